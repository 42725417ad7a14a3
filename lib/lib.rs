#![allow(non_snake_case)]

//! Symmetry-reduced basis construction and sparse interaction operators for
//! one- and two-atom Rydberg systems.

pub mod constants;
pub mod error;
pub mod config;
pub mod spin;
pub mod state;
pub mod space;
pub mod symmetry;
pub mod scalar;
pub mod sparse;
pub mod matrix;
pub mod elements;
pub mod rotator;
pub mod cache;
pub mod system;

pub use error::{ Error, Result };
pub use matrix::Hamiltonianmatrix;
pub use state::{ StateOne, StateTwo };
pub use system::{ SystemBuild, one::SystemOne, two::SystemTwo };
