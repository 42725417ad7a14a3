//! Physical constants in atomic units.

// Bohr magneton [e hbar / m_e]
pub const MU_B: f64 = 0.5;

// electron spin g-factor [dimensionless]
pub const G_S: f64 = 2.0023193043622;

// electron rest mass [m_e]
pub const ELECTRON_REST_MASS: f64 = 1.0;

// Coulomb constant 1 / (4 pi epsilon_0)
pub const COULOMB_CONSTANT: f64 = 1.0;

// elementary charge [e]
pub const ELEMENTARY_CHARGE: f64 = 1.0;

// Rydberg constant for infinite nuclear mass [hartree]
pub const RYDBERG: f64 = 0.5;
