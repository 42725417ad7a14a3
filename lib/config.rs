//! TOML descriptions of one- and two-particle systems.
//!
//! ```toml
//! species = "Rb"
//! n = [60]
//! l = [0, 1]
//! energy_window = [-1e-4, -1e-5]
//! reflection = "even"
//! momenta = [0.5, -0.5]
//!
//! [efield]
//! vector = [0.0, 0.0, 1e-11]
//! rotation = { axes = { to_z_axis = [0.0, 0.0, 1.0], to_y_axis = [0.0, 1.0, 0.0] } }
//!
//! [ion]
//! charge = 1
//! order = 2
//! distance = 2000.0
//! ```

use std::path::Path;
use serde::Deserialize;
use crate::{
    error::{ Result, config_err },
    rotator::Rotation,
    scalar::Element,
    state::{ StateOne, StateTwo },
    symmetry::{ Momentum, Parity },
    system::{ SystemBuild, one::SystemOne, two::SystemTwo },
};

/// Numeric thresholds used throughout basis construction and assembly.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Tolerances {
    /// Interaction terms with coefficients at or below this magnitude are
    /// skipped.
    pub interaction: f64,
    /// Squared-norm threshold for necessary states and surviving
    /// symmetrized basis vectors.
    pub sqnorm: f64,
    /// Eigenvector components at or below this magnitude are pruned.
    pub eigenvector: f64,
    /// Largest imaginary part silently dropped when narrowing to `f64`.
    pub imaginary: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            interaction: 1e-24,
            sqnorm: 0.05,
            eigenvector: 1e-12,
            imaginary: 1e-12,
        }
    }
}

/// A field vector, optionally given in a rotated frame.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldConfig {
    pub vector: [f64; 3],
    #[serde(default)]
    pub rotation: Option<Rotation>,
}

/// Coupling to an ion on the quantization axis.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IonConfig {
    pub charge: i32,
    pub order: u32,
    pub distance: f64,
}

/// An entry of a conserved-momentum list: a number or `"arbitrary"`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MomentumConfig {
    Value(f64),
    Keyword(String),
}

impl MomentumConfig {
    fn to_momentum(&self) -> Result<Momentum> {
        match self {
            Self::Value(m) => Ok(Momentum::from(*m)),
            Self::Keyword(k) if k == "arbitrary" => Ok(Momentum::Arbitrary),
            Self::Keyword(k) => Err(config_err(format!("unknown momentum '{}'", k))),
        }
    }
}

fn momenta(list: &[MomentumConfig]) -> Result<Vec<Momentum>> {
    list.iter().map(|m| m.to_momentum()).collect()
}

/// A user-added single-particle state.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StateConfig {
    Atomic { n: u32, l: u32, j: f64, m: f64 },
    Artificial { label: String },
}

impl StateConfig {
    fn to_state(&self, species: &str) -> StateOne {
        match self {
            Self::Atomic { n, l, j, m } => StateOne::new(species, *n, *l, *j, *m),
            Self::Artificial { label } => StateOne::artificial(label),
        }
    }
}

fn default_true() -> bool { true }

fn apply_window<A, S>(system: &mut S, window: Option<[f64; 2]>) -> Result<()>
where
    A: Element,
    S: SystemBuild<A>,
{
    if let Some([min, max]) = window {
        if min > max {
            return Err(config_err(format!(
                "empty energy window [{}, {}]", min, max)));
        }
        system.set_energy_window(min, max);
    }
    Ok(())
}

/// Description of a [`SystemOne`].
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemOneConfig {
    pub species: String,
    #[serde(default)]
    pub n: Vec<u32>,
    #[serde(default)]
    pub l: Vec<u32>,
    #[serde(default)]
    pub j: Vec<f64>,
    #[serde(default)]
    pub m: Vec<f64>,
    #[serde(default)]
    pub energy_window: Option<[f64; 2]>,
    #[serde(default)]
    pub efield: Option<FieldConfig>,
    #[serde(default)]
    pub bfield: Option<FieldConfig>,
    #[serde(default = "default_true")]
    pub diamagnetism: bool,
    #[serde(default)]
    pub ion: Option<IonConfig>,
    #[serde(default)]
    pub reflection: Parity,
    #[serde(default)]
    pub momenta: Option<Vec<MomentumConfig>>,
    #[serde(default)]
    pub states: Vec<StateConfig>,
    #[serde(default)]
    pub tolerances: Tolerances,
}

impl SystemOneConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> { Ok(toml::from_str(s)?) }

    pub fn from_file<P>(path: P) -> Result<Self>
    where P: AsRef<Path>
    {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Construct the described system; nothing is computed yet.
    pub fn build<A>(&self) -> Result<SystemOne<A>>
    where A: Element
    {
        let mut system: SystemOne<A> = SystemOne::new(&self.species);
        if !self.n.is_empty() { system.restrict_n(self.n.iter().copied()); }
        if !self.l.is_empty() { system.restrict_l(self.l.iter().copied()); }
        if !self.j.is_empty() { system.restrict_j(self.j.iter().copied()); }
        if !self.m.is_empty() { system.restrict_m(self.m.iter().copied()); }
        apply_window::<A, _>(&mut system, self.energy_window)?;
        if let Some(field) = &self.efield {
            match &field.rotation {
                Some(rot) => system.set_efield_rotated(field.vector, rot)?,
                None => system.set_efield(field.vector)?,
            }
        }
        if let Some(field) = &self.bfield {
            match &field.rotation {
                Some(rot) => system.set_bfield_rotated(field.vector, rot)?,
                None => system.set_bfield(field.vector)?,
            }
        }
        system.enable_diamagnetism(self.diamagnetism);
        if let Some(ion) = &self.ion {
            system.set_ion_charge(ion.charge);
            system.set_ryd_ion_order(ion.order);
            system.set_ryd_ion_distance(ion.distance);
        }
        if let Some(list) = &self.momenta {
            system.set_conserved_momenta_under_rotation(momenta(list)?)?;
        }
        system.set_conserved_parity_under_reflection(self.reflection)?;
        system.add_states(self.states.iter().map(|s| s.to_state(&self.species)));
        system.set_tolerances(self.tolerances);
        Ok(system)
    }
}

/// Description of a [`SystemTwo`] built from two copies of one atom.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemTwoConfig {
    pub atom: SystemOneConfig,
    #[serde(default)]
    pub distance: Option<f64>,
    /// Polar angle of the interatomic axis.
    #[serde(default)]
    pub angle: Option<f64>,
    #[serde(default)]
    pub distance_vector: Option<[f64; 3]>,
    #[serde(default)]
    pub order: Option<u32>,
    #[serde(default)]
    pub energy_window: Option<[f64; 2]>,
    /// Target pair energy and half-width, in place of `energy_window`.
    #[serde(default)]
    pub pair_energy_window: Option<[f64; 2]>,
    #[serde(default)]
    pub permutation: Parity,
    #[serde(default)]
    pub inversion: Parity,
    #[serde(default)]
    pub reflection: Parity,
    #[serde(default)]
    pub momenta: Option<Vec<MomentumConfig>>,
    #[serde(default)]
    pub states: Vec<[StateConfig; 2]>,
    #[serde(default)]
    pub tolerances: Tolerances,
}

impl SystemTwoConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> { Ok(toml::from_str(s)?) }

    pub fn from_file<P>(path: P) -> Result<Self>
    where P: AsRef<Path>
    {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Construct the pair system from two copies of the configured atom.
    pub fn build<A>(&self) -> Result<SystemTwo<A>>
    where A: Element
    {
        let atom: SystemOne<A> = self.atom.build()?;
        let mut system = SystemTwo::new(atom.clone(), atom)?;
        self.apply(&mut system)?;
        Ok(system)
    }

    /// Apply the pair parameters to an existing system.
    pub fn apply<A>(&self, system: &mut SystemTwo<A>) -> Result<()>
    where A: Element
    {
        if self.distance.is_some() && self.distance_vector.is_some() {
            return Err(config_err("give either a distance or a distance vector, not both"));
        }
        if let Some(d) = self.distance { system.set_distance(d); }
        if let Some(theta) = self.angle { system.set_angle(theta); }
        if let Some(r) = self.distance_vector { system.set_distance_vector(r)?; }
        if let Some(order) = self.order { system.set_order(order)?; }
        if self.energy_window.is_some() && self.pair_energy_window.is_some() {
            return Err(config_err(
                "give either an energy window or a pair energy window, not both"));
        }
        apply_window::<A, _>(system, self.energy_window)?;
        if let Some([target, delta_e]) = self.pair_energy_window {
            system.set_pair_energy_window(target, delta_e)?;
        }
        if let Some(list) = &self.momenta {
            system.set_conserved_momenta_under_rotation(momenta(list)?)?;
        }
        system.set_conserved_parity_under_reflection(self.reflection)?;
        system.set_conserved_parity_under_permutation(self.permutation);
        system.set_conserved_parity_under_inversion(self.inversion);
        let species = &self.atom.species;
        system.add_states(
            self.states.iter()
                .map(|[a, b]| StateTwo::new(a.to_state(species), b.to_state(species)))
        );
        system.set_tolerances(self.tolerances);
        Ok(())
    }
}
