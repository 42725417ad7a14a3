//! One- and two-particle quantum states.

use std::fmt;
use std::hash::Hash;
use crate::spin::{ SpinProj, SpinTotal, sign };

/* States *********************************************************************/

/// Requirements for any state that can be registered in a
/// [`StateSpace`][crate::space::StateSpace].
pub trait BasisState: Clone + Eq + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync {
    /// Partial description of a state used to select groups of states.
    type Pattern;

    /// Return `true` if `self` is a placeholder without physical properties.
    fn is_artificial(&self) -> bool;

    /// Return the mirror partner of `self` under reflection through the
    /// xz-plane, together with the real part of the phase picked up.
    ///
    /// Artificial states are their own partners.
    fn reflected(&self) -> (Self, f64);

    /// Total magnetic quantum number, if defined.
    fn total_m(&self) -> Option<SpinProj>;

    /// Return `true` if `self` is selected by `pattern`.
    fn matches(&self, pattern: &Self::Pattern) -> bool;
}

/// Physical single-atom state `|n, l, j, m>` of a given species.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AtomicState {
    pub species: String,
    pub n: u32,
    pub l: u32,
    pub j: SpinTotal,
    pub m: SpinProj,
    pub s: SpinTotal,
}

impl AtomicState {
    /// Create a new state with the electron spin derived from the species.
    ///
    /// `j` and `m` are given as `f64`s and rounded to the nearest
    /// half-integer.
    pub fn new(species: &str, n: u32, l: u32, j: f64, m: f64) -> Self {
        Self {
            species: species.to_string(),
            n,
            l,
            j: SpinTotal::from_f64(j),
            m: SpinProj::from_f64(m),
            s: species_spin(species),
        }
    }

    /// Return `true` if the quantum numbers are mutually consistent.
    pub fn is_valid(&self) -> bool {
        let l2 = 2 * self.l as i32;
        let j2 = self.j.halves() as i32;
        let s2 = self.s.halves() as i32;
        self.l < self.n
            && (j2 - l2).abs() <= s2
            && (j2 - l2 - s2) % 2 == 0
            && self.m.halves().abs() <= j2
            && (j2 - self.m.halves()) % 2 == 0
    }

    /// `(-1)^(l + m - j)`.
    pub fn reflection_sign(&self) -> f64 {
        let twice = 2 * self.l as i32 + self.m.halves() - self.j.halves() as i32;
        sign(twice / 2)
    }

    /// Return a copy of `self` with `m -> -m`.
    pub fn with_reflected_m(&self) -> Self {
        Self { m: self.m.reflected(), ..self.clone() }
    }

    /// Return a copy of `self` with a different magnetic quantum number.
    pub fn with_m(&self, m: SpinProj) -> Self {
        Self { m, ..self.clone() }
    }

    /// Return `(species, n, l, j)`, which fixes the radial wavefunction.
    pub fn radial_key(&self) -> (&str, u32, u32, SpinTotal) {
        (&self.species, self.n, self.l, self.j)
    }
}

impl fmt::Display for AtomicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "|{}, {} {} {}, mj={}>",
            self.species, self.n, l_label(self.l), self.j, self.m,
        )
    }
}

fn l_label(l: u32) -> String {
    const LABELS: [&str; 7] = ["S", "P", "D", "F", "G", "H", "I"];
    LABELS.get(l as usize)
        .map(|s| s.to_string())
        .unwrap_or_else(|| l.to_string())
}

/// Electron spin of a species.
///
/// A trailing digit in the species name gives the spin multiplicity (`Sr3`
/// is a triplet, `Sr1` a singlet); otherwise the spin is 1/2.
pub fn species_spin(species: &str) -> SpinTotal {
    match species.chars().last().and_then(|c| c.to_digit(10)) {
        Some(mult) if mult >= 1 => SpinTotal::new(mult - 1),
        _ => SpinTotal::new(1),
    }
}

/// A single-particle basis state.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StateOne {
    /// A physical state whose properties are supplied by a
    /// [`MatrixElementSource`][crate::elements::MatrixElementSource].
    Atomic(AtomicState),
    /// A user-injected placeholder with zero energy and no couplings.
    Artificial(String),
}

impl StateOne {
    /// Shortcut for a physical state; see [`AtomicState::new`].
    pub fn new(species: &str, n: u32, l: u32, j: f64, m: f64) -> Self {
        Self::Atomic(AtomicState::new(species, n, l, j, m))
    }

    /// Create a placeholder state with a label.
    pub fn artificial(label: &str) -> Self { Self::Artificial(label.to_string()) }

    /// Return the physical state, if `self` is one.
    pub fn atomic(&self) -> Option<&AtomicState> {
        match self {
            Self::Atomic(s) => Some(s),
            Self::Artificial(_) => None,
        }
    }

    pub fn species(&self) -> Option<&str> { self.atomic().map(|s| s.species.as_str()) }

    pub fn n(&self) -> Option<u32> { self.atomic().map(|s| s.n) }

    pub fn l(&self) -> Option<u32> { self.atomic().map(|s| s.l) }

    pub fn j(&self) -> Option<SpinTotal> { self.atomic().map(|s| s.j) }

    pub fn m(&self) -> Option<SpinProj> { self.atomic().map(|s| s.m) }

    /// Return the placeholder label, if `self` is artificial.
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Artificial(label) => Some(label),
            Self::Atomic(_) => None,
        }
    }
}

impl From<AtomicState> for StateOne {
    fn from(s: AtomicState) -> Self { Self::Atomic(s) }
}

impl fmt::Display for StateOne {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atomic(s) => s.fmt(f),
            Self::Artificial(label) => write!(f, "|{}>", label),
        }
    }
}

/// Generalized single-particle state: each `None` field matches anything.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatePattern {
    pub species: Option<String>,
    pub n: Option<u32>,
    pub l: Option<u32>,
    pub j: Option<f64>,
    pub m: Option<f64>,
}

impl StatePattern {
    pub fn new() -> Self { Self::default() }

    pub fn species(mut self, species: &str) -> Self {
        self.species = Some(species.to_string());
        self
    }

    pub fn n(mut self, n: u32) -> Self { self.n = Some(n); self }

    pub fn l(mut self, l: u32) -> Self { self.l = Some(l); self }

    pub fn j(mut self, j: f64) -> Self { self.j = Some(j); self }

    pub fn m(mut self, m: f64) -> Self { self.m = Some(m); self }
}

impl BasisState for StateOne {
    type Pattern = StatePattern;

    fn is_artificial(&self) -> bool { matches!(self, Self::Artificial(_)) }

    fn reflected(&self) -> (Self, f64) {
        match self {
            Self::Atomic(s) => {
                (Self::Atomic(s.with_reflected_m()), s.reflection_sign())
            },
            Self::Artificial(_) => (self.clone(), 1.0),
        }
    }

    fn total_m(&self) -> Option<SpinProj> { self.m() }

    fn matches(&self, pattern: &StatePattern) -> bool {
        let Some(s) = self.atomic() else { return false; };
        pattern.species.as_ref().map_or(true, |sp| *sp == s.species)
            && pattern.n.map_or(true, |n| n == s.n)
            && pattern.l.map_or(true, |l| l == s.l)
            && pattern.j.map_or(true, |j| SpinTotal::from_f64(j) == s.j)
            && pattern.m.map_or(true, |m| SpinProj::from_f64(m) == s.m)
    }
}

/// An ordered pair of single-particle states.
///
/// The pair may carry a total momentum and a pair energy. Neither takes part
/// in comparisons: two pairs are the same state whenever their components
/// agree.
#[derive(Clone, Debug)]
pub struct StateTwo {
    pub states: [StateOne; 2],
    momentum: Option<SpinProj>,
    energy: Option<f64>,
}

impl StateTwo {
    pub fn new(first: StateOne, second: StateOne) -> Self {
        Self { states: [first, second], momentum: None, energy: None }
    }

    pub fn first(&self) -> &StateOne { &self.states[0] }

    pub fn second(&self) -> &StateOne { &self.states[1] }

    /// Pair-level magnetic quantum number, if assigned.
    pub fn momentum(&self) -> Option<SpinProj> { self.momentum }

    /// Pair energy, if assigned.
    pub fn energy(&self) -> Option<f64> { self.energy }

    pub fn with_momentum(mut self, momentum: SpinProj) -> Self {
        self.momentum = Some(momentum);
        self
    }

    pub fn with_energy(mut self, energy: f64) -> Self {
        self.energy = Some(energy);
        self
    }

    /// Return the state with both particles exchanged.
    ///
    /// Pair momentum and energy are unchanged by the exchange.
    pub fn swapped(&self) -> Self {
        Self {
            states: [self.states[1].clone(), self.states[0].clone()],
            momentum: self.momentum,
            energy: self.energy,
        }
    }

    /// Sum of both orbital quantum numbers, if both states are physical.
    pub fn total_l(&self) -> Option<u32> {
        Some(self.states[0].l()? + self.states[1].l()?)
    }
}

impl PartialEq for StateTwo {
    fn eq(&self, other: &Self) -> bool { self.states == other.states }
}

impl Eq for StateTwo { }

impl PartialOrd for StateTwo {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StateTwo {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering { self.states.cmp(&other.states) }
}

impl Hash for StateTwo {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) { self.states.hash(state); }
}

impl From<(StateOne, StateOne)> for StateTwo {
    fn from(pair: (StateOne, StateOne)) -> Self { Self::new(pair.0, pair.1) }
}

impl fmt::Display for StateTwo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ⊗ {}", self.states[0], self.states[1])
    }
}

impl BasisState for StateTwo {
    type Pattern = [StatePattern; 2];

    fn is_artificial(&self) -> bool {
        self.states[0].is_artificial() || self.states[1].is_artificial()
    }

    // each single-particle mirror image carries a factor of i, so the pair
    // picks up an extra -1
    fn reflected(&self) -> (Self, f64) {
        let (a, pa) = self.states[0].reflected();
        let (b, pb) = self.states[1].reflected();
        let mirror = Self {
            states: [a, b],
            momentum: self.momentum.map(SpinProj::reflected),
            energy: self.energy,
        };
        (mirror, -pa * pb)
    }

    fn total_m(&self) -> Option<SpinProj> {
        let ma = self.states[0].m()?;
        let mb = self.states[1].m()?;
        Some(SpinProj::new(ma.halves() + mb.halves()))
    }

    fn matches(&self, pattern: &[StatePattern; 2]) -> bool {
        self.states[0].matches(&pattern[0]) && self.states[1].matches(&pattern[1])
    }
}
