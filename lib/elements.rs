//! Matrix elements of single-atom operators.
//!
//! The [`MatrixElementSource`] trait is the contract every basis and operator
//! build relies on. [`ModelElements`] is a deterministic analytic
//! implementation: hydrogen-like energies shifted by quantum defects, exact
//! angular factors, and a closed-form model of the radial integrals.

use std::path::Path;
use rustc_hash::FxHashMap as HashMap;
use crate::{
    constants::{ G_S, MU_B, RYDBERG },
    error::Result,
    spin::{ SpinTotal, sign, w3j_halves, w6j_halves },
    state::{ AtomicState, StateTwo },
};

/// Strategy used to evaluate radial integrals.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    #[default]
    Numerov,
    Whittaker,
}

/// Source of single-atom energies and matrix elements.
///
/// All getters are pure functions of their arguments. The component `q` of a
/// spherical operator is implied by the magnetic quantum numbers,
/// `m_row = m_col + q`. The `precalculate_*` calls warm up internal caches
/// for a whole list of states and must complete before the getters are
/// queried from several threads.
pub trait MatrixElementSource: Sync {
    /// Energy of a state.
    fn energy(&self, state: &AtomicState) -> f64;

    /// Effective principal quantum number.
    fn nstar(&self, state: &AtomicState) -> f64;

    /// `<row| r C^1_q |col>`.
    fn electric_dipole(&self, row: &AtomicState, col: &AtomicState) -> f64 {
        self.electric_multipole(row, col, 1)
    }

    /// `<row| r^κ C^κ_q |col>`.
    fn electric_multipole(&self, row: &AtomicState, col: &AtomicState, kappa: u32) -> f64;

    /// `<row| μ_q |col>` with `μ = -μ_B (L + g_s S)`.
    fn magnetic_dipole(&self, row: &AtomicState, col: &AtomicState) -> f64;

    /// Angular-momentum-resolved diamagnetic element of rank `k` (0 or 2).
    fn diamagnetism(&self, row: &AtomicState, col: &AtomicState, k: u32) -> f64;

    /// `<row| r^power |col>`, radial part only.
    fn radial(&self, row: &AtomicState, col: &AtomicState, power: i32) -> f64;

    fn precalculate_electric_momentum(&mut self, states: &[AtomicState], q: i32);

    fn precalculate_magnetic_momentum(&mut self, states: &[AtomicState], q: i32);

    fn precalculate_diamagnetism(&mut self, states: &[AtomicState], k: u32, q: i32);

    fn precalculate_multipole(&mut self, states: &[AtomicState], kappa: u32);

    fn precalculate_radial(&mut self, states: &[AtomicState], power: i32);

    fn set_method(&mut self, method: Method);

    /// Load quantum defects from a file.
    fn set_defect_db(&mut self, path: &Path) -> Result<()>;
}

/* Selection rules ************************************************************/

/// Selection rule for a multipole operator of rank `kappa`, optionally
/// restricted to a single component `q`.
pub fn selection_rules_multipole(
    row: &AtomicState,
    col: &AtomicState,
    kappa: u32,
    q: Option<i32>,
) -> bool
{
    let k = kappa as i32;
    let dl = (row.l as i32 - col.l as i32).abs();
    let j2r = row.j.halves() as i32;
    let j2c = col.j.halves() as i32;
    let dq2 = row.m.halves() - col.m.halves();
    row.species == col.species
        && dl <= k
        && dl % 2 == k % 2
        && (j2r - j2c).abs() <= 2 * k
        && 2 * k <= j2r + j2c
        && dq2.abs() <= 2 * k
        && q.map_or(true, |q| dq2 == 2 * q)
        && !(k == 2 && j2r == 1 && j2c == 1)
}

/// Selection rule for the magnetic moment component `q`.
pub fn selection_rules_momentum(row: &AtomicState, col: &AtomicState, q: i32) -> bool {
    let dq2 = row.m.halves() - col.m.halves();
    row.species == col.species
        && row.l == col.l
        && (row.j.halves() as i32 - col.j.halves() as i32).abs() <= 2
        && q.abs() <= 1
        && dq2 == 2 * q
}

/// Angular part `<l_r j_r m_r| C^κ_q |l_c j_c m_c>` for `q = m_r - m_c`.
pub fn multipole_angular(row: &AtomicState, col: &AtomicState, kappa: u32) -> f64 {
    let k2 = 2 * kappa as i32;
    let (l2r, l2c) = (2 * row.l as i32, 2 * col.l as i32);
    let (j2r, j2c) = (row.j.halves() as i32, col.j.halves() as i32);
    let s2 = row.s.halves() as i32;
    let (m2r, m2c) = (row.m.halves(), col.m.halves());
    let q2 = m2r - m2c;
    let ang_m = sign((j2r - m2r) / 2) * w3j_halves(j2r, -m2r, k2, q2, j2c, m2c);
    if ang_m == 0.0 { return 0.0; }
    let ang_j
        = sign((l2r + s2 + j2c + k2) / 2)
        * f64::from((j2r + 1) * (j2c + 1)).sqrt()
        * w6j_halves(l2r, j2r, s2, j2c, l2c, k2);
    let ang_l
        = sign(l2r / 2)
        * f64::from((l2r + 1) * (l2c + 1)).sqrt()
        * w3j_halves(l2r, 0, k2, 0, l2c, 0);
    ang_m * ang_j * ang_l
}

/// Angular part of `<row| L_q + g_s S_q |col>` for `q = m_r - m_c`.
pub fn momentum_angular(row: &AtomicState, col: &AtomicState) -> f64 {
    if row.l != col.l { return 0.0; }
    let l = f64::from(row.l);
    let s = row.s.f();
    let l2 = 2 * row.l as i32;
    let (j2r, j2c) = (row.j.halves() as i32, col.j.halves() as i32);
    let s2 = row.s.halves() as i32;
    let (m2r, m2c) = (row.m.halves(), col.m.halves());
    let q2 = m2r - m2c;
    let ang_m = sign((j2r - m2r) / 2) * w3j_halves(j2r, -m2r, 2, q2, j2c, m2c);
    if ang_m == 0.0 { return 0.0; }
    let dims = f64::from((j2r + 1) * (j2c + 1)).sqrt();
    let reduced_l
        = sign((l2 + s2 + j2c + 2) / 2) * dims
        * w6j_halves(l2, j2r, s2, j2c, l2, 2)
        * (l * (l + 1.0) * (2.0 * l + 1.0)).sqrt();
    let reduced_s
        = sign((l2 + s2 + j2r + 2) / 2) * dims
        * w6j_halves(s2, j2r, l2, j2c, s2, 2)
        * (s * (s + 1.0) * (2.0 * s + 1.0)).sqrt();
    ang_m * (reduced_l + G_S * reduced_s)
}

/// Le Roy radius `2 (sqrt(<r^2>_1) + sqrt(<r^2>_2))` of a pair of physical
/// states.
pub fn le_roy_radius<M>(source: &M, pair: &StateTwo) -> Option<f64>
where M: MatrixElementSource + ?Sized
{
    let a = pair.first().atomic()?;
    let b = pair.second().atomic()?;
    let ra = source.radial(a, a, 2).sqrt();
    let rb = source.radial(b, b, 2).sqrt();
    Some(2.0 * (ra + rb))
}

/* Analytic model *************************************************************/

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
enum ElementKind {
    Multipole(u32),
    Magnetic,
    Diamagnetism(u32),
    Radial(i32),
}

type ElementKey = (ElementKind, AtomicState, AtomicState);

#[derive(Clone, Debug, serde::Deserialize)]
struct DefectEntry {
    species: String,
    l: u32,
    j: f64,
    delta: f64,
}

#[derive(Clone, Debug, serde::Deserialize)]
struct DefectDb {
    #[serde(default)]
    defect: Vec<DefectEntry>,
}

/// Leading-order quantum defects `δ(l, j)` for a few alkali species.
fn builtin_defect(species: &str, l: u32, j: SpinTotal) -> f64 {
    let jp = j.halves() > 2 * l;
    match (species, l) {
        ("Rb", 0) => 3.1311804,
        ("Rb", 1) => if jp { 2.6416737 } else { 2.6548849 },
        ("Rb", 2) => if jp { 1.34646572 } else { 1.34809171 },
        ("Rb", 3) => if jp { 0.0165437 } else { 0.0165192 },
        ("Cs", 0) => 4.049325,
        ("Cs", 1) => if jp { 3.559058 } else { 3.591556 },
        ("Cs", 2) => if jp { 2.466210 } else { 2.475365 },
        ("Cs", 3) => if jp { 0.033537 } else { 0.033392 },
        _ => 0.0,
    }
}

/// Analytic matrix-element model with optional precomputed caches.
#[derive(Clone, Debug, Default)]
pub struct ModelElements {
    method: Method,
    defects: HashMap<(String, u32, SpinTotal), f64>,
    cache: HashMap<ElementKey, f64>,
}

impl ModelElements {
    pub fn new() -> Self { Self::default() }

    pub fn method(&self) -> Method { self.method }

    /// Override the quantum defect of `(species, l, j)`.
    pub fn set_defect(&mut self, species: &str, l: u32, j: f64, delta: f64) {
        self.defects.insert((species.to_string(), l, SpinTotal::from_f64(j)), delta);
        self.cache.clear();
    }

    /// Number of cached matrix elements.
    pub fn size(&self) -> usize { self.cache.len() }

    fn defect(&self, s: &AtomicState) -> f64 {
        self.defects.get(&(s.species.clone(), s.l, s.j))
            .copied()
            .unwrap_or_else(|| builtin_defect(&s.species, s.l, s.j))
    }

    fn radial_model(&self, row: &AtomicState, col: &AtomicState, power: i32) -> f64 {
        let n1 = self.nstar(row);
        let n2 = self.nstar(col);
        let dn = n1 - n2;
        let overlap = match self.method {
            Method::Numerov => (-dn * dn).exp(),
            Method::Whittaker => 1.0 / (1.0 + dn * dn),
        };
        let nt = 0.5 * (n1 + n2);
        let lmax = f64::from(row.l.max(col.l));
        let scale = match power {
            0 => 1.0,
            1 => 1.5 * nt * (nt * nt - lmax * lmax).max(0.0).sqrt(),
            2 => 0.5 * nt * nt * (5.0 * nt * nt + 1.0 - 3.0 * lmax * (lmax + 1.0)),
            p => (1.5 * nt * nt).powi(p),
        };
        overlap * scale
    }

    fn compute(&self, kind: ElementKind, row: &AtomicState, col: &AtomicState) -> f64 {
        match kind {
            ElementKind::Multipole(kappa) => {
                let ang = multipole_angular(row, col, kappa);
                if ang == 0.0 { 0.0 } else { ang * self.radial_model(row, col, kappa as i32) }
            },
            ElementKind::Magnetic => {
                let ang = momentum_angular(row, col);
                if ang == 0.0 { 0.0 } else { -MU_B * ang * self.radial_model(row, col, 0) }
            },
            ElementKind::Diamagnetism(k) => {
                let ang = multipole_angular(row, col, k);
                if ang == 0.0 {
                    0.0
                } else {
                    2.0 / 3.0 * ang * self.radial_model(row, col, 2)
                }
            },
            ElementKind::Radial(p) => self.radial_model(row, col, p),
        }
    }

    fn lookup(&self, kind: ElementKind, row: &AtomicState, col: &AtomicState) -> f64 {
        self.cache.get(&(kind, row.clone(), col.clone()))
            .copied()
            .unwrap_or_else(|| self.compute(kind, row, col))
    }

    fn warm_up<F>(&mut self, kind: ElementKind, states: &[AtomicState], rule: F)
    where F: Fn(&AtomicState, &AtomicState) -> bool
    {
        for row in states.iter() {
            for col in states.iter() {
                if !rule(row, col) { continue; }
                let key = (kind, row.clone(), col.clone());
                if self.cache.contains_key(&key) { continue; }
                let value = self.compute(kind, row, col);
                self.cache.insert(key, value);
            }
        }
    }
}

impl MatrixElementSource for ModelElements {
    fn energy(&self, state: &AtomicState) -> f64 {
        let ns = self.nstar(state);
        -RYDBERG / (ns * ns)
    }

    fn nstar(&self, state: &AtomicState) -> f64 {
        f64::from(state.n) - self.defect(state)
    }

    fn electric_multipole(&self, row: &AtomicState, col: &AtomicState, kappa: u32) -> f64 {
        self.lookup(ElementKind::Multipole(kappa), row, col)
    }

    fn magnetic_dipole(&self, row: &AtomicState, col: &AtomicState) -> f64 {
        self.lookup(ElementKind::Magnetic, row, col)
    }

    fn diamagnetism(&self, row: &AtomicState, col: &AtomicState, k: u32) -> f64 {
        self.lookup(ElementKind::Diamagnetism(k), row, col)
    }

    fn radial(&self, row: &AtomicState, col: &AtomicState, power: i32) -> f64 {
        self.lookup(ElementKind::Radial(power), row, col)
    }

    fn precalculate_electric_momentum(&mut self, states: &[AtomicState], q: i32) {
        self.warm_up(
            ElementKind::Multipole(1),
            states,
            |r, c| selection_rules_multipole(r, c, 1, Some(q)),
        );
    }

    fn precalculate_magnetic_momentum(&mut self, states: &[AtomicState], q: i32) {
        self.warm_up(
            ElementKind::Magnetic,
            states,
            |r, c| selection_rules_momentum(r, c, q),
        );
    }

    fn precalculate_diamagnetism(&mut self, states: &[AtomicState], k: u32, q: i32) {
        self.warm_up(
            ElementKind::Diamagnetism(k),
            states,
            |r, c| selection_rules_multipole(r, c, k, Some(q)),
        );
    }

    fn precalculate_multipole(&mut self, states: &[AtomicState], kappa: u32) {
        self.warm_up(
            ElementKind::Multipole(kappa),
            states,
            |r, c| selection_rules_multipole(r, c, kappa, None),
        );
    }

    fn precalculate_radial(&mut self, states: &[AtomicState], power: i32) {
        self.warm_up(ElementKind::Radial(power), states, |_, _| true);
    }

    fn set_method(&mut self, method: Method) {
        if method != self.method {
            self.method = method;
            self.cache.clear();
        }
    }

    fn set_defect_db(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)?;
        let db: DefectDb = toml::from_str(&text)?;
        for entry in db.defect.into_iter() {
            self.defects.insert(
                (entry.species, entry.l, SpinTotal::from_f64(entry.j)),
                entry.delta,
            );
        }
        self.cache.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn st(n: u32, l: u32, j: f64, m: f64) -> AtomicState {
        AtomicState::new("Rb", n, l, j, m)
    }

    #[test]
    fn multipole_rules() {
        let s = st(10, 0, 0.5, 0.5);
        let p = st(10, 1, 0.5, -0.5);
        assert!(selection_rules_multipole(&p, &s, 1, Some(-1)));
        assert!(!selection_rules_multipole(&p, &s, 1, Some(0)));
        assert!(!selection_rules_multipole(&s, &s, 1, None));
        // rank 2 between two j = 1/2 states vanishes
        let d = st(10, 2, 1.5, 0.5);
        assert!(!selection_rules_multipole(&s, &s, 2, Some(0)));
        assert!(selection_rules_multipole(&d, &s, 2, Some(0)));
    }

    #[test]
    fn momentum_rules() {
        let a = st(10, 1, 0.5, 0.5);
        let b = st(10, 1, 1.5, -0.5);
        assert!(selection_rules_momentum(&a, &b, 1));
        assert!(!selection_rules_momentum(&a, &b, -1));
        assert!(!selection_rules_momentum(&a, &st(10, 0, 0.5, 0.5), 0));
    }

    #[test]
    fn rank_zero_angular_is_identity() {
        let p = st(10, 1, 1.5, 0.5);
        assert_relative_eq!(multipole_angular(&p, &p, 0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn dipole_angular_values() {
        // <p1/2 m=1/2| C^1_0 |s1/2 m=1/2> = -1/3 for the phase conventions
        // used here; only its magnitude is convention independent
        let s = st(10, 0, 0.5, 0.5);
        let p = st(10, 1, 0.5, 0.5);
        assert_relative_eq!(multipole_angular(&p, &s, 1).abs(), 1.0 / 3.0, epsilon = 1e-12);
        // adjoint relation for the q = -1 and q = +1 components
        let pm = st(10, 1, 1.5, -0.5);
        let up = multipole_angular(&pm, &s, 1);
        let dn = multipole_angular(&s, &pm, 1);
        assert_relative_eq!(dn, -up, epsilon = 1e-12);
    }

    #[test]
    fn magnetic_moment_of_s_state() {
        // g_j = g_s for an s state, so <m| mu_z |m> = -mu_B g_s m
        let model = ModelElements::new();
        let s = st(10, 0, 0.5, 0.5);
        assert_relative_eq!(
            model.magnetic_dipole(&s, &s),
            -MU_B * G_S * 0.5,
            epsilon = 1e-10,
        );
    }

    #[test]
    fn energies_follow_defects() {
        let mut model = ModelElements::new();
        let s = st(10, 0, 0.5, 0.5);
        assert_relative_eq!(model.nstar(&s), 10.0 - 3.1311804, epsilon = 1e-12);
        model.set_defect("Rb", 0, 0.5, 0.0);
        assert_relative_eq!(model.energy(&s), -0.005, epsilon = 1e-15);
    }

    #[test]
    fn warm_up_matches_direct_evaluation() {
        let mut model = ModelElements::new();
        let states = vec![st(10, 0, 0.5, 0.5), st(10, 1, 0.5, 0.5), st(10, 1, 1.5, 0.5)];
        let direct = model.electric_dipole(&states[1], &states[0]);
        model.precalculate_electric_momentum(&states, 0);
        assert!(model.size() > 0);
        assert_eq!(model.electric_dipole(&states[1], &states[0]), direct);
        model.set_method(Method::Whittaker);
        assert_eq!(model.size(), 0);
    }

    #[test]
    fn le_roy_radius_is_positive() {
        let model = ModelElements::new();
        let a = crate::state::StateOne::Atomic(st(10, 0, 0.5, 0.5));
        let pair = StateTwo::new(a.clone(), a);
        assert!(le_roy_radius(&model, &pair).unwrap() > 0.0);
        let art = StateTwo::new(
            crate::state::StateOne::artificial("x"),
            crate::state::StateOne::artificial("y"),
        );
        assert!(le_roy_radius(&model, &art).is_none());
    }
}
