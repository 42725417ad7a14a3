//! Two atoms coupled by the electrostatic multipole expansion.
//!
//! The pair basis is the tensor product of the eigenbases of two
//! [`SystemOne`]s, restricted to a window of pair energies and reduced by the
//! pair symmetries (total momentum, permutation, inversion, reflection).

use std::collections::{ BTreeMap, BTreeSet };
use itertools::Itertools;
use log::{ debug, warn };
use num_complex::Complex64 as C64;
use num_traits::Zero;
use rustc_hash::FxHashMap as HashMap;
use crate::{
    cache::OperatorKey,
    constants::{ COULOMB_CONSTANT, ELEMENTARY_CHARGE },
    elements::{ MatrixElementSource, selection_rules_multipole },
    error::{ Result, config_err },
    matrix::{ Hamiltonianmatrix, combine, combine_around },
    rotator::WignerD,
    scalar::Element,
    space::StateSpace,
    sparse::{ SpMat, Triplet },
    spin::{ SpinProj, SpinTotal, cg_halves, sign },
    state::{ AtomicState, BasisState, StateOne, StateTwo },
    symmetry::{ ConservedMomenta, Momentum, Parity, Symmetry },
    system::{
        Combinable,
        SystemBuild,
        SystemCore,
        check_combinable,
        merge_symmetries,
        one::SystemOne,
    },
};

/// Default largest power of `1/R` kept in the multipole expansion
/// (dipole-dipole).
pub const DEFAULT_ORDER: u32 = 3;

/// Two-particle system.
#[derive(Clone, Debug)]
pub struct SystemTwo<A>
where A: Element
{
    core: SystemCore<A, StateTwo>,
    system1: SystemOne<A>,
    system2: SystemOne<A>,
    distance: Option<f64>,
    // polar angle of the interatomic axis
    theta: f64,
    // azimuth of the interatomic axis
    phi: f64,
    order: u32,
    // (target, delta_e) of a window centered on a pair energy
    pair_window: Option<(f64, f64)>,
    symmetry: Symmetry,
}

/// Symmetry operations acting on pair states.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum PairOp {
    Permutation,
    Inversion,
    Reflection,
}

impl PairOp {
    /// Image of a pair state and the phase picked up.
    fn image(self, state: &StateTwo) -> Option<(StateTwo, f64)> {
        match self {
            Self::Permutation => Some((state.swapped(), 1.0)),
            Self::Inversion => {
                let l = state.total_l()?;
                Some((state.swapped(), sign(l as i32)))
            },
            Self::Reflection => Some(state.reflected()),
        }
    }
}

fn factorial(n: u32) -> f64 { (1..=n).map(f64::from).product() }

/// Angular prefactor of the `(κ1, q1; κ2, q2)` term of the multipole
/// expansion, without the `1/R^(κ1 + κ2 + 1)` power law.
fn multipole_prefactor(
    wigner: &mut WignerD,
    kappa1: u32,
    kappa2: u32,
    q1: i32,
    q2: i32,
    theta: f64,
    phi: f64,
) -> C64
{
    let kappa = kappa1 + kappa2;
    let q = q1 + q2;
    let norm
        = (factorial(2 * kappa)
            / (factorial(2 * kappa1) * factorial(2 * kappa2))).sqrt();
    let cg = cg_halves(
        2 * kappa1 as i32, 2 * q1,
        2 * kappa2 as i32, 2 * q2,
        2 * kappa as i32, 2 * q,
    );
    if cg == 0.0 { return C64::zero(); }
    let d = wigner.d(
        SpinTotal::new(2 * kappa),
        SpinProj::new(2 * q),
        SpinProj::new(0),
        theta,
    );
    C64::from_polar(sign(kappa2 as i32) * norm * cg * d, -f64::from(q) * phi)
}

fn add_at<A>(v: &mut BTreeMap<usize, A>, idx: usize, val: A)
where A: Element
{
    *v.entry(idx).or_insert_with(A::zero) += val;
}

fn sqnorm<A>(v: &BTreeMap<usize, A>) -> f64
where A: Element
{
    v.values().map(|x| x.square()).sum()
}

/// Apply `(1 + p S) / 2` to a vector over registered pair states; images that
/// are not registered are dropped.
fn project<A>(
    v: &BTreeMap<usize, A>,
    space: &StateSpace<StateTwo>,
    op: PairOp,
    parity: f64,
) -> BTreeMap<usize, A>
where A: Element
{
    let mut w: BTreeMap<usize, A> = BTreeMap::new();
    for (&row, &val) in v.iter() {
        add_at(&mut w, row, val * A::from_real(0.5));
        let image
            = space.state(row)
            .and_then(|s| op.image(s))
            .and_then(|(s, phase)| space.index_of(&s).map(|idx| (idx, phase)));
        if let Some((idx, phase)) = image {
            add_at(&mut w, idx, val * A::from_real(0.5 * parity * phase));
        }
    }
    w
}

/// Pair of one-particle states labeled with its total momentum and the sum of
/// the unperturbed one-particle energies; artificial states contribute no
/// energy.
fn labeled_pair<M>(source: &M, first: &StateOne, second: &StateOne) -> StateTwo
where M: MatrixElementSource + ?Sized
{
    let energy: f64
        = [first, second].iter()
        .map(|s| s.atomic().map_or(0.0, |a| source.energy(a)))
        .sum();
    let pair = StateTwo::new(first.clone(), second.clone()).with_energy(energy);
    match pair.total_m() {
        Some(m) => pair.with_momentum(m),
        None => pair,
    }
}

/// Incrementally built orthonormal set of sparse vectors.
struct Orthonormal<A> {
    vectors: Vec<BTreeMap<usize, A>>,
    // coordinate -> vectors with support there
    touching: HashMap<usize, Vec<usize>>,
}

impl<A> Orthonormal<A>
where A: Element
{
    fn new() -> Self { Self { vectors: Vec::new(), touching: HashMap::default() } }

    /// Orthogonalize `c` against the set and add it if enough of it is left.
    fn push(&mut self, mut c: BTreeMap<usize, A>, threshold: f64) -> bool {
        let before = sqnorm(&c);
        if before < threshold { return false; }
        for _ in 0..2 {
            let overlapping: BTreeSet<usize>
                = c.keys()
                .filter_map(|k| self.touching.get(k))
                .flatten()
                .copied()
                .collect();
            for idx in overlapping.into_iter() {
                let u = &self.vectors[idx];
                let dot: A
                    = u.iter()
                    .filter_map(|(k, uk)| c.get(k).map(|ck| uk.conj() * *ck))
                    .fold(A::zero(), |acc, x| acc + x);
                for (k, uk) in u.iter() {
                    add_at(&mut c, *k, -(dot * *uk));
                }
            }
        }
        let after = sqnorm(&c);
        if after < threshold * before { return false; }
        let norm = A::from_real(after.sqrt());
        let c: BTreeMap<usize, A>
            = c.into_iter()
            .filter(|(_, v)| !v.is_zero())
            .map(|(k, v)| (k, v / norm))
            .collect();
        let idx = self.vectors.len();
        c.keys().for_each(|k| self.touching.entry(*k).or_default().push(idx));
        self.vectors.push(c);
        true
    }

    /// Collect the vectors as the columns of a `dim x len` matrix.
    fn into_matrix(self, dim: usize) -> SpMat<A> {
        let cols = self.vectors.len();
        let triplets: Vec<Triplet<A>>
            = self.vectors.into_iter()
            .enumerate()
            .flat_map(|(col, v)| {
                v.into_iter().map(move |(row, val)| Triplet::new(row, col, val))
            })
            .collect();
        SpMat::from_triplets(dim, cols, triplets)
    }
}

impl<A> SystemTwo<A>
where A: Element
{
    /// Pair up two one-particle systems.
    ///
    /// Fails if the systems differ in species, fields, or diamagnetism. If
    /// their symmetries differ, both are loosened to a common symmetry.
    pub fn new(mut system1: SystemOne<A>, mut system2: SystemOne<A>) -> Result<Self> {
        check_combinable(&system1, &system2)?;
        if system1.symmetry() != system2.symmetry() {
            let merged = merge_symmetries(system1.symmetry(), system2.symmetry());
            system1.replace_symmetry(merged.clone());
            system2.replace_symmetry(merged);
        }
        Ok(Self {
            core: SystemCore::default(),
            system1,
            system2,
            distance: None,
            theta: 0.0,
            phi: 0.0,
            order: DEFAULT_ORDER,
            pair_window: None,
            symmetry: Symmetry::default(),
        })
    }

    pub fn system_one(&self) -> &SystemOne<A> { &self.system1 }

    pub fn system_two(&self) -> &SystemOne<A> { &self.system2 }

    pub fn distance(&self) -> Option<f64> { self.distance }

    /// Polar angle of the interatomic axis with respect to the quantization
    /// axis.
    pub fn angle(&self) -> f64 { self.theta }

    pub fn order(&self) -> u32 { self.order }

    pub fn symmetry(&self) -> &Symmetry { &self.symmetry }

    /// Target pair energy and half-width of the window set by
    /// [`Self::set_pair_energy_window`].
    pub fn pair_energy_window(&self) -> Option<(f64, f64)> { self.pair_window }

    /// Keep only product states whose pair energy lies within `delta_e` of
    /// `target`.
    ///
    /// This takes the place of the absolute window of
    /// [`SystemBuild::set_energy_window`] when the product basis is formed.
    pub fn set_pair_energy_window(&mut self, target: f64, delta_e: f64) -> Result<()> {
        if !(delta_e >= 0.0) || !target.is_finite() {
            return Err(config_err(
                "the pair energy window needs a finite target and a nonnegative width"));
        }
        self.pair_window = Some((target, delta_e));
        self.core.invalidate_basis();
        Ok(())
    }

    /// Set the interatomic distance.
    pub fn set_distance(&mut self, distance: f64) {
        self.distance = Some(distance);
        self.core.invalidate_parameters();
    }

    /// Set the polar angle of the interatomic axis; the axis stays in the
    /// xz-plane.
    pub fn set_angle(&mut self, theta: f64) {
        self.theta = theta;
        self.phi = 0.0;
        self.core.invalidate_parameters();
    }

    /// Set distance and orientation from the vector joining both atoms.
    pub fn set_distance_vector(&mut self, r: [f64; 3]) -> Result<()> {
        let [x, y, z] = r;
        let norm = (x * x + y * y + z * z).sqrt();
        if norm == 0.0 {
            return Err(config_err("the interatomic distance must be nonzero"));
        }
        self.distance = Some(norm);
        self.theta = (z / norm).clamp(-1.0, 1.0).acos();
        self.phi = y.atan2(x);
        self.core.invalidate_parameters();
        Ok(())
    }

    /// Largest power of `1/R` kept in the multipole expansion; must be at
    /// least 3.
    pub fn set_order(&mut self, order: u32) -> Result<()> {
        if order < 3 {
            return Err(config_err("the order of the multipole expansion must be at least 3"));
        }
        self.order = order;
        self.core.invalidate_parameters();
        Ok(())
    }

    pub fn set_conserved_parity_under_permutation(&mut self, parity: Parity) {
        self.symmetry.permutation = parity;
        self.core.invalidate_basis();
    }

    pub fn set_conserved_parity_under_inversion(&mut self, parity: Parity) {
        self.symmetry.inversion = parity;
        self.core.invalidate_basis();
    }

    pub fn set_conserved_parity_under_reflection(&mut self, parity: Parity) -> Result<()> {
        self.symmetry.set_reflection(parity)?;
        self.core.invalidate_basis();
        Ok(())
    }

    /// Restrict the total magnetic quantum number of the pair.
    pub fn set_conserved_momenta_under_rotation<I>(&mut self, momenta: I) -> Result<()>
    where I: IntoIterator<Item = Momentum>
    {
        self.symmetry.set_rotation(momenta)?;
        self.core.invalidate_basis();
        Ok(())
    }

    /// Tensor product of both diagonalized one-particle systems, restricted
    /// to the pair energy window.
    fn combined_basis<M>(&mut self, source: &mut M)
        -> Result<(StateSpace<StateTwo>, Hamiltonianmatrix<A>)>
    where M: MatrixElementSource + ?Sized
    {
        self.system1.diagonalize(source)?;
        self.system2.diagonalize(source)?;
        let h1 = self.system1.hamiltonian();
        let h2 = self.system2.hamiltonian();
        let product
            = match self.pair_window {
                Some((target, delta_e)) => combine_around(h1, h2, target, delta_e),
                None => combine(h1, h2, self.core.energy_min, self.core.energy_max),
            };
        let n2 = h2.num_coordinates();
        let used: BTreeSet<usize> = product.basis().iter().map(|(r, _, _)| r).collect();
        let mut space: StateSpace<StateTwo> = StateSpace::new();
        let mut rows: HashMap<usize, usize> = HashMap::default();
        for r in used.into_iter() {
            let s1 = self.system1.states().state(r / n2);
            let s2 = self.system2.states().state(r % n2);
            let (Some(s1), Some(s2)) = (s1, s2) else {
                return Err(config_err("product coordinate outside the one-particle bases"));
            };
            let (idx, _) = space.insert(labeled_pair(&*source, s1, s2));
            rows.insert(r, idx);
        }
        let basis = product.basis().remap_rows(space.len(), |r| rows.get(&r).copied());
        Ok((space, Hamiltonianmatrix::new(product.entries().clone(), basis)))
    }

    /// One unit basis vector per user-added pair state.
    fn user_basis<M>(&self, source: &M)
        -> Result<(StateSpace<StateTwo>, Hamiltonianmatrix<A>)>
    where M: MatrixElementSource + ?Sized
    {
        let species = self.system1.species();
        let mut space: StateSpace<StateTwo> = StateSpace::new();
        let mut hamiltonian: Hamiltonianmatrix<A> = Hamiltonianmatrix::default();
        for state in self.core.states_to_add.iter() {
            if state.states.iter().any(|s| s.species().map_or(false, |sp| sp != species)) {
                return Err(config_err(format!(
                    "the state {} is of the wrong species", state)));
            }
            let pair = labeled_pair(source, state.first(), state.second());
            let energy = pair.energy().unwrap_or(0.0);
            let (idx, added) = space.insert(pair);
            if !added {
                return Err(config_err(format!(
                    "the state {} is already contained in the list of states", state)));
            }
            hamiltonian.add_basis(idx, idx, A::one());
            hamiltonian.add_entries(idx, idx, A::from_real(energy));
        }
        hamiltonian.compress(space.len(), space.len());
        Ok((space, hamiltonian))
    }

    /// Symmetry actually applied to a pair basis, with fallbacks for
    /// requests that cannot be honored.
    fn effective_symmetry(&self, space: &StateSpace<StateTwo>) -> Symmetry {
        let mut symmetry = self.symmetry.clone();
        if symmetry.permutation.is_set()
            && self.core.states_to_add.is_empty()
            && self.system1.states().to_vec() != self.system2.states().to_vec()
        {
            warn!(
                "permutation symmetry needs identical one-particle bases; \
                it is not applied"
            );
            symmetry.permutation = Parity::NotApplicable;
        }
        if (symmetry.reflection.is_set() || symmetry.inversion.is_set())
            && space.iter().any(|s| s.is_artificial())
        {
            warn!("only permutation symmetry can be applied to artificial states");
            symmetry.reflection = Parity::NotApplicable;
            symmetry.inversion = Parity::NotApplicable;
        }
        symmetry
    }

    /// Keep basis vectors lying on allowed total momenta, up to a squared
    /// weight of `threshold` elsewhere.
    fn filter_rotation(
        space: &StateSpace<StateTwo>,
        rotation: &ConservedMomenta,
        hamiltonian: Hamiltonianmatrix<A>,
        threshold: f64,
    ) -> Hamiltonianmatrix<A>
    {
        if rotation.is_arbitrary() { return hamiltonian; }
        let allowed: Vec<bool>
            = space.iter()
            .map(|s| s.total_m().map_or(true, |m| rotation.contains(m)))
            .collect();
        let keep: Vec<usize>
            = hamiltonian.basis()
            .filter(|r, _, _| allowed[r])
            .col_sqnorms()
            .into_iter()
            .enumerate()
            .filter_map(|(k, w)| (1.0 - w < threshold).then_some(k))
            .collect();
        hamiltonian.get_block(&keep)
    }

    /// Restrict the basis to the joint eigenspace of the discrete pair
    /// symmetries.
    fn symmetrize(
        &self,
        space: &StateSpace<StateTwo>,
        symmetry: &Symmetry,
        hamiltonian: Hamiltonianmatrix<A>,
    ) -> Hamiltonianmatrix<A>
    {
        let ops: Vec<(PairOp, f64)>
            = [
                (PairOp::Permutation, symmetry.permutation),
                (PairOp::Inversion, symmetry.inversion),
                (PairOp::Reflection, symmetry.reflection),
            ]
            .into_iter()
            .filter_map(|(op, parity)| parity.sign().map(|p| (op, p)))
            .collect();
        if ops.is_empty() { return hamiltonian; }
        let bc = hamiltonian.basis();
        let bct = bc.adjoint();
        let threshold = self.core.tolerances.sqnorm;
        let mut accepted: Orthonormal<A> = Orthonormal::new();
        for col in 0..bc.cols() {
            let mut w: BTreeMap<usize, A> = bc.col(col).collect();
            for (op, parity) in ops.iter() {
                w = project(&w, space, *op, *parity);
            }
            let mut c: BTreeMap<usize, A> = BTreeMap::new();
            for (row, val) in w.into_iter() {
                for (k, b) in bct.col(row) { add_at(&mut c, k, b * val); }
            }
            accepted.push(c, threshold);
        }
        let transform = accepted.into_matrix(bc.cols());
        let entries
            = transform.adjoint()
            .matmul(hamiltonian.entries())
            .matmul(&transform);
        let basis = bc.matmul(&transform);
        Hamiltonianmatrix::new(entries, basis)
    }

    fn distinct_atoms(&self) -> Vec<AtomicState> {
        let atoms: BTreeSet<AtomicState>
            = self.core.space.iter()
            .flat_map(|s| s.states.iter())
            .filter_map(|s| s.atomic().cloned())
            .collect();
        atoms.into_iter().collect()
    }
}

impl<A> SystemBuild<A> for SystemTwo<A>
where A: Element
{
    type State = StateTwo;

    fn core(&self) -> &SystemCore<A, StateTwo> { &self.core }

    fn core_mut(&mut self) -> &mut SystemCore<A, StateTwo> { &mut self.core }

    fn initialize_basis<M>(&mut self, source: &mut M) -> Result<()>
    where M: MatrixElementSource + ?Sized
    {
        let (space, hamiltonian)
            = if self.core.states_to_add.is_empty() {
                self.combined_basis(source)?
            } else {
                self.user_basis(&*source)?
            };
        let symmetry = self.effective_symmetry(&space);
        let hamiltonian
            = Self::filter_rotation(
                &space,
                &symmetry.rotation,
                hamiltonian,
                self.core.tolerances.sqnorm,
            );
        let hamiltonian = self.symmetrize(&space, &symmetry, hamiltonian);
        debug!(
            "pair basis: {} states in {} basis vectors",
            space.len(),
            hamiltonian.num_basisvectors(),
        );
        self.core.space = space;
        self.core.unperturbed = Some(hamiltonian);
        Ok(())
    }

    fn interaction_terms(&self) -> Vec<(OperatorKey, C64)> {
        let Some(distance) = self.distance else { return Vec::new(); };
        let mut wigner = WignerD::new();
        let mut terms: Vec<(OperatorKey, C64)> = Vec::new();
        let ranks
            = (1..self.order).cartesian_product(1..self.order)
            .filter(|(kappa1, kappa2)| kappa1 + kappa2 < self.order);
        for (kappa1, kappa2) in ranks {
            let powerlaw = 1.0 / distance.powi((kappa1 + kappa2) as i32 + 1);
            let components
                = (-(kappa1 as i32)..=kappa1 as i32)
                .cartesian_product(-(kappa2 as i32)..=kappa2 as i32);
            for (q1, q2) in components {
                let coeff
                    = multipole_prefactor(
                        &mut wigner,
                        kappa1, kappa2, q1, q2,
                        self.theta, self.phi,
                    ) * powerlaw;
                terms.push((OperatorKey::PairMultipole { kappa1, kappa2, q1, q2 }, coeff));
            }
        }
        terms
    }

    fn warm_up<M>(&self, source: &mut M, keys: &[OperatorKey])
    where M: MatrixElementSource + ?Sized
    {
        let kappas: BTreeSet<u32>
            = keys.iter()
            .filter_map(|k| match *k {
                OperatorKey::PairMultipole { kappa1, kappa2, .. }
                    => Some([kappa1, kappa2]),
                _ => None,
            })
            .flatten()
            .collect();
        if kappas.is_empty() { return; }
        let atoms = self.distinct_atoms();
        for kappa in kappas.into_iter() {
            source.precalculate_multipole(&atoms, kappa);
        }
    }

    fn operator_element<M>(&self, source: &M, key: OperatorKey, row: usize, col: usize)
        -> Option<A>
    where M: MatrixElementSource + ?Sized
    {
        let OperatorKey::PairMultipole { kappa1, kappa2, q1, q2 } = key else {
            return None;
        };
        let r = self.core.space.state(row)?;
        let c = self.core.space.state(col)?;
        let (r1, r2) = (r.first().atomic()?, r.second().atomic()?);
        let (c1, c2) = (c.first().atomic()?, c.second().atomic()?);
        if !selection_rules_multipole(r1, c1, kappa1, Some(q1))
            || !selection_rules_multipole(r2, c2, kappa2, Some(q2))
        {
            return None;
        }
        let value
            = COULOMB_CONSTANT * ELEMENTARY_CHARGE * ELEMENTARY_CHARGE
            * source.electric_multipole(r1, c1, kappa1)
            * source.electric_multipole(r2, c2, kappa2);
        Some(A::from_real(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::{
        elements::ModelElements,
        error::Error,
        state::StateOne,
    };

    fn atom(ls: &[u32]) -> SystemOne<f64> {
        let mut sys = SystemOne::new("Rb");
        sys.restrict_n([10]);
        sys.restrict_l(ls.iter().copied());
        sys
    }

    #[test]
    fn incompatible_systems() {
        let a = atom(&[0]);
        let b: SystemOne<f64> = SystemOne::new("Cs");
        assert!(matches!(SystemTwo::new(a.clone(), b), Err(Error::IncompatibleSystems(_))));
        let mut b = atom(&[0]);
        b.set_efield([0.0, 0.0, 1e-8]).unwrap();
        assert!(matches!(SystemTwo::new(a.clone(), b), Err(Error::IncompatibleSystems(_))));
        let mut b = atom(&[0]);
        b.enable_diamagnetism(false);
        assert!(matches!(SystemTwo::new(a, b), Err(Error::IncompatibleSystems(_))));
    }

    #[test]
    fn product_basis() {
        let mut model = ModelElements::new();
        let mut pair = SystemTwo::new(atom(&[0]), atom(&[0])).unwrap();
        pair.build_basis(&mut model).unwrap();
        assert_eq!(pair.num_states(), 4);
        assert_eq!(pair.num_basisvectors(), 4);
        let e = model.energy(&AtomicState::new("Rb", 10, 0, 0.5, 0.5));
        for d in pair.unperturbed().unwrap().diagonal_energies() {
            assert_relative_eq!(d, 2.0 * e, epsilon = 1e-12);
        }
    }

    #[test]
    fn pair_energy_window() {
        let mut model = ModelElements::new();
        let e = model.energy(&AtomicState::new("Rb", 10, 0, 0.5, 0.5));
        let mut pair = SystemTwo::new(atom(&[0, 1]), atom(&[0, 1])).unwrap();
        pair.set_energy_window(2.0 * e - 1e-6, 2.0 * e + 1e-6);
        pair.build_basis(&mut model).unwrap();
        assert_eq!(pair.num_basisvectors(), 4);
    }

    #[test]
    fn permutation_symmetry() {
        let mut model = ModelElements::new();
        let mut pair = SystemTwo::new(atom(&[0]), atom(&[0])).unwrap();
        pair.set_conserved_parity_under_permutation(Parity::Even);
        pair.build_basis(&mut model).unwrap();
        assert_eq!(pair.num_basisvectors(), 3);

        pair.set_conserved_parity_under_permutation(Parity::Odd);
        pair.build_basis(&mut model).unwrap();
        assert_eq!(pair.num_basisvectors(), 1);
        let sq: Vec<f64> = pair.unperturbed().unwrap().basis().col_sqnorms();
        assert_relative_eq!(sq[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn total_momentum_restriction() {
        let mut model = ModelElements::new();
        let mut pair = SystemTwo::new(atom(&[0]), atom(&[0])).unwrap();
        pair.set_conserved_momenta_under_rotation([Momentum::from(0.0)]).unwrap();
        pair.build_basis(&mut model).unwrap();
        assert_eq!(pair.num_basisvectors(), 2);
    }

    #[test]
    fn product_states_are_labeled() {
        let mut model = ModelElements::new();
        let mut pair = SystemTwo::new(atom(&[0, 1]), atom(&[0, 1])).unwrap();
        pair.build_basis(&mut model).unwrap();
        assert_eq!(pair.num_states(), 64);
        for state in pair.states().iter() {
            let expected: f64
                = state.states.iter()
                .map(|s| model.energy(s.atomic().unwrap()))
                .sum();
            assert_relative_eq!(state.energy().unwrap(), expected, epsilon = 1e-12);
            assert_eq!(state.momentum(), state.total_m());
        }
    }

    #[test]
    fn rotation_filter_keeps_pure_columns() {
        let up = StateOne::new("Rb", 10, 0, 0.5, 0.5);
        let down = StateOne::new("Rb", 10, 0, 0.5, -0.5);
        let mut space: StateSpace<StateTwo> = StateSpace::new();
        let (uu, _) = space.insert(StateTwo::new(up.clone(), up.clone()));
        let (ud, _) = space.insert(StateTwo::new(up.clone(), down.clone()));
        let (dd, _) = space.insert(StateTwo::new(down.clone(), down.clone()));
        space.insert(StateTwo::new(down.clone(), up));
        let mut hamiltonian: Hamiltonianmatrix<f64> = Hamiltonianmatrix::default();
        // M = 0
        hamiltonian.add_basis(ud, 0, 1.0);
        // half on M = 1
        hamiltonian.add_basis(uu, 1, 0.5_f64.sqrt());
        hamiltonian.add_basis(ud, 1, 0.5_f64.sqrt());
        // 0.64 on M = 0, 0.36 on M = -1
        hamiltonian.add_basis(ud, 2, 0.8);
        hamiltonian.add_basis(dd, 2, 0.6);
        for k in 0..3 { hamiltonian.add_entries(k, k, 1.0); }
        hamiltonian.compress(3, space.len());

        let rotation = ConservedMomenta::from_momenta([Momentum::from(0.0)]).unwrap();
        let kept
            = SystemTwo::<f64>::filter_rotation(
                &space, &rotation, hamiltonian.clone(), 0.05);
        assert_eq!(kept.num_basisvectors(), 1);
        assert_relative_eq!(kept.basis().get(ud, 0), 1.0);
        let loose
            = SystemTwo::<f64>::filter_rotation(&space, &rotation, hamiltonian, 0.4);
        assert_eq!(loose.num_basisvectors(), 2);
    }

    #[test]
    fn dipole_dipole_coefficients() {
        let mut wigner = WignerD::new();
        let c0 = multipole_prefactor(&mut wigner, 1, 1, 0, 0, 0.0, 0.0);
        let c1 = multipole_prefactor(&mut wigner, 1, 1, 1, -1, 0.0, 0.0);
        let c2 = multipole_prefactor(&mut wigner, 1, 1, 1, 0, 0.0, 0.0);
        assert_relative_eq!(c0.re, -2.0, epsilon = 1e-12);
        assert_relative_eq!(c1.re, -1.0, epsilon = 1e-12);
        assert_relative_eq!(c2.norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn dipole_dipole_coupling() {
        let mut model = ModelElements::new();
        let mut pair = SystemTwo::new(atom(&[0, 1]), atom(&[0, 1])).unwrap();
        assert!(pair.interaction_terms().is_empty());
        pair.set_distance(500.0);
        assert!(pair.set_order(2).is_err());
        pair.diagonalize(&mut model).unwrap();
        // along z only q1 + q2 = 0 contributes: (1, -1), (0, 0), (-1, 1)
        assert_eq!(pair.cache().len(), 3);
        assert_eq!(pair.num_basisvectors(), pair.num_states());
        let coupling = pair.cache().get(&OperatorKey::PairMultipole {
            kappa1: 1, kappa2: 1, q1: 0, q2: 0,
        }).unwrap();
        assert!(coupling.nnz() > 0);
        assert!(coupling.max_abs_diff(&coupling.adjoint()) < 1e-12);

        pair.set_distance(5000.0);
        assert_eq!(pair.assembly(), crate::system::Assembly::ParametersDirty);
        pair.diagonalize(&mut model).unwrap();
        assert_eq!(pair.cache().len(), 3);
        assert!(pair.is_diagonalized());

        pair.set_angle(std::f64::consts::FRAC_PI_2);
        pair.diagonalize(&mut model).unwrap();
        assert!(pair.cache().len() > 3);
    }

    #[test]
    fn user_pair_states() {
        let mut model = ModelElements::new();
        let mut pair = SystemTwo::new(atom(&[0]), atom(&[0])).unwrap();
        let s = StateOne::new("Rb", 10, 0, 0.5, 0.5);
        pair.add_states([
            StateTwo::new(s.clone(), s.clone()),
            StateTwo::new(s.clone(), StateOne::artificial("x")),
        ]);
        pair.build_basis(&mut model).unwrap();
        assert_eq!(pair.num_states(), 2);
        let e = model.energy(s.atomic().unwrap());
        let energies = pair.unperturbed().unwrap().diagonal_energies();
        assert_relative_eq!(energies[0], 2.0 * e, epsilon = 1e-12);
        assert_relative_eq!(energies[1], e, epsilon = 1e-12);
        let both = pair.states().state(0).unwrap();
        assert_relative_eq!(both.energy().unwrap(), 2.0 * e, epsilon = 1e-12);
        assert_eq!(both.momentum(), Some(SpinProj::new(2)));
        let half = pair.states().state(1).unwrap();
        assert_relative_eq!(half.energy().unwrap(), e, epsilon = 1e-12);
        assert_eq!(half.momentum(), None);

        let mut pair = SystemTwo::new(atom(&[0]), atom(&[0])).unwrap();
        let cs = StateOne::new("Cs", 10, 0, 0.5, 0.5);
        pair.add_states([StateTwo::new(s, cs)]);
        assert!(pair.build_basis(&mut model).is_err());
    }

    #[test]
    fn distance_vector() {
        let mut pair = SystemTwo::new(atom(&[0]), atom(&[0])).unwrap();
        pair.set_distance_vector([3.0, 0.0, 4.0]).unwrap();
        assert_relative_eq!(pair.distance().unwrap(), 5.0);
        assert_relative_eq!(pair.angle(), (0.8_f64).acos(), epsilon = 1e-12);
        assert!(pair.set_distance_vector([0.0; 3]).is_err());
    }
}
