//! Basis construction and Hamiltonian assembly shared by one- and
//! two-particle systems.
//!
//! A system moves through three stages: the basis is enumerated and
//! symmetrized into a field-free operator, interaction operators are built
//! into an [`InteractionCache`], and finally the total Hamiltonian is
//! assembled as a linear combination and diagonalized. Setters only record
//! which stage has become stale (see [`Assembly`]); the work is done lazily by
//! [`SystemBuild::diagonalize`] and friends.

use log::{ debug, info, warn };
use num_complex::Complex64 as C64;
use crate::{
    cache::{ self, InteractionCache, OperatorKey },
    config::Tolerances,
    elements::MatrixElementSource,
    error::{ Result, config_err },
    matrix::Hamiltonianmatrix,
    rotator::{ Rotate, Rotation, build_staterotator, narrow, rotate_states },
    scalar::Element,
    space::StateSpace,
    sparse::{ SpMat, Triplet },
    state::BasisState,
    symmetry::{ ConservedMomenta, Parity, Symmetry },
};

pub mod one;
pub mod two;

/// Staleness of the assembled Hamiltonian.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Assembly {
    /// Nothing changed since the last assembly.
    Clean,
    /// Fields, charges, or geometry changed; only the final linear combination
    /// must be redone.
    ParametersDirty,
    /// The basis must be rebuilt, which also discards every cached operator.
    SymmetryDirty,
}

/// State shared by every system type.
#[derive(Clone, Debug)]
pub struct SystemCore<A, S>
where
    A: Element,
    S: BasisState,
{
    pub(crate) space: StateSpace<S>,
    pub(crate) states_to_add: Vec<S>,
    pub(crate) energy_min: f64,
    pub(crate) energy_max: f64,
    pub(crate) assembly: Assembly,
    pub(crate) diagonalized: bool,
    pub(crate) unperturbed: Option<Hamiltonianmatrix<A>>,
    pub(crate) hamiltonian: Hamiltonianmatrix<A>,
    pub(crate) cache: InteractionCache<A>,
    pub(crate) tolerances: Tolerances,
}

impl<A, S> Default for SystemCore<A, S>
where
    A: Element,
    S: BasisState,
{
    fn default() -> Self {
        Self {
            space: StateSpace::new(),
            states_to_add: Vec::new(),
            energy_min: f64::NEG_INFINITY,
            energy_max: f64::INFINITY,
            assembly: Assembly::SymmetryDirty,
            diagonalized: false,
            unperturbed: None,
            hamiltonian: Hamiltonianmatrix::default(),
            cache: InteractionCache::new(),
            tolerances: Tolerances::default(),
        }
    }
}

impl<A, S> SystemCore<A, S>
where
    A: Element,
    S: BasisState,
{
    /// Mark the basis as stale.
    pub(crate) fn invalidate_basis(&mut self) {
        self.assembly = Assembly::SymmetryDirty;
        self.diagonalized = false;
    }

    /// Mark the linear combination as stale without touching the basis.
    pub(crate) fn invalidate_parameters(&mut self) {
        if self.assembly == Assembly::Clean {
            self.assembly = Assembly::ParametersDirty;
        }
    }

    /// Return `true` if the energy lies inside the window.
    pub(crate) fn in_window(&self, energy: f64) -> bool {
        energy >= self.energy_min && energy <= self.energy_max
    }

    fn require_basis(&self) -> Result<&Hamiltonianmatrix<A>> {
        match (&self.unperturbed, self.assembly) {
            (Some(_), Assembly::Clean | Assembly::ParametersDirty)
                => Ok(&self.hamiltonian),
            _ => Err(config_err("the basis has not been built")),
        }
    }
}

/// Parameters that must agree between one-particle systems combined into a
/// pair system.
pub trait Combinable {
    fn species(&self) -> &str;

    fn efield(&self) -> [f64; 3];

    fn bfield(&self) -> [f64; 3];

    fn diamagnetism(&self) -> bool;

    fn symmetry(&self) -> &Symmetry;
}

/// Check that two systems can be combined.
pub fn check_combinable<T, U>(a: &T, b: &U) -> Result<()>
where
    T: Combinable + ?Sized,
    U: Combinable + ?Sized,
{
    use crate::error::Error::IncompatibleSystems;
    if a.species() != b.species() {
        return Err(IncompatibleSystems(format!(
            "species differ: {} vs {}", a.species(), b.species())));
    }
    if a.efield() != b.efield() {
        return Err(IncompatibleSystems("electric fields differ".into()));
    }
    if a.bfield() != b.bfield() {
        return Err(IncompatibleSystems("magnetic fields differ".into()));
    }
    if a.diamagnetism() != b.diamagnetism() {
        return Err(IncompatibleSystems("diamagnetism settings differ".into()));
    }
    Ok(())
}

/// Loosest one-particle symmetry compatible with both inputs.
///
/// Differing reflection parities become [`Parity::NotApplicable`]; differing
/// momentum restrictions are merged.
pub fn merge_symmetries(a: &Symmetry, b: &Symmetry) -> Symmetry {
    let mut merged = a.clone();
    let mut num_different: usize = 0;
    if a.reflection != b.reflection {
        merged.reflection = Parity::NotApplicable;
        num_different += 1;
    }
    if a.rotation != b.rotation {
        merged.rotation
            = match (&a.rotation, &b.rotation) {
                (ConservedMomenta::Set(_), ConservedMomenta::Set(_))
                    => a.rotation.union(&b.rotation),
                _ => ConservedMomenta::Arbitrary,
            };
        num_different += 1;
    }
    if num_different > 1 {
        warn!(
            "the systems differ in more than one symmetry; for the combined \
            system, the notion of symmetries might be meaningless"
        );
    }
    merged
}

/// Common driver for basis construction, operator caching, and Hamiltonian
/// assembly.
///
/// Implementors provide the basis enumeration and the operator elements in
/// canonical coordinates; everything else is shared.
pub trait SystemBuild<A>: Sized
where A: Element
{
    /// Basis state type.
    type State: BasisState + Rotate;

    fn core(&self) -> &SystemCore<A, Self::State>;

    fn core_mut(&mut self) -> &mut SystemCore<A, Self::State>;

    /// Register all basis states and store the field-free operator in
    /// `core.unperturbed`.
    fn initialize_basis<M>(&mut self, source: &mut M) -> Result<()>
    where M: MatrixElementSource + ?Sized;

    /// Operators contributing to the Hamiltonian, with their current
    /// coefficients.
    fn interaction_terms(&self) -> Vec<(OperatorKey, C64)>;

    /// Precompute matrix elements needed for the given operators.
    fn warm_up<M>(&self, source: &mut M, keys: &[OperatorKey])
    where M: MatrixElementSource + ?Sized;

    /// Element `(row, col)` of an operator in canonical coordinates.
    fn operator_element<M>(&self, source: &M, key: OperatorKey, row: usize, col: usize)
        -> Option<A>
    where M: MatrixElementSource + ?Sized;

    /// Interaction terms whose coefficients are not negligible.
    fn active_terms(&self) -> Vec<(OperatorKey, C64)> {
        let tol = self.core().tolerances.interaction;
        self.interaction_terms().into_iter()
            .filter(|(_, coeff)| coeff.norm() > tol)
            .collect()
    }

    /// (Re)build the basis if it is stale.
    fn build_basis<M>(&mut self, source: &mut M) -> Result<()>
    where M: MatrixElementSource + ?Sized
    {
        let core = self.core();
        if core.unperturbed.is_some() && core.assembly != Assembly::SymmetryDirty {
            return Ok(());
        }
        let core = self.core_mut();
        core.cache.clear();
        core.space.clear();
        core.unperturbed = None;
        self.initialize_basis(source)?;
        let core = self.core_mut();
        let unperturbed
            = core.unperturbed.clone()
            .ok_or_else(|| config_err("basis initialization produced no operator"))?;
        info!(
            "built basis: {} states, {} basis vectors",
            core.space.len(),
            unperturbed.num_basisvectors(),
        );
        core.hamiltonian = unperturbed;
        core.assembly = Assembly::ParametersDirty;
        core.diagonalized = false;
        Ok(())
    }

    /// Build every interaction operator required by the current parameters
    /// that is not cached yet.
    fn build_interaction<M>(&mut self, source: &mut M) -> Result<()>
    where
        M: MatrixElementSource + ?Sized,
        Self: Sync,
    {
        self.build_basis(source)?;
        let mut missing: Vec<OperatorKey>
            = self.active_terms().into_iter()
            .map(|(key, _)| key.canonical())
            .filter(|key| !self.core().cache.contains(key))
            .collect();
        missing.sort_unstable();
        missing.dedup();
        if missing.is_empty() { return Ok(()); }
        self.warm_up(source, &missing);
        let n = self.core().space.len();
        let mut grouped = {
            let this: &Self = self;
            let source: &M = source;
            cache::collect_triplets(
                n,
                &missing,
                |key, row, col| this.operator_element(source, key, row, col),
            )
        };
        let core = self.core_mut();
        let basis: SpMat<A>
            = core.unperturbed.as_ref()
            .map(|h| h.basis().clone())
            .ok_or_else(|| config_err("the basis has not been built"))?;
        for key in missing.into_iter() {
            let triplets: Vec<Triplet<A>> = grouped.remove(&key).unwrap_or_default();
            debug!("operator {}: {} canonical elements", key, triplets.len());
            core.cache.insert_canonical(key, triplets, n, &basis);
        }
        Ok(())
    }

    /// Assemble the total Hamiltonian if any parameter changed.
    fn build_hamiltonian<M>(&mut self, source: &mut M) -> Result<()>
    where
        M: MatrixElementSource + ?Sized,
        Self: Sync,
    {
        if self.core().assembly == Assembly::Clean && self.core().unperturbed.is_some() {
            return Ok(());
        }
        self.build_interaction(source)?;
        let terms = self.active_terms();
        let core = self.core_mut();
        let tol = core.tolerances;
        let mut hamiltonian
            = core.unperturbed.clone()
            .ok_or_else(|| config_err("the basis has not been built"))?;
        for (key, coeff) in terms.into_iter() {
            let op
                = core.cache.get(&key)
                .ok_or_else(|| config_err(format!("operator {} is not cached", key)))?;
            let coeff
                = A::from_c64(coeff, tol.imaginary)
                .ok_or_else(|| config_err(format!(
                    "the coefficient of {} is complex; a complex data type is needed",
                    key,
                )))?;
            hamiltonian.add_scaled(op, coeff);
        }
        debug!("assembled hamiltonian with {} nonzero entries", hamiltonian.entries().nnz());
        core.hamiltonian = hamiltonian;
        core.assembly = Assembly::Clean;
        core.diagonalized = false;
        Ok(())
    }

    /// Bring the Hamiltonian up to date and diagonalize it.
    ///
    /// Afterwards [`Self::hamiltonian`] holds the eigenvalues on its diagonal
    /// and the eigenvectors as its basis.
    fn diagonalize<M>(&mut self, source: &mut M) -> Result<()>
    where
        M: MatrixElementSource + ?Sized,
        Self: Sync,
    {
        self.build_hamiltonian(source)?;
        if self.core().diagonalized { return Ok(()); }
        let core = self.core_mut();
        let prune = core.tolerances.eigenvector;
        core.hamiltonian.diagonalize(prune)?;
        core.diagonalized = true;
        info!("diagonalized {} basis vectors", core.hamiltonian.num_basisvectors());
        Ok(())
    }

    /// Current assembled Hamiltonian.
    fn hamiltonian(&self) -> &Hamiltonianmatrix<A> { &self.core().hamiltonian }

    /// Field-free operator in the working basis, if the basis was built.
    fn unperturbed(&self) -> Option<&Hamiltonianmatrix<A>> {
        self.core().unperturbed.as_ref()
    }

    /// Current basis vectors in canonical coordinates.
    fn basisvectors(&self) -> &SpMat<A> { self.core().hamiltonian.basis() }

    /// Registered states; row `k` of the basis belongs to state `k`.
    fn states(&self) -> &StateSpace<Self::State> { &self.core().space }

    fn num_states(&self) -> usize { self.core().space.len() }

    fn num_basisvectors(&self) -> usize { self.core().hamiltonian.num_basisvectors() }

    fn assembly(&self) -> Assembly { self.core().assembly }

    fn is_diagonalized(&self) -> bool { self.core().diagonalized }

    fn cache(&self) -> &InteractionCache<A> { &self.core().cache }

    fn tolerances(&self) -> Tolerances { self.core().tolerances }

    fn set_tolerances(&mut self, tolerances: Tolerances) {
        let core = self.core_mut();
        core.tolerances = tolerances;
        core.invalidate_basis();
    }

    /// Restrict basis states to energies within `[min, max]`.
    fn set_energy_window(&mut self, min: f64, max: f64) {
        let core = self.core_mut();
        core.energy_min = min;
        core.energy_max = max;
        core.invalidate_basis();
    }

    fn energy_window(&self) -> (f64, f64) {
        let core = self.core();
        (core.energy_min, core.energy_max)
    }

    /// Add states to the basis in addition to the enumerated ones.
    fn add_states<I>(&mut self, states: I)
    where I: IntoIterator<Item = Self::State>
    {
        let core = self.core_mut();
        for state in states.into_iter() {
            if !core.states_to_add.contains(&state) {
                core.states_to_add.push(state);
            }
        }
        core.invalidate_basis();
    }

    /// Rotation operator over all registered states, narrowed to `A`.
    fn staterotator(&self, rotation: &Rotation) -> Result<SpMat<A>> {
        let angles = rotation.angles()?;
        let rot = build_staterotator(&self.core().space, &angles);
        narrow(&rot, self.core().tolerances.imaginary)
    }

    /// Squared overlap of every basis vector with the span of the given
    /// states, optionally rotated first.
    fn overlap_indices(&self, indices: &[usize], rotation: Option<&Rotation>)
        -> Result<Vec<f64>>
    {
        let core = self.core();
        let hamiltonian = core.require_basis()?;
        let n = core.space.len();
        if let Some(bad) = indices.iter().find(|idx| **idx >= n) {
            return Err(config_err(format!("state index {} out of range", bad)));
        }
        let targets: SpMat<C64>
            = match rotation {
                None => {
                    let triplets: Vec<Triplet<C64>>
                        = indices.iter().enumerate()
                        .map(|(k, idx)| Triplet::new(*idx, k, C64::new(1.0, 0.0)))
                        .collect();
                    SpMat::from_triplets(n, indices.len(), triplets)
                },
                Some(rot) => rotate_states(&core.space, indices, &rot.angles()?)?,
            };
        let basis = hamiltonian.basis().to_complex();
        let products = targets.adjoint().matmul(&basis);
        let mut overlaps: Vec<f64> = vec![0.0; basis.cols()];
        for (_, col, v) in products.iter() {
            overlaps[col] += v.norm_sqr();
        }
        Ok(overlaps)
    }

    /// [`Self::overlap_indices`] for explicit states, which must be
    /// registered.
    fn overlap_states(&self, states: &[Self::State], rotation: Option<&Rotation>)
        -> Result<Vec<f64>>
    {
        let indices: Vec<usize>
            = states.iter()
            .map(|s| {
                self.core().space.index_of(s)
                    .ok_or_else(|| config_err(format!("state {} is not in the basis", s)))
            })
            .collect::<Result<_>>()?;
        self.overlap_indices(&indices, rotation)
    }

    /// [`Self::overlap_indices`] for every registered state matching a
    /// pattern.
    fn overlap_pattern(
        &self,
        pattern: &<Self::State as BasisState>::Pattern,
        rotation: Option<&Rotation>,
    ) -> Result<Vec<f64>>
    {
        let indices = self.core().space.find_matching(pattern);
        self.overlap_indices(&indices, rotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symmetry::Momentum;

    #[test]
    fn invalidation_order() {
        let mut core: SystemCore<f64, crate::state::StateOne> = SystemCore::default();
        assert_eq!(core.assembly, Assembly::SymmetryDirty);
        core.invalidate_parameters();
        assert_eq!(core.assembly, Assembly::SymmetryDirty);
        core.assembly = Assembly::Clean;
        core.invalidate_parameters();
        assert_eq!(core.assembly, Assembly::ParametersDirty);
        core.invalidate_basis();
        assert_eq!(core.assembly, Assembly::SymmetryDirty);
        assert!(core.require_basis().is_err());
    }

    #[test]
    fn symmetry_merge() {
        let mut a = Symmetry::default();
        a.set_rotation([Momentum::from(0.5)]).unwrap();
        let mut b = Symmetry::default();
        b.set_rotation([Momentum::from(-0.5)]).unwrap();
        let merged = merge_symmetries(&a, &b);
        assert_eq!(merged.rotation, a.rotation.union(&b.rotation));

        let mut c = Symmetry::default();
        c.set_reflection(Parity::Even).unwrap();
        let merged = merge_symmetries(&a, &c);
        assert_eq!(merged.reflection, Parity::NotApplicable);
        assert!(merged.rotation.is_arbitrary());
    }
}
