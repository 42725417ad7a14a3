//! A single atom in static electric and magnetic fields, optionally coupled
//! to an ion on the quantization axis.

use std::collections::BTreeSet;
use std::f64::consts::FRAC_1_SQRT_2;
use log::{ debug, warn };
use num_complex::Complex64 as C64;
use crate::{
    cache::OperatorKey,
    constants::{ COULOMB_CONSTANT, ELECTRON_REST_MASS, ELEMENTARY_CHARGE },
    elements::{ MatrixElementSource, selection_rules_momentum, selection_rules_multipole },
    error::{ Result, config_err },
    matrix::Hamiltonianmatrix,
    rotator::{ Rotation, rotate_vector },
    scalar::Element,
    space::StateSpace,
    spin::{ SpinProj, SpinTotal },
    state::{ AtomicState, BasisState, StateOne, species_spin },
    symmetry::{ ConservedMomenta, Momentum, Parity, Symmetry },
    system::{ Combinable, SystemBuild, SystemCore },
};

/// Largest principal quantum number reached when the n range is derived from
/// the energy window.
pub const MAX_PRINCIPAL: u32 = 150;

/// One-particle system.
///
/// Quantum numbers are restricted with the `restrict_*` methods; an empty
/// restriction admits every physically allowed value. The basis is built
/// lazily by [`SystemBuild::diagonalize`].
#[derive(Clone, Debug)]
pub struct SystemOne<A>
where A: Element
{
    core: SystemCore<A, StateOne>,
    species: String,
    range_n: BTreeSet<u32>,
    range_l: BTreeSet<u32>,
    range_j: BTreeSet<SpinTotal>,
    range_m: BTreeSet<SpinProj>,
    efield: [f64; 3],
    bfield: [f64; 3],
    // indexed by q + 1
    efield_spherical: [C64; 3],
    bfield_spherical: [C64; 3],
    diamagnetism: bool,
    charge: i32,
    ordermax: u32,
    distance: Option<f64>,
    symmetry: Symmetry,
}

/// Spherical components `[F(-1), F(0), F(+1)]` of a Cartesian vector.
pub fn spherical_components(field: [f64; 3]) -> [C64; 3] {
    let [x, y, z] = field;
    [
        C64::new(x * FRAC_1_SQRT_2, -y * FRAC_1_SQRT_2),
        C64::new(z, 0.0),
        C64::new(-x * FRAC_1_SQRT_2, -y * FRAC_1_SQRT_2),
    ]
}

impl<A> SystemOne<A>
where A: Element
{
    pub fn new(species: &str) -> Self {
        Self {
            core: SystemCore::default(),
            species: species.to_string(),
            range_n: BTreeSet::new(),
            range_l: BTreeSet::new(),
            range_j: BTreeSet::new(),
            range_m: BTreeSet::new(),
            efield: [0.0; 3],
            bfield: [0.0; 3],
            efield_spherical: [C64::new(0.0, 0.0); 3],
            bfield_spherical: [C64::new(0.0, 0.0); 3],
            diamagnetism: true,
            charge: 0,
            ordermax: 0,
            distance: None,
            symmetry: Symmetry::default(),
        }
    }

    pub fn restrict_n<I>(&mut self, ns: I)
    where I: IntoIterator<Item = u32>
    {
        self.range_n = ns.into_iter().collect();
        self.core.invalidate_basis();
    }

    pub fn restrict_l<I>(&mut self, ls: I)
    where I: IntoIterator<Item = u32>
    {
        self.range_l = ls.into_iter().collect();
        self.core.invalidate_basis();
    }

    pub fn restrict_j<I>(&mut self, js: I)
    where I: IntoIterator<Item = f64>
    {
        self.range_j = js.into_iter().map(SpinTotal::from_f64).collect();
        self.core.invalidate_basis();
    }

    pub fn restrict_m<I>(&mut self, ms: I)
    where I: IntoIterator<Item = f64>
    {
        self.range_m = ms.into_iter().map(SpinProj::from_f64).collect();
        self.core.invalidate_basis();
    }

    fn check_field(field: [f64; 3]) -> Result<()> {
        if !A::COMPLEX && field[1] != 0.0 {
            Err(config_err(
                "fields with a nonzero y component need a complex data type"))
        } else {
            Ok(())
        }
    }

    /// Set the electric field in the laboratory frame.
    pub fn set_efield(&mut self, field: [f64; 3]) -> Result<()> {
        Self::check_field(field)?;
        self.efield = field;
        self.efield_spherical = spherical_components(field);
        self.core.invalidate_parameters();
        Ok(())
    }

    /// Set the electric field given in a rotated frame.
    pub fn set_efield_rotated(&mut self, field: [f64; 3], rotation: &Rotation) -> Result<()> {
        let r = rotation.matrix()?;
        self.set_efield(rotate_vector(&r, field))
    }

    /// Set the magnetic field in the laboratory frame.
    pub fn set_bfield(&mut self, field: [f64; 3]) -> Result<()> {
        Self::check_field(field)?;
        self.bfield = field;
        self.bfield_spherical = spherical_components(field);
        self.core.invalidate_parameters();
        Ok(())
    }

    /// Set the magnetic field given in a rotated frame.
    pub fn set_bfield_rotated(&mut self, field: [f64; 3], rotation: &Rotation) -> Result<()> {
        let r = rotation.matrix()?;
        self.set_bfield(rotate_vector(&r, field))
    }

    pub fn enable_diamagnetism(&mut self, enable: bool) {
        self.diamagnetism = enable;
        self.core.invalidate_parameters();
    }

    pub fn set_ion_charge(&mut self, charge: i32) {
        self.charge = charge;
        self.core.invalidate_parameters();
    }

    /// Highest multipole order of the atom-ion coupling.
    pub fn set_ryd_ion_order(&mut self, order: u32) {
        self.ordermax = order;
        self.core.invalidate_parameters();
    }

    pub fn set_ryd_ion_distance(&mut self, distance: f64) {
        self.distance = Some(distance);
        self.core.invalidate_parameters();
    }

    pub fn set_conserved_parity_under_reflection(&mut self, parity: Parity) -> Result<()> {
        self.symmetry.set_reflection(parity)?;
        self.core.invalidate_basis();
        Ok(())
    }

    pub fn set_conserved_momenta_under_rotation<I>(&mut self, momenta: I) -> Result<()>
    where I: IntoIterator<Item = Momentum>
    {
        self.symmetry.set_rotation(momenta)?;
        self.core.invalidate_basis();
        Ok(())
    }

    /// Replace the symmetry wholesale, e.g. after merging with another system.
    pub(crate) fn replace_symmetry(&mut self, symmetry: Symmetry) {
        self.symmetry = symmetry;
        self.core.invalidate_basis();
    }

    pub fn ion_charge(&self) -> i32 { self.charge }

    pub fn ryd_ion_order(&self) -> u32 { self.ordermax }

    pub fn ryd_ion_distance(&self) -> Option<f64> { self.distance }

    /// Diamagnetic source terms `((rank, q), value)`, already multiplied by
    /// their rank-2 coupling factors.
    fn diamagnetism_terms(&self) -> [((u32, i32), C64); 6] {
        let [bm, b0, bp] = self.bfield_spherical;
        let sqrt3 = 3.0_f64.sqrt();
        let sqrt15 = 1.5_f64.sqrt();
        [
            ((0, 0), b0 * b0 - bp * bm * 2.0),
            ((2, 0), -(b0 * b0 + bp * bm)),
            ((2, 1), b0 * bm * sqrt3),
            ((2, -1), b0 * bp * sqrt3),
            ((2, 2), -(bm * bm) * sqrt15),
            ((2, -2), -(bp * bp) * sqrt15),
        ]
    }

    fn allowed_l(&self, n: u32) -> Vec<u32> {
        (0..n)
            .filter(|l| self.range_l.is_empty() || self.range_l.contains(l))
            .collect()
    }

    fn allowed_j(&self, l: u32, s: SpinTotal) -> Vec<SpinTotal> {
        let l2 = 2 * l;
        let jmin = l2.abs_diff(s.halves());
        let jmax = l2 + s.halves();
        (jmin..=jmax).step_by(2)
            .map(SpinTotal::new)
            .filter(|j| self.range_j.is_empty() || self.range_j.contains(j))
            .collect()
    }

    fn reference_state(&self, n: u32, l: u32, j: SpinTotal, s: SpinTotal) -> AtomicState {
        AtomicState {
            species: self.species.clone(),
            n,
            l,
            j,
            m: SpinProj::new(j.halves() as i32),
            s,
        }
    }

    /// Principal quantum numbers to enumerate.
    fn principal_numbers<M>(&self, source: &M, s: SpinTotal) -> Result<Vec<u32>>
    where M: MatrixElementSource + ?Sized
    {
        if !self.range_n.is_empty() {
            return Ok(self.range_n.iter().copied().collect());
        }
        if !(self.core.energy_min.is_finite() && self.core.energy_max.is_finite()) {
            return Err(config_err(
                "the number of basis elements is infinite; the basis has to be restricted"));
        }
        let mut ns: Vec<u32> = Vec::new();
        for n in 1..=MAX_PRINCIPAL {
            let energies: Vec<f64>
                = self.allowed_l(n).into_iter()
                .flat_map(|l| {
                    self.allowed_j(l, s).into_iter()
                        .map(move |j| (l, j))
                })
                .map(|(l, j)| source.energy(&self.reference_state(n, l, j, s)))
                .collect();
            if energies.is_empty() { continue; }
            if energies.iter().any(|e| self.core.in_window(*e)) { ns.push(n); }
            if !ns.is_empty() && energies.iter().all(|e| *e > self.core.energy_max) {
                return Ok(ns);
            }
        }
        warn!("n range derived from the energy window was cut off at n = {}", MAX_PRINCIPAL);
        Ok(ns)
    }
}

/// Append one basis vector for `state`, combined with its mirror partner if
/// reflection symmetry is imposed.
fn add_symmetrized<A>(
    space: &mut StateSpace<StateOne>,
    hamiltonian: &mut Hamiltonianmatrix<A>,
    idx: &mut usize,
    state: &StateOne,
    energy: f64,
    reflection: Parity,
) -> Result<()>
where A: Element
{
    let mirrored
        = reflection.sign()
        .filter(|_| state.m().map_or(false, |m| m.halves() != 0));
    if mirrored.is_some() && state.m().map_or(false, |m| m.halves() < 0) {
        return Ok(());
    }
    hamiltonian.add_entries(*idx, *idx, A::from_real(energy));
    let value = if mirrored.is_some() { FRAC_1_SQRT_2 } else { 1.0 };
    let (row, _) = space.insert(state.clone());
    hamiltonian.add_basis(row, *idx, A::from_real(value));
    if let Some(parity) = mirrored {
        let unit
            = A::imaginary_unit()
            .ok_or_else(|| config_err(
                "conservation of parity under reflection needs a complex data type"))?;
        let (partner, phase) = state.reflected();
        let (row, _) = space.insert(partner);
        hamiltonian.add_basis(row, *idx, A::from_real(value * phase * parity) * unit);
    }
    *idx += 1;
    Ok(())
}

impl<A> SystemBuild<A> for SystemOne<A>
where A: Element
{
    type State = StateOne;

    fn core(&self) -> &SystemCore<A, StateOne> { &self.core }

    fn core_mut(&mut self) -> &mut SystemCore<A, StateOne> { &mut self.core }

    fn initialize_basis<M>(&mut self, source: &mut M) -> Result<()>
    where M: MatrixElementSource + ?Sized
    {
        let symmetry = self.symmetry.clone();
        if symmetry.reflection.is_set() && A::imaginary_unit().is_none() {
            return Err(config_err(
                "conservation of parity under reflection needs a complex data type"));
        }
        let s = species_spin(&self.species);
        let ns = self.principal_numbers(&*source, s)?;

        let mut space: StateSpace<StateOne> = StateSpace::new();
        let mut hamiltonian: Hamiltonianmatrix<A> = Hamiltonianmatrix::default();
        let mut idx: usize = 0;

        for n in ns.into_iter() {
            for l in self.allowed_l(n) {
                for j in self.allowed_j(l, s) {
                    let reference = self.reference_state(n, l, j, s);
                    let energy = source.energy(&reference);
                    if !self.core.in_window(energy) { continue; }
                    let allowed_m: Vec<SpinProj>
                        = j.projections()
                        .filter(|m| self.range_m.is_empty() || self.range_m.contains(m))
                        .filter(|m| symmetry.rotation.contains(*m))
                        .collect();
                    for m in allowed_m.iter() {
                        if symmetry.reflection.is_set()
                            && m.halves() != 0
                            && !allowed_m.contains(&m.reflected())
                        {
                            return Err(config_err(format!(
                                "the momentum {} required by symmetries cannot be found",
                                m.reflected(),
                            )));
                        }
                        let state = StateOne::Atomic(reference.with_m(*m));
                        add_symmetrized(
                            &mut space,
                            &mut hamiltonian,
                            &mut idx,
                            &state,
                            energy,
                            symmetry.reflection,
                        )?;
                    }
                }
            }
        }

        for state in self.core.states_to_add.iter() {
            if space.index_of(state).is_some() {
                return Err(config_err(format!(
                    "the state {} is already contained in the list of states", state)));
            }
            if let Some(species) = state.species() {
                if species != self.species {
                    return Err(config_err(format!(
                        "the state {} is of the wrong species", state)));
                }
            }
        }
        for state in self.core.states_to_add.iter() {
            let energy = state.atomic().map_or(0.0, |a| source.energy(a));
            let (reflection, rotation)
                = if state.is_artificial() {
                    if symmetry.reflection.is_set() || !symmetry.rotation.is_arbitrary() {
                        warn!("only permutation symmetry can be applied to artificial states");
                    }
                    (Parity::NotApplicable, ConservedMomenta::Arbitrary)
                } else {
                    (symmetry.reflection, symmetry.rotation.clone())
                };
            if let Some(m) = state.m() {
                if !rotation.contains(m) { continue; }
                if reflection.is_set() && m.halves() != 0 {
                    let (partner, _) = state.reflected();
                    if !self.core.states_to_add.contains(&partner) {
                        return Err(config_err(format!(
                            "the state {} required by symmetries cannot be found", partner)));
                    }
                }
            }
            add_symmetrized(&mut space, &mut hamiltonian, &mut idx, state, energy, reflection)?;
        }

        hamiltonian.compress(idx, space.len());
        debug!("{}: {} states in {} basis vectors", self.species, space.len(), idx);
        self.core.space = space;
        self.core.unperturbed = Some(hamiltonian);
        Ok(())
    }

    fn interaction_terms(&self) -> Vec<(OperatorKey, C64)> {
        let [em, e0, ep] = self.efield_spherical;
        let [bm, b0, bp] = self.bfield_spherical;
        let mut terms: Vec<(OperatorKey, C64)> = vec![
            (OperatorKey::Efield(0), -e0),
            (OperatorKey::Efield(1), em),
            (OperatorKey::Efield(-1), ep),
            (OperatorKey::Bfield(0), -b0),
            (OperatorKey::Bfield(1), bm),
            (OperatorKey::Bfield(-1), bp),
        ];
        if self.diamagnetism {
            terms.extend(
                self.diamagnetism_terms().into_iter()
                    .map(|((rank, q), d)| (OperatorKey::Diamagnetism { rank, q }, d))
            );
        }
        if let Some(distance) = self.distance.filter(|_| self.charge != 0) {
            for order in 1..=self.ordermax {
                let powerlaw = 1.0 / distance.powi(order as i32 + 1);
                terms.push((
                    OperatorKey::Multipole(order),
                    C64::new(f64::from(self.charge) * powerlaw, 0.0),
                ));
            }
        }
        terms
    }

    fn warm_up<M>(&self, source: &mut M, keys: &[OperatorKey])
    where M: MatrixElementSource + ?Sized
    {
        let atoms: Vec<AtomicState>
            = self.core.space.iter()
            .filter_map(|s| s.atomic().cloned())
            .collect();
        for key in keys.iter() {
            match *key {
                OperatorKey::Efield(q) => {
                    source.precalculate_electric_momentum(&atoms, q);
                    if q != 0 { source.precalculate_electric_momentum(&atoms, -q); }
                },
                OperatorKey::Bfield(q) => {
                    source.precalculate_magnetic_momentum(&atoms, q);
                    if q != 0 { source.precalculate_magnetic_momentum(&atoms, -q); }
                },
                OperatorKey::Diamagnetism { rank, q } => {
                    source.precalculate_diamagnetism(&atoms, rank, q);
                    if q != 0 { source.precalculate_diamagnetism(&atoms, rank, -q); }
                },
                OperatorKey::Multipole(order) => {
                    source.precalculate_multipole(&atoms, order);
                },
                OperatorKey::PairMultipole { .. } => { },
            }
        }
    }

    fn operator_element<M>(&self, source: &M, key: OperatorKey, row: usize, col: usize)
        -> Option<A>
    where M: MatrixElementSource + ?Sized
    {
        let r = self.core.space.state(row)?.atomic()?;
        let c = self.core.space.state(col)?.atomic()?;
        let value
            = match key {
                OperatorKey::Efield(q) => {
                    selection_rules_multipole(r, c, 1, Some(q))
                        .then(|| source.electric_dipole(r, c))
                },
                OperatorKey::Bfield(q) => {
                    selection_rules_momentum(r, c, q)
                        .then(|| source.magnetic_dipole(r, c))
                },
                OperatorKey::Diamagnetism { rank, q } => {
                    selection_rules_multipole(r, c, rank, Some(q))
                        .then(|| {
                            source.diamagnetism(r, c, rank) / (8.0 * ELECTRON_REST_MASS)
                        })
                },
                OperatorKey::Multipole(order) => {
                    (r.m == c.m && selection_rules_multipole(r, c, order, None))
                        .then(|| {
                            -COULOMB_CONSTANT * ELEMENTARY_CHARGE
                                * source.electric_multipole(r, c, order)
                        })
                },
                OperatorKey::PairMultipole { .. } => None,
            }?;
        Some(A::from_real(value))
    }
}

impl<A> Combinable for SystemOne<A>
where A: Element
{
    fn species(&self) -> &str { &self.species }

    fn efield(&self) -> [f64; 3] { self.efield }

    fn bfield(&self) -> [f64; 3] { self.bfield }

    fn diamagnetism(&self) -> bool { self.diamagnetism }

    fn symmetry(&self) -> &Symmetry { &self.symmetry }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::{ elements::ModelElements, error::Error, state::StatePattern };

    fn rb10() -> SystemOne<f64> {
        let mut sys = SystemOne::new("Rb");
        sys.restrict_n([10]);
        sys.restrict_l([0, 1]);
        sys
    }

    #[test]
    fn infinite_basis_is_rejected() {
        let mut model = ModelElements::new();
        let mut sys: SystemOne<f64> = SystemOne::new("Rb");
        let res = sys.build_basis(&mut model);
        assert!(matches!(res, Err(Error::Configuration(_))));
    }

    #[test]
    fn enumerates_valid_states() {
        let mut model = ModelElements::new();
        let mut sys = rb10();
        sys.build_basis(&mut model).unwrap();
        // s1/2, p1/2, p3/2
        assert_eq!(sys.num_states(), 8);
        assert_eq!(sys.unperturbed().unwrap().num_basisvectors(), 8);
    }

    #[test]
    fn rotation_restricts_momenta() {
        let mut model = ModelElements::new();
        let mut sys = rb10();
        sys.set_conserved_momenta_under_rotation([Momentum::from(0.5)]).unwrap();
        sys.build_basis(&mut model).unwrap();
        assert_eq!(sys.num_states(), 3);
    }

    #[test]
    fn reflection_needs_complex_scalars() {
        let mut model = ModelElements::new();
        let mut sys = rb10();
        sys.set_conserved_parity_under_reflection(Parity::Even).unwrap();
        assert!(sys.build_basis(&mut model).is_err());

        let mut sys: SystemOne<C64> = SystemOne::new("Rb");
        sys.restrict_n([10]);
        sys.restrict_l([0, 1]);
        sys.set_conserved_parity_under_reflection(Parity::Even).unwrap();
        sys.build_basis(&mut model).unwrap();
        assert_eq!(sys.num_states(), 8);
        assert_eq!(sys.unperturbed().unwrap().num_basisvectors(), 4);
    }

    #[test]
    fn energy_window_derives_n() {
        let mut model = ModelElements::new();
        let mut sys: SystemOne<f64> = SystemOne::new("H");
        sys.restrict_l([0]);
        sys.set_energy_window(-0.0051, -0.0049);
        sys.build_basis(&mut model).unwrap();
        assert_eq!(sys.num_states(), 2);
        assert!(sys.states().iter().all(|s| s.n() == Some(10)));
    }

    #[test]
    fn user_states() {
        let mut model = ModelElements::new();
        let mut sys = rb10();
        sys.add_states([StateOne::new("Rb", 10, 0, 0.5, 0.5)]);
        assert!(sys.build_basis(&mut model).is_err());

        let mut sys = rb10();
        sys.add_states([StateOne::new("Cs", 11, 0, 0.5, 0.5)]);
        assert!(sys.build_basis(&mut model).is_err());

        let mut sys = rb10();
        sys.add_states([StateOne::new("Rb", 11, 0, 0.5, 0.5), StateOne::artificial("g")]);
        sys.build_basis(&mut model).unwrap();
        assert_eq!(sys.num_states(), 10);
        let art = sys.states().index_of(&StateOne::artificial("g")).unwrap();
        let h = sys.unperturbed().unwrap();
        let col = h.basis().iter().find(|(r, _, _)| *r == art).unwrap().1;
        assert_eq!(h.entries().get(col, col), 0.0);
    }

    #[test]
    fn mirror_partner_of_user_state_is_required() {
        let mut model = ModelElements::new();
        let mut sys: SystemOne<C64> = SystemOne::new("Rb");
        sys.restrict_n([10]);
        sys.restrict_l([0]);
        sys.set_conserved_parity_under_reflection(Parity::Odd).unwrap();
        sys.add_states([StateOne::new("Rb", 11, 0, 0.5, 0.5)]);
        assert!(sys.build_basis(&mut model).is_err());
    }

    #[test]
    fn real_fields_must_lie_in_xz_plane() {
        let mut sys = rb10();
        assert!(sys.set_efield([0.0, 1e-6, 0.0]).is_err());
        assert!(sys.set_efield([1e-6, 0.0, 1e-6]).is_ok());
        let mut sys: SystemOne<C64> = SystemOne::new("Rb");
        assert!(sys.set_bfield([0.0, 1e-6, 0.0]).is_ok());
    }

    #[test]
    fn rotated_field() {
        let mut sys = rb10();
        let rot = Rotation::Axes { to_z_axis: [1.0, 0.0, 0.0], to_y_axis: [0.0, 1.0, 0.0] };
        sys.set_efield_rotated([1.0, 0.0, 0.0], &rot).unwrap();
        assert_relative_eq!(sys.efield()[2], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn field_free_overlaps() {
        let mut model = ModelElements::new();
        let mut sys = rb10();
        sys.diagonalize(&mut model).unwrap();
        let ov = sys.overlap_pattern(&StatePattern::new().l(0), None).unwrap();
        let total: f64 = ov.iter().sum();
        assert_relative_eq!(total, 2.0, epsilon = 1e-10);
    }

    #[test]
    fn parameter_change_keeps_cache() {
        let mut model = ModelElements::new();
        let mut sys = rb10();
        sys.set_efield([0.0, 0.0, 1e-7]).unwrap();
        sys.diagonalize(&mut model).unwrap();
        let cached = sys.cache().len();
        assert!(cached > 0);
        sys.set_efield([0.0, 0.0, 2e-7]).unwrap();
        assert_eq!(sys.assembly(), crate::system::Assembly::ParametersDirty);
        sys.diagonalize(&mut model).unwrap();
        assert_eq!(sys.cache().len(), cached);
        sys.restrict_l([0, 1, 2]);
        sys.diagonalize(&mut model).unwrap();
        assert_eq!(sys.num_states(), 18);
    }
}
