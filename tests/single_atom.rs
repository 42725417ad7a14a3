use std::f64::consts::FRAC_1_SQRT_2;
use approx::assert_relative_eq;
use num_complex::Complex64 as C64;
use rydpair::{
    SystemBuild,
    SystemOne,
    StateOne,
    cache::OperatorKey,
    elements::MatrixElementSource,
    rotator::{ EulerAngles, Rotation },
    state::{ BasisState, StatePattern },
    symmetry::Parity,
};

mod common;

#[test]
fn reflection_pairs_partner_states() {
    let mut model = common::model();
    for species in ["Rb", "Sr3"] {
        let mut sys: SystemOne<C64> = common::atom(species, 10, &[0, 1, 2]);
        sys.set_conserved_parity_under_reflection(Parity::Odd).unwrap();
        sys.build_basis(&mut model).unwrap();
        let states = sys.states();
        let basis = sys.basisvectors();
        assert!(basis.cols() > 0);
        for col in 0..basis.cols() {
            let entries: Vec<(usize, C64)> = basis.col(col).collect();
            match entries.as_slice() {
                [(row, v)] => {
                    let s = states.state(*row).unwrap();
                    assert_eq!(s.m().unwrap().halves(), 0);
                    assert_relative_eq!(v.norm(), 1.0, epsilon = 1e-12);
                },
                [(r1, v1), (r2, v2)] => {
                    let s1 = states.state(*r1).unwrap();
                    let s2 = states.state(*r2).unwrap();
                    assert_eq!(&s1.reflected().0, s2);
                    assert_relative_eq!(v1.norm(), FRAC_1_SQRT_2, epsilon = 1e-12);
                    assert_relative_eq!(v2.norm(), FRAC_1_SQRT_2, epsilon = 1e-12);
                },
                other => panic!("basis vector with {} components", other.len()),
            }
        }
        // every registered state is distinct
        let unique: std::collections::BTreeSet<&StateOne> = states.iter().collect();
        assert_eq!(unique.len(), states.len());
    }
}

#[test]
fn field_free_diagonalization() {
    let mut model = common::model();
    let mut sys: SystemOne<f64> = common::atom("Rb", 10, &[0, 1]);
    sys.diagonalize(&mut model).unwrap();
    // s1/2: 2, p1/2: 2, p3/2: 4
    assert_eq!(sys.num_basisvectors(), 8);
    assert!(sys.hamiltonian().entries().iter().all(|(r, c, _)| r == c));

    let mut expected: Vec<f64>
        = sys.states().iter()
        .map(|s| model.energy(s.atomic().unwrap()))
        .collect();
    expected.sort_by(f64::total_cmp);
    let found = sys.hamiltonian().diagonal_energies();
    assert_eq!(found.len(), expected.len());
    for (f, e) in found.iter().zip(expected.iter()) {
        assert_relative_eq!(*f, *e, epsilon = 1e-14);
    }
}

#[test]
fn derived_components_are_signed_adjoints() {
    let mut model = common::model();
    let mut sys: SystemOne<C64> = common::atom("Rb", 10, &[0, 1, 2]);
    sys.set_conserved_parity_under_reflection(Parity::Even).unwrap();
    sys.set_efield([1e-9, 0.0, 1e-9]).unwrap();
    sys.set_bfield([1e-5, 0.0, 2e-5]).unwrap();
    sys.diagonalize(&mut model).unwrap();

    let cache = sys.cache();
    let mut checked = 0;
    for key in cache.keys().filter(|k| k.component() > 0) {
        let up = cache.get(key).unwrap();
        let dn = cache.get(&key.partner()).unwrap();
        let expected = up.adjoint().scaled(C64::new(key.adjoint_sign(), 0.0));
        assert!(dn.max_abs_diff(&expected) < 1e-12, "{}", key);
        checked += 1;
    }
    // E[+1], B[+1], D2[+1], D2[+2]
    assert_eq!(checked, 4);
    assert!(cache.contains(&OperatorKey::Efield(0)));
    assert!(cache.contains(&OperatorKey::Diamagnetism { rank: 0, q: 0 }));
}

fn stark_system(field: f64) -> SystemOne<f64> {
    let mut sys: SystemOne<f64> = common::atom("H", 10, &[0, 1]);
    sys.restrict_m([0.5]);
    sys.set_efield([0.0, 0.0, field]).unwrap();
    sys
}

#[test]
fn linear_stark_shift_follows_field_direction() {
    let mut model = common::model();
    let s = StateOne::new("H", 10, 0, 0.5, 0.5);
    let p = StateOne::new("H", 10, 1, 0.5, 0.5);
    let e0 = model.energy(s.atomic().unwrap());

    let mut coupling: Vec<f64> = Vec::new();
    let mut mixing: Vec<f64> = Vec::new();
    let mut shifts: Vec<f64> = Vec::new();
    for field in [1e-9, -1e-9, 2e-9] {
        let mut sys = stark_system(field);
        sys.build_hamiltonian(&mut model).unwrap();
        let is = sys.states().index_of(&s).unwrap();
        let ip = sys.states().index_of(&p).unwrap();
        let cs = common::dominant_column(sys.basisvectors(), is).unwrap();
        let cp = common::dominant_column(sys.basisvectors(), ip).unwrap();
        coupling.push(sys.hamiltonian().entries().get(cs, cp));

        sys.diagonalize(&mut model).unwrap();
        let basis = sys.basisvectors();
        // eigenvalues are sorted, so column 0 is the lowest state
        mixing.push(basis.get(is, 0) * basis.get(ip, 0));
        shifts.push(sys.hamiltonian().diagonal_energies()[0] - e0);
    }
    assert!(coupling[0] != 0.0);
    assert_relative_eq!(coupling[0], -coupling[1], epsilon = 1e-20);
    assert!(mixing[0] * mixing[1] < 0.0);
    assert!(shifts[0] < 0.0);
    assert_relative_eq!(shifts[0], shifts[1], max_relative = 1e-6);
    assert_relative_eq!(shifts[2], 2.0 * shifts[0], max_relative = 1e-6);
}

#[test]
fn overlaps_with_rotated_states() {
    let mut model = common::model();
    let mut sys: SystemOne<f64> = common::atom("Rb", 10, &[0]);
    sys.diagonalize(&mut model).unwrap();
    let up = StateOne::new("Rb", 10, 0, 0.5, 0.5);
    let dn = StateOne::new("Rb", 10, 0, 0.5, -0.5);
    let iu = common::dominant_column(sys.basisvectors(), sys.states().index_of(&up).unwrap()).unwrap();
    let id = common::dominant_column(sys.basisvectors(), sys.states().index_of(&dn).unwrap()).unwrap();

    let plain = sys.overlap_states(&[up.clone()], None).unwrap();
    assert_relative_eq!(plain[iu], 1.0, epsilon = 1e-12);
    assert_relative_eq!(plain[id], 0.0, epsilon = 1e-12);

    let flip = Rotation::Euler(EulerAngles::new(0.0, std::f64::consts::PI, 0.0));
    let flipped = sys.overlap_states(&[up], Some(&flip)).unwrap();
    assert_relative_eq!(flipped[iu], 0.0, epsilon = 1e-12);
    assert_relative_eq!(flipped[id], 1.0, epsilon = 1e-12);

    let all = sys.overlap_pattern(&StatePattern::new().n(10), None).unwrap();
    assert!(all.iter().all(|w| (w - 1.0).abs() < 1e-12));
    assert!(sys.overlap_indices(&[7], None).is_err());
}

#[test]
fn ion_coupling_conserves_m() {
    let mut model = common::model();
    let mut sys: SystemOne<f64> = common::atom("Rb", 10, &[0, 1]);
    sys.set_ion_charge(1);
    sys.set_ryd_ion_order(2);
    sys.set_ryd_ion_distance(1000.0);
    sys.build_hamiltonian(&mut model).unwrap();
    assert!(sys.cache().contains(&OperatorKey::Multipole(1)));
    assert!(sys.cache().contains(&OperatorKey::Multipole(2)));
    let states = sys.states();
    let basis = sys.basisvectors();
    for (r, c, _) in sys.hamiltonian().entries().iter() {
        let (row, _, _) = basis.iter().find(|(_, col, _)| *col == r).unwrap();
        let (col, _, _) = basis.iter().find(|(_, col, _)| *col == c).unwrap();
        assert_eq!(states.state(row).unwrap().m(), states.state(col).unwrap().m());
    }
}

#[test]
fn save_and_reload_hamiltonian() {
    let mut model = common::model();
    let mut sys: SystemOne<C64> = common::atom("Rb", 10, &[0, 1]);
    sys.set_bfield([0.0, 1e-5, 1e-5]).unwrap();
    sys.diagonalize(&mut model).unwrap();
    let path = std::env::temp_dir().join(format!("rydpair-{}.bin", std::process::id()));
    sys.hamiltonian().save(&path).unwrap();
    let loaded: rydpair::Hamiltonianmatrix<C64>
        = rydpair::Hamiltonianmatrix::load(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(&loaded, sys.hamiltonian());
    assert_eq!(loaded.hash_entries(), sys.hamiltonian().hash_entries());
    assert_eq!(loaded.hash_basis(), sys.hamiltonian().hash_basis());
}
