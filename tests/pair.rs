use approx::assert_relative_eq;
use rydpair::{
    Error,
    SystemBuild,
    SystemOne,
    SystemTwo,
    config::SystemTwoConfig,
    elements::{ MatrixElementSource, ModelElements },
    state::{ AtomicState, StatePattern },
    symmetry::Parity,
};

mod common;

const PAIR: &str = r#"
    distance = 500.0
    permutation = "even"

    [atom]
    species = "Rb"
    n = [10]
    l = [0]
"#;

#[test]
fn pair_from_config() {
    let mut model = common::model();
    let config = SystemTwoConfig::from_toml_str(PAIR).unwrap();
    let mut pair: SystemTwo<f64> = config.build().unwrap();
    assert_eq!(pair.distance(), Some(500.0));
    assert_eq!(pair.symmetry().permutation, Parity::Even);
    pair.diagonalize(&mut model).unwrap();
    assert_eq!(pair.num_states(), 4);
    assert_eq!(pair.num_basisvectors(), 3);

    let path = std::env::temp_dir().join(format!("rydpair-pair-{}.toml", std::process::id()));
    std::fs::write(&path, PAIR).unwrap();
    let reloaded = SystemTwoConfig::from_file(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(reloaded, config);

    let both = PAIR.replace("distance = 500.0", "distance = 500.0\ndistance_vector = [0.0, 0.0, 500.0]");
    let config = SystemTwoConfig::from_toml_str(&both).unwrap();
    assert!(matches!(config.build::<f64>(), Err(Error::Configuration(_))));
}

#[test]
fn different_species_cannot_be_paired() {
    let a: SystemOne<f64> = common::atom("Rb", 10, &[0]);
    let b: SystemOne<f64> = common::atom("Cs", 10, &[0]);
    assert!(matches!(SystemTwo::new(a, b), Err(Error::IncompatibleSystems(_))));
}

#[test]
fn exchange_symmetries_split_the_pair_space() {
    let mut model = common::model();
    // 8 one-atom states: s1/2, p1/2, p3/2
    let atom: SystemOne<f64> = common::atom("Rb", 10, &[0, 1]);
    let count = |permutation: Parity, inversion: Parity, model: &mut ModelElements| {
        let mut pair = SystemTwo::new(atom.clone(), atom.clone()).unwrap();
        pair.set_conserved_parity_under_permutation(permutation);
        pair.set_conserved_parity_under_inversion(inversion);
        pair.build_basis(model).unwrap();
        assert_eq!(pair.num_states(), 64);
        pair.num_basisvectors()
    };
    let na = Parity::NotApplicable;
    assert_eq!(count(na, na, &mut model), 64);
    assert_eq!(count(Parity::Even, na, &mut model), 36);
    assert_eq!(count(Parity::Odd, na, &mut model), 28);
    assert_eq!(count(na, Parity::Even, &mut model), 36);
    assert_eq!(count(na, Parity::Odd, &mut model), 28);
    // symmetric under exchange with even total parity: ss and pp pairs only
    assert_eq!(count(Parity::Even, Parity::Even, &mut model), 24);
}

#[test]
fn symmetrized_basis_is_orthonormal() {
    let mut model = common::model();
    let atom: SystemOne<f64> = common::atom("Rb", 10, &[0, 1]);
    let mut pair = SystemTwo::new(atom.clone(), atom).unwrap();
    pair.set_conserved_parity_under_inversion(Parity::Odd);
    pair.build_basis(&mut model).unwrap();
    let basis = pair.basisvectors();
    let gram = basis.adjoint().matmul(basis);
    for i in 0..basis.cols() {
        for j in 0..basis.cols() {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert_relative_eq!(gram.get(i, j), expected, epsilon = 1e-12);
        }
    }
}

#[test]
fn dipole_dipole_scales_with_inverse_cube() {
    let mut model = common::model();
    let atom: SystemOne<f64> = common::atom("Rb", 10, &[0, 1]);
    let mut pair = SystemTwo::new(atom.clone(), atom).unwrap();
    pair.set_distance(400.0);
    pair.build_hamiltonian(&mut model).unwrap();
    let near = pair.hamiltonian().entries().clone();
    pair.set_distance(800.0);
    pair.build_hamiltonian(&mut model).unwrap();
    let far = pair.hamiltonian().entries().clone();

    assert!(near.max_abs_diff(&near.adjoint()) < 1e-15);
    let mut couplings = 0;
    for (r, c, v) in near.iter().filter(|(r, c, _)| r != c) {
        assert_relative_eq!(v, 8.0 * far.get(r, c), max_relative = 1e-9);
        couplings += 1;
    }
    assert!(couplings > 0);
    for (d_near, d_far) in near.diagonal().iter().zip(far.diagonal()) {
        assert_relative_eq!(*d_near, d_far, epsilon = 1e-15);
    }
}

#[test]
fn pair_overlaps_by_pattern() {
    let mut model = common::model();
    let atom: SystemOne<f64> = common::atom("Rb", 10, &[0]);
    let mut pair = SystemTwo::new(atom.clone(), atom).unwrap();
    pair.build_basis(&mut model).unwrap();
    let up = [StatePattern::new().m(0.5), StatePattern::new()];
    let overlaps = pair.overlap_pattern(&up, None).unwrap();
    assert_eq!(overlaps.len(), 4);
    assert_relative_eq!(overlaps.iter().sum::<f64>(), 2.0, epsilon = 1e-12);
    let none = [StatePattern::new().species("Cs"), StatePattern::new()];
    assert!(pair.overlap_pattern(&none, None).unwrap().iter().all(|w| *w == 0.0));
}

#[test]
fn pair_window_grows_around_target() {
    let mut model = common::model();
    let mut atom: SystemOne<f64> = common::atom("Rb", 10, &[0, 1]);
    atom.restrict_j([0.5]);
    let es = model.energy(&AtomicState::new("Rb", 10, 0, 0.5, 0.5));
    let ep = model.energy(&AtomicState::new("Rb", 10, 1, 0.5, 0.5));
    let target = es + ep;
    let gap = (ep - es).abs();
    let mut pair = SystemTwo::new(atom.clone(), atom).unwrap();

    // sp and ps only
    pair.set_pair_energy_window(target, 1e-3 * gap).unwrap();
    pair.build_basis(&mut model).unwrap();
    assert_eq!(pair.num_basisvectors(), 8);
    for state in pair.states().iter() {
        assert_relative_eq!(state.energy().unwrap(), target, epsilon = 1e-12);
    }

    // ss below and pp above
    pair.set_pair_energy_window(target, 1.01 * gap).unwrap();
    pair.build_basis(&mut model).unwrap();
    assert_eq!(pair.num_basisvectors(), 16);
    let energies: Vec<f64> = pair.states().iter().filter_map(|s| s.energy()).collect();
    assert_eq!(energies.len(), 16);
    let below = energies.iter().filter(|e| **e < target - 0.5 * gap).count();
    let above = energies.iter().filter(|e| **e > target + 0.5 * gap).count();
    assert_eq!((below, above), (4, 4));

    assert!(pair.set_pair_energy_window(target, -1.0).is_err());
    assert_eq!(pair.pair_energy_window(), Some((target, 1.01 * gap)));
}
