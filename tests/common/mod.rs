#![allow(dead_code)]

use rydpair::{
    SystemBuild,
    SystemOne,
    elements::ModelElements,
    scalar::Element,
    sparse::SpMat,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn model() -> ModelElements {
    init_logging();
    ModelElements::new()
}

/// Single atom of `species` restricted to one principal quantum number and
/// the given orbital quantum numbers.
pub fn atom<A>(species: &str, n: u32, ls: &[u32]) -> SystemOne<A>
where A: Element
{
    let mut sys = SystemOne::new(species);
    sys.restrict_n([n]);
    sys.restrict_l(ls.iter().copied());
    sys
}

/// Column of the basis vector with the largest weight on state `idx`.
pub fn dominant_column<A>(basis: &SpMat<A>, idx: usize) -> Option<usize>
where A: Element
{
    basis.iter()
        .filter(|(r, _, _)| *r == idx)
        .max_by(|a, b| a.2.abs().total_cmp(&b.2.abs()))
        .map(|(_, c, _)| c)
}
