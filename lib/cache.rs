//! Interaction operators expressed in a system's working basis.
//!
//! Operators are first assembled in canonical coordinates (one row/column per
//! registered state) and then transformed with the basis-change matrix `B` as
//! `B† V B`. Only one of each pair of mutually adjoint components is computed;
//! the other follows from `V(-q) = (-1)^q V(q)†`.

use std::fmt;
use rayon::prelude::*;
use rustc_hash::FxHashMap as HashMap;
use crate::{
    scalar::Element,
    sparse::{ SpMat, Triplet },
    spin::sign,
};

/// Identifies one spherical component of one interaction family.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperatorKey {
    /// Electric dipole, component `q`.
    Efield(i32),
    /// Magnetic dipole, component `q`.
    Bfield(i32),
    /// Diamagnetic operator of rank `rank` (0 or 2), component `q`.
    Diamagnetism { rank: u32, q: i32 },
    /// m-conserving electric multipole of the given order, coupling to an
    /// ion on the quantization axis.
    Multipole(u32),
    /// Product of two single-atom multipoles, as in the atom-atom multipole
    /// expansion.
    PairMultipole { kappa1: u32, kappa2: u32, q1: i32, q2: i32 },
}

impl OperatorKey {
    /// Total spherical component carried by the operator.
    pub fn component(&self) -> i32 {
        match *self {
            Self::Efield(q) | Self::Bfield(q) => q,
            Self::Diamagnetism { q, .. } => q,
            Self::Multipole(_) => 0,
            Self::PairMultipole { q1, q2, .. } => q1 + q2,
        }
    }

    /// Key of the operator related to `self` by adjunction.
    pub fn partner(&self) -> Self {
        match *self {
            Self::Efield(q) => Self::Efield(-q),
            Self::Bfield(q) => Self::Bfield(-q),
            Self::Diamagnetism { rank, q } => Self::Diamagnetism { rank, q: -q },
            Self::Multipole(order) => Self::Multipole(order),
            Self::PairMultipole { kappa1, kappa2, q1, q2 }
                => Self::PairMultipole { kappa1, kappa2, q1: -q1, q2: -q2 },
        }
    }

    /// `s` such that `V(partner) = s V(self)†`.
    pub fn adjoint_sign(&self) -> f64 { sign(self.component()) }

    /// Return `true` if the operator is its own partner.
    pub fn is_self_adjoint(&self) -> bool { self.partner() == *self }

    /// Return `true` if `self` is the member of its adjoint pair that is
    /// computed directly.
    pub fn is_canonical(&self) -> bool {
        match *self {
            Self::PairMultipole { q1, q2, .. } => q1 > 0 || (q1 == 0 && q2 >= 0),
            _ => self.component() >= 0,
        }
    }

    /// The directly computed member of the adjoint pair containing `self`.
    pub fn canonical(&self) -> Self {
        if self.is_canonical() { *self } else { self.partner() }
    }
}

impl fmt::Display for OperatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Efield(q) => write!(f, "E[{:+}]", q),
            Self::Bfield(q) => write!(f, "B[{:+}]", q),
            Self::Diamagnetism { rank, q } => write!(f, "D{}[{:+}]", rank, q),
            Self::Multipole(order) => write!(f, "M{}", order),
            Self::PairMultipole { kappa1, kappa2, q1, q2 }
                => write!(f, "V{}{}[{:+},{:+}]", kappa1, kappa2, q1, q2),
        }
    }
}

/// Store of interaction operators in the working basis.
#[derive(Clone, Debug)]
pub struct InteractionCache<A> {
    ops: HashMap<OperatorKey, SpMat<A>>,
}

impl<A> Default for InteractionCache<A> {
    fn default() -> Self { Self { ops: HashMap::default() } }
}

impl<A> InteractionCache<A>
where A: Element
{
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, key: &OperatorKey) -> Option<&SpMat<A>> { self.ops.get(key) }

    pub fn contains(&self, key: &OperatorKey) -> bool { self.ops.contains_key(key) }

    pub fn len(&self) -> usize { self.ops.len() }

    pub fn is_empty(&self) -> bool { self.ops.is_empty() }

    pub fn keys(&self) -> impl Iterator<Item = &OperatorKey> + '_ { self.ops.keys() }

    /// Drop every stored operator.
    pub fn clear(&mut self) { self.ops.clear(); }

    /// Assemble a canonical-coordinate operator from its triplets, transform
    /// it into the working basis, and store it together with its partner.
    ///
    /// For a self-adjoint key, only the lower triangle (`row >= col`) is
    /// expected.
    pub fn insert_canonical(
        &mut self,
        key: OperatorKey,
        triplets: Vec<Triplet<A>>,
        n: usize,
        basis: &SpMat<A>,
    ) {
        let op
            = if key.is_self_adjoint() {
                SpMat::from_triangle_triplets(n, triplets)
            } else {
                SpMat::from_triplets(n, n, triplets)
            };
        let transformed = basis.adjoint().matmul(&op).matmul(basis);
        if !key.is_self_adjoint() {
            let partner
                = transformed.adjoint()
                .scaled(A::from_real(key.adjoint_sign()));
            self.ops.insert(key.partner(), partner);
        }
        self.ops.insert(key, transformed);
    }
}

/// Evaluate all operator elements over an `n x n` grid of canonical
/// coordinates in parallel, grouped by key.
///
/// `element(key, row, col)` returns `None` when the element vanishes. For
/// self-adjoint keys only the lower triangle is visited.
pub fn collect_triplets<A, F>(n: usize, keys: &[OperatorKey], element: F)
    -> HashMap<OperatorKey, Vec<Triplet<A>>>
where
    A: Element,
    F: Fn(OperatorKey, usize, usize) -> Option<A> + Sync,
{
    let found: Vec<(OperatorKey, Triplet<A>)>
        = (0..n).into_par_iter()
        .fold(
            Vec::new,
            |mut acc, col| {
                for row in 0..n {
                    for key in keys.iter() {
                        if key.is_self_adjoint() && row < col { continue; }
                        if let Some(v) = element(*key, row, col) {
                            acc.push((*key, Triplet::new(row, col, v)));
                        }
                    }
                }
                acc
            },
        )
        .reduce(Vec::new, |mut a, mut b| { a.append(&mut b); a });
    let mut grouped: HashMap<OperatorKey, Vec<Triplet<A>>> = HashMap::default();
    keys.iter().for_each(|k| { grouped.entry(*k).or_default(); });
    for (key, t) in found.into_iter() {
        grouped.entry(key).or_default().push(t);
    }
    grouped
}
