//! Conserved quantities used to reduce the basis.

use std::collections::BTreeSet;
use crate::{
    error::{ Error, Result, config_err },
    spin::SpinProj,
};

/// Eigenvalue of a discrete symmetry operation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    #[serde(alias = "na")]
    NotApplicable,
    Even,
    Odd,
}

impl Parity {
    /// `+1` or `-1` for a set parity.
    pub fn sign(self) -> Option<f64> {
        match self {
            Self::NotApplicable => None,
            Self::Even => Some(1.0),
            Self::Odd => Some(-1.0),
        }
    }

    pub fn is_set(self) -> bool { self != Self::NotApplicable }
}

/// A single input to a conserved-momentum restriction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Momentum {
    /// Sentinel meaning "do not restrict the momentum".
    Arbitrary,
    Value(SpinProj),
}

impl From<f64> for Momentum {
    fn from(m: f64) -> Self { Self::Value(SpinProj::from_f64(m)) }
}

/// Set of magnetic quantum numbers conserved under rotation about the
/// quantization axis.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ConservedMomenta {
    #[default]
    Arbitrary,
    Set(BTreeSet<SpinProj>),
}

impl ConservedMomenta {
    /// Collect momenta, rejecting the arbitrary sentinel next to explicit
    /// values.
    pub fn from_momenta<I>(momenta: I) -> Result<Self>
    where I: IntoIterator<Item = Momentum>
    {
        let mut arbitrary = false;
        let mut set = BTreeSet::new();
        for m in momenta {
            match m {
                Momentum::Arbitrary => { arbitrary = true; },
                Momentum::Value(v) => { set.insert(v); },
            }
        }
        match (arbitrary, set.is_empty()) {
            (true, true) => Ok(Self::Arbitrary),
            (true, false) => Err(Error::ArbitraryMomentumMisuse),
            (false, true) => Err(config_err("empty set of conserved momenta")),
            (false, false) => Ok(Self::Set(set)),
        }
    }

    pub fn is_arbitrary(&self) -> bool { matches!(self, Self::Arbitrary) }

    /// Return `true` if `m` is allowed.
    pub fn contains(&self, m: SpinProj) -> bool {
        match self {
            Self::Arbitrary => true,
            Self::Set(set) => set.contains(&m),
        }
    }

    /// Return `true` if every kept value `v` has `-v` kept as well.
    pub fn is_closed_under_reflection(&self) -> bool {
        match self {
            Self::Arbitrary => true,
            Self::Set(set) => set.iter().all(|v| set.contains(&v.reflected())),
        }
    }

    /// Smallest restriction admitting everything either operand admits.
    pub fn union(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Set(a), Self::Set(b)) => Self::Set(a.union(b).copied().collect()),
            _ => Self::Arbitrary,
        }
    }
}

/// Check that a reflection parity and a momentum restriction can hold at the
/// same time.
pub fn check_compatible(reflection: Parity, rotation: &ConservedMomenta)
    -> Result<()>
{
    if reflection.is_set() && !rotation.is_closed_under_reflection() {
        Err(config_err(
            "reflection symmetry requires every conserved momentum m to be \
            accompanied by -m"
        ))
    } else {
        Ok(())
    }
}

/// All symmetries a system may conserve.
///
/// Permutation and inversion only apply to pair systems.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Symmetry {
    pub reflection: Parity,
    pub rotation: ConservedMomenta,
    pub permutation: Parity,
    pub inversion: Parity,
}

impl Symmetry {
    /// Validate a new reflection parity against the current rotation
    /// restriction before storing it.
    pub fn set_reflection(&mut self, parity: Parity) -> Result<()> {
        check_compatible(parity, &self.rotation)?;
        self.reflection = parity;
        Ok(())
    }

    /// Validate a new rotation restriction against the current reflection
    /// parity before storing it.
    pub fn set_rotation<I>(&mut self, momenta: I) -> Result<()>
    where I: IntoIterator<Item = Momentum>
    {
        let rotation = ConservedMomenta::from_momenta(momenta)?;
        check_compatible(self.reflection, &rotation)?;
        self.rotation = rotation;
        Ok(())
    }

    /// Return `true` if no symmetry is imposed.
    pub fn is_trivial(&self) -> bool {
        !self.reflection.is_set()
            && self.rotation.is_arbitrary()
            && !self.permutation.is_set()
            && !self.inversion.is_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflection_after_symmetric_momenta() {
        let mut sym = Symmetry::default();
        sym.set_rotation([Momentum::from(1.0), Momentum::from(-1.0)]).unwrap();
        assert!(sym.set_reflection(Parity::Even).is_ok());
        assert_eq!(sym.reflection, Parity::Even);
    }

    #[test]
    fn reflection_after_one_sided_momenta() {
        let mut sym = Symmetry::default();
        sym.set_rotation([Momentum::from(1.0)]).unwrap();
        let res = sym.set_reflection(Parity::Even);
        assert!(matches!(res, Err(Error::Configuration(_))));
        assert_eq!(sym.reflection, Parity::NotApplicable);
    }

    #[test]
    fn momenta_after_reflection() {
        let mut sym = Symmetry::default();
        sym.set_reflection(Parity::Odd).unwrap();
        assert!(sym.set_rotation([Momentum::from(0.5)]).is_err());
        assert!(sym.set_rotation([Momentum::from(0.5), Momentum::from(-0.5)]).is_ok());
    }

    #[test]
    fn arbitrary_misuse() {
        let res = ConservedMomenta::from_momenta(
            [Momentum::Arbitrary, Momentum::from(1.0)]);
        assert!(matches!(res, Err(Error::ArbitraryMomentumMisuse)));
        assert_eq!(
            ConservedMomenta::from_momenta([Momentum::Arbitrary]).unwrap(),
            ConservedMomenta::Arbitrary,
        );
    }

    #[test]
    fn union_of_sets() {
        let a = ConservedMomenta::from_momenta([Momentum::from(1.0)]).unwrap();
        let b = ConservedMomenta::from_momenta([Momentum::from(-1.0)]).unwrap();
        let u = a.union(&b);
        assert!(u.contains(SpinProj::new(2)) && u.contains(SpinProj::new(-2)));
        assert!(a.union(&ConservedMomenta::Arbitrary).is_arbitrary());
    }
}
