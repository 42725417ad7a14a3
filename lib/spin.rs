//! Angular momentum quantum numbers and angular-momentum coupling symbols.
//!
//! All quantum numbers are stored as a number of halves so that integer and
//! half-integer values share one exact representation.

use std::fmt;
use wigner_symbols::{ ClebschGordan, Wigner3jm, Wigner6j };

/// A single spin-projection quantum number, in halves.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpinProj(i32);

impl SpinProj {
    /// Create a new spin projection from a number of halves.
    pub fn new(m: i32) -> Self { Self(m) }

    /// Return a copy of `self` with a minus sign applied.
    pub fn reflected(self) -> Self { Self(-self.0) }

    /// Return `self` as a bare number of halves.
    pub fn halves(self) -> i32 { self.0 }

    /// Return `self` as an `f64`.
    pub fn f(self) -> f64 { f64::from(self.0) / 2.0 }

    /// Create a new spin-projection quantum number from a `f64` value, rounding
    /// to the nearest half-integer.
    pub fn from_f64(f: f64) -> Self { Self((2.0 * f).round() as i32) }

    /// Return `true` if `self` is an integer.
    pub fn is_integer(self) -> bool { self.0 % 2 == 0 }
}

impl From<SpinProj> for f64 {
    fn from(m: SpinProj) -> Self { m.f() }
}

impl fmt::Display for SpinProj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_halves(i64::from(self.0), f)
    }
}

/// A single total-spin quantum number, in halves.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpinTotal(u32);

impl SpinTotal {
    /// Create a new total spin from a number of halves.
    pub fn new(j: u32) -> Self { Self(j) }

    /// Return `self` as a bare number of halves.
    pub fn halves(self) -> u32 { self.0 }

    /// Return `self` as an `f64`.
    pub fn f(self) -> f64 { f64::from(self.0) / 2.0 }

    /// Create a new total-spin quantum number from a `f64` value, rounding
    /// to the nearest half-integer.
    ///
    /// Negative inputs are passed through [`f64::abs`] before rounding.
    pub fn from_f64(f: f64) -> Self { Self((2.0 * f.abs()).round() as u32) }

    /// Return an iterator over available projections in ascending order.
    pub fn projections(self) -> SpinProjections {
        SpinProjections { j: self.0 as i32, next: -(self.0 as i32) }
    }
}

impl From<SpinTotal> for f64 {
    fn from(j: SpinTotal) -> Self { j.f() }
}

impl fmt::Display for SpinTotal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_halves(i64::from(self.0), f)
    }
}

fn fmt_halves(h: i64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if h % 2 == 0 { write!(f, "{}", h / 2) } else { write!(f, "{}/2", h) }
}

/// A `(total, projection)` spin quantum number pair.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Spin(SpinTotal, SpinProj);

impl Spin {
    /// Create a new spin if the given spin-projection number is valid for the
    /// given total-spin number.
    pub fn new(j: u32, m: i32) -> Option<Self> {
        let j_i64 = i64::from(j);
        let m_i64 = i64::from(m);
        (
            (-j_i64..=j_i64).contains(&m_i64)
            && (m_i64 - j_i64) % 2 == 0
        )
        .then_some(Self(SpinTotal(j), SpinProj(m)))
    }

    /// Return the [total-spin][SpinTotal] quantum number.
    pub fn total(self) -> SpinTotal { self.0 }

    /// Return the [spin-projection][SpinProj] quantum number.
    pub fn proj(self) -> SpinProj { self.1 }

    /// Return `self` as a bare pair of halves.
    pub fn halves(self) -> (u32, i32) { (self.0.halves(), self.1.halves()) }
}

/// Iterator over spin projections for a fixed total spin, in ascending order.
#[derive(Copy, Clone, Debug)]
pub struct SpinProjections {
    j: i32,
    next: i32,
}

impl Iterator for SpinProjections {
    type Item = SpinProj;

    fn next(&mut self) -> Option<Self::Item> {
        (self.next <= self.j).then(|| {
            let m = self.next;
            self.next += 2;
            SpinProj(m)
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = ((self.j - self.next) / 2 + 1).max(0) as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for SpinProjections { }

/// Return `true` if total spins `a`, `b`, `c` (in halves) satisfy the triangle
/// condition and sum to an integer.
pub fn triangle(a: i32, b: i32, c: i32) -> bool {
    a >= 0 && b >= 0 && c >= 0
        && c <= a + b
        && c >= (a - b).abs()
        && (a + b + c) % 2 == 0
}

fn valid_pair(j: i32, m: i32) -> bool {
    j >= 0 && m.abs() <= j && (j - m) % 2 == 0
}

/// `(-1)^k` for an integer `k`.
pub fn sign(k: i32) -> f64 { if k.rem_euclid(2) == 0 { 1.0 } else { -1.0 } }

/// Wigner 3j symbol with all arguments given in halves.
///
/// Returns zero for any combination that violates a selection rule.
pub fn w3j_halves(j1: i32, m1: i32, j2: i32, m2: i32, j3: i32, m3: i32) -> f64 {
    if !(valid_pair(j1, m1) && valid_pair(j2, m2) && valid_pair(j3, m3)) {
        return 0.0;
    }
    if m1 + m2 + m3 != 0 || !triangle(j1, j2, j3) { return 0.0; }
    Wigner3jm { tj1: j1, tm1: m1, tj2: j2, tm2: m2, tj3: j3, tm3: m3 }
        .value()
        .into()
}

/// Wigner 6j symbol `{j1 j2 j3; j4 j5 j6}` with all arguments in halves.
///
/// Returns zero unless all four triads satisfy the triangle condition.
pub fn w6j_halves(j1: i32, j2: i32, j3: i32, j4: i32, j5: i32, j6: i32) -> f64 {
    let ok = triangle(j1, j2, j3)
        && triangle(j1, j5, j6)
        && triangle(j4, j2, j6)
        && triangle(j4, j5, j3);
    if !ok { return 0.0; }
    Wigner6j { tj1: j1, tj2: j2, tj3: j3, tj4: j4, tj5: j5, tj6: j6 }
        .value()
        .into()
}

/// Clebsch-Gordan coefficient `<j1 m1; j2 m2 | j3 m3>` with all arguments in
/// halves.
pub fn cg_halves(j1: i32, m1: i32, j2: i32, m2: i32, j3: i32, m3: i32) -> f64 {
    if !(valid_pair(j1, m1) && valid_pair(j2, m2) && valid_pair(j3, m3)) {
        return 0.0;
    }
    if m1 + m2 != m3 || !triangle(j1, j2, j3) { return 0.0; }
    ClebschGordan { tj1: j1, tm1: m1, tj2: j2, tm2: m2, tj12: j3, tm12: m3 }
        .value()
        .into()
}

/// Clebsch-Gordan coefficient for the angular momentum addition
/// `s1 + s2 = s3`.
pub fn cg(s1: Spin, s2: Spin, s3: Spin) -> f64 {
    let (j1, m1) = s1.halves();
    let (j2, m2) = s2.halves();
    let (j3, m3) = s3.halves();
    cg_halves(j1 as i32, m1, j2 as i32, m2, j3 as i32, m3)
}
