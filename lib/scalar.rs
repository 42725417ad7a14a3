//! Scalar strategy shared by every matrix in the pipeline.
//!
//! A system is instantiated over either `f64` or [`C64`]; operations that can
//! only be expressed with complex arithmetic report a configuration error on a
//! real pipeline rather than silently dropping an imaginary part.

use ndarray_linalg::{ Lapack, Scalar };
use num_complex::Complex64 as C64;

/// Matrix element type: real or complex double precision.
pub trait Element: Scalar<Real = f64> + Lapack + Send + Sync + 'static {
    /// `true` if the type can hold a nonzero imaginary part.
    const COMPLEX: bool;

    /// Return the real and imaginary parts.
    fn parts(self) -> (f64, f64);

    /// Build a value from real and imaginary parts.
    ///
    /// Returns `None` if `Self` is real and `|im| > tol`.
    fn from_parts(re: f64, im: f64, tol: f64) -> Option<Self>;

    /// The imaginary unit, if representable.
    fn imaginary_unit() -> Option<Self>;

    /// Convert from a complex number, subject to [`Self::from_parts`].
    fn from_c64(z: C64, tol: f64) -> Option<Self> { Self::from_parts(z.re, z.im, tol) }

    /// Widen to a complex number.
    fn to_c64(self) -> C64 {
        let (re, im) = self.parts();
        C64::new(re, im)
    }
}

impl Element for f64 {
    const COMPLEX: bool = false;

    fn parts(self) -> (f64, f64) { (self, 0.0) }

    fn from_parts(re: f64, im: f64, tol: f64) -> Option<Self> {
        (im.abs() <= tol).then_some(re)
    }

    fn imaginary_unit() -> Option<Self> { None }
}

impl Element for C64 {
    const COMPLEX: bool = true;

    fn parts(self) -> (f64, f64) { (self.re, self.im) }

    fn from_parts(re: f64, im: f64, _tol: f64) -> Option<Self> {
        Some(C64::new(re, im))
    }

    fn imaginary_unit() -> Option<Self> { Some(C64::i()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_rejects_imaginary() {
        assert_eq!(<f64 as Element>::from_parts(1.0, 0.0, 1e-12), Some(1.0));
        assert!(<f64 as Element>::from_parts(1.0, 1e-3, 1e-12).is_none());
        assert!(<f64 as Element>::imaginary_unit().is_none());
        assert_eq!(<C64 as Element>::imaginary_unit(), Some(C64::i()));
    }
}
