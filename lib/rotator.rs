//! Rotations of states and field vectors.
//!
//! Euler angles follow the z-y-z convention: `R(α, β, γ) = Rz(α) Ry(β)
//! Rz(γ)`, and a rotated state is `R|j m> = Σ_m' D^j_{m'm}(α, β, γ) |j m'>`
//! with `D^j_{m'm} = exp(-i m' α) d^j_{m'm}(β) exp(-i m γ)`.

use ndarray as nd;
use num_complex::Complex64 as C64;
use rustc_hash::FxHashMap as HashMap;
use crate::{
    error::{ Result, config_err },
    scalar::Element,
    space::StateSpace,
    sparse::{ SpMat, Triplet },
    spin::{ SpinProj, SpinTotal },
    state::{ BasisState, StateOne, StateTwo },
};

/// Axis orthogonality tolerance for frames given by two vectors.
const ORTHOGONALITY_TOL: f64 = 1e-10;

/// Three z-y-z Euler angles.
#[derive(Copy, Clone, Debug, Default, PartialEq, serde::Deserialize)]
pub struct EulerAngles {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl EulerAngles {
    pub fn new(alpha: f64, beta: f64, gamma: f64) -> Self { Self { alpha, beta, gamma } }

    /// Rotation matrix `Rz(α) Ry(β) Rz(γ)`.
    pub fn matrix(&self) -> nd::Array2<f64> {
        rz(self.alpha).dot(&ry(self.beta)).dot(&rz(self.gamma))
    }

    /// Extract the angles of a proper rotation matrix.
    ///
    /// For the gimbal-locked cases `β ∈ {0, π}`, `γ` is set to zero.
    pub fn from_matrix(r: &nd::Array2<f64>) -> Self {
        let beta = r[[2, 2]].clamp(-1.0, 1.0).acos();
        let sin_beta = beta.sin();
        if sin_beta.abs() > 1e-12 {
            Self {
                alpha: r[[1, 2]].atan2(r[[0, 2]]),
                beta,
                gamma: r[[2, 1]].atan2(-r[[2, 0]]),
            }
        } else if r[[2, 2]] > 0.0 {
            Self { alpha: r[[1, 0]].atan2(r[[0, 0]]), beta: 0.0, gamma: 0.0 }
        } else {
            Self {
                alpha: (-r[[1, 0]]).atan2(-r[[0, 0]]),
                beta: std::f64::consts::PI,
                gamma: 0.0,
            }
        }
    }

    /// Angles of the frame whose z- and y-axes are given.
    pub fn from_axes(to_z_axis: [f64; 3], to_y_axis: [f64; 3]) -> Result<Self> {
        Ok(Self::from_matrix(&frame_matrix(to_z_axis, to_y_axis)?))
    }
}

fn rz(a: f64) -> nd::Array2<f64> {
    let (s, c) = a.sin_cos();
    nd::array![[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]]
}

fn ry(b: f64) -> nd::Array2<f64> {
    let (s, c) = b.sin_cos();
    nd::array![[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]]
}

/// Rotation matrix whose columns are the frame's x-, y-, and z-axes.
///
/// Fails if the two axes are not orthogonal or either is zero.
pub fn frame_matrix(to_z_axis: [f64; 3], to_y_axis: [f64; 3])
    -> Result<nd::Array2<f64>>
{
    let z = nd::Array1::from(to_z_axis.to_vec());
    let y = nd::Array1::from(to_y_axis.to_vec());
    let nz = z.dot(&z).sqrt();
    let ny = y.dot(&y).sqrt();
    if nz == 0.0 || ny == 0.0 {
        return Err(config_err("frame axes must be nonzero"));
    }
    let z = z / nz;
    let y = y / ny;
    if z.dot(&y).abs() > ORTHOGONALITY_TOL {
        return Err(config_err("the z-axis and the y-axis are not orthogonal"));
    }
    let x = nd::array![
        y[1] * z[2] - y[2] * z[1],
        y[2] * z[0] - y[0] * z[2],
        y[0] * z[1] - y[1] * z[0],
    ];
    let mut r: nd::Array2<f64> = nd::Array2::zeros((3, 3));
    r.column_mut(0).assign(&x);
    r.column_mut(1).assign(&y);
    r.column_mut(2).assign(&z);
    Ok(r)
}

/// Express a vector given in a rotated frame in the laboratory frame's
/// coordinates along the rotated axes, `Rᵀ v`.
pub fn rotate_vector(r: &nd::Array2<f64>, v: [f64; 3]) -> [f64; 3] {
    let v = nd::Array1::from(v.to_vec());
    let w = r.t().dot(&v);
    [w[0], w[1], w[2]]
}

/// A frame rotation, given either directly or by the images of two axes.
#[derive(Copy, Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    Euler(EulerAngles),
    Axes { to_z_axis: [f64; 3], to_y_axis: [f64; 3] },
}

impl Rotation {
    pub fn angles(&self) -> Result<EulerAngles> {
        match self {
            Self::Euler(angles) => Ok(*angles),
            Self::Axes { to_z_axis, to_y_axis }
                => EulerAngles::from_axes(*to_z_axis, *to_y_axis),
        }
    }

    pub fn matrix(&self) -> Result<nd::Array2<f64>> {
        match self {
            Self::Euler(angles) => Ok(angles.matrix()),
            Self::Axes { to_z_axis, to_y_axis } => frame_matrix(*to_z_axis, *to_y_axis),
        }
    }
}

/// Memoized Wigner small-d and D matrix elements.
#[derive(Clone, Debug, Default)]
pub struct WignerD {
    ln_fact: Vec<f64>,
    small_d: HashMap<(u32, i32, i32, u64), f64>,
}

impl WignerD {
    pub fn new() -> Self { Self::default() }

    fn ln_factorial(&mut self, k: usize) -> f64 {
        if self.ln_fact.is_empty() { self.ln_fact.push(0.0); }
        while self.ln_fact.len() <= k {
            let n = self.ln_fact.len();
            let prev = self.ln_fact[n - 1];
            self.ln_fact.push(prev + (n as f64).ln());
        }
        self.ln_fact[k]
    }

    /// `d^j_{m'm}(β)` with `j`, `m'`, `m` in halves.
    pub fn d(&mut self, j: SpinTotal, mp: SpinProj, m: SpinProj, beta: f64) -> f64 {
        let key = (j.halves(), mp.halves(), m.halves(), beta.to_bits());
        if let Some(v) = self.small_d.get(&key) { return *v; }
        let v = self.compute_d(j.halves() as i32, mp.halves(), m.halves(), beta);
        self.small_d.insert(key, v);
        v
    }

    // explicit sum over k; all arguments in halves
    fn compute_d(&mut self, j2: i32, mp2: i32, m2: i32, beta: f64) -> f64 {
        if mp2.abs() > j2 || m2.abs() > j2 || (j2 - mp2) % 2 != 0 || (j2 - m2) % 2 != 0 {
            return 0.0;
        }
        let jpmp = ((j2 + mp2) / 2) as usize;
        let jmmp = ((j2 - mp2) / 2) as usize;
        let jpm = ((j2 + m2) / 2) as usize;
        let jmm = ((j2 - m2) / 2) as usize;
        let delta = (mp2 - m2) / 2;
        let ln_pref = 0.5 * (
            self.ln_factorial(jpmp) + self.ln_factorial(jmmp)
            + self.ln_factorial(jpm) + self.ln_factorial(jmm)
        );
        let (s, c) = (beta / 2.0).sin_cos();
        let k_min = 0_i32.max(-delta) as usize;
        let k_max = jpm.min(jmmp);
        let mut total = 0.0;
        for k in k_min..=k_max {
            let kd = k as i32 + delta;
            let ln_den
                = self.ln_factorial(jpm - k)
                + self.ln_factorial(k)
                + self.ln_factorial(jmmp - k)
                + self.ln_factorial(kd as usize);
            let sign = if kd % 2 == 0 { 1.0 } else { -1.0 };
            let cos_pow = (jpm + jmmp) as i32 - 2 * k as i32;
            let sin_pow = 2 * k as i32 + delta;
            total += sign * (ln_pref - ln_den).exp()
                * c.powi(cos_pow) * s.powi(sin_pow);
        }
        total
    }

    /// `D^j_{m'm}(α, β, γ)`.
    pub fn big_d(&mut self, j: SpinTotal, mp: SpinProj, m: SpinProj, angles: &EulerAngles)
        -> C64
    {
        let d = self.d(j, mp, m, angles.beta);
        let phase = -(mp.f() * angles.alpha + m.f() * angles.gamma);
        C64::from_polar(d, phase)
    }
}

/// States that can be expressed in a rotated frame.
pub trait Rotate: Sized {
    /// Return the components of the rotated state.
    fn rotated(&self, wigner: &mut WignerD, angles: &EulerAngles) -> Vec<(Self, C64)>;
}

impl Rotate for StateOne {
    fn rotated(&self, wigner: &mut WignerD, angles: &EulerAngles) -> Vec<(Self, C64)> {
        match self {
            Self::Atomic(s) => {
                s.j.projections()
                    .map(|mp| {
                        let coeff = wigner.big_d(s.j, mp, s.m, angles);
                        (Self::Atomic(s.with_m(mp)), coeff)
                    })
                    .filter(|(_, coeff)| coeff.norm() > 0.0)
                    .collect()
            },
            Self::Artificial(_) => vec![(self.clone(), C64::new(1.0, 0.0))],
        }
    }
}

impl Rotate for StateTwo {
    fn rotated(&self, wigner: &mut WignerD, angles: &EulerAngles) -> Vec<(Self, C64)> {
        let first = self.first().rotated(wigner, angles);
        let second = self.second().rotated(wigner, angles);
        let mut out = Vec::with_capacity(first.len() * second.len());
        for (a, ca) in first.iter() {
            for (b, cb) in second.iter() {
                out.push((StateTwo::new(a.clone(), b.clone()), ca * cb));
            }
        }
        out
    }
}

fn add_rotated<S>(
    space: &StateSpace<S>,
    state: &S,
    col: usize,
    wigner: &mut WignerD,
    angles: &EulerAngles,
    triplets: &mut Vec<Triplet<C64>>,
)
where S: BasisState + Rotate
{
    for (component, coeff) in state.rotated(wigner, angles) {
        // components outside the registered states are dropped
        if let Some(row) = space.index_of(&component) {
            triplets.push(Triplet::new(row, col, coeff));
        }
    }
}

/// Rotation operator over all registered states.
///
/// Column `k` holds the rotated state `k` in canonical coordinates.
pub fn build_staterotator<S>(space: &StateSpace<S>, angles: &EulerAngles) -> SpMat<C64>
where S: BasisState + Rotate
{
    let mut wigner = WignerD::new();
    let mut triplets: Vec<Triplet<C64>> = Vec::new();
    for (col, state) in space.iter().enumerate() {
        add_rotated(space, state, col, &mut wigner, angles, &mut triplets);
    }
    SpMat::from_triplets(space.len(), space.len(), triplets)
}

/// Rotated copies of the states at `indices`, one column each.
pub fn rotate_states<S>(space: &StateSpace<S>, indices: &[usize], angles: &EulerAngles)
    -> Result<SpMat<C64>>
where S: BasisState + Rotate
{
    let mut wigner = WignerD::new();
    let mut triplets: Vec<Triplet<C64>> = Vec::new();
    for (col, idx) in indices.iter().enumerate() {
        let state = space.state(*idx)
            .ok_or_else(|| config_err(format!("state index {} out of range", idx)))?;
        add_rotated(space, state, col, &mut wigner, angles, &mut triplets);
    }
    Ok(SpMat::from_triplets(space.len(), indices.len(), triplets))
}

/// Narrow a rotation operator to the scalar type of a pipeline.
pub fn narrow<A>(m: &SpMat<C64>, tol: f64) -> Result<SpMat<A>>
where A: Element
{
    let triplets: Vec<Triplet<A>>
        = m.iter()
        .map(|(r, c, v)| {
            A::from_c64(v, tol)
                .map(|a| Triplet::new(r, c, a))
                .ok_or_else(|| config_err("rotation requires a complex data type"))
        })
        .collect::<Result<_>>()?;
    Ok(SpMat::from_triplets(m.rows(), m.cols(), triplets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{ FRAC_PI_2, PI };

    #[test]
    fn small_d_known_values() {
        let mut w = WignerD::new();
        let beta = 0.7;
        let half = SpinTotal::new(1);
        let up = SpinProj::new(1);
        let dn = SpinProj::new(-1);
        assert_relative_eq!(w.d(half, up, up, beta), (beta / 2.0).cos(), epsilon = 1e-12);
        assert_relative_eq!(w.d(half, up, dn, beta), -(beta / 2.0).sin(), epsilon = 1e-12);
        assert_relative_eq!(w.d(half, dn, up, beta), (beta / 2.0).sin(), epsilon = 1e-12);
        let one = SpinTotal::new(2);
        let zero = SpinProj::new(0);
        assert_relative_eq!(w.d(one, zero, zero, beta), beta.cos(), epsilon = 1e-12);
        assert_relative_eq!(
            w.d(one, SpinProj::new(2), zero, beta),
            -beta.sin() / 2.0_f64.sqrt(),
            epsilon = 1e-12,
        );
    }

    #[test]
    fn d_matrix_is_orthogonal() {
        let mut w = WignerD::new();
        let j = SpinTotal::new(5);
        let beta = 1.234;
        let ms: Vec<SpinProj> = j.projections().collect();
        for a in ms.iter() {
            for b in ms.iter() {
                let dot: f64
                    = ms.iter().map(|k| w.d(j, *k, *a, beta) * w.d(j, *k, *b, beta)).sum();
                let expected = if a == b { 1.0 } else { 0.0 };
                assert_relative_eq!(dot, expected, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn euler_round_trip() {
        let angles = EulerAngles::new(0.3, 1.1, -0.4);
        let back = EulerAngles::from_matrix(&angles.matrix());
        assert_relative_eq!(back.alpha, angles.alpha, epsilon = 1e-12);
        assert_relative_eq!(back.beta, angles.beta, epsilon = 1e-12);
        assert_relative_eq!(back.gamma, angles.gamma, epsilon = 1e-12);
    }

    #[test]
    fn frame_axes() {
        assert!(frame_matrix([0.0, 0.0, 1.0], [1.0, 1.0, 0.0]).is_ok());
        assert!(frame_matrix([0.0, 0.0, 1.0], [0.0, 1.0, 1.0]).is_err());
        // identity frame
        let angles = EulerAngles::from_axes([0.0, 0.0, 1.0], [0.0, 1.0, 0.0]).unwrap();
        assert_relative_eq!(angles.beta, 0.0, epsilon = 1e-12);
        assert_relative_eq!(angles.alpha + angles.gamma, 0.0, epsilon = 1e-12);
        // z -> x
        let r = frame_matrix([1.0, 0.0, 0.0], [0.0, 1.0, 0.0]).unwrap();
        let v = rotate_vector(&r, [1.0, 0.0, 0.0]);
        assert_relative_eq!(v[2], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn rotating_full_space_is_unitary() {
        let space: StateSpace<StateOne>
            = [-1.5, -0.5, 0.5, 1.5].into_iter()
            .map(|m| StateOne::new("Rb", 10, 1, 1.5, m))
            .collect();
        let angles = EulerAngles::new(0.2, FRAC_PI_2, PI / 3.0);
        let rot = build_staterotator(&space, &angles);
        let prod = rot.adjoint().matmul(&rot);
        for k in 0..4 {
            assert_relative_eq!(prod.get(k, k).re, 1.0, epsilon = 1e-10);
        }
        assert_relative_eq!(prod.get(1, 0).norm(), 0.0, epsilon = 1e-10);
        assert!(narrow::<f64>(&rot, 1e-12).is_err());
        let sub = rotate_states(&space, &[2], &angles).unwrap();
        assert_eq!(sub.shape(), (4, 1));
    }
}
