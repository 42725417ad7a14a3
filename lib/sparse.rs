//! Compressed sparse column matrices.
//!
//! Only the handful of operations needed to assemble, transform, and combine
//! interaction operators are provided: construction from (row, column, value)
//! triplets, sparse-sparse products, adjoints, sums, and index-based slicing.

use std::ops::{ Add, Mul, Neg, Sub };
use ndarray as nd;
use num_traits::{ One, Zero };
use rustc_hash::FxHashMap as HashMap;
use crate::{
    error::{ Error, Result },
    scalar::Element,
};

/// A single matrix entry awaiting assembly.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Triplet<A> {
    pub row: usize,
    pub col: usize,
    pub value: A,
}

impl<A> Triplet<A> {
    pub fn new(row: usize, col: usize, value: A) -> Self { Self { row, col, value } }
}

/// Sparse matrix in compressed sparse column layout.
///
/// Row indices within each column are strictly increasing and no explicit
/// zeros are stored.
#[derive(Clone, Debug, PartialEq)]
pub struct SpMat<A> {
    rows: usize,
    cols: usize,
    colptr: Vec<usize>,
    rowind: Vec<usize>,
    values: Vec<A>,
}

impl<A> SpMat<A>
where A: Element
{
    /// Create an empty `rows x cols` matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            colptr: vec![0; cols + 1],
            rowind: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Create the `n x n` identity.
    pub fn identity(n: usize) -> Self {
        Self::from_diagonal(&vec![A::one(); n])
    }

    /// Create a square matrix with `diag` on the diagonal.
    pub fn from_diagonal(diag: &[A]) -> Self {
        let n = diag.len();
        let triplets: Vec<Triplet<A>>
            = diag.iter().enumerate()
            .map(|(k, d)| Triplet::new(k, k, *d))
            .collect();
        Self::from_triplets(n, n, triplets)
    }

    /// Assemble a matrix from triplets in any order.
    ///
    /// Duplicate coordinates are summed and exact zeros are dropped.
    ///
    /// *Panics* if a triplet lies outside the given shape.
    pub fn from_triplets(rows: usize, cols: usize, mut triplets: Vec<Triplet<A>>)
        -> Self
    {
        triplets.sort_unstable_by_key(|t| (t.col, t.row));
        let mut colptr: Vec<usize> = vec![0; cols + 1];
        let mut rowind: Vec<usize> = Vec::with_capacity(triplets.len());
        let mut values: Vec<A> = Vec::with_capacity(triplets.len());
        let mut iter = triplets.into_iter().peekable();
        while let Some(t) = iter.next() {
            assert!(
                t.row < rows && t.col < cols,
                "SpMat::from_triplets: entry ({}, {}) outside {}x{} matrix",
                t.row, t.col, rows, cols,
            );
            let mut v = t.value;
            while iter.peek().map_or(false, |n| n.row == t.row && n.col == t.col) {
                if let Some(n) = iter.next() { v += n.value; }
            }
            if !v.is_zero() {
                rowind.push(t.row);
                values.push(v);
                colptr[t.col + 1] += 1;
            }
        }
        for c in 0..cols { colptr[c + 1] += colptr[c]; }
        Self { rows, cols, colptr, rowind, values }
    }

    /// Assemble a self-adjoint matrix from the triplets of one triangle.
    ///
    /// Every off-diagonal triplet `(r, c, v)` is mirrored as `(c, r, conj(v))`.
    pub fn from_triangle_triplets(n: usize, triplets: Vec<Triplet<A>>) -> Self {
        let mirrored: Vec<Triplet<A>>
            = triplets.iter()
            .filter(|t| t.row != t.col)
            .map(|t| Triplet::new(t.col, t.row, t.value.conj()))
            .collect();
        let mut all = triplets;
        all.extend(mirrored);
        Self::from_triplets(n, n, all)
    }

    /// Build a matrix from raw compressed-column arrays, checking their
    /// structure.
    pub fn from_csc_parts(
        rows: usize,
        cols: usize,
        colptr: Vec<usize>,
        rowind: Vec<usize>,
        values: Vec<A>,
    ) -> Result<Self>
    {
        let bad = |msg: &str| Error::Decode(format!("sparse structure: {}", msg));
        if colptr.len() != cols + 1 { return Err(bad("column pointer length")); }
        if colptr[0] != 0 { return Err(bad("column pointer start")); }
        if colptr.windows(2).any(|w| w[1] < w[0]) {
            return Err(bad("column pointers not monotonic"));
        }
        if colptr[cols] != rowind.len() || rowind.len() != values.len() {
            return Err(bad("entry count"));
        }
        for c in 0..cols {
            let col = &rowind[colptr[c]..colptr[c + 1]];
            if col.iter().any(|r| *r >= rows) { return Err(bad("row index")); }
            if col.windows(2).any(|w| w[1] <= w[0]) {
                return Err(bad("row indices not sorted"));
            }
        }
        Ok(Self { rows, cols, colptr, rowind, values })
    }

    /// Convert a dense matrix, keeping entries with `|v| > prune`.
    pub fn from_dense(a: &nd::Array2<A>, prune: f64) -> Self {
        let (rows, cols) = a.dim();
        let triplets: Vec<Triplet<A>>
            = a.indexed_iter()
            .filter(|(_, v)| v.abs() > prune)
            .map(|((r, c), v)| Triplet::new(r, c, *v))
            .collect();
        Self::from_triplets(rows, cols, triplets)
    }

    pub fn rows(&self) -> usize { self.rows }

    pub fn cols(&self) -> usize { self.cols }

    pub fn shape(&self) -> (usize, usize) { (self.rows, self.cols) }

    pub fn is_square(&self) -> bool { self.rows == self.cols }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize { self.values.len() }

    pub fn colptr(&self) -> &[usize] { &self.colptr }

    pub fn rowind(&self) -> &[usize] { &self.rowind }

    pub fn values(&self) -> &[A] { &self.values }

    /// Iterate over the `(row, value)` entries of a single column.
    pub fn col(&self, c: usize) -> impl Iterator<Item = (usize, A)> + '_ {
        let range = self.colptr[c]..self.colptr[c + 1];
        self.rowind[range.clone()].iter().copied()
            .zip(self.values[range].iter().copied())
    }

    /// Iterate over all `(row, col, value)` entries in column-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, A)> + '_ {
        (0..self.cols)
            .flat_map(move |c| self.col(c).map(move |(r, v)| (r, c, v)))
    }

    /// Return the entry at `(r, c)`, zero if not stored.
    pub fn get(&self, r: usize, c: usize) -> A {
        let range = self.colptr[c]..self.colptr[c + 1];
        match self.rowind[range.clone()].binary_search(&r) {
            Ok(k) => self.values[range.start + k],
            Err(_) => A::zero(),
        }
    }

    /// Return the main diagonal.
    pub fn diagonal(&self) -> Vec<A> {
        (0..self.rows.min(self.cols)).map(|k| self.get(k, k)).collect()
    }

    pub fn to_triplets(&self) -> Vec<Triplet<A>> {
        self.iter().map(|(r, c, v)| Triplet::new(r, c, v)).collect()
    }

    pub fn to_dense(&self) -> nd::Array2<A> {
        let mut a: nd::Array2<A> = nd::Array2::zeros((self.rows, self.cols));
        self.iter().for_each(|(r, c, v)| { a[[r, c]] = v; });
        a
    }

    pub fn transpose(&self) -> Self {
        let triplets: Vec<Triplet<A>>
            = self.iter().map(|(r, c, v)| Triplet::new(c, r, v)).collect();
        Self::from_triplets(self.cols, self.rows, triplets)
    }

    /// Conjugate transpose.
    pub fn adjoint(&self) -> Self {
        let triplets: Vec<Triplet<A>>
            = self.iter().map(|(r, c, v)| Triplet::new(c, r, v.conj())).collect();
        Self::from_triplets(self.cols, self.rows, triplets)
    }

    /// Apply `f` to every stored entry, dropping results that are exactly
    /// zero.
    pub fn map<F>(&self, f: F) -> Self
    where F: Fn(A) -> A
    {
        let triplets: Vec<Triplet<A>>
            = self.iter().map(|(r, c, v)| Triplet::new(r, c, f(v))).collect();
        Self::from_triplets(self.rows, self.cols, triplets)
    }

    /// Keep only the entries for which `keep(row, col, value)` holds.
    pub fn filter<F>(&self, keep: F) -> Self
    where F: Fn(usize, usize, A) -> bool
    {
        let triplets: Vec<Triplet<A>>
            = self.iter()
            .filter(|(r, c, v)| keep(*r, *c, *v))
            .map(|(r, c, v)| Triplet::new(r, c, v))
            .collect();
        Self::from_triplets(self.rows, self.cols, triplets)
    }

    pub fn scaled(&self, s: A) -> Self { self.map(|v| v * s) }

    /// Widen every entry to a complex number.
    pub fn to_complex(&self) -> SpMat<num_complex::Complex64> {
        SpMat {
            rows: self.rows,
            cols: self.cols,
            colptr: self.colptr.clone(),
            rowind: self.rowind.clone(),
            values: self.values.iter().map(|v| v.to_c64()).collect(),
        }
    }

    /// Elementwise sum.
    ///
    /// *Panics* if the shapes differ.
    pub fn add_mat(&self, other: &Self) -> Self {
        assert_eq!(self.shape(), other.shape(), "SpMat::add_mat: shape mismatch");
        let mut triplets = self.to_triplets();
        triplets.extend(other.iter().map(|(r, c, v)| Triplet::new(r, c, v)));
        Self::from_triplets(self.rows, self.cols, triplets)
    }

    /// Elementwise difference.
    ///
    /// *Panics* if the shapes differ.
    pub fn sub_mat(&self, other: &Self) -> Self {
        assert_eq!(self.shape(), other.shape(), "SpMat::sub_mat: shape mismatch");
        let mut triplets = self.to_triplets();
        triplets.extend(other.iter().map(|(r, c, v)| Triplet::new(r, c, -v)));
        Self::from_triplets(self.rows, self.cols, triplets)
    }

    /// Sparse matrix product `self * other`.
    ///
    /// *Panics* if the inner dimensions differ.
    pub fn matmul(&self, other: &Self) -> Self {
        assert_eq!(self.cols, other.rows, "SpMat::matmul: inner dimension mismatch");
        let mut colptr: Vec<usize> = Vec::with_capacity(other.cols + 1);
        let mut rowind: Vec<usize> = Vec::new();
        let mut values: Vec<A> = Vec::new();
        let mut acc: Vec<A> = vec![A::zero(); self.rows];
        let mut stamp: Vec<usize> = vec![usize::MAX; self.rows];
        let mut touched: Vec<usize> = Vec::new();
        colptr.push(0);
        for j in 0..other.cols {
            touched.clear();
            for (k, b) in other.col(j) {
                for (i, a) in self.col(k) {
                    if stamp[i] != j {
                        stamp[i] = j;
                        acc[i] = A::zero();
                        touched.push(i);
                    }
                    acc[i] += a * b;
                }
            }
            touched.sort_unstable();
            for &i in touched.iter() {
                if !acc[i].is_zero() {
                    rowind.push(i);
                    values.push(acc[i]);
                }
            }
            colptr.push(rowind.len());
        }
        Self { rows: self.rows, cols: other.cols, colptr, rowind, values }
    }

    /// Return the columns listed in `cols_idx`, in that order.
    pub fn select_columns(&self, cols_idx: &[usize]) -> Self {
        let mut colptr: Vec<usize> = Vec::with_capacity(cols_idx.len() + 1);
        let mut rowind: Vec<usize> = Vec::new();
        let mut values: Vec<A> = Vec::new();
        colptr.push(0);
        for &c in cols_idx.iter() {
            let range = self.colptr[c]..self.colptr[c + 1];
            rowind.extend_from_slice(&self.rowind[range.clone()]);
            values.extend_from_slice(&self.values[range]);
            colptr.push(rowind.len());
        }
        Self { rows: self.rows, cols: cols_idx.len(), colptr, rowind, values }
    }

    /// Return the submatrix at the intersection of the listed rows and
    /// columns, in the listed orders.
    pub fn submatrix(&self, rows_idx: &[usize], cols_idx: &[usize]) -> Self {
        let row_map: HashMap<usize, usize>
            = rows_idx.iter().enumerate().map(|(new, old)| (*old, new)).collect();
        let row_map = &row_map;
        let triplets: Vec<Triplet<A>>
            = cols_idx.iter().enumerate()
            .flat_map(move |(new_c, old_c)| {
                self.col(*old_c)
                    .filter_map(move |(r, v)| {
                        row_map.get(&r).map(|new_r| Triplet::new(*new_r, new_c, v))
                    })
            })
            .collect();
        Self::from_triplets(rows_idx.len(), cols_idx.len(), triplets)
    }

    /// Move every row `r` to `map(r)` in a matrix with `rows` rows, dropping
    /// rows mapped to `None`.
    pub fn remap_rows<F>(&self, rows: usize, map: F) -> Self
    where F: Fn(usize) -> Option<usize>
    {
        let triplets: Vec<Triplet<A>>
            = self.iter()
            .filter_map(|(r, c, v)| map(r).map(|new_r| Triplet::new(new_r, c, v)))
            .collect();
        Self::from_triplets(rows, self.cols, triplets)
    }

    /// Kronecker products of selected column pairs.
    ///
    /// Column `k` of the result is `self[:, a] ⊗ other[:, b]` for
    /// `pairs[k] = (a, b)`, so that row `r1 * other.rows() + r2` holds
    /// `self[r1, a] * other[r2, b]`.
    pub fn kron_columns(&self, other: &Self, pairs: &[(usize, usize)]) -> Self {
        let mut colptr: Vec<usize> = Vec::with_capacity(pairs.len() + 1);
        let mut rowind: Vec<usize> = Vec::new();
        let mut values: Vec<A> = Vec::new();
        colptr.push(0);
        for &(a, b) in pairs.iter() {
            for (r1, v1) in self.col(a) {
                for (r2, v2) in other.col(b) {
                    let v = v1 * v2;
                    if !v.is_zero() {
                        rowind.push(r1 * other.rows + r2);
                        values.push(v);
                    }
                }
            }
            colptr.push(rowind.len());
        }
        Self {
            rows: self.rows * other.rows,
            cols: pairs.len(),
            colptr,
            rowind,
            values,
        }
    }

    /// Squared norm of every column.
    pub fn col_sqnorms(&self) -> Vec<f64> {
        (0..self.cols)
            .map(|c| self.col(c).map(|(_, v)| v.square()).sum())
            .collect()
    }

    /// Squared norm of every row.
    pub fn row_sqnorms(&self) -> Vec<f64> {
        let mut norms: Vec<f64> = vec![0.0; self.rows];
        self.iter().for_each(|(r, _, v)| { norms[r] += v.square(); });
        norms
    }

    /// Largest absolute entrywise difference between two equally shaped
    /// matrices.
    pub fn max_abs_diff(&self, other: &Self) -> f64 {
        self.sub_mat(other).values.iter()
            .map(|v| v.abs())
            .fold(0.0, f64::max)
    }
}

impl<'a, A> Add<&'a SpMat<A>> for &'a SpMat<A>
where A: Element
{
    type Output = SpMat<A>;

    fn add(self, rhs: &'a SpMat<A>) -> Self::Output { self.add_mat(rhs) }
}

impl<'a, A> Sub<&'a SpMat<A>> for &'a SpMat<A>
where A: Element
{
    type Output = SpMat<A>;

    fn sub(self, rhs: &'a SpMat<A>) -> Self::Output { self.sub_mat(rhs) }
}

impl<'a, A> Mul<&'a SpMat<A>> for &'a SpMat<A>
where A: Element
{
    type Output = SpMat<A>;

    fn mul(self, rhs: &'a SpMat<A>) -> Self::Output { self.matmul(rhs) }
}

impl<'a, A> Mul<A> for &'a SpMat<A>
where A: Element
{
    type Output = SpMat<A>;

    fn mul(self, rhs: A) -> Self::Output { self.scaled(rhs) }
}

impl<'a, A> Neg for &'a SpMat<A>
where A: Element
{
    type Output = SpMat<A>;

    fn neg(self) -> Self::Output { self.map(|v| -v) }
}
