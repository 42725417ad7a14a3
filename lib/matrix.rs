//! An operator bundled with the basis it is expressed in.

use std::{
    fs,
    hash::Hasher,
    io::Read,
    ops::{ Add, AddAssign, Mul, Sub, SubAssign },
    path::Path,
};
use byteorder::{ ByteOrder, LittleEndian, ReadBytesExt };
use ndarray_linalg::{ EighInto, UPLO };
use rustc_hash::FxHashMap as HashMap;
use siphasher::sip::SipHasher13;
use crate::{
    error::{ Error, Result, config_err },
    scalar::Element,
    sparse::{ SpMat, Triplet },
};

/// Serialized-record flag: indices describe compressed rows instead of
/// compressed columns.
pub const CSR_NOT_CSC: u8 = 0x01;

/// Serialized-record flag: values are stored as real/imaginary pairs.
pub const COMPLEX_NOT_REAL: u8 = 0x02;

/// Current version of the serialized record.
pub const FORMAT_VERSION: u8 = 1;

const ENTRIES_KEYS: (u64, u64) = (0x656e7472_69657321, 0x68616d69_6c746f6e);
const BASIS_KEYS: (u64, u64) = (0x62617369_73766563, 0x746f7273_21212121);

/// Operator `entries` (square, one row/column per basis vector) together with
/// the change-of-basis matrix `basis` (one row per canonical coordinate, one
/// column per basis vector).
#[derive(Clone, Debug)]
pub struct Hamiltonianmatrix<A> {
    entries: SpMat<A>,
    basis: SpMat<A>,
    triplets_entries: Vec<Triplet<A>>,
    triplets_basis: Vec<Triplet<A>>,
}

impl<A> PartialEq for Hamiltonianmatrix<A>
where A: Element
{
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries && self.basis == other.basis
    }
}

impl<A> Default for Hamiltonianmatrix<A>
where A: Element
{
    fn default() -> Self { Self::new(SpMat::zeros(0, 0), SpMat::zeros(0, 0)) }
}

impl<A> Hamiltonianmatrix<A>
where A: Element
{
    /// Bundle an operator with its basis.
    ///
    /// The shapes are only checked in debug builds; use [`Self::try_new`] for
    /// matrices of unknown origin.
    pub fn new(entries: SpMat<A>, basis: SpMat<A>) -> Self {
        debug_assert!(
            Self::shapes_match(&entries, &basis),
            "Hamiltonianmatrix::new: entries ({:?}) do not match basis ({:?})",
            entries.shape(), basis.shape(),
        );
        Self {
            entries,
            basis,
            triplets_entries: Vec::new(),
            triplets_basis: Vec::new(),
        }
    }

    /// Bundle an operator with its basis, failing if `entries` is not square
    /// or its size differs from the number of basis vectors.
    pub fn try_new(entries: SpMat<A>, basis: SpMat<A>) -> Result<Self> {
        if !Self::shapes_match(&entries, &basis) {
            return Err(config_err(format!(
                "operator of shape {:?} does not match basis of shape {:?}",
                entries.shape(), basis.shape(),
            )));
        }
        Ok(Self::new(entries, basis))
    }

    fn shapes_match(entries: &SpMat<A>, basis: &SpMat<A>) -> bool {
        entries.is_square() && entries.rows() == basis.cols()
    }

    /// Create an empty container ready for triplet accumulation.
    pub fn with_capacity(sz_basis: usize, sz_entries: usize) -> Self {
        let mut new = Self::default();
        new.triplets_basis.reserve(sz_basis);
        new.triplets_entries.reserve(sz_entries);
        new
    }

    pub fn entries(&self) -> &SpMat<A> { &self.entries }

    pub fn basis(&self) -> &SpMat<A> { &self.basis }

    pub fn num_basisvectors(&self) -> usize { self.basis.cols() }

    pub fn num_coordinates(&self) -> usize { self.basis.rows() }

    /// Queue an entry of the change-of-basis matrix.
    pub fn add_basis(&mut self, row: usize, col: usize, val: A) {
        self.triplets_basis.push(Triplet::new(row, col, val));
    }

    /// Queue an entry of the operator.
    pub fn add_entries(&mut self, row: usize, col: usize, val: A) {
        self.triplets_entries.push(Triplet::new(row, col, val));
    }

    /// Assemble all queued entries, replacing the current contents.
    pub fn compress(&mut self, n_basis: usize, n_coordinates: usize) {
        let entries = std::mem::take(&mut self.triplets_entries);
        let basis = std::mem::take(&mut self.triplets_basis);
        self.entries = SpMat::from_triplets(n_basis, n_basis, entries);
        self.basis = SpMat::from_triplets(n_coordinates, n_basis, basis);
    }

    /// Add `coeff * op` to the operator, where `op` is expressed in the same
    /// basis.
    pub fn add_scaled(&mut self, op: &SpMat<A>, coeff: A) {
        self.entries = self.entries.add_mat(&op.scaled(coeff));
    }

    /// Split the basis into groups of basis vectors that are not coupled to
    /// each other by any nonzero entry.
    pub fn find_subs(&self) -> Vec<Self> {
        let n = self.num_basisvectors();
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (r, c, _) in self.entries.iter() {
            if r != c {
                adjacency[r].push(c);
                adjacency[c].push(r);
            }
        }
        let mut visited: Vec<bool> = vec![false; n];
        let mut subs: Vec<Self> = Vec::new();
        for start in 0..n {
            if visited[start] { continue; }
            visited[start] = true;
            let mut component: Vec<usize> = vec![start];
            let mut queue: Vec<usize> = vec![start];
            while let Some(k) = queue.pop() {
                for &nb in adjacency[k].iter() {
                    if !visited[nb] {
                        visited[nb] = true;
                        component.push(nb);
                        queue.push(nb);
                    }
                }
            }
            component.sort_unstable();
            subs.push(self.get_block(&component));
        }
        subs
    }

    /// Replace every entry by its absolute value.
    pub fn abs(&self) -> Self {
        Self::new(
            self.entries.map(|v| A::from_real(v.abs())),
            self.basis.clone(),
        )
    }

    /// Re-express the operator in a different set of basis vectors over the
    /// same canonical coordinates.
    pub fn change_basis(&self, new_basis: &SpMat<A>) -> Self {
        let transformator = self.basis.adjoint().matmul(new_basis);
        let entries
            = transformator.adjoint()
            .matmul(&self.entries)
            .matmul(&transformator);
        Self::new(entries, new_basis.clone())
    }

    /// Drop off-diagonal entries with `|v| < threshold`; the diagonal is kept.
    pub fn apply_cutoff(&mut self, threshold: f64) {
        self.entries
            = self.entries.filter(|r, c, v| r == c || v.abs() >= threshold);
    }

    /// Drop all entries with `|v| < threshold`, including the diagonal.
    pub fn apply_cutoff_full(&mut self, threshold: f64) {
        self.entries = self.entries.filter(|_, _, v| v.abs() >= threshold);
    }

    /// Keep only basis vectors whose diagonal entry satisfies
    /// `|E| < cutoff`.
    pub fn apply_energy_cutoff(&mut self, cutoff: f64) {
        let keep: Vec<usize>
            = self.entries.diagonal().into_iter()
            .enumerate()
            .filter_map(|(k, e)| (e.abs() < cutoff).then_some(k))
            .collect();
        *self = self.get_block(&keep);
    }

    /// Mark every canonical coordinate whose total squared weight over all
    /// basis vectors exceeds `threshold`.
    pub fn find_unnecessary_states(&self, threshold: f64) -> Vec<bool> {
        self.basis.row_sqnorms().into_iter().map(|w| w > threshold).collect()
    }

    /// Drop basis vectors whose squared weight on the necessary coordinates is
    /// at most `threshold`.
    pub fn remove_unnecessary_basisvectors_masked(
        &mut self,
        necessary: &[bool],
        threshold: f64,
    ) {
        let masked = self.basis.filter(|r, _, _| necessary.get(r).copied().unwrap_or(false));
        let keep: Vec<usize>
            = masked.col_sqnorms().into_iter()
            .enumerate()
            .filter_map(|(k, w)| (w > threshold).then_some(k))
            .collect();
        *self = self.get_block(&keep);
    }

    /// Drop basis vectors whose squared norm is at most `threshold`.
    pub fn remove_unnecessary_basisvectors(&mut self, threshold: f64) {
        let keep: Vec<usize>
            = self.basis.col_sqnorms().into_iter()
            .enumerate()
            .filter_map(|(k, w)| (w > threshold).then_some(k))
            .collect();
        *self = self.get_block(&keep);
    }

    /// Zero the rows of the basis belonging to unnecessary coordinates.
    pub fn remove_unnecessary_states(&mut self, necessary: &[bool]) {
        self.basis
            = self.basis.filter(|r, _, _| necessary.get(r).copied().unwrap_or(false));
    }

    /// Restrict to the listed basis vectors, in the listed order.
    pub fn get_block(&self, indices: &[usize]) -> Self {
        Self::new(
            self.entries.submatrix(indices, indices),
            self.basis.select_columns(indices),
        )
    }

    /// Diagonalize the (Hermitian) operator and fold the eigenvectors into the
    /// basis.
    ///
    /// Afterwards `entries` holds the eigenvalues in ascending order.
    /// Eigenvector components with `|v| <= prune` are discarded.
    pub fn diagonalize(&mut self, prune: f64) -> Result<()> {
        if self.num_basisvectors() == 0 { return Ok(()); }
        let (evals, evecs) = self.entries.to_dense().eigh_into(UPLO::Lower)?;
        let evals: Vec<A> = evals.iter().map(|e| A::from_real(*e)).collect();
        let transformator = SpMat::from_dense(&evecs, prune);
        self.basis = self.basis.matmul(&transformator);
        self.entries = SpMat::from_diagonal(&evals);
        Ok(())
    }

    /// Eigenvalues after [`Self::diagonalize`], or the diagonal in general.
    pub fn diagonal_energies(&self) -> Vec<f64> {
        self.entries.diagonal().into_iter().map(|e| e.re()).collect()
    }

    fn check_same_basis(&self, other: &Self) -> Result<()> {
        if self.basis == other.basis {
            Ok(())
        } else {
            Err(config_err("operators are expressed in different bases"))
        }
    }

    /// Sum of two operators sharing a basis.
    pub fn try_add(&self, other: &Self) -> Result<Self> {
        self.check_same_basis(other)?;
        Ok(Self::new(self.entries.add_mat(&other.entries), self.basis.clone()))
    }

    /// Difference of two operators sharing a basis.
    pub fn try_sub(&self, other: &Self) -> Result<Self> {
        self.check_same_basis(other)?;
        Ok(Self::new(self.entries.sub_mat(&other.entries), self.basis.clone()))
    }

    /// Digest of the operator.
    pub fn hash_entries(&self) -> u64 { hash_spmat(&self.entries, ENTRIES_KEYS) }

    /// Digest of the change-of-basis matrix.
    pub fn hash_basis(&self) -> u64 { hash_spmat(&self.basis, BASIS_KEYS) }

    /// Encode `self` as a versioned binary record.
    ///
    /// Layout (little endian): version `u8`, flags `u8`, number of coordinates
    /// `u64`, number of basis vectors `u64`, the basis block, the entries
    /// block, then the entries and basis digests as `u64`s. Each block holds
    /// the entry count, the column pointers, the row indices, the real parts,
    /// and, for complex records, the imaginary parts.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf: Vec<u8> = Vec::new();
        let flags: u8 = if A::COMPLEX { COMPLEX_NOT_REAL } else { 0 };
        buf.push(FORMAT_VERSION);
        buf.push(flags);
        put_u64(&mut buf, self.num_coordinates() as u64);
        put_u64(&mut buf, self.num_basisvectors() as u64);
        write_block(&mut buf, &self.basis);
        write_block(&mut buf, &self.entries);
        put_u64(&mut buf, self.hash_entries());
        put_u64(&mut buf, self.hash_basis());
        buf
    }

    /// Decode a record produced by [`Self::serialize`].
    ///
    /// Records with compressed-row blocks are accepted and converted. A
    /// complex record cannot be decoded into a real container.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut rd: &[u8] = bytes;
        let version = rd.read_u8().map_err(truncated)?;
        if version != FORMAT_VERSION {
            return Err(Error::Decode(format!("unsupported record version {}", version)));
        }
        let flags = rd.read_u8().map_err(truncated)?;
        let complex = flags & COMPLEX_NOT_REAL != 0;
        let csr = flags & CSR_NOT_CSC != 0;
        if complex && !A::COMPLEX {
            return Err(Error::Decode("complex record for a real container".into()));
        }
        let n_coords = read_len(&mut rd)?;
        let n_basis = read_len(&mut rd)?;
        let basis: SpMat<A> = read_block(&mut rd, n_coords, n_basis, csr, complex)?;
        let entries: SpMat<A> = read_block(&mut rd, n_basis, n_basis, csr, complex)?;
        let hash_entries = rd.read_u64::<LittleEndian>().map_err(truncated)?;
        let hash_basis = rd.read_u64::<LittleEndian>().map_err(truncated)?;
        if !rd.is_empty() {
            return Err(Error::Decode(format!("{} trailing bytes", rd.len())));
        }
        let new = Self::try_new(entries, basis)?;
        if new.hash_entries() != hash_entries || new.hash_basis() != hash_basis {
            return Err(Error::Decode("content hash mismatch".into()));
        }
        Ok(new)
    }

    /// Write the [serialized][Self::serialize] record to a file.
    pub fn save<P>(&self, path: P) -> Result<()>
    where P: AsRef<Path>
    {
        fs::write(path, self.serialize())?;
        Ok(())
    }

    /// Read a record written by [`Self::save`].
    pub fn load<P>(path: P) -> Result<Self>
    where P: AsRef<Path>
    {
        let bytes = fs::read(path)?;
        Self::deserialize(&bytes)
    }
}

fn hash_spmat<A>(m: &SpMat<A>, keys: (u64, u64)) -> u64
where A: Element
{
    let mut hasher = SipHasher13::new_with_keys(keys.0, keys.1);
    hasher.write_u64(m.rows() as u64);
    hasher.write_u64(m.cols() as u64);
    m.colptr().iter().for_each(|p| hasher.write_u64(*p as u64));
    m.rowind().iter().for_each(|r| hasher.write_u64(*r as u64));
    m.values().iter()
        .for_each(|v| {
            let (re, im) = v.parts();
            hasher.write_u64(re.to_bits());
            hasher.write_u64(im.to_bits());
        });
    hasher.finish()
}

fn truncated(err: std::io::Error) -> Error {
    Error::Decode(format!("truncated record: {}", err))
}

fn put_u64(buf: &mut Vec<u8>, x: u64) {
    let mut b = [0_u8; 8];
    LittleEndian::write_u64(&mut b, x);
    buf.extend_from_slice(&b);
}

fn put_f64(buf: &mut Vec<u8>, x: f64) {
    let mut b = [0_u8; 8];
    LittleEndian::write_f64(&mut b, x);
    buf.extend_from_slice(&b);
}

fn write_block<A>(buf: &mut Vec<u8>, m: &SpMat<A>)
where A: Element
{
    put_u64(buf, m.nnz() as u64);
    m.colptr().iter().for_each(|p| put_u64(buf, *p as u64));
    m.rowind().iter().for_each(|r| put_u64(buf, *r as u64));
    m.values().iter().for_each(|v| put_f64(buf, v.parts().0));
    if A::COMPLEX {
        m.values().iter().for_each(|v| put_f64(buf, v.parts().1));
    }
}

fn read_len<R>(rd: &mut R) -> Result<usize>
where R: Read
{
    let x = rd.read_u64::<LittleEndian>().map_err(truncated)?;
    usize::try_from(x).map_err(|_| Error::Decode(format!("length {} out of range", x)))
}

fn read_block<A, R>(
    rd: &mut R,
    rows: usize,
    cols: usize,
    csr: bool,
    complex: bool,
) -> Result<SpMat<A>>
where
    A: Element,
    R: Read,
{
    let nnz = read_len(rd)?;
    // a compressed-row block is the compressed-column block of the transpose
    let (outer, inner) = if csr { (rows, cols) } else { (cols, rows) };
    let ptr: Vec<usize> = (0..=outer).map(|_| read_len(rd)).collect::<Result<_>>()?;
    let ind: Vec<usize> = (0..nnz).map(|_| read_len(rd)).collect::<Result<_>>()?;
    let re: Vec<f64>
        = (0..nnz).map(|_| rd.read_f64::<LittleEndian>())
        .collect::<std::io::Result<_>>()
        .map_err(truncated)?;
    let im: Vec<f64>
        = if complex {
            (0..nnz).map(|_| rd.read_f64::<LittleEndian>())
                .collect::<std::io::Result<_>>()
                .map_err(truncated)?
        } else {
            vec![0.0; nnz]
        };
    let values: Vec<A>
        = re.into_iter().zip(im)
        .map(|(re, im)| {
            A::from_parts(re, im, 0.0)
                .ok_or_else(|| Error::Decode("imaginary part in real record".into()))
        })
        .collect::<Result<_>>()?;
    let m = SpMat::from_csc_parts(inner, outer, ptr, ind, values)?;
    Ok(if csr { m.transpose() } else { m })
}

/// Tensor product of two operators, keeping only product basis vectors whose
/// summed diagonal energy lies in `[energy_min, energy_max]`.
///
/// Canonical coordinate `(r1, r2)` of the product is numbered
/// `r1 * rhs.num_coordinates() + r2`.
pub fn combine<A>(
    lhs: &Hamiltonianmatrix<A>,
    rhs: &Hamiltonianmatrix<A>,
    energy_min: f64,
    energy_max: f64,
) -> Hamiltonianmatrix<A>
where A: Element
{
    let pairs = kept_pairs(lhs, rhs, energy_min, energy_max);
    let index: HashMap<(usize, usize), usize>
        = pairs.iter().enumerate().map(|(k, p)| (*p, k)).collect();
    let mut triplets: Vec<Triplet<A>> = Vec::new();
    for (k, &(c1, c2)) in pairs.iter().enumerate() {
        for (r1, v) in lhs.entries.col(c1) {
            if let Some(&i) = index.get(&(r1, c2)) {
                triplets.push(Triplet::new(i, k, v));
            }
        }
        for (r2, v) in rhs.entries.col(c2) {
            if let Some(&i) = index.get(&(c1, r2)) {
                triplets.push(Triplet::new(i, k, v));
            }
        }
    }
    let entries = SpMat::from_triplets(pairs.len(), pairs.len(), triplets);
    let basis = lhs.basis.kron_columns(&rhs.basis, &pairs);
    Hamiltonianmatrix::new(entries, basis)
}

/// [`combine`] with the energy window `[target - delta_e, target + delta_e]`.
pub fn combine_around<A>(
    lhs: &Hamiltonianmatrix<A>,
    rhs: &Hamiltonianmatrix<A>,
    target: f64,
    delta_e: f64,
) -> Hamiltonianmatrix<A>
where A: Element
{
    combine(lhs, rhs, target - delta_e, target + delta_e)
}

/// Mark the product coordinates touched by any product basis vector that
/// [`combine`] would keep.
pub fn energycutoff<A>(
    lhs: &Hamiltonianmatrix<A>,
    rhs: &Hamiltonianmatrix<A>,
    energy_min: f64,
    energy_max: f64,
) -> Vec<bool>
where A: Element
{
    let n2 = rhs.num_coordinates();
    let mut necessary: Vec<bool> = vec![false; lhs.num_coordinates() * n2];
    for (c1, c2) in kept_pairs(lhs, rhs, energy_min, energy_max) {
        for (r1, _) in lhs.basis.col(c1) {
            for (r2, _) in rhs.basis.col(c2) {
                necessary[r1 * n2 + r2] = true;
            }
        }
    }
    necessary
}

fn kept_pairs<A>(
    lhs: &Hamiltonianmatrix<A>,
    rhs: &Hamiltonianmatrix<A>,
    energy_min: f64,
    energy_max: f64,
) -> Vec<(usize, usize)>
where A: Element
{
    let e1 = lhs.diagonal_energies();
    let e2 = rhs.diagonal_energies();
    let mut pairs: Vec<(usize, usize)> = Vec::new();
    for (a, ea) in e1.iter().enumerate() {
        for (b, eb) in e2.iter().enumerate() {
            let e = ea + eb;
            if e >= energy_min && e <= energy_max { pairs.push((a, b)); }
        }
    }
    pairs
}

/// *Panics* if the operands are expressed in different bases; see
/// [`Hamiltonianmatrix::try_add`].
impl<'a, A> Add<&'a Hamiltonianmatrix<A>> for Hamiltonianmatrix<A>
where A: Element
{
    type Output = Hamiltonianmatrix<A>;

    fn add(self, rhs: &'a Hamiltonianmatrix<A>) -> Self::Output {
        match self.try_add(rhs) {
            Ok(sum) => sum,
            Err(err) => panic!("Hamiltonianmatrix::add: {}", err),
        }
    }
}

/// *Panics* if the operands are expressed in different bases; see
/// [`Hamiltonianmatrix::try_sub`].
impl<'a, A> Sub<&'a Hamiltonianmatrix<A>> for Hamiltonianmatrix<A>
where A: Element
{
    type Output = Hamiltonianmatrix<A>;

    fn sub(self, rhs: &'a Hamiltonianmatrix<A>) -> Self::Output {
        match self.try_sub(rhs) {
            Ok(diff) => diff,
            Err(err) => panic!("Hamiltonianmatrix::sub: {}", err),
        }
    }
}

/// *Panics* like [`Add`]; see [`Hamiltonianmatrix::try_add`].
impl<'a, A> AddAssign<&'a Hamiltonianmatrix<A>> for Hamiltonianmatrix<A>
where A: Element
{
    fn add_assign(&mut self, rhs: &'a Hamiltonianmatrix<A>) {
        let sum = self.clone() + rhs;
        *self = sum;
    }
}

/// *Panics* like [`Sub`]; see [`Hamiltonianmatrix::try_sub`].
impl<'a, A> SubAssign<&'a Hamiltonianmatrix<A>> for Hamiltonianmatrix<A>
where A: Element
{
    fn sub_assign(&mut self, rhs: &'a Hamiltonianmatrix<A>) {
        let diff = self.clone() - rhs;
        *self = diff;
    }
}

impl<A> Mul<A> for Hamiltonianmatrix<A>
where A: Element
{
    type Output = Hamiltonianmatrix<A>;

    fn mul(self, rhs: A) -> Self::Output {
        Self::new(self.entries.scaled(rhs), self.basis)
    }
}
