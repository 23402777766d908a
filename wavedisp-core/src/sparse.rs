//! Sparse matrix operations.
//!
//! Real system blocks are stored in CSR format; the Bloch system matrix is a
//! complex CSR matrix with the union sparsity pattern of K, S and R.

use nalgebra::DVector;
use nalgebra_sparse::coo::CooMatrix;
use nalgebra_sparse::csr::CsrMatrix as NalgebraCsr;

use crate::error::{Error, Result};
use crate::types::Complex64;

/// Real compressed sparse row matrix.
pub type CsrMatrix = NalgebraCsr<f64>;

/// Complex compressed sparse row matrix.
pub type ComplexCsr = NalgebraCsr<Complex64>;

/// Builder for assembling a sparse matrix from triplets (COO format).
///
/// Accumulates (row, col, value) triplets and converts to CSR when complete.
pub struct TripletMatrix {
    n_rows: usize,
    n_cols: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
}

impl TripletMatrix {
    /// Create a new triplet matrix builder.
    pub fn new(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            rows: Vec::new(),
            cols: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Add a value at (row, col). Duplicates are summed during conversion,
    /// exact zeros are not stored.
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        if value != 0.0 {
            self.rows.push(row);
            self.cols.push(col);
            self.values.push(value);
        }
    }

    /// Add `value` at (row, col) and `sign * value` at (col, row).
    pub fn add_pair(&mut self, row: usize, col: usize, value: f64, sign: f64) {
        self.add(row, col, value);
        self.add(col, row, sign * value);
    }

    /// Number of stored triplets.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Convert to CSR format, summing duplicate entries.
    pub fn to_csr(self) -> Result<CsrMatrix> {
        let coo = CooMatrix::try_from_triplets(
            self.n_rows,
            self.n_cols,
            self.rows,
            self.cols,
            self.values,
        )
        .map_err(|e| Error::DimensionMismatch(format!("invalid triplet data: {e}")))?;

        Ok(CsrMatrix::from(&coo))
    }
}

/// Build a real diagonal CSR matrix.
pub fn diagonal(values: &[f64]) -> CsrMatrix {
    let n = values.len();
    let mut coo = CooMatrix::new(n, n);
    for (i, &v) in values.iter().enumerate() {
        coo.push(i, i, v);
    }
    CsrMatrix::from(&coo)
}

/// Maximum absolute entry of `X - sign * X^T`.
///
/// `sign = 1.0` measures asymmetry, `sign = -1.0` measures deviation from
/// antisymmetry. A matrix without stored entries yields exactly 0.0.
pub fn max_transpose_deviation(matrix: &CsrMatrix, sign: f64) -> f64 {
    if matrix.nrows() != matrix.ncols() {
        return f64::INFINITY;
    }
    let mut coo = CooMatrix::new(matrix.nrows(), matrix.ncols());
    for (i, j, &v) in matrix.triplet_iter() {
        coo.push(i, j, v);
        coo.push(j, i, -sign * v);
    }
    let diff = CsrMatrix::from(&coo);
    diff.values().iter().fold(0.0, |acc, v| acc.max(v.abs()))
}

/// Maximum absolute entry of `A - A^H`.
pub fn max_hermitian_deviation(matrix: &ComplexCsr) -> f64 {
    if matrix.nrows() != matrix.ncols() {
        return f64::INFINITY;
    }
    let mut coo = CooMatrix::new(matrix.nrows(), matrix.ncols());
    for (i, j, &v) in matrix.triplet_iter() {
        coo.push(i, j, v);
        coo.push(j, i, -v.conj());
    }
    let diff = ComplexCsr::from(&coo);
    diff.values().iter().fold(0.0, |acc, v| acc.max(v.norm()))
}

/// Largest absolute stored entry (0.0 for an empty matrix).
pub fn max_abs_entry(matrix: &CsrMatrix) -> f64 {
    matrix.values().iter().fold(0.0, |acc, v| acc.max(v.abs()))
}

/// Real sparse matrix times complex vector.
#[inline]
pub fn spmv_real(a: &CsrMatrix, x: &DVector<Complex64>) -> DVector<Complex64> {
    let mut y = DVector::zeros(a.nrows());
    for (i, row) in a.row_iter().enumerate() {
        let mut acc = Complex64::new(0.0, 0.0);
        for (&col, &val) in row.col_indices().iter().zip(row.values().iter()) {
            acc += x[col] * val;
        }
        y[i] = acc;
    }
    y
}

/// `A - sigma * B` on the union sparsity pattern of both matrices.
///
/// Entries that cancel stay stored, so the pattern does not depend on the
/// shift.
pub fn shifted(a: &ComplexCsr, b: &CsrMatrix, sigma: f64) -> ComplexCsr {
    let mut coo = CooMatrix::new(a.nrows(), a.ncols());
    for (i, j, &v) in a.triplet_iter() {
        coo.push(i, j, v);
    }
    for (i, j, &v) in b.triplet_iter() {
        coo.push(i, j, Complex64::new(-sigma * v, 0.0));
    }
    ComplexCsr::from(&coo)
}

/// Maximum absolute row sum (infinity norm) of a complex matrix.
pub fn max_row_sum(matrix: &ComplexCsr) -> f64 {
    matrix
        .row_iter()
        .map(|row| row.values().iter().map(|v| v.norm()).sum::<f64>())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    #[test]
    fn test_triplet_to_csr() {
        let mut triplet = TripletMatrix::new(3, 3);
        triplet.add(0, 0, 1.0);
        triplet.add(1, 1, 2.0);
        triplet.add(2, 2, 3.0);
        triplet.add_pair(0, 1, 0.5, 1.0);

        assert_eq!(triplet.nnz(), 5);
        let csr = triplet.to_csr().unwrap();
        assert_eq!(csr.nrows(), 3);
        assert_eq!(csr.ncols(), 3);
        assert_eq!(csr.nnz(), 5);
    }

    #[test]
    fn test_duplicate_summation() {
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 0, 1.0);
        triplet.add(0, 0, 2.0);
        triplet.add(0, 0, 3.0);

        let dense = DMatrix::from(&triplet.to_csr().unwrap());
        assert_relative_eq!(dense[(0, 0)], 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_out_of_bounds_triplet_is_rejected() {
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(5, 0, 1.0);
        assert!(matches!(triplet.to_csr(), Err(Error::DimensionMismatch(_))));
    }

    #[test]
    fn test_transpose_deviation() {
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 1, 2.0);
        triplet.add(1, 0, 1.5);
        let m = triplet.to_csr().unwrap();

        assert_relative_eq!(max_transpose_deviation(&m, 1.0), 0.5, epsilon = 1e-15);
        assert_relative_eq!(max_transpose_deviation(&m, -1.0), 3.5, epsilon = 1e-15);
    }

    #[test]
    fn test_empty_matrix_deviation_is_zero() {
        let m = TripletMatrix::new(4, 4).to_csr().unwrap();
        assert_eq!(max_transpose_deviation(&m, 1.0), 0.0);
        assert_eq!(max_abs_entry(&m), 0.0);
    }

    #[test]
    fn test_hermitian_deviation() {
        let mut coo = CooMatrix::new(2, 2);
        coo.push(0, 1, Complex64::new(0.0, 1.0));
        coo.push(1, 0, Complex64::new(0.0, -1.0));
        let a = ComplexCsr::from(&coo);
        assert_eq!(max_hermitian_deviation(&a), 0.0);

        let mut coo = CooMatrix::new(2, 2);
        coo.push(0, 1, Complex64::new(0.0, 1.0));
        coo.push(1, 0, Complex64::new(0.0, 1.0));
        let a = ComplexCsr::from(&coo);
        assert_relative_eq!(max_hermitian_deviation(&a), 2.0, epsilon = 1e-15);
    }

    #[test]
    fn test_spmv_real_times_complex() {
        let m = diagonal(&[2.0, 3.0]);
        let x = DVector::from_vec(vec![Complex64::new(1.0, 1.0), Complex64::new(0.0, -1.0)]);
        let y = spmv_real(&m, &x);
        assert_eq!(y[0], Complex64::new(2.0, 2.0));
        assert_eq!(y[1], Complex64::new(0.0, -3.0));
    }

    #[test]
    fn test_shifted_keeps_union_pattern() {
        let mut coo = CooMatrix::new(2, 2);
        coo.push(0, 0, Complex64::new(4.0, 0.0));
        coo.push(0, 1, Complex64::new(0.0, 1.0));
        coo.push(1, 0, Complex64::new(0.0, -1.0));
        let a = ComplexCsr::from(&coo);
        let b = diagonal(&[4.0, 2.0]);

        let shifted = shifted(&a, &b, 1.0);
        // (0, 0) cancels to zero but stays stored
        assert_eq!(shifted.nnz(), 4);
        let dense = DMatrix::from(&shifted);
        assert_eq!(dense[(0, 0)], Complex64::new(0.0, 0.0));
        assert_eq!(dense[(1, 1)], Complex64::new(-2.0, 0.0));
        assert_eq!(dense[(0, 1)], Complex64::new(0.0, 1.0));
        assert_relative_eq!(max_row_sum(&shifted), 3.0, epsilon = 1e-15);
    }
}
