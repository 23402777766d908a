//! Bloch system matrix assembly.
//!
//! For a wave-number magnitude κ the dispersion problem of the periodic cell
//! reads `A(κ) v = λ M v` with
//!
//! ```text
//! A(κ) = K + κ² S + i κ R
//! ```
//!
//! where K is the stiffness, S the second-order wave term and R the
//! antisymmetric first-order coupling. With K, S symmetric and R
//! antisymmetric, A(κ) is Hermitian for every real κ.
//!
//! Assembly is a pure function: the base matrices are only borrowed and a
//! fresh complex matrix is produced on every call, so steps of a sweep can be
//! assembled concurrently from the same [`SystemMatrices`].

use nalgebra_sparse::coo::CooMatrix;

use crate::error::{Error, Result};
use crate::sparse::{ComplexCsr, CsrMatrix};
use crate::types::{Complex64, I};

/// The four reduced matrices of the periodic cell, validated to share one
/// DOF numbering of size `n`.
#[derive(Debug, Clone)]
pub struct SystemMatrices {
    k: CsrMatrix,
    m: CsrMatrix,
    s: CsrMatrix,
    r: CsrMatrix,
}

impl SystemMatrices {
    /// Bundle stiffness `k`, mass `m`, wave term `s` and coupling `r`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] unless all four are square with
    /// the same size.
    pub fn new(k: CsrMatrix, m: CsrMatrix, s: CsrMatrix, r: CsrMatrix) -> Result<Self> {
        let n = k.nrows();
        for (name, mtx) in [("K", &k), ("M", &m), ("S", &s), ("R", &r)] {
            if mtx.nrows() != n || mtx.ncols() != n {
                return Err(Error::DimensionMismatch(format!(
                    "{} is {}x{}, expected {}x{}",
                    name,
                    mtx.nrows(),
                    mtx.ncols(),
                    n,
                    n
                )));
            }
        }
        Ok(Self { k, m, s, r })
    }

    /// Reduced DOF count.
    pub fn dim(&self) -> usize {
        self.k.nrows()
    }

    /// Stiffness matrix K.
    pub fn k(&self) -> &CsrMatrix {
        &self.k
    }

    /// Mass matrix M.
    pub fn m(&self) -> &CsrMatrix {
        &self.m
    }

    /// Second-order wave matrix S.
    pub fn s(&self) -> &CsrMatrix {
        &self.s
    }

    /// Antisymmetric first-order coupling R.
    pub fn r(&self) -> &CsrMatrix {
        &self.r
    }

    /// Assemble `(A(κ), M)`; see [`assemble_system`].
    pub fn assemble(&self, kappa: f64) -> Result<(ComplexCsr, &CsrMatrix)> {
        assemble(self, kappa)
    }
}

/// Assemble the Bloch pencil `(A(κ), B)` for validated matrices.
///
/// `B` is the mass matrix, returned by reference and never modified.
pub fn assemble(matrices: &SystemMatrices, kappa: f64) -> Result<(ComplexCsr, &CsrMatrix)> {
    let a = bloch_matrix(&matrices.k, &matrices.s, &matrices.r, kappa)?;
    Ok((a, &matrices.m))
}

/// Assemble `(A(κ), B)` directly from the four blocks.
///
/// # Errors
///
/// Returns [`Error::DimensionMismatch`] if the blocks disagree in size and
/// [`Error::InvalidConfig`] for a negative or non-finite κ.
pub fn assemble_system<'a>(
    k: &CsrMatrix,
    m: &'a CsrMatrix,
    s: &CsrMatrix,
    r: &CsrMatrix,
    kappa: f64,
) -> Result<(ComplexCsr, &'a CsrMatrix)> {
    let n = k.nrows();
    if m.nrows() != n || m.ncols() != n {
        return Err(Error::DimensionMismatch(format!(
            "M is {}x{}, K is {}x{}",
            m.nrows(),
            m.ncols(),
            n,
            k.ncols()
        )));
    }
    let a = bloch_matrix(k, s, r, kappa)?;
    Ok((a, m))
}

fn bloch_matrix(k: &CsrMatrix, s: &CsrMatrix, r: &CsrMatrix, kappa: f64) -> Result<ComplexCsr> {
    if !kappa.is_finite() || kappa < 0.0 {
        return Err(Error::InvalidConfig(format!(
            "wave magnitude must be finite and non-negative, got {kappa}"
        )));
    }
    let n = k.nrows();
    for (name, mtx) in [("K", k), ("S", s), ("R", r)] {
        if mtx.nrows() != n || mtx.ncols() != n {
            return Err(Error::DimensionMismatch(format!(
                "{} is {}x{}, expected {}x{}",
                name,
                mtx.nrows(),
                mtx.ncols(),
                n,
                n
            )));
        }
    }

    let mut coo = CooMatrix::new(n, n);
    for (i, j, &v) in k.triplet_iter() {
        coo.push(i, j, Complex64::new(v, 0.0));
    }

    // κ = 0 must reproduce K exactly, so the wave terms are skipped instead
    // of being added as explicit zeros.
    if kappa != 0.0 {
        let kappa2 = kappa * kappa;
        for (i, j, &v) in s.triplet_iter() {
            coo.push(i, j, Complex64::new(kappa2 * v, 0.0));
        }
        let coupling = I * kappa;
        for (i, j, &v) in r.triplet_iter() {
            coo.push(i, j, coupling * v);
        }
    }

    Ok(ComplexCsr::from(&coo))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::{diagonal, max_hermitian_deviation, TripletMatrix};
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    fn rotation() -> CsrMatrix {
        let mut r = TripletMatrix::new(2, 2);
        r.add(0, 1, 1.0);
        r.add(1, 0, -1.0);
        r.to_csr().unwrap()
    }

    fn banded_system(n: usize) -> SystemMatrices {
        let mut k = TripletMatrix::new(n, n);
        let mut s = TripletMatrix::new(n, n);
        let mut r = TripletMatrix::new(n, n);
        for i in 0..n {
            k.add(i, i, 4.0 + i as f64);
            s.add(i, i, 1.0 + 0.1 * i as f64);
        }
        for i in 0..n - 1 {
            k.add_pair(i, i + 1, -1.0, 1.0);
            s.add_pair(i, i + 1, 0.25, 1.0);
            r.add_pair(i, i + 1, 0.5 + i as f64, -1.0);
        }
        let m = diagonal(&vec![2.0; n]);
        SystemMatrices::new(
            k.to_csr().unwrap(),
            m,
            s.to_csr().unwrap(),
            r.to_csr().unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_identity_example() {
        let eye = diagonal(&[1.0, 1.0]);
        let system =
            SystemMatrices::new(eye.clone(), eye.clone(), eye.clone(), rotation()).unwrap();

        let (a, b) = system.assemble(1.0).unwrap();
        let dense = DMatrix::from(&a);
        assert_eq!(dense[(0, 0)], Complex64::new(2.0, 0.0));
        assert_eq!(dense[(1, 1)], Complex64::new(2.0, 0.0));
        assert_eq!(dense[(0, 1)], Complex64::new(0.0, 1.0));
        assert_eq!(dense[(1, 0)], Complex64::new(0.0, -1.0));
        assert_eq!(b.nnz(), 2);
    }

    #[test]
    fn test_zero_wave_number_reproduces_stiffness() {
        let system = banded_system(6);
        let (a, _) = system.assemble(0.0).unwrap();

        assert_eq!(a.nnz(), system.k().nnz());
        for ((i, j, av), (ki, kj, kv)) in a.triplet_iter().zip(system.k().triplet_iter()) {
            assert_eq!((i, j), (ki, kj));
            assert_eq!(*av, Complex64::new(*kv, 0.0));
        }
    }

    #[test]
    fn test_assembled_matrix_is_hermitian() {
        let system = banded_system(8);
        for kappa in [0.0, 0.3, 1.0, 17.5, 250.0] {
            let (a, _) = system.assemble(kappa).unwrap();
            let scale = kappa * kappa + kappa + 1.0;
            assert!(max_hermitian_deviation(&a) <= 1e-14 * scale);
        }
    }

    #[test]
    fn test_assembly_is_repeatable() {
        let system = banded_system(5);
        let (a1, b1) = system.assemble(3.7).unwrap();
        let (a2, b2) = system.assemble(3.7).unwrap();

        assert_eq!(a1.row_offsets(), a2.row_offsets());
        assert_eq!(a1.col_indices(), a2.col_indices());
        for (x, y) in a1.values().iter().zip(a2.values()) {
            assert_eq!(x.re.to_bits(), y.re.to_bits());
            assert_eq!(x.im.to_bits(), y.im.to_bits());
        }
        assert_eq!(b1.values(), b2.values());
    }

    #[test]
    fn test_base_matrices_untouched() {
        let system = banded_system(4);
        let k_before = system.k().values().to_vec();
        let r_before = system.r().values().to_vec();
        let _ = system.assemble(12.0).unwrap();
        assert_eq!(system.k().values(), &k_before[..]);
        assert_eq!(system.r().values(), &r_before[..]);
    }

    #[test]
    fn test_wave_terms_scale_with_kappa() {
        let system = banded_system(3);
        let kappa = 2.0;
        let (a, _) = system.assemble(kappa).unwrap();
        let dense = DMatrix::from(&a);
        // K[0,1] = -1, S[0,1] = 0.25, R[0,1] = 0.5
        assert_relative_eq!(dense[(0, 1)].re, -1.0 + 4.0 * 0.25, epsilon = 1e-14);
        assert_relative_eq!(dense[(0, 1)].im, 2.0 * 0.5, epsilon = 1e-14);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let eye2 = diagonal(&[1.0, 1.0]);
        let eye3 = diagonal(&[1.0, 1.0, 1.0]);
        let err = SystemMatrices::new(eye2.clone(), eye3.clone(), eye2.clone(), eye2.clone());
        assert!(matches!(err, Err(Error::DimensionMismatch(_))));

        let err = assemble_system(&eye2, &eye2, &eye3, &eye2, 1.0);
        assert!(matches!(err, Err(Error::DimensionMismatch(_))));
    }

    #[test]
    fn test_negative_wave_number_rejected() {
        let system = banded_system(3);
        assert!(matches!(system.assemble(-1.0), Err(Error::InvalidConfig(_))));
    }
}
