//! Generalized Hermitian eigensolvers for the Bloch pencil `A v = λ M v`.
//!
//! # Solver Backends
//!
//! - [`ShiftInvertLanczos`]: Lanczos iteration on `(A - σM)⁻¹ M` in the
//!   M-inner product. The operator is self-adjoint in that inner product, so
//!   the projected matrix is real symmetric tridiagonal and every Ritz value
//!   is real. The eigenvalues nearest the shift σ converge first.
//! - [`DenseHermitianSolver`]: reduces the pencil with the Cholesky factor of
//!   M to a dense Hermitian standard problem. Exact up to round-off, used for
//!   small systems and as a reference.
//!
//! Both backends verify up front that M is positive definite with a sparse
//! Cholesky factorization (faer), and both return eigenvalues in ascending
//! order with M-normalized eigenvectors (`vᴴ M v = 1`).

use std::cmp::Ordering;
use std::time::{Duration, Instant};

use faer::linalg::cholesky::llt::factor::LltError;
use faer::prelude::*;
use faer::sparse::linalg::solvers::{Llt, Lu, SymbolicLlt, SymbolicLu};
use faer::sparse::linalg::{LltError as SparseLltError, LuError};
use faer::sparse::{SparseColMat, SymbolicSparseColMat};
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use nalgebra_sparse::csr::CsrMatrix as NalgebraCsr;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::sparse::{max_row_sum, shifted, spmv_real, ComplexCsr, CsrMatrix};
use crate::types::Complex64;

/// Reciprocal condition estimate of `A - σM` below which it counts as
/// singular.
const SINGULAR_RCOND: f64 = 1e-13;

/// Relative norm of the orthogonalized Lanczos vector that signals an
/// invariant subspace.
const BREAKDOWN_TOL: f64 = 1e-10;

/// Start vectors tried per restart before the Krylov space counts as
/// exhausted.
const RESTART_ATTEMPTS: usize = 8;

/// Generalized eigensolver interface.
pub trait EigenSolver: Send + Sync {
    /// Compute the `n_eigs` eigenpairs of `a v = λ b v` nearest the shift.
    ///
    /// # Arguments
    ///
    /// * `a` - Hermitian system matrix A(κ)
    /// * `b` - Symmetric positive definite mass matrix
    /// * `n_eigs` - Number of eigenpairs requested
    /// * `want_vectors` - Whether to form eigenvectors
    ///
    /// # Returns
    ///
    /// Eigenvalues in ascending order with aligned eigenvector columns.
    fn solve(
        &self,
        a: &ComplexCsr,
        b: &CsrMatrix,
        n_eigs: usize,
        want_vectors: bool,
    ) -> Result<Eigensolution>;

    /// Solver name for diagnostics.
    fn name(&self) -> &str;
}

/// Result of one generalized eigensolve.
#[derive(Debug, Clone)]
pub struct Eigensolution {
    /// Eigenvalues, ascending.
    pub eigenvalues: Vec<f64>,
    /// `n x n_eigs` eigenvectors, column `i` belongs to `eigenvalues[i]`.
    pub eigenvectors: Option<DMatrix<Complex64>>,
    /// Operator applications (0 for the dense backend).
    pub iterations: usize,
}

impl Eigensolution {
    fn empty(n: usize, want_vectors: bool) -> Self {
        Self {
            eigenvalues: Vec::new(),
            eigenvectors: want_vectors.then(|| DMatrix::zeros(n, 0)),
            iterations: 0,
        }
    }
}

/// Eigensolver backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolverKind {
    /// Dense Cholesky reduction plus Hermitian eigendecomposition.
    Dense,
    /// Shift-invert Lanczos.
    ShiftInvert,
    /// Dense below `auto_threshold` DOFs, shift-invert above.
    #[default]
    Auto,
}

/// Eigensolver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EigenSolverConfig {
    /// Backend to use.
    pub kind: SolverKind,
    /// Shift σ; eigenvalues nearest to it are returned.
    pub shift: f64,
    /// Relative Ritz residual tolerance.
    pub tolerance: f64,
    /// Maximum operator applications per solve.
    pub max_iterations: usize,
    /// Optional wall-clock limit per solve, in seconds.
    pub timeout_secs: Option<f64>,
    /// Problem size threshold for auto-selection (dense below).
    pub auto_threshold: usize,
}

impl Default for EigenSolverConfig {
    fn default() -> Self {
        Self {
            kind: SolverKind::Auto,
            shift: 0.0,
            tolerance: 1e-5,
            max_iterations: 1000,
            timeout_secs: None,
            auto_threshold: 500,
        }
    }
}

impl EigenSolverConfig {
    /// Check numeric settings.
    pub fn validate(&self) -> Result<()> {
        if !self.shift.is_finite() {
            return Err(Error::InvalidConfig("eigensolver shift must be finite".into()));
        }
        if !(self.tolerance > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "eigensolver tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfig(
                "eigensolver max_iterations must be positive".into(),
            ));
        }
        if let Some(t) = self.timeout_secs {
            if !(t > 0.0) || !t.is_finite() {
                return Err(Error::InvalidConfig(format!(
                    "eigensolver timeout must be a positive number of seconds, got {t}"
                )));
            }
        }
        Ok(())
    }
}

/// Select a solver based on configuration and problem size.
pub fn select_solver(config: &EigenSolverConfig, n_dofs: usize) -> Box<dyn EigenSolver> {
    match config.kind {
        SolverKind::Dense => Box::new(DenseHermitianSolver::new(config.shift)),
        SolverKind::ShiftInvert => Box::new(ShiftInvertLanczos::from_config(config)),
        SolverKind::Auto => {
            if n_dofs < config.auto_threshold {
                Box::new(DenseHermitianSolver::new(config.shift))
            } else {
                Box::new(ShiftInvertLanczos::from_config(config))
            }
        }
    }
}

/// Dense generalized Hermitian solver.
///
/// With `M = L Lᵀ`, solves `C z = λ z` for `C = L⁻¹ A L⁻ᴴ` and maps back
/// with `v = L⁻ᴴ z`. Cost is cubic in `n`.
pub struct DenseHermitianSolver {
    shift: f64,
}

impl DenseHermitianSolver {
    /// Create a dense solver selecting eigenvalues nearest `shift`.
    pub fn new(shift: f64) -> Self {
        Self { shift }
    }
}

impl Default for DenseHermitianSolver {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl EigenSolver for DenseHermitianSolver {
    fn solve(
        &self,
        a: &ComplexCsr,
        b: &CsrMatrix,
        n_eigs: usize,
        want_vectors: bool,
    ) -> Result<Eigensolution> {
        let n = validate_pencil(a, b, n_eigs)?;
        if n_eigs == 0 {
            return Ok(Eigensolution::empty(n, want_vectors));
        }
        check_positive_definite(b)?;

        let chol = DMatrix::from(b)
            .cholesky()
            .ok_or_else(|| Error::SingularMatrix("mass matrix is not positive definite".into()))?;
        let l = chol.l().map(|x| Complex64::new(x, 0.0));

        let a_dense = DMatrix::from(a);
        let y = l
            .solve_lower_triangular(&a_dense)
            .ok_or_else(|| Error::SingularMatrix("Cholesky factor of M is singular".into()))?;
        let c = l
            .solve_lower_triangular(&y.adjoint())
            .ok_or_else(|| Error::SingularMatrix("Cholesky factor of M is singular".into()))?;
        let c = (&c + c.adjoint()) * Complex64::new(0.5, 0.0);

        let (values, vectors) = if want_vectors {
            let eig = SymmetricEigen::new(c);
            (eig.eigenvalues, Some(eig.eigenvectors))
        } else {
            (c.symmetric_eigenvalues(), None)
        };

        let selected = nearest_ascending(values.as_slice(), self.shift, n_eigs);
        let eigenvalues: Vec<f64> = selected.iter().map(|&i| values[i]).collect();

        let eigenvectors = match vectors {
            Some(z) => {
                let mut picked = DMatrix::zeros(n, selected.len());
                for (col, &i) in selected.iter().enumerate() {
                    picked.set_column(col, &z.column(i));
                }
                let v = l.adjoint().solve_upper_triangular(&picked).ok_or_else(|| {
                    Error::SingularMatrix("Cholesky factor of M is singular".into())
                })?;
                Some(v)
            }
            None => None,
        };

        Ok(Eigensolution {
            eigenvalues,
            eigenvectors,
            iterations: 0,
        })
    }

    fn name(&self) -> &str {
        "Dense Hermitian (Cholesky reduction)"
    }
}

/// Shift-invert Lanczos with full reorthogonalization in the M-inner product.
///
/// Each step applies `Op = (A - σM)⁻¹ M` through a sparse LU factorization
/// of the shifted matrix. Converged Ritz pairs are locked and the iteration
/// restarts in their M-orthogonal complement until a run no longer improves
/// the wanted set. A single Krylov space holds one vector per distinct
/// eigenvalue, so the restarts are what recover the copies of a repeated
/// eigenvalue.
pub struct ShiftInvertLanczos {
    shift: f64,
    tolerance: f64,
    max_iterations: usize,
    timeout: Option<Duration>,
}

impl ShiftInvertLanczos {
    /// Create a solver with the default tolerance and iteration cap.
    pub fn new(shift: f64) -> Self {
        Self::from_config(&EigenSolverConfig {
            shift,
            ..EigenSolverConfig::default()
        })
    }

    /// Create a solver from a configuration (the backend kind is ignored).
    pub fn from_config(config: &EigenSolverConfig) -> Self {
        Self {
            shift: config.shift,
            tolerance: config.tolerance,
            max_iterations: config.max_iterations,
            timeout: config
                .timeout_secs
                .filter(|t| t.is_finite() && *t > 0.0)
                .map(Duration::from_secs_f64),
        }
    }

    /// Fail once the iteration cap or the wall-clock limit is reached.
    fn check_budget(&self, state: &SolveState, converged: usize) -> Result<()> {
        if state.iterations >= self.max_iterations {
            return Err(Error::Convergence {
                iterations: state.iterations,
                converged,
                requested: state.requested,
                reason: "iteration cap reached".into(),
            });
        }
        if let Some(limit) = self.timeout {
            if state.started.elapsed() > limit {
                return Err(Error::Convergence {
                    iterations: state.iterations,
                    converged,
                    requested: state.requested,
                    reason: format!("timeout after {:.3}s", limit.as_secs_f64()),
                });
            }
        }
        Ok(())
    }

    /// One Lanczos run in the M-orthogonal complement of `locked`.
    ///
    /// Returns the converged Ritz pairs among the `want` largest `|θ|` once
    /// all of them converged, or every Ritz pair when the Krylov space
    /// became invariant.
    fn run(
        &self,
        op: &ShiftedOperator,
        b: &CsrMatrix,
        locked: &[LockedPair],
        want: usize,
        state: &mut SolveState,
    ) -> Result<Vec<LockedPair>> {
        let n = b.nrows();
        let Some(mut v) = next_start_vector(b, locked, &mut state.restarts) else {
            return Ok(Vec::new());
        };

        let mut basis: Vec<DVector<Complex64>> = Vec::with_capacity(want + 20);
        let mut b_basis: Vec<DVector<Complex64>> = Vec::with_capacity(want + 20);
        let mut alpha: Vec<f64> = Vec::new();
        let mut beta: Vec<f64> = Vec::new();
        let mut converged = 0usize;

        loop {
            self.check_budget(state, locked.len() + converged)?;

            let bv = spmv_real(b, &v);
            let mut w = op.solve(&bv).ok_or_else(|| {
                Error::SingularMatrix(format!("A - {}M gave a non-finite solution", self.shift))
            })?;
            state.iterations += 1;
            basis.push(v);
            b_basis.push(bv);
            let j = basis.len() - 1;

            let alpha_j = b_basis[j].dotc(&w).re;
            alpha.push(alpha_j);
            let w_norm = b_norm(b, &w);
            w -= &basis[j] * Complex64::new(alpha_j, 0.0);
            reorthogonalize(&mut w, locked, &basis, &b_basis);
            reorthogonalize(&mut w, locked, &basis, &b_basis);
            let beta_j = b_norm(b, &w);

            let exhausted = locked.len() + basis.len() == n;
            let breakdown = beta_j <= BREAKDOWN_TOL * w_norm.max(f64::MIN_POSITIVE);

            if basis.len() >= want || breakdown || exhausted {
                let coupling = if breakdown || exhausted { 0.0 } else { beta_j };
                let candidate = ritz_pairs(&alpha, &beta, coupling, want.min(alpha.len()));
                let done: Vec<&RitzPair> = candidate
                    .iter()
                    .filter(|r| r.residual <= self.tolerance * r.theta.abs())
                    .collect();
                converged = done.len();
                debug!(
                    iteration = state.iterations,
                    converged,
                    locked = locked.len(),
                    want,
                    beta = beta_j,
                    "lanczos step"
                );
                if converged >= want || breakdown || exhausted {
                    return Ok(done.into_iter().map(|r| r.lock(&basis, b)).collect());
                }
            }

            beta.push(beta_j);
            v = w / Complex64::new(beta_j, 0.0);
        }
    }
}

impl EigenSolver for ShiftInvertLanczos {
    fn solve(
        &self,
        a: &ComplexCsr,
        b: &CsrMatrix,
        n_eigs: usize,
        want_vectors: bool,
    ) -> Result<Eigensolution> {
        let n = validate_pencil(a, b, n_eigs)?;
        if n_eigs == 0 {
            return Ok(Eigensolution::empty(n, want_vectors));
        }
        check_positive_definite(b)?;

        let mut state = SolveState {
            started: Instant::now(),
            iterations: 0,
            restarts: 0,
            requested: n_eigs,
        };
        let op = ShiftedOperator::factor(a, b, self.shift)?;

        // Wanted pairs by decreasing |θ|.
        let mut locked: Vec<LockedPair> = Vec::with_capacity(2 * n_eigs);
        let mut runs = 0usize;
        while locked.len() < n {
            let want = n_eigs.min(n - locked.len());
            let found = match self.run(&op, b, &locked, want, &mut state) {
                Ok(found) => found,
                // every wanted pair already converged; the cut-off run was
                // only looking for larger ones
                Err(err @ Error::Convergence { .. }) if locked.len() == n_eigs => {
                    debug!(%err, "lanczos stopped while searching for more pairs");
                    break;
                }
                Err(err) => return Err(err),
            };
            runs += 1;

            let previous: Vec<f64> = locked.iter().map(|p| p.theta.abs()).collect();
            locked.extend(found);
            locked.sort_by(|x, y| {
                y.theta
                    .abs()
                    .partial_cmp(&x.theta.abs())
                    .unwrap_or(Ordering::Equal)
            });
            locked.truncate(n_eigs);

            let improved = locked.len() > previous.len()
                || locked
                    .iter()
                    .zip(&previous)
                    .any(|(p, &old)| p.theta.abs() > old * (1.0 + self.tolerance));
            debug!(runs, locked = locked.len(), improved, "lanczos run finished");
            if !improved {
                break;
            }
        }

        if locked.len() < n_eigs {
            return Err(Error::Convergence {
                iterations: state.iterations,
                converged: locked.len(),
                requested: n_eigs,
                reason: "Krylov space exhausted".into(),
            });
        }

        let mut pairs: Vec<(f64, LockedPair)> = locked
            .into_iter()
            .map(|p| (self.shift + 1.0 / p.theta, p))
            .collect();
        pairs.sort_by(|x, y| x.0.partial_cmp(&y.0).unwrap_or(Ordering::Equal));

        let eigenvectors = want_vectors.then(|| {
            let mut vectors = DMatrix::zeros(n, pairs.len());
            for (col, (_, p)) in pairs.iter().enumerate() {
                vectors.set_column(col, &p.vector);
            }
            vectors
        });

        Ok(Eigensolution {
            eigenvalues: pairs.iter().map(|(lambda, _)| *lambda).collect(),
            eigenvectors,
            iterations: state.iterations,
        })
    }

    fn name(&self) -> &str {
        "Shift-invert Lanczos"
    }
}

/// Progress of one shift-invert solve across its Lanczos runs.
struct SolveState {
    started: Instant,
    /// Operator applications so far.
    iterations: usize,
    restarts: usize,
    requested: usize,
}

/// Converged Ritz pair that later runs deflate against.
struct LockedPair {
    theta: f64,
    vector: DVector<Complex64>,
    b_vector: DVector<Complex64>,
}

/// Sparse LU factorization of `A - σM`.
struct ShiftedOperator {
    lu: Lu<usize, Complex64>,
    n: usize,
}

impl ShiftedOperator {
    /// Factor `A - σM` and reject it when it is numerically singular.
    ///
    /// The reciprocal condition number is estimated from one solve,
    /// `‖r‖∞ / (‖A - σM‖∞ ‖x‖∞)`, which never underestimates it.
    fn factor(a: &ComplexCsr, b: &CsrMatrix, shift: f64) -> Result<Self> {
        let matrix = shifted(a, b, shift);
        let csc = csr_to_faer_csc(&matrix);
        let symbolic = SymbolicLu::try_new(csc.as_ref().symbolic()).map_err(|err| {
            Error::SingularMatrix(format!("symbolic LU analysis of A - {shift}M failed: {err:?}"))
        })?;
        let lu = Lu::try_new_with_symbolic(symbolic, csc.as_ref()).map_err(|e| match e {
            LuError::SymbolicSingular { index } => Error::SingularMatrix(format!(
                "A - {shift}M is structurally singular at column {index}"
            )),
            LuError::Generic(err) => {
                Error::SingularMatrix(format!("sparse LU of A - {shift}M failed: {err:?}"))
            }
        })?;
        let op = Self { lu, n: matrix.nrows() };

        let rhs = start_vector(op.n, 0);
        let rcond = op
            .solve(&rhs)
            .map(|x| max_norm(&rhs) / (max_row_sum(&matrix) * max_norm(&x)))
            .unwrap_or(0.0);
        if !(rcond > SINGULAR_RCOND) {
            return Err(Error::SingularMatrix(format!(
                "A - {shift}M is singular (rcond {rcond:.3e}); \
                 choose a shift away from the eigenvalues"
            )));
        }
        debug!(shift, rcond, nnz = matrix.nnz(), "factored shifted operator");
        Ok(op)
    }

    /// `(A - σM)⁻¹ rhs`, or `None` if the result is not finite.
    fn solve(&self, rhs: &DVector<Complex64>) -> Option<DVector<Complex64>> {
        let mut x = faer::Mat::from_fn(self.n, 1, |i, _| rhs[i]);
        self.lu.solve_in_place(x.as_mut());
        let x = DVector::from_fn(self.n, |i, _| x[(i, 0)]);
        x.iter().all(|z| z.is_finite()).then_some(x)
    }
}

/// Verify that `b` is symmetric positive definite via sparse Cholesky.
///
/// Only the lower triangle is read.
pub fn check_positive_definite(b: &CsrMatrix) -> Result<()> {
    let n = b.nrows();
    if n == 0 {
        return Ok(());
    }
    if n != b.ncols() {
        return Err(Error::DimensionMismatch(format!(
            "mass matrix is {}x{}",
            n,
            b.ncols()
        )));
    }

    let csc = csr_to_faer_csc(b);
    let csc_ref = csc.as_ref();
    let symbolic = SymbolicLlt::try_new(csc_ref.symbolic(), faer::Side::Lower).map_err(|_| {
        Error::SingularMatrix("symbolic Cholesky analysis of the mass matrix failed".into())
    })?;
    Llt::try_new_with_symbolic(symbolic, csc_ref, faer::Side::Lower).map_err(|e| match e {
        SparseLltError::Generic(err) => {
            Error::SingularMatrix(format!("sparse Cholesky of the mass matrix failed: {:?}", err))
        }
        SparseLltError::Numeric(LltError::NonPositivePivot { index }) => Error::SingularMatrix(
            format!("mass matrix is not positive definite at pivot {}", index),
        ),
    })?;
    Ok(())
}

/// Convert a nalgebra-sparse CSR matrix to faer CSC by bucketing the
/// entries of each row into their columns.
fn csr_to_faer_csc<T: Copy + Default>(csr: &NalgebraCsr<T>) -> SparseColMat<usize, T> {
    let nrows = csr.nrows();
    let ncols = csr.ncols();
    let row_offsets = csr.row_offsets();
    let col_indices = csr.col_indices();
    let values = csr.values();

    let mut col_offsets = vec![0usize; ncols + 1];
    for &col in col_indices {
        col_offsets[col + 1] += 1;
    }
    for i in 0..ncols {
        col_offsets[i + 1] += col_offsets[i];
    }

    let nnz = values.len();
    let mut csc_row_indices = vec![0usize; nnz];
    let mut csc_values = vec![T::default(); nnz];
    let mut col_positions = col_offsets[..ncols].to_vec();

    for row in 0..nrows {
        for idx in row_offsets[row]..row_offsets[row + 1] {
            let col = col_indices[idx];
            let pos = col_positions[col];
            csc_row_indices[pos] = row;
            csc_values[pos] = values[idx];
            col_positions[col] += 1;
        }
    }

    // SAFETY: offsets are monotone and row indices within each column are
    // increasing because CSR rows are visited in order.
    unsafe {
        SparseColMat::new(
            SymbolicSparseColMat::new_unchecked(nrows, ncols, col_offsets, None, csc_row_indices),
            csc_values,
        )
    }
}

fn validate_pencil(a: &ComplexCsr, b: &CsrMatrix, n_eigs: usize) -> Result<usize> {
    let n = a.nrows();
    if a.ncols() != n || b.nrows() != n || b.ncols() != n {
        return Err(Error::DimensionMismatch(format!(
            "A is {}x{}, M is {}x{}",
            a.nrows(),
            a.ncols(),
            b.nrows(),
            b.ncols()
        )));
    }
    if n_eigs > n {
        return Err(Error::InvalidConfig(format!(
            "requested {} eigenvalues but the system has only {} DOFs",
            n_eigs, n
        )));
    }
    Ok(n)
}

/// Indices of the `count` values nearest `shift`, reordered ascending.
/// Stable sorts keep solver order among ties.
fn nearest_ascending(values: &[f64], shift: f64, count: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&i, &j| {
        (values[i] - shift)
            .abs()
            .partial_cmp(&(values[j] - shift).abs())
            .unwrap_or(Ordering::Equal)
    });
    order.truncate(count);
    order.sort_by(|&i, &j| values[i].partial_cmp(&values[j]).unwrap_or(Ordering::Equal));
    order
}

struct RitzPair {
    theta: f64,
    residual: f64,
    coefficients: Vec<f64>,
}

impl RitzPair {
    /// Form the Ritz vector from the run's basis.
    fn lock(&self, basis: &[DVector<Complex64>], b: &CsrMatrix) -> LockedPair {
        let mut vector = DVector::zeros(b.nrows());
        for (vk, &c) in basis.iter().zip(&self.coefficients) {
            vector += vk * Complex64::new(c, 0.0);
        }
        let b_vector = spmv_real(b, &vector);
        LockedPair {
            theta: self.theta,
            vector,
            b_vector,
        }
    }
}

/// Ritz pairs of the tridiagonal `T` with the largest `|θ|`.
fn ritz_pairs(alpha: &[f64], beta: &[f64], coupling: f64, count: usize) -> Vec<RitzPair> {
    let m = alpha.len();
    let mut t = DMatrix::zeros(m, m);
    for i in 0..m {
        t[(i, i)] = alpha[i];
        if i + 1 < m {
            t[(i, i + 1)] = beta[i];
            t[(i + 1, i)] = beta[i];
        }
    }
    let eig = SymmetricEigen::new(t);

    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&i, &j| {
        eig.eigenvalues[j]
            .abs()
            .partial_cmp(&eig.eigenvalues[i].abs())
            .unwrap_or(Ordering::Equal)
    });
    order
        .into_iter()
        .take(count)
        .map(|i| {
            let s = eig.eigenvectors.column(i);
            RitzPair {
                theta: eig.eigenvalues[i],
                residual: (coupling * s[m - 1]).abs(),
                coefficients: s.iter().copied().collect(),
            }
        })
        .collect()
}

fn b_norm(b: &CsrMatrix, x: &DVector<Complex64>) -> f64 {
    x.dotc(&spmv_real(b, x)).re.max(0.0).sqrt()
}

/// Remove the components of `w` along the locked vectors and the
/// M-orthonormal basis of the current run.
fn reorthogonalize(
    w: &mut DVector<Complex64>,
    locked: &[LockedPair],
    basis: &[DVector<Complex64>],
    b_basis: &[DVector<Complex64>],
) {
    for pair in locked {
        let coeff = pair.b_vector.dotc(w);
        *w -= &pair.vector * coeff;
    }
    for (vk, bvk) in basis.iter().zip(b_basis) {
        let coeff = bvk.dotc(w);
        *w -= vk * coeff;
    }
}

fn max_norm(x: &DVector<Complex64>) -> f64 {
    x.iter().fold(0.0, |acc, z| acc.max(z.norm()))
}

/// Deterministic complex start vector for attempt `seed`.
fn start_vector(n: usize, seed: usize) -> DVector<Complex64> {
    DVector::from_fn(n, |i, _| {
        let re = ((i * 7 + 13 + 31 * seed) % 101) as f64 / 100.0 - 0.5;
        let im = ((i * 11 + 5 + 17 * seed) % 97) as f64 / 96.0 - 0.5;
        Complex64::new(re, 0.5 * im)
    })
}

/// Next start vector, M-orthogonal to `locked` and M-normalized.
fn next_start_vector(
    b: &CsrMatrix,
    locked: &[LockedPair],
    restarts: &mut usize,
) -> Option<DVector<Complex64>> {
    let n = b.nrows();
    if locked.len() >= n {
        return None;
    }
    for _ in 0..RESTART_ATTEMPTS {
        let mut v = start_vector(n, *restarts);
        *restarts += 1;
        let initial = b_norm(b, &v);
        reorthogonalize(&mut v, locked, &[], &[]);
        reorthogonalize(&mut v, locked, &[], &[]);
        let norm = b_norm(b, &v);
        if norm > 1e-8 * initial {
            return Some(v / Complex64::new(norm, 0.0));
        }
    }
    None
}
