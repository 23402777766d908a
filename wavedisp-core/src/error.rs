//! Error types for dispersion sweeps.

use thiserror::Error;

/// Result type alias using the wavedisp Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while setting up or running a dispersion sweep.
#[derive(Error, Debug)]
pub enum Error {
    /// Matrices, vectors or the wave direction have inconsistent sizes.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Sweep or solver configuration is invalid (e.g. more eigenvalues
    /// requested than the system has).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The iterative eigensolver stopped before enough Ritz pairs converged.
    #[error(
        "eigensolver did not converge: {converged}/{requested} eigenpairs \
         after {iterations} iterations ({reason})"
    )]
    Convergence {
        iterations: usize,
        converged: usize,
        requested: usize,
        reason: String,
    },

    /// Mass matrix not positive definite, or the shifted operator is singular.
    #[error("singular matrix: {0}")]
    SingularMatrix(String),

    /// Malformed input file contents.
    #[error("parse error: {0}")]
    Parse(String),

    /// I/O errors (matrix files, recorder output).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error comes from the eigensolve of a single sweep step
    /// (as opposed to set-up or output failures).
    pub fn is_solver_failure(&self) -> bool {
        matches!(self, Error::Convergence { .. } | Error::SingularMatrix(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}
