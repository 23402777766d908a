//! Loading of system matrices and constraint maps.
//!
//! Matrices are read from Matrix Market coordinate files (general,
//! symmetric or skew-symmetric storage). The constraint map is a JSON
//! document in one of two shapes:
//!
//! ```json
//! { "n_full": 6, "fixed": [0], "periodic": [[4, 1], [5, 4]] }
//! { "n_reduced": 2, "rules": [{"independent": 0}, {"prescribed": [0.0, 0.0]}] }
//! ```

use std::fs;
use std::path::Path;

use nalgebra_sparse::io::load_coo_from_matrix_market_str;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assembly::SystemMatrices;
use crate::error::{Error, Result};
use crate::reconstruct::{ConstraintMap, DofRule};
use crate::sparse::CsrMatrix;

/// Read a real sparse matrix from a Matrix Market file.
pub fn load_matrix(path: &Path) -> Result<CsrMatrix> {
    let text = fs::read_to_string(path)?;
    let matrix = parse_matrix(&text)
        .map_err(|e| Error::Parse(format!("{}: {}", path.display(), e)))?;
    debug!(
        path = %path.display(),
        nrows = matrix.nrows(),
        ncols = matrix.ncols(),
        nnz = matrix.nnz(),
        "loaded matrix"
    );
    Ok(matrix)
}

/// Parse Matrix Market text into CSR.
pub fn parse_matrix(text: &str) -> Result<CsrMatrix> {
    let coo = load_coo_from_matrix_market_str::<f64>(text)
        .map_err(|e| Error::Parse(format!("invalid Matrix Market data: {e}")))?;
    Ok(CsrMatrix::from(&coo))
}

/// Read K, M, S and R and validate them as one system.
pub fn load_system(k: &Path, m: &Path, s: &Path, r: &Path) -> Result<SystemMatrices> {
    SystemMatrices::new(
        load_matrix(k)?,
        load_matrix(m)?,
        load_matrix(s)?,
        load_matrix(r)?,
    )
}

/// On-disk form of a constraint map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstraintFile {
    /// Constraints to eliminate: fixed DOFs and `[slave, master]` pairs.
    Eliminated {
        n_full: usize,
        #[serde(default)]
        fixed: Vec<usize>,
        #[serde(default)]
        periodic: Vec<(usize, usize)>,
    },
    /// One explicit rule per full DOF.
    Rules {
        n_reduced: usize,
        rules: Vec<DofRule>,
    },
}

impl ConstraintFile {
    pub fn into_map(self) -> Result<ConstraintMap> {
        match self {
            ConstraintFile::Eliminated {
                n_full,
                fixed,
                periodic,
            } => ConstraintMap::from_constraints(n_full, &fixed, &periodic),
            ConstraintFile::Rules { n_reduced, rules } => ConstraintMap::new(n_reduced, rules),
        }
    }
}

/// Parse a constraint map from JSON text.
pub fn parse_constraint_map(json: &str) -> Result<ConstraintMap> {
    let file: ConstraintFile = serde_json::from_str(json)?;
    file.into_map()
}

/// Read a constraint map from a JSON file.
pub fn load_constraint_map(path: &Path) -> Result<ConstraintMap> {
    let text = fs::read_to_string(path)?;
    parse_constraint_map(&text).map_err(|e| match e {
        Error::Parse(msg) => Error::Parse(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}
