//! Full-space reconstruction of reduced eigenvectors.
//!
//! The eigenproblem is posed on the reduced DOF space left after fixed and
//! periodic constraints were eliminated. A [`ConstraintMap`] records, for
//! every DOF of the full space, how its value follows from the reduced
//! vector. Expansion is a single linear pass over those rules.

use std::collections::{HashMap, HashSet};

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Complex64;

/// How one full-space DOF is obtained from the reduced vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DofRule {
    /// Copy of reduced DOF `i`.
    Independent(usize),
    /// Linear combination `Σ c · reduced[i]`.
    Combination(Vec<(usize, Complex64)>),
    /// Fixed value, independent of the reduced vector.
    Prescribed(Complex64),
}

/// Map from the reduced DOF space (size n) to the full DOF space (size N).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstraintMap {
    n_reduced: usize,
    rules: Vec<DofRule>,
}

impl ConstraintMap {
    /// Map of an unconstrained system: every DOF is its own reduced DOF.
    pub fn identity(n: usize) -> Self {
        Self {
            n_reduced: n,
            rules: (0..n).map(DofRule::Independent).collect(),
        }
    }

    /// Create a map from explicit rules, one per full DOF.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a rule references a reduced DOF
    /// outside `0..n_reduced` or carries a non-finite coefficient.
    pub fn new(n_reduced: usize, rules: Vec<DofRule>) -> Result<Self> {
        for (dof, rule) in rules.iter().enumerate() {
            let (indices, coefficients): (Vec<usize>, Vec<Complex64>) = match rule {
                DofRule::Independent(i) => (vec![*i], Vec::new()),
                DofRule::Combination(terms) => terms.iter().copied().unzip(),
                DofRule::Prescribed(value) => (Vec::new(), vec![*value]),
            };
            if let Some(bad) = indices.iter().find(|&&i| i >= n_reduced) {
                return Err(Error::InvalidConfig(format!(
                    "rule for DOF {} references reduced DOF {} (reduced size {})",
                    dof, bad, n_reduced
                )));
            }
            if coefficients.iter().any(|c| !c.re.is_finite() || !c.im.is_finite()) {
                return Err(Error::InvalidConfig(format!(
                    "rule for DOF {} has a non-finite coefficient",
                    dof
                )));
            }
        }
        Ok(Self { n_reduced, rules })
    }

    /// Build the map produced by eliminating fixed DOFs and periodic slaves.
    ///
    /// Free DOFs (neither fixed nor slave) are numbered in increasing order.
    /// Fixed DOFs are prescribed to zero. A slave copies its master; chains
    /// `a -> b -> c` resolve to `c`, and a chain ending in a fixed DOF makes
    /// the slave fixed as well.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for out-of-range DOFs, a DOF that is
    /// both fixed and a slave, a slave with two masters, or a cycle.
    pub fn from_constraints(
        n_full: usize,
        fixed: &[usize],
        periodic: &[(usize, usize)],
    ) -> Result<Self> {
        let check = |dof: usize, what: &str| {
            if dof >= n_full {
                Err(Error::InvalidConfig(format!(
                    "{} DOF {} out of range (full size {})",
                    what, dof, n_full
                )))
            } else {
                Ok(())
            }
        };

        let mut fixed_set = HashSet::with_capacity(fixed.len());
        for &dof in fixed {
            check(dof, "fixed")?;
            fixed_set.insert(dof);
        }

        let mut master_of = HashMap::with_capacity(periodic.len());
        for &(slave, master) in periodic {
            check(slave, "periodic slave")?;
            check(master, "periodic master")?;
            if slave == master {
                return Err(Error::InvalidConfig(format!(
                    "DOF {} is periodic with itself",
                    slave
                )));
            }
            if fixed_set.contains(&slave) {
                return Err(Error::InvalidConfig(format!(
                    "DOF {} is both fixed and a periodic slave",
                    slave
                )));
            }
            if master_of.insert(slave, master).is_some() {
                return Err(Error::InvalidConfig(format!(
                    "DOF {} has more than one periodic master",
                    slave
                )));
            }
        }

        let mut reduced_index = vec![None; n_full];
        let mut n_reduced = 0;
        for (dof, slot) in reduced_index.iter_mut().enumerate() {
            if !fixed_set.contains(&dof) && !master_of.contains_key(&dof) {
                *slot = Some(n_reduced);
                n_reduced += 1;
            }
        }

        let mut rules = Vec::with_capacity(n_full);
        for dof in 0..n_full {
            let mut root = dof;
            let mut hops = 0;
            while let Some(&master) = master_of.get(&root) {
                root = master;
                hops += 1;
                if hops > master_of.len() {
                    return Err(Error::InvalidConfig(format!(
                        "periodic constraints of DOF {} form a cycle",
                        dof
                    )));
                }
            }
            let rule = match reduced_index[root] {
                Some(i) => DofRule::Independent(i),
                None => DofRule::Prescribed(Complex64::new(0.0, 0.0)),
            };
            rules.push(rule);
        }

        Ok(Self { n_reduced, rules })
    }

    /// Full DOF count N.
    pub fn n_full(&self) -> usize {
        self.rules.len()
    }

    /// Reduced DOF count n.
    pub fn n_reduced(&self) -> usize {
        self.n_reduced
    }

    pub fn rules(&self) -> &[DofRule] {
        &self.rules
    }

    /// Expand a reduced vector to the full DOF space.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `reduced.len() != n_reduced`.
    pub fn expand(&self, reduced: &[Complex64]) -> Result<Vec<Complex64>> {
        if reduced.len() != self.n_reduced {
            return Err(Error::DimensionMismatch(format!(
                "reduced vector has length {}, constraint map expects {}",
                reduced.len(),
                self.n_reduced
            )));
        }
        Ok(self
            .rules
            .iter()
            .map(|rule| match rule {
                DofRule::Independent(i) => reduced[*i],
                DofRule::Combination(terms) => terms
                    .iter()
                    .map(|&(i, c)| c * reduced[i])
                    .sum::<Complex64>(),
                DofRule::Prescribed(value) => *value,
            })
            .collect())
    }

    /// Expand every column of an `n x k` eigenvector matrix.
    pub fn expand_modes(&self, vectors: &DMatrix<Complex64>) -> Result<DMatrix<Complex64>> {
        if vectors.nrows() != self.n_reduced {
            return Err(Error::DimensionMismatch(format!(
                "eigenvectors have {} rows, constraint map expects {}",
                vectors.nrows(),
                self.n_reduced
            )));
        }
        let mut full = DMatrix::zeros(self.n_full(), vectors.ncols());
        for (col, v) in vectors.column_iter().enumerate() {
            let reduced: Vec<Complex64> = v.iter().copied().collect();
            let expanded = self.expand(&reduced)?;
            for (row, value) in expanded.into_iter().enumerate() {
                full[(row, col)] = value;
            }
        }
        Ok(full)
    }
}
