//! Symmetry diagnostics for the system blocks.
//!
//! Asymmetry in K, M or S, or a symmetric part in R, points at an upstream
//! assembly or material error. The checks are advisory: the sweep reports
//! them through `tracing` and carries on.

use serde::{Deserialize, Serialize};

use crate::assembly::SystemMatrices;
use crate::sparse::{
    max_abs_entry, max_hermitian_deviation, max_transpose_deviation, ComplexCsr, CsrMatrix,
};

/// Deviation of one matrix from its expected (anti)symmetry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymmetryCheck {
    /// Max absolute entry of `X - Xᵀ` (or `R + Rᵀ`, `A - Aᴴ`).
    pub deviation: f64,
    /// Max absolute entry of the matrix itself.
    pub magnitude: f64,
}

impl SymmetryCheck {
    /// Deviation relative to the largest entry; 0.0 for an empty matrix.
    pub fn relative(&self) -> f64 {
        if self.magnitude > 0.0 {
            self.deviation / self.magnitude
        } else {
            self.deviation
        }
    }

    /// Whether the relative deviation exceeds `threshold`.
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.relative() > threshold
    }
}

/// Checks of the four step-invariant blocks, computed once per sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockSymmetry {
    /// `M - Mᵀ`
    pub m: SymmetryCheck,
    /// `K - Kᵀ`
    pub k: SymmetryCheck,
    /// `S - Sᵀ`
    pub s: SymmetryCheck,
    /// `R + Rᵀ`
    pub r: SymmetryCheck,
}

impl BlockSymmetry {
    /// Check the blocks of a validated system.
    pub fn of(matrices: &SystemMatrices) -> Self {
        Self::check(matrices.k(), matrices.m(), matrices.s(), matrices.r())
    }

    /// Check four blocks given separately.
    pub fn check(k: &CsrMatrix, m: &CsrMatrix, s: &CsrMatrix, r: &CsrMatrix) -> Self {
        Self {
            m: symmetric(m),
            k: symmetric(k),
            s: symmetric(s),
            r: antisymmetric(r),
        }
    }

    /// Names of blocks whose relative deviation exceeds `threshold`.
    pub fn violations(&self, threshold: f64) -> Vec<&'static str> {
        [
            ("M - M^T", self.m),
            ("K - K^T", self.k),
            ("S - S^T", self.s),
            ("R + R^T", self.r),
        ]
        .into_iter()
        .filter(|(_, check)| check.exceeds(threshold))
        .map(|(name, _)| name)
        .collect()
    }
}

/// Full report: block checks plus the Hermitian check of one assembled A.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymmetryReport {
    pub blocks: BlockSymmetry,
    /// `A - Aᴴ`
    pub a: SymmetryCheck,
}

impl SymmetryReport {
    /// Names of all checks exceeding `threshold`.
    pub fn violations(&self, threshold: f64) -> Vec<&'static str> {
        let mut names = self.blocks.violations(threshold);
        if self.a.exceeds(threshold) {
            names.push("A - A^H");
        }
        names
    }

    /// Largest relative deviation over all checks.
    pub fn worst(&self) -> f64 {
        [
            self.blocks.m,
            self.blocks.k,
            self.blocks.s,
            self.blocks.r,
            self.a,
        ]
        .iter()
        .map(SymmetryCheck::relative)
        .fold(0.0, f64::max)
    }
}

/// Run every check on an assembled A and its blocks.
pub fn check(
    a: &ComplexCsr,
    k: &CsrMatrix,
    m: &CsrMatrix,
    s: &CsrMatrix,
    r: &CsrMatrix,
) -> SymmetryReport {
    SymmetryReport {
        blocks: BlockSymmetry::check(k, m, s, r),
        a: hermitian_check(a),
    }
}

/// Max absolute entry of `A - Aᴴ`, run once per sweep step.
pub fn hermitian_deviation(a: &ComplexCsr) -> f64 {
    max_hermitian_deviation(a)
}

/// Hermitian check of a complex matrix.
pub fn hermitian_check(a: &ComplexCsr) -> SymmetryCheck {
    SymmetryCheck {
        deviation: hermitian_deviation(a),
        magnitude: a.values().iter().fold(0.0, |acc, v| acc.max(v.norm())),
    }
}

fn symmetric(x: &CsrMatrix) -> SymmetryCheck {
    SymmetryCheck {
        deviation: max_transpose_deviation(x, 1.0),
        magnitude: max_abs_entry(x),
    }
}

fn antisymmetric(x: &CsrMatrix) -> SymmetryCheck {
    SymmetryCheck {
        deviation: max_transpose_deviation(x, -1.0),
        magnitude: max_abs_entry(x),
    }
}
