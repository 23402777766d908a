//! Core data types for dispersion sweeps.
//!
//! This module defines the small value types shared by every stage:
//! - Complex scalar alias
//! - Wave propagation direction (unit vector in 2D or 3D)
//! - Linearly spaced wave-number magnitude range

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Complex scalar used for the Bloch system matrix and mode shapes.
pub type Complex64 = num_complex::Complex64;

/// Imaginary unit.
pub const I: Complex64 = Complex64::new(0.0, 1.0);

/// Unit-norm wave propagation direction.
///
/// Fixed for a whole sweep. Only 2D and 3D directions are accepted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaveDirection(Vec<f64>);

impl WaveDirection {
    /// Normalize a raw direction vector.
    ///
    /// # Errors
    ///
    /// Returns error if the vector is not 2D/3D, has non-finite components
    /// or zero length.
    pub fn new(raw: &[f64]) -> Result<Self> {
        if raw.len() != 2 && raw.len() != 3 {
            return Err(Error::DimensionMismatch(format!(
                "wave direction must have 2 or 3 components, got {}",
                raw.len()
            )));
        }
        if raw.iter().any(|c| !c.is_finite()) {
            return Err(Error::InvalidConfig(
                "wave direction has non-finite components".into(),
            ));
        }
        let norm = raw.iter().map(|c| c * c).sum::<f64>().sqrt();
        if norm == 0.0 {
            return Err(Error::InvalidConfig("wave direction has zero length".into()));
        }
        Ok(Self(raw.iter().map(|c| c / norm).collect()))
    }

    /// Normalize the first `dim` components of a raw direction.
    ///
    /// Lets a 3-component default like `1,0,0` drive a 2D problem.
    pub fn for_dimension(raw: &[f64], dim: usize) -> Result<Self> {
        if raw.len() < dim {
            return Err(Error::DimensionMismatch(format!(
                "wave direction has {} components, problem dimension is {}",
                raw.len(),
                dim
            )));
        }
        Self::new(&raw[..dim])
    }

    /// Spatial dimension (2 or 3).
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    /// Unit vector components.
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Wave vector `magnitude * d`.
    pub fn wave_vector(&self, magnitude: f64) -> Vec<f64> {
        self.0.iter().map(|c| magnitude * c).collect()
    }
}

impl<'de> Deserialize<'de> for WaveDirection {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = Vec::<f64>::deserialize(deserializer)?;
        WaveDirection::new(&raw).map_err(serde::de::Error::custom)
    }
}

/// Linearly spaced wave-number magnitudes, both ends included.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveRange {
    pub start: f64,
    pub stop: f64,
    pub count: usize,
}

impl WaveRange {
    /// Create a validated range.
    pub fn new(start: f64, stop: f64, count: usize) -> Result<Self> {
        let range = Self { start, stop, count };
        range.validate()?;
        Ok(range)
    }

    /// Check that the range describes a finite, non-negative sweep.
    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(Error::InvalidConfig("wave range count must be positive".into()));
        }
        if !self.start.is_finite() || !self.stop.is_finite() {
            return Err(Error::InvalidConfig("wave range bounds must be finite".into()));
        }
        if self.start < 0.0 || self.stop < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "wave magnitudes must be non-negative, got [{}, {}]",
                self.start, self.stop
            )));
        }
        Ok(())
    }

    /// Magnitudes in sweep order, both ends included.
    pub fn magnitudes(&self) -> Vec<f64> {
        match self.count {
            0 => Vec::new(),
            1 => vec![self.start],
            n => {
                let step = (self.stop - self.start) / (n - 1) as f64;
                (0..n)
                    .map(|i| {
                        if i == n - 1 {
                            self.stop
                        } else {
                            self.start + step * i as f64
                        }
                    })
                    .collect()
            }
        }
    }
}
