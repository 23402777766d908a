//! Result recording for dispersion sweeps.
//!
//! The sweep emits one [`DispersionRecord`] per completed step, strictly in
//! increasing step order, followed by that step's mode shapes when
//! eigenvectors were requested. Recorders are only ever called from the
//! thread driving the sweep.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::material::ReferenceWaves;
use crate::sweep::SweepStatus;
use crate::symmetry::BlockSymmetry;
use crate::types::{Complex64, WaveDirection};

/// Result of one sweep step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispersionRecord {
    /// Index into the wave-number range.
    pub step: usize,
    /// κ
    pub wave_magnitude: f64,
    /// κ · d
    pub wave_vector: Vec<f64>,
    /// λ, ascending.
    pub eigenvalues: Vec<f64>,
    /// ω = √λ, aligned with `eigenvalues`.
    pub frequencies: Vec<f64>,
    /// Max |A - Aᴴ| of this step's system matrix.
    pub hermitian_deviation: f64,
    /// `[ω_p, ω_s]` of the averaged homogeneous medium, when configured.
    pub reference_frequencies: Option<[f64; 2]>,
    /// Modes whose eigenvalue was too negative to clamp (ω is NaN).
    pub nan_modes: Vec<usize>,
    /// Eigensolver operator applications.
    pub iterations: usize,
}

/// Full-space eigenvector of one mode at one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeShape {
    pub step: usize,
    pub mode: usize,
    pub eigenvalue: f64,
    pub values: Vec<Complex64>,
}

/// Sweep-wide facts known before the first step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepHeader {
    /// Reduced DOF count n.
    pub n_dofs: usize,
    /// Length of emitted mode shapes.
    pub n_full: usize,
    pub n_eigs: usize,
    pub want_vectors: bool,
    pub wave_direction: WaveDirection,
    pub magnitudes: Vec<f64>,
    /// Eigensolver backend name.
    pub solver: String,
    pub blocks: BlockSymmetry,
    pub reference_waves: Option<ReferenceWaves>,
}

/// Sink for sweep results.
pub trait Recorder {
    /// Called once before the first step.
    fn begin(&mut self, _header: &SweepHeader) -> Result<()> {
        Ok(())
    }

    /// Called once per completed step, in step order.
    fn record_step(&mut self, record: &DispersionRecord) -> Result<()>;

    /// Called after `record_step` with that step's mode shapes, ordered by
    /// mode index. Not called when eigenvectors were not requested.
    fn record_modes(&mut self, step: usize, modes: &[ModeShape]) -> Result<()>;

    /// Called once with the final status.
    fn finish(&mut self, _status: &SweepStatus) -> Result<()> {
        Ok(())
    }
}

/// Recorder keeping everything in memory.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    pub header: Option<SweepHeader>,
    pub records: Vec<DispersionRecord>,
    pub modes: Vec<ModeShape>,
    pub status: Option<SweepStatus>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mode shape of `mode` at `step`, if recorded.
    pub fn mode(&self, step: usize, mode: usize) -> Option<&ModeShape> {
        self.modes
            .iter()
            .find(|shape| shape.step == step && shape.mode == mode)
    }
}

impl Recorder for MemoryRecorder {
    fn begin(&mut self, header: &SweepHeader) -> Result<()> {
        self.header = Some(header.clone());
        Ok(())
    }

    fn record_step(&mut self, record: &DispersionRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn record_modes(&mut self, _step: usize, modes: &[ModeShape]) -> Result<()> {
        self.modes.extend_from_slice(modes);
        Ok(())
    }

    fn finish(&mut self, status: &SweepStatus) -> Result<()> {
        self.status = Some(status.clone());
        Ok(())
    }
}

/// Recorder that discards all results.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRecorder;

impl Recorder for NullRecorder {
    fn record_step(&mut self, _record: &DispersionRecord) -> Result<()> {
        Ok(())
    }

    fn record_modes(&mut self, _step: usize, _modes: &[ModeShape]) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(step: usize) -> DispersionRecord {
        DispersionRecord {
            step,
            wave_magnitude: step as f64,
            wave_vector: vec![step as f64, 0.0],
            eigenvalues: vec![1.0, 4.0],
            frequencies: vec![1.0, 2.0],
            hermitian_deviation: 0.0,
            reference_frequencies: None,
            nan_modes: Vec::new(),
            iterations: 0,
        }
    }

    #[test]
    fn test_memory_recorder_keeps_order() {
        let mut recorder = MemoryRecorder::new();
        for step in 0..3 {
            recorder.record_step(&record(step)).unwrap();
            recorder
                .record_modes(
                    step,
                    &[ModeShape {
                        step,
                        mode: 0,
                        eigenvalue: 1.0,
                        values: vec![Complex64::new(1.0, 0.0)],
                    }],
                )
                .unwrap();
        }
        recorder.finish(&SweepStatus::Completed).unwrap();

        let steps: Vec<usize> = recorder.records.iter().map(|r| r.step).collect();
        assert_eq!(steps, vec![0, 1, 2]);
        assert!(recorder.mode(2, 0).is_some());
        assert!(recorder.mode(2, 1).is_none());
        assert_eq!(recorder.status, Some(SweepStatus::Completed));
    }

    #[test]
    fn test_record_serializes_to_json() {
        let json = serde_json::to_string(&record(1)).unwrap();
        let back: DispersionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record(1));
    }
}
