//! Dispersion sweep controller.
//!
//! Walks the wave-number magnitudes and, per step, assembles `A(κ)`, checks
//! it for Hermitian symmetry, solves the generalized eigenproblem, turns
//! eigenvalues into frequencies and reconstructs full-space mode shapes.
//!
//! Steps only share read-only inputs, so with `parallel = true` they are
//! computed on the rayon pool. Results always reach the [`Recorder`] in
//! step order from the calling thread, so sequential and parallel runs
//! produce the same log.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::assembly::SystemMatrices;
use crate::eigen::{select_solver, EigenSolver, EigenSolverConfig};
use crate::error::{Error, Result};
use crate::material::ReferenceWaves;
use crate::reconstruct::ConstraintMap;
use crate::recorder::{DispersionRecord, ModeShape, Recorder, SweepHeader};
use crate::symmetry::{hermitian_check, BlockSymmetry};
use crate::types::{WaveDirection, WaveRange};

/// What to do when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the failing step and return the records completed so far.
    #[default]
    Abort,
    /// Log the failure, omit the step and continue.
    Skip,
}

/// Sweep configuration.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub range: WaveRange,
    pub direction: WaveDirection,
    /// Spatial dimension of the cell; the direction must match when set.
    pub dimension: Option<usize>,
    pub n_eigs: usize,
    /// Form eigenvectors and emit mode shapes.
    pub want_vectors: bool,
    pub solver: EigenSolverConfig,
    pub policy: FailurePolicy,
    pub parallel: bool,
    /// Relative deviation above which symmetry checks warn.
    pub symmetry_threshold: f64,
    /// Negative eigenvalues with `|λ| <= clamp_tolerance * max(1, max|λ|)`
    /// give ω = 0.
    pub clamp_tolerance: f64,
    pub reference_waves: Option<ReferenceWaves>,
}

impl SweepConfig {
    /// Configuration with default solver, policy and tolerances.
    pub fn new(range: WaveRange, direction: WaveDirection, n_eigs: usize) -> Self {
        Self {
            range,
            direction,
            dimension: None,
            n_eigs,
            want_vectors: true,
            solver: EigenSolverConfig::default(),
            policy: FailurePolicy::Abort,
            parallel: false,
            symmetry_threshold: 1e-8,
            clamp_tolerance: 1e-8,
            reference_waves: None,
        }
    }
}

/// Cooperative cancellation flag shared with the sweep.
///
/// Checked before each step; a step already running finishes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a sweep ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SweepStatus {
    Completed,
    Cancelled {
        completed: usize,
    },
    Aborted {
        step: usize,
        wave_magnitude: f64,
        error: String,
    },
}

/// A step omitted under [`FailurePolicy::Skip`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedStep {
    pub step: usize,
    pub wave_magnitude: f64,
    pub error: String,
}

/// Outcome of [`Sweep::run`].
#[derive(Debug, Clone)]
pub struct SweepResult {
    /// Completed records in step order.
    pub records: Vec<DispersionRecord>,
    pub status: SweepStatus,
    pub skipped: Vec<SkippedStep>,
    pub blocks: BlockSymmetry,
    /// Steps whose eigenvectors went through the constraint map.
    pub expanded_steps: usize,
}

struct StepOutput {
    record: DispersionRecord,
    modes: Vec<ModeShape>,
    /// The modes went through the constraint map.
    expanded: bool,
}

/// What has reached the recorder so far.
#[derive(Default)]
struct Emitted {
    records: Vec<DispersionRecord>,
    skipped: Vec<SkippedStep>,
    expanded_steps: usize,
}

/// A validated sweep over borrowed system matrices.
pub struct Sweep<'a> {
    matrices: &'a SystemMatrices,
    constraints: Option<&'a ConstraintMap>,
    config: SweepConfig,
    solver: Box<dyn EigenSolver>,
    blocks: BlockSymmetry,
}

impl<'a> Sweep<'a> {
    /// Validate inputs and prepare a sweep. No step is solved here.
    ///
    /// # Errors
    ///
    /// - [`Error::DimensionMismatch`] if the constraint map does not match
    ///   the reduced size or the wave direction does not match `dimension`.
    /// - [`Error::InvalidConfig`] for `n_eigs` outside `1..=n` or invalid
    ///   range, solver or tolerance settings.
    pub fn new(
        matrices: &'a SystemMatrices,
        constraints: Option<&'a ConstraintMap>,
        config: SweepConfig,
    ) -> Result<Self> {
        let n = matrices.dim();
        config.range.validate()?;
        config.solver.validate()?;

        if let Some(dim) = config.dimension {
            if config.direction.dim() != dim {
                return Err(Error::DimensionMismatch(format!(
                    "wave direction has {} components, problem dimension is {}",
                    config.direction.dim(),
                    dim
                )));
            }
        }
        if config.n_eigs == 0 {
            return Err(Error::InvalidConfig("n_eigs must be positive".into()));
        }
        if config.n_eigs > n {
            return Err(Error::InvalidConfig(format!(
                "requested {} eigenvalues but the system has only {} DOFs",
                config.n_eigs, n
            )));
        }
        if let Some(map) = constraints {
            if map.n_reduced() != n {
                return Err(Error::DimensionMismatch(format!(
                    "constraint map expects {} reduced DOFs, matrices have {}",
                    map.n_reduced(),
                    n
                )));
            }
        }
        for (name, value) in [
            ("symmetry_threshold", config.symmetry_threshold),
            ("clamp_tolerance", config.clamp_tolerance),
        ] {
            if !(value >= 0.0) || !value.is_finite() {
                return Err(Error::InvalidConfig(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        let blocks = BlockSymmetry::of(matrices);
        for name in blocks.violations(config.symmetry_threshold) {
            warn!(check = name, threshold = config.symmetry_threshold, "symmetry check failed");
        }
        info!(
            m = blocks.m.deviation,
            k = blocks.k.deviation,
            s = blocks.s.deviation,
            r = blocks.r.deviation,
            "symmetry checks of real blocks"
        );

        let solver = select_solver(&config.solver, n);
        Ok(Self {
            matrices,
            constraints,
            config,
            solver,
            blocks,
        })
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Block symmetry checks computed at construction.
    pub fn blocks(&self) -> &BlockSymmetry {
        &self.blocks
    }

    pub fn header(&self) -> SweepHeader {
        SweepHeader {
            n_dofs: self.matrices.dim(),
            n_full: self
                .constraints
                .map_or(self.matrices.dim(), ConstraintMap::n_full),
            n_eigs: self.config.n_eigs,
            want_vectors: self.config.want_vectors,
            wave_direction: self.config.direction.clone(),
            magnitudes: self.config.range.magnitudes(),
            solver: self.solver.name().to_string(),
            blocks: self.blocks,
            reference_waves: self.config.reference_waves,
        }
    }

    /// Run every step and feed the results to `recorder`.
    ///
    /// Eigensolver failures follow the configured [`FailurePolicy`]; any
    /// other step error aborts. Both are reported through the returned
    /// status. `Err` is returned only when the recorder itself fails.
    pub fn run(
        &self,
        recorder: &mut dyn Recorder,
        cancel: Option<&CancelToken>,
    ) -> Result<SweepResult> {
        let header = self.header();
        recorder.begin(&header)?;
        let magnitudes = header.magnitudes;
        let cancelled = || cancel.is_some_and(CancelToken::is_cancelled);

        info!(
            steps = magnitudes.len(),
            n_dofs = header.n_dofs,
            n_eigs = self.config.n_eigs,
            solver = %header.solver,
            parallel = self.config.parallel,
            "starting dispersion sweep"
        );

        let mut emitted = Emitted {
            records: Vec::with_capacity(magnitudes.len()),
            ..Emitted::default()
        };
        let mut status = SweepStatus::Completed;

        if self.config.parallel {
            // Lowest failed step under Abort; later steps are not solved.
            let abort_at = AtomicUsize::new(usize::MAX);
            let aborting = self.config.policy == FailurePolicy::Abort;
            let outputs: Vec<Option<Result<StepOutput>>> = magnitudes
                .par_iter()
                .enumerate()
                .map(|(step, &kappa)| {
                    if cancelled() || step > abort_at.load(Ordering::SeqCst) {
                        return None;
                    }
                    let output = self.compute_step(step, kappa);
                    if let Err(err) = &output {
                        if aborting || !err.is_solver_failure() {
                            abort_at.fetch_min(step, Ordering::SeqCst);
                        }
                    }
                    Some(output)
                })
                .collect();

            // A step left out for an earlier failure is never reached here:
            // emission stops at that failure first.
            for (step, output) in outputs.into_iter().enumerate() {
                let Some(output) = output else {
                    status = SweepStatus::Cancelled {
                        completed: emitted.records.len(),
                    };
                    break;
                };
                if let Some(stop) =
                    self.emit(step, magnitudes[step], output, recorder, &mut emitted)?
                {
                    status = stop;
                    break;
                }
            }
        } else {
            for (step, &kappa) in magnitudes.iter().enumerate() {
                if cancelled() {
                    status = SweepStatus::Cancelled {
                        completed: emitted.records.len(),
                    };
                    break;
                }
                let output = self.compute_step(step, kappa);
                if let Some(stop) = self.emit(step, kappa, output, recorder, &mut emitted)? {
                    status = stop;
                    break;
                }
            }
        }

        match &status {
            SweepStatus::Completed => info!(
                records = emitted.records.len(),
                skipped = emitted.skipped.len(),
                "dispersion sweep completed"
            ),
            SweepStatus::Cancelled { completed } => {
                warn!(completed, "dispersion sweep cancelled")
            }
            SweepStatus::Aborted { step, error, .. } => {
                warn!(step, %error, "dispersion sweep aborted")
            }
        }
        recorder.finish(&status)?;

        Ok(SweepResult {
            records: emitted.records,
            status,
            skipped: emitted.skipped,
            blocks: self.blocks,
            expanded_steps: emitted.expanded_steps,
        })
    }

    /// Hand one step's outcome to the recorder. Returns the final status
    /// when the sweep has to stop.
    fn emit(
        &self,
        step: usize,
        kappa: f64,
        output: Result<StepOutput>,
        recorder: &mut dyn Recorder,
        emitted: &mut Emitted,
    ) -> Result<Option<SweepStatus>> {
        match output {
            Ok(StepOutput {
                record,
                modes,
                expanded,
            }) => {
                recorder.record_step(&record)?;
                if self.config.want_vectors {
                    recorder.record_modes(step, &modes)?;
                }
                if expanded {
                    emitted.expanded_steps += 1;
                }
                emitted.records.push(record);
                Ok(None)
            }
            Err(err) if self.config.policy == FailurePolicy::Skip && err.is_solver_failure() => {
                warn!(step, wave_magnitude = kappa, error = %err, "step failed, skipping");
                emitted.skipped.push(SkippedStep {
                    step,
                    wave_magnitude: kappa,
                    error: err.to_string(),
                });
                Ok(None)
            }
            Err(err) => {
                warn!(step, wave_magnitude = kappa, error = %err, "step failed");
                Ok(Some(SweepStatus::Aborted {
                    step,
                    wave_magnitude: kappa,
                    error: err.to_string(),
                }))
            }
        }
    }

    fn compute_step(&self, step: usize, kappa: f64) -> Result<StepOutput> {
        let wave_vector = self.config.direction.wave_vector(kappa);
        debug!(step, wave_magnitude = kappa, ?wave_vector, "assembling step");

        let (a, b) = self.matrices.assemble(kappa)?;
        let hermitian = hermitian_check(&a);
        if hermitian.exceeds(self.config.symmetry_threshold) {
            warn!(
                step,
                deviation = hermitian.deviation,
                relative = hermitian.relative(),
                "A - A^H exceeds symmetry threshold"
            );
        }

        let solution = self
            .solver
            .solve(&a, b, self.config.n_eigs, self.config.want_vectors)?;
        let (frequencies, nan_modes) =
            frequencies(&solution.eigenvalues, self.config.clamp_tolerance);
        if !nan_modes.is_empty() {
            warn!(step, ?nan_modes, "negative eigenvalues give NaN frequencies");
        }

        let expanded = self.config.want_vectors
            && solution.eigenvectors.is_some()
            && self.constraints.is_some();
        let modes = match (&solution.eigenvectors, self.config.want_vectors) {
            (Some(vectors), true) => {
                let full = match self.constraints {
                    Some(map) => map.expand_modes(vectors)?,
                    None => vectors.clone(),
                };
                full.column_iter()
                    .zip(&solution.eigenvalues)
                    .enumerate()
                    .map(|(mode, (column, &eigenvalue))| ModeShape {
                        step,
                        mode,
                        eigenvalue,
                        values: column.iter().copied().collect(),
                    })
                    .collect()
            }
            _ => Vec::new(),
        };

        info!(
            step,
            wave_magnitude = kappa,
            lowest = frequencies.first().copied().unwrap_or(f64::NAN),
            iterations = solution.iterations,
            "step solved"
        );

        Ok(StepOutput {
            record: DispersionRecord {
                step,
                wave_magnitude: kappa,
                wave_vector,
                frequencies,
                eigenvalues: solution.eigenvalues,
                hermitian_deviation: hermitian.deviation,
                reference_frequencies: self.config.reference_waves.map(|w| w.frequencies(kappa)),
                nan_modes,
                iterations: solution.iterations,
            },
            modes,
            expanded,
        })
    }
}

/// ω = √λ with small negative eigenvalues clamped to zero.
///
/// Returns the frequencies and the indices of modes left at NaN.
pub fn frequencies(eigenvalues: &[f64], clamp_tolerance: f64) -> (Vec<f64>, Vec<usize>) {
    let scale = eigenvalues.iter().fold(1.0_f64, |acc, l| acc.max(l.abs()));
    let limit = clamp_tolerance * scale;
    let mut nan_modes = Vec::new();
    let omegas = eigenvalues
        .iter()
        .enumerate()
        .map(|(i, &lambda)| {
            if lambda >= 0.0 {
                lambda.sqrt()
            } else if -lambda <= limit {
                0.0
            } else {
                nan_modes.push(i);
                f64::NAN
            }
        })
        .collect();
    (omegas, nan_modes)
}
