//! One CLI run: load inputs, sweep, write results.

use anyhow::{Context, Result};
use tracing::{info, warn};

use wavedisp_core::io::{load_constraint_map, load_system};
use wavedisp_core::{Sweep, SweepResult, SweepStatus};

use crate::config::RunConfig;
use crate::output::{clear_outputs, FileRecorder};

/// Result of a finished run.
#[derive(Debug)]
pub struct RunOutcome {
    pub result: SweepResult,
}

impl RunOutcome {
    /// Whether every step was computed or skipped by policy.
    pub fn is_success(&self) -> bool {
        self.result.status == SweepStatus::Completed
    }
}

/// Execute the run described by `config`.
///
/// Input and configuration errors are returned before any step is solved.
/// A sweep that stops early still leaves its completed records on disk and
/// is reported through [`RunOutcome`].
pub fn run(config: &RunConfig) -> Result<RunOutcome> {
    let files = &config.matrices;
    let system = load_system(&files.k, &files.m, &files.s, &files.r)
        .context("loading system matrices")?;
    let constraints = files
        .constraints
        .as_deref()
        .map(load_constraint_map)
        .transpose()
        .context("loading constraint map")?;
    info!(
        n_dofs = system.dim(),
        n_full = constraints.as_ref().map_or(system.dim(), |map| map.n_full()),
        "loaded cell matrices"
    );

    let sweep_config = config.sweep_config()?;
    let sweep = Sweep::new(&system, constraints.as_ref(), sweep_config)?;

    let dir = &config.output.dir;
    if config.output.clear {
        let removed = clear_outputs(dir)
            .with_context(|| format!("clearing {}", dir.display()))?;
        info!(removed, dir = %dir.display(), "removed previous results");
    }
    let mut recorder = FileRecorder::new(dir.as_path())
        .with_context(|| format!("creating output directory {}", dir.display()))?;
    recorder.write_options(&config.to_toml()?)?;

    let result = sweep.run(&mut recorder, None)?;
    if !result.skipped.is_empty() {
        warn!(skipped = result.skipped.len(), "some wave numbers were skipped");
        recorder.set_skipped(result.skipped.clone());
        recorder.write_summary(&result.status)?;
    }

    Ok(RunOutcome { result })
}
