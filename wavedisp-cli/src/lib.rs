//! wavedisp command-line driver
//!
//! Loads the cell matrices of a periodic elastic medium, sweeps the
//! wave-number range and writes the dispersion results to an output
//! directory.
//!
//! # Usage
//!
//! ```bash
//! # Default run: K.mtx, M.mtx, S.mtx, R.mtx in the working directory
//! wavedisp
//!
//! # Configured run with overrides
//! wavedisp --config run.toml --wave-range 0,3.14,40 --wave-dir 1,1 -n 8 --parallel
//!
//! # Eigenvalues only, fresh output directory
//! wavedisp --eigs-only -o results -c
//! ```

use std::path::PathBuf;

use clap::Parser;
use wavedisp_core::WaveRange;

pub mod config;
pub mod logging;
pub mod output;
pub mod run;

pub use config::RunConfig;
pub use output::FileRecorder;
pub use run::{run, RunOutcome};

/// Dispersion analysis of periodic elastic cells
#[derive(Parser, Debug)]
#[command(name = "wavedisp")]
#[command(author, version, about = "Dispersion analysis of periodic elastic cells")]
pub struct Cli {
    /// Path to a TOML run configuration
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Wave-number range as start,stop,count (1/m)
    #[arg(long, value_parser = parse_wave_range)]
    pub wave_range: Option<WaveRange>,

    /// Wave direction components, e.g. 1,0,0
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub wave_dir: Option<Vec<f64>>,

    /// Number of eigenvalues per wave number
    #[arg(short = 'n', long)]
    pub n_eigs: Option<usize>,

    /// Compute eigenvalues only, without mode shapes
    #[arg(long)]
    pub eigs_only: bool,

    /// Solve wave numbers in parallel
    #[arg(long)]
    pub parallel: bool,

    /// Output directory
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Remove previous results from the output directory
    #[arg(short = 'c', long)]
    pub clear: bool,

    /// Do not log to stdout; output_log.txt is still written
    #[arg(long)]
    pub silent: bool,

    /// Log frequencies of the averaged homogeneous medium
    #[arg(long)]
    pub log_std_waves: bool,
}

fn parse_wave_range(s: &str) -> Result<WaveRange, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [start, stop, count] = parts.as_slice() else {
        return Err(format!("expected start,stop,count, got '{s}'"));
    };
    let start: f64 = start.parse().map_err(|e| format!("start: {e}"))?;
    let stop: f64 = stop.parse().map_err(|e| format!("stop: {e}"))?;
    let count: usize = count.parse().map_err(|e| format!("count: {e}"))?;
    WaveRange::new(start, stop, count).map_err(|e| e.to_string())
}
