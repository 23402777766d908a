//! Run configuration.
//!
//! A run is described by a TOML file whose sections all have defaults, so
//! an empty file (or no file) describes the default run: matrices `K.mtx`,
//! `M.mtx`, `S.mtx` and `R.mtx` in the working directory, ten wave numbers
//! from 10 to 100 along x and the six lowest eigenpairs.
//!
//! ```toml
//! [matrices]
//! constraints = "map.json"
//!
//! [wave]
//! start = 0.0
//! stop = 3.14
//! count = 40
//! direction = [1.0, 1.0]
//!
//! [sweep]
//! n_eigs = 8
//! eigs_only = true
//!
//! [units]
//! length = 1e-3
//! ```
//!
//! Wave numbers and material parameters are given in SI units and are
//! converted with the `[units]` multipliers before the sweep.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use wavedisp_core::{
    EigenSolverConfig, FailurePolicy, Material, Phase, Quantity, ReferenceWaves, SweepConfig,
    UnitMultipliers, WaveDirection, WaveRange,
};

use crate::Cli;

// ============================================================================
// Sections
// ============================================================================

/// `[matrices]`: input files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixFiles {
    #[serde(default = "default_k")]
    pub k: PathBuf,
    #[serde(default = "default_m")]
    pub m: PathBuf,
    #[serde(default = "default_s")]
    pub s: PathBuf,
    #[serde(default = "default_r")]
    pub r: PathBuf,
    /// Optional JSON constraint map for mode shape reconstruction.
    #[serde(default)]
    pub constraints: Option<PathBuf>,
}

fn default_k() -> PathBuf {
    PathBuf::from("K.mtx")
}

fn default_m() -> PathBuf {
    PathBuf::from("M.mtx")
}

fn default_s() -> PathBuf {
    PathBuf::from("S.mtx")
}

fn default_r() -> PathBuf {
    PathBuf::from("R.mtx")
}

impl Default for MatrixFiles {
    fn default() -> Self {
        Self {
            k: default_k(),
            m: default_m(),
            s: default_s(),
            r: default_r(),
            constraints: None,
        }
    }
}

impl MatrixFiles {
    /// Resolve relative paths against `base`.
    fn rebase(&mut self, base: &Path) {
        for path in [&mut self.k, &mut self.m, &mut self.s, &mut self.r] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        if let Some(path) = self.constraints.as_mut() {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// `[wave]`: wave-number magnitudes (1/m) and propagation direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveSection {
    #[serde(default = "default_start")]
    pub start: f64,
    #[serde(default = "default_stop")]
    pub stop: f64,
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default = "default_direction")]
    pub direction: Vec<f64>,
    /// Spatial dimension of the cell. When set, only the first `dimension`
    /// direction components are used.
    #[serde(default)]
    pub dimension: Option<usize>,
}

fn default_start() -> f64 {
    10.0
}

fn default_stop() -> f64 {
    100.0
}

fn default_count() -> usize {
    10
}

fn default_direction() -> Vec<f64> {
    vec![1.0, 0.0, 0.0]
}

impl Default for WaveSection {
    fn default() -> Self {
        Self {
            start: default_start(),
            stop: default_stop(),
            count: default_count(),
            direction: default_direction(),
            dimension: None,
        }
    }
}

/// `[sweep]`: what to compute per step and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSection {
    #[serde(default = "default_n_eigs")]
    pub n_eigs: usize,
    /// Skip eigenvectors and mode shape files.
    #[serde(default)]
    pub eigs_only: bool,
    #[serde(default)]
    pub policy: FailurePolicy,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default = "default_tolerance")]
    pub symmetry_threshold: f64,
    #[serde(default = "default_tolerance")]
    pub clamp_tolerance: f64,
}

fn default_n_eigs() -> usize {
    6
}

fn default_tolerance() -> f64 {
    1e-8
}

impl Default for SweepSection {
    fn default() -> Self {
        Self {
            n_eigs: default_n_eigs(),
            eigs_only: false,
            policy: FailurePolicy::Abort,
            parallel: false,
            symmetry_threshold: default_tolerance(),
            clamp_tolerance: default_tolerance(),
        }
    }
}

/// `[materials]`: phases averaged into the reference medium.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialsSection {
    /// Log ω_p and ω_s of the averaged medium with every step.
    #[serde(default)]
    pub log_std_waves: bool,
    #[serde(default = "default_phases")]
    pub phases: Vec<Phase>,
}

fn default_phases() -> Vec<Phase> {
    vec![
        Phase::new(Material::aluminium(), 1.0),
        Phase::new(Material::epoxy(), 1.0),
    ]
}

impl Default for MaterialsSection {
    fn default() -> Self {
        Self {
            log_std_waves: false,
            phases: default_phases(),
        }
    }
}

/// `[output]`: where results go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSection {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    /// Remove results of a previous run before starting.
    #[serde(default)]
    pub clear: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            clear: false,
        }
    }
}

// ============================================================================
// Run configuration
// ============================================================================

/// Complete configuration of one CLI run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub matrices: MatrixFiles,
    #[serde(default)]
    pub wave: WaveSection,
    #[serde(default)]
    pub eigensolver: EigenSolverConfig,
    #[serde(default)]
    pub sweep: SweepSection,
    #[serde(default)]
    pub units: UnitMultipliers,
    #[serde(default)]
    pub materials: MaterialsSection,
    #[serde(default)]
    pub output: OutputSection,
}

impl RunConfig {
    /// Load configuration from a TOML file.
    ///
    /// Relative matrix paths are taken relative to the file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config = Self::from_toml(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.matrices.rebase(base);
        }
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(s: &str) -> Result<Self> {
        let config: RunConfig = toml::from_str(s)?;
        Ok(config)
    }

    /// Configuration file named by `--config` (or defaults) with the
    /// command-line overrides applied.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(cli);
        Ok(config)
    }

    /// Command-line flags take precedence over the file.
    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(range) = cli.wave_range {
            self.wave.start = range.start;
            self.wave.stop = range.stop;
            self.wave.count = range.count;
        }
        if let Some(direction) = &cli.wave_dir {
            self.wave.direction = direction.clone();
        }
        if let Some(n) = cli.n_eigs {
            self.sweep.n_eigs = n;
        }
        if cli.eigs_only {
            self.sweep.eigs_only = true;
        }
        if cli.parallel {
            self.sweep.parallel = true;
        }
        if let Some(dir) = &cli.output_dir {
            self.output.dir = dir.clone();
        }
        if cli.clear {
            self.output.clear = true;
        }
        if cli.log_std_waves {
            self.materials.log_std_waves = true;
        }
    }

    /// Wave-number range in scaled units.
    pub fn wave_range(&self) -> Result<WaveRange> {
        let factor = self.units.factor(Quantity::WaveNumber);
        let range = WaveRange::new(
            self.wave.start * factor,
            self.wave.stop * factor,
            self.wave.count,
        )?;
        Ok(range)
    }

    pub fn wave_direction(&self) -> Result<WaveDirection> {
        let direction = match self.wave.dimension {
            Some(dim) => WaveDirection::for_dimension(&self.wave.direction, dim)?,
            None => WaveDirection::new(&self.wave.direction)?,
        };
        Ok(direction)
    }

    /// Wave speeds of the averaged medium in scaled units, when requested.
    pub fn reference_waves(&self) -> Result<Option<ReferenceWaves>> {
        if !self.materials.log_std_waves {
            return Ok(None);
        }
        let phases: Vec<Phase> = self
            .materials
            .phases
            .iter()
            .map(|phase| Phase::new(phase.material.in_units(&self.units), phase.fraction))
            .collect();
        let waves = ReferenceWaves::from_phases(&phases).context("[materials]")?;
        Ok(Some(waves))
    }

    /// Sweep configuration for the core library.
    pub fn sweep_config(&self) -> Result<SweepConfig> {
        self.units.validate().context("[units]")?;
        if !self.units.is_identity() {
            info!(
                time = self.units.time,
                length = self.units.length,
                mass = self.units.mass,
                "scaling wave numbers and materials by unit multipliers"
            );
        }
        let mut config = SweepConfig::new(
            self.wave_range().context("[wave]")?,
            self.wave_direction().context("[wave]")?,
            self.sweep.n_eigs,
        );
        config.dimension = self.wave.dimension;
        config.want_vectors = !self.sweep.eigs_only;
        config.solver = self.eigensolver.clone();
        config.policy = self.sweep.policy;
        config.parallel = self.sweep.parallel;
        config.symmetry_threshold = self.sweep.symmetry_threshold;
        config.clamp_tolerance = self.sweep.clamp_tolerance;
        config.reference_waves = self.reference_waves()?;
        Ok(config)
    }

    /// Effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
