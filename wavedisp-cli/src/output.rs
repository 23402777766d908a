//! File output of a sweep.
//!
//! Layout of the output directory:
//!
//! - `eigenvalues.csv`: one row per step with κ, the wave vector, λ and ω
//!   of every mode and, when configured, ω_p and ω_s
//! - `eigenshapes-NNN.csv`: mode shapes of step NNN, one row per DOF with
//!   real and imaginary parts of every mode
//! - `options.toml`: the effective run configuration
//! - `summary.json`: final status, symmetry report and skipped steps

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use wavedisp_core::recorder::{DispersionRecord, ModeShape, Recorder, SweepHeader};
use wavedisp_core::sweep::SkippedStep;
use wavedisp_core::{BlockSymmetry, Result, SweepStatus};

pub const EIGENVALUES_FILE: &str = "eigenvalues.csv";
pub const OPTIONS_FILE: &str = "options.toml";
pub const SUMMARY_FILE: &str = "summary.json";
const SHAPES_PREFIX: &str = "eigenshapes-";

/// Name of the mode shape file of `step`.
pub fn eigenshapes_file(step: usize) -> String {
    format!("{SHAPES_PREFIX}{step:03}.csv")
}

/// Remove the files of a previous run from `dir`. Other files are left
/// alone. Returns the number of removed files.
pub fn clear_outputs(dir: &Path) -> std::io::Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let ours = name == EIGENVALUES_FILE
            || name == OPTIONS_FILE
            || name == SUMMARY_FILE
            || (name.starts_with(SHAPES_PREFIX) && name.ends_with(".csv"));
        if ours && entry.file_type()?.is_file() {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    debug!(dir = %dir.display(), removed, "cleared previous outputs");
    Ok(removed)
}

/// Contents of `summary.json`.
#[derive(Debug, Serialize)]
struct Summary<'a> {
    status: &'a SweepStatus,
    records: usize,
    n_dofs: usize,
    n_full: usize,
    solver: &'a str,
    blocks: &'a BlockSymmetry,
    skipped: &'a [SkippedStep],
}

/// [`Recorder`] writing CSV and JSON files into a directory.
pub struct FileRecorder {
    dir: PathBuf,
    eigenvalues: Option<BufWriter<File>>,
    header: Option<SweepHeader>,
    records: usize,
    skipped: Vec<SkippedStep>,
}

impl FileRecorder {
    /// Recorder writing into `dir`, which is created if missing.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            eigenvalues: None,
            header: None,
            records: 0,
            skipped: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Steps to list in the summary as skipped. Set before `finish`.
    pub fn set_skipped(&mut self, skipped: Vec<SkippedStep>) {
        self.skipped = skipped;
    }

    /// Write the effective configuration.
    pub fn write_options(&self, toml: &str) -> Result<()> {
        fs::write(self.dir.join(OPTIONS_FILE), toml)?;
        Ok(())
    }

    /// Write `summary.json`. Called by `finish`; rewritten when the skipped
    /// steps become known afterwards.
    pub fn write_summary(&self, status: &SweepStatus) -> Result<()> {
        let Some(header) = &self.header else {
            return Ok(());
        };
        let summary = Summary {
            status,
            records: self.records,
            n_dofs: header.n_dofs,
            n_full: header.n_full,
            solver: &header.solver,
            blocks: &header.blocks,
            skipped: &self.skipped,
        };
        let mut writer = BufWriter::new(File::create(self.dir.join(SUMMARY_FILE))?);
        serde_json::to_writer_pretty(&mut writer, &summary)?;
        writer.flush()?;
        Ok(())
    }
}

impl Recorder for FileRecorder {
    fn begin(&mut self, header: &SweepHeader) -> Result<()> {
        let mut writer = BufWriter::new(File::create(self.dir.join(EIGENVALUES_FILE))?);
        write!(writer, "step,kappa")?;
        for i in 0..header.wave_direction.dim() {
            write!(writer, ",k{i}")?;
        }
        for i in 0..header.n_eigs {
            write!(writer, ",lambda{i}")?;
        }
        for i in 0..header.n_eigs {
            write!(writer, ",omega{i}")?;
        }
        if header.reference_waves.is_some() {
            write!(writer, ",omega_p,omega_s")?;
        }
        writeln!(writer)?;

        self.eigenvalues = Some(writer);
        self.header = Some(header.clone());
        self.records = 0;
        info!(dir = %self.dir.display(), "writing results");
        Ok(())
    }

    fn record_step(&mut self, record: &DispersionRecord) -> Result<()> {
        let Some(writer) = self.eigenvalues.as_mut() else {
            return Ok(());
        };
        write!(writer, "{},{}", record.step, record.wave_magnitude)?;
        for k in &record.wave_vector {
            write!(writer, ",{k}")?;
        }
        for lambda in &record.eigenvalues {
            write!(writer, ",{lambda}")?;
        }
        for omega in &record.frequencies {
            write!(writer, ",{omega}")?;
        }
        if let Some([wp, ws]) = record.reference_frequencies {
            write!(writer, ",{wp},{ws}")?;
        }
        writeln!(writer)?;
        self.records += 1;
        Ok(())
    }

    fn record_modes(&mut self, step: usize, modes: &[ModeShape]) -> Result<()> {
        if modes.is_empty() {
            return Ok(());
        }
        let path = self.dir.join(eigenshapes_file(step));
        let mut writer = BufWriter::new(File::create(&path)?);

        write!(writer, "dof")?;
        for shape in modes {
            write!(writer, ",mode{0}_re,mode{0}_im", shape.mode)?;
        }
        writeln!(writer)?;

        let n = modes.iter().map(|shape| shape.values.len()).max().unwrap_or(0);
        for dof in 0..n {
            write!(writer, "{dof}")?;
            for shape in modes {
                match shape.values.get(dof) {
                    Some(v) => write!(writer, ",{},{}", v.re, v.im)?,
                    None => write!(writer, ",,")?,
                }
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        debug!(step, path = %path.display(), "wrote mode shapes");
        Ok(())
    }

    fn finish(&mut self, status: &SweepStatus) -> Result<()> {
        if let Some(mut writer) = self.eigenvalues.take() {
            writer.flush()?;
        }
        self.write_summary(status)
    }
}
