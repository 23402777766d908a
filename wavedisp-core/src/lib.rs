//! wavedisp core - dispersion analysis of periodic elastic cells
//!
//! Computes the dispersion relation ω(κ) of elastic waves in a periodic
//! heterogeneous medium from four precomputed cell matrices:
//! - Bloch system assembly `A(κ) = K + κ²S + iκR`
//! - Symmetry diagnostics of the blocks and of A
//! - Generalized Hermitian eigensolvers (shift-invert Lanczos, dense)
//! - Reconstruction of full-space mode shapes from reduced DOFs
//! - Ordered, optionally parallel sweeps over wave-number magnitudes
//!
//! # Architecture
//!
//! - [`SystemMatrices`]: the validated K, M, S, R blocks
//! - [`EigenSolver`] trait: generalized eigensolve strategies
//! - [`ConstraintMap`]: reduced-to-full DOF expansion
//! - [`Sweep`]: drives the per-step pipeline
//! - [`Recorder`] trait: receives records in step order

pub mod types;
pub mod sparse;
pub mod assembly;
pub mod symmetry;
pub mod eigen;
pub mod reconstruct;
pub mod sweep;
pub mod recorder;
pub mod material;
pub mod units;
pub mod io;
pub mod error;

pub use types::{Complex64, WaveDirection, WaveRange};
pub use sparse::{ComplexCsr, CsrMatrix};
pub use assembly::{assemble, assemble_system, SystemMatrices};
pub use symmetry::{BlockSymmetry, SymmetryReport};
pub use eigen::{select_solver, EigenSolver, EigenSolverConfig, Eigensolution, SolverKind};
pub use reconstruct::{ConstraintMap, DofRule};
pub use sweep::{CancelToken, FailurePolicy, Sweep, SweepConfig, SweepResult, SweepStatus};
pub use recorder::{
    DispersionRecord, MemoryRecorder, ModeShape, NullRecorder, Recorder, SweepHeader,
};
pub use material::{Material, Phase, ReferenceWaves};
pub use units::{Quantity, UnitMultipliers};
pub use error::{Error, Result};
