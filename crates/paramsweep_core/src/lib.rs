//! Distributed parameter sweep engine
//!
//! Evaluates a model over a grid or a random sample of its inputs, spreading
//! the cases over a fixed group of workers and merging everything back into
//! one globally ordered results table. It supports:
//! - Fixed linear grids (Cartesian product), independent uniform/normal
//!   sampling and joint Latin-Hypercube sampling
//! - Balanced contiguous partitioning over any number of workers
//! - Per-case failure isolation with an optional reinitialize-and-retry hook
//! - Aggregation of results, per-component metadata and solver statuses
//! - Linear interpolation of failed cases from successful neighbours
//! - CSV tables plus a structured JSON artifact, with read-back
//!
//! # Example
//!
//! ```ignore
//! use paramsweep_core::{AnalyticModel, OutputSpec, SweepHooks, SweepOptions, SweepParameter};
//! use paramsweep_core::parameter_sweep;
//!
//! let mut model = AnalyticModel::new();
//! model.add_parameter("flow", 1.0);
//! model.add_expression("cost", |v| 3.0 * v.get("flow"));
//!
//! let params = vec![SweepParameter::new(&model, "flow", "flow", (0.0, 10.0, 11))?];
//! let outputs = vec![OutputSpec::new(&model, "cost", "cost")?];
//! let results = parameter_sweep(
//!     &mut model,
//!     &params,
//!     &outputs,
//!     &SweepOptions::default().with_csv_results_file("out/sweep.csv"),
//!     SweepHooks::new(),
//!     None,
//! )?;
//! ```

#![warn(clippy::all)]

// ============================================================================
// Core modules
// ============================================================================

pub mod aggregate;
pub mod combinations;
pub mod comm;
pub mod error;
pub mod evaluate;
pub mod interpolate;
pub mod partition;
pub mod persist;
pub mod sampling;
pub mod skeleton;
pub mod sweep;

// ============================================================================
// Type definition modules
// ============================================================================

pub mod matrix;
pub mod model;
pub mod status;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use comm::{Communicator, LocalComm, LocalGroup, SerialComm, run_local_group};
pub use error::{Result, SweepError};
pub use evaluate::{OutputSpec, SweepHooks};
pub use interpolate::{LinearSimplexInterpolator, ScatteredInterpolator};
pub use matrix::{CombinationArray, Matrix};
pub use model::{AnalyticModel, ComponentId, HookOptions, Model, SolveOutcome};
pub use persist::{TextSummary, read_artifact, read_table};
pub use sampling::{SamplingCategory, SamplingSpec, SweepParameter};
pub use skeleton::{ComponentRecord, OutputSkeleton};
pub use status::TerminationCondition;
pub use sweep::{SweepOptions, SweepResults, parameter_sweep};
