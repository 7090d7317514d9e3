//! Command-line front end for the parameter sweep engine
//!
//! Loads a YAML sweep description, builds one of the demonstration models on
//! every worker and runs the sweep over an in-process worker group.

pub mod config;
pub mod logging;
pub mod models;
pub mod run;

pub use config::SweepFile;
pub use logging::init_logging;
pub use models::DemoModel;
pub use run::{RunSummary, run_sweep};
