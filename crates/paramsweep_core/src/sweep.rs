//! The sweep entry point
//!
//! [`parameter_sweep`] runs the whole pipeline on one worker of a group:
//! build and broadcast the combination array, evaluate the local chunk,
//! aggregate, optionally interpolate failed cases, and persist. Every worker
//! of the group calls it with the same arguments.

use std::ops::Range;
use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregate::{aggregate_results, aggregate_skeleton};
use crate::combinations::build_combinations;
use crate::comm::{Communicator, SerialComm, coordinator_outcome};
use crate::error::{ConfigError, Result};
use crate::evaluate::{EvaluationSettings, OutputSpec, SweepHooks, evaluate_chunk};
use crate::interpolate::{LinearSimplexInterpolator, interp_nan_values};
use crate::matrix::Matrix;
use crate::model::{HookOptions, Model};
use crate::partition::local_chunk;
use crate::persist::{
    DEBUG_DELIMITER, GlobalArtifacts, TextSummary, debug_dump_path, ensure_dir,
    write_global_artifacts, write_table,
};
use crate::sampling::{SweepParameter, classify_parameters};
use crate::skeleton::OutputSkeleton;

/// Options for one sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepOptions {
    /// Results table; nothing global is written without it
    pub csv_results_file: Option<PathBuf>,
    /// Base name of the structured artifact and text summary
    pub results_fname: String,
    /// Passed to the evaluate hook
    pub optimize_options: HookOptions,
    /// Passed to the reinitialize hook
    pub reinitialize_options: HookOptions,
    /// Reinitialize before every case instead of only after a failure
    pub reinitialize_before_sweep: bool,
    /// Directory for per-worker `local_results_<rank>.csv` dumps
    pub debugging_data_dir: Option<PathBuf>,
    pub interpolate_nan_outputs: bool,
    /// Required for random and Latin-Hypercube sampling
    pub num_samples: Option<usize>,
    /// Seed for random sampling; drawn from the OS when absent
    pub seed: Option<u64>,
    pub write_artifact: bool,
    /// `None` skips the text summary
    pub text_summary: Option<TextSummary>,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            csv_results_file: None,
            results_fname: "output_dict".to_string(),
            optimize_options: HookOptions::new(),
            reinitialize_options: HookOptions::new(),
            reinitialize_before_sweep: false,
            debugging_data_dir: None,
            interpolate_nan_outputs: false,
            num_samples: None,
            seed: None,
            write_artifact: true,
            text_summary: Some(TextSummary::Keys),
        }
    }
}

impl SweepOptions {
    pub fn with_csv_results_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.csv_results_file = Some(path.into());
        self
    }

    pub fn with_num_samples(mut self, num_samples: usize) -> Self {
        self.num_samples = Some(num_samples);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_interpolation(mut self, enabled: bool) -> Self {
        self.interpolate_nan_outputs = enabled;
        self
    }

    pub fn with_debugging_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debugging_data_dir = Some(dir.into());
        self
    }

    fn evaluation_settings(&self) -> EvaluationSettings<'_> {
        EvaluationSettings {
            optimize_options: &self.optimize_options,
            reinitialize_options: &self.reinitialize_options,
            reinitialize_before_sweep: self.reinitialize_before_sweep,
        }
    }
}

/// What a sweep returns on one worker
#[derive(Debug, Clone)]
pub struct SweepResults {
    /// Parameter names followed by output names
    pub header: Vec<String>,
    /// `[inputs | outputs]`, one row per case, identical on every worker
    pub table: Matrix,
    /// `table` with failed cases interpolated; coordinator only
    pub interpolated: Option<Matrix>,
    /// Global skeleton on the coordinator, the local one elsewhere
    pub skeleton: OutputSkeleton,
    /// Failed cases in this worker's chunk
    pub fail_count: usize,
    /// Global rows this worker evaluated
    pub local_range: Range<usize>,
}

impl SweepResults {
    /// Column of `table` under the given header name
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let j = self.header.iter().position(|h| h == name)?;
        Some(self.table.column(j))
    }
}

fn create_output_dirs(options: &SweepOptions) -> Result<()> {
    if let Some(csv) = &options.csv_results_file {
        ensure_dir(csv.parent().unwrap_or_else(|| Path::new("")))?;
    }
    if let Some(dir) = &options.debugging_data_dir {
        ensure_dir(dir)?;
    }
    Ok(())
}

/// Run a parameter sweep on this worker.
///
/// `comm` defaults to a single-worker group. Failed cases do not fail the
/// sweep; only configuration, shape, communication and persistence errors do,
/// and those are raised before any global file is written.
pub fn parameter_sweep<M: Model>(
    model: &mut M,
    sweep_params: &[SweepParameter],
    outputs: &[OutputSpec],
    options: &SweepOptions,
    mut hooks: SweepHooks<'_, M>,
    comm: Option<&dyn Communicator>,
) -> Result<SweepResults> {
    let serial = SerialComm;
    let comm = comm.unwrap_or(&serial);

    let category = classify_parameters(sweep_params)?;
    if options.reinitialize_before_sweep && hooks.reinitialize.is_none() {
        return Err(ConfigError::MissingReinitializer.into());
    }

    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let combos = build_combinations(sweep_params, category, options.num_samples, &mut rng, comm)?;
    let total = combos.rows();

    let chunk = local_chunk(&combos, comm.rank(), comm.size())?;
    info!(
        rank = comm.rank(),
        workers = comm.size(),
        first = chunk.range.start,
        cases = chunk.len(),
        "evaluating local chunk"
    );

    let local = evaluate_chunk(
        model,
        sweep_params,
        outputs,
        &chunk,
        &mut hooks,
        options.evaluation_settings(),
    )?;
    if local.fail_count > 0 {
        info!(rank = comm.rank(), failed = local.fail_count, "local chunk finished with failures");
    }

    let global_results = if comm.size() > 1 {
        aggregate_results(&local.results, total, comm)?
    } else {
        local.results.clone()
    };

    let skeleton = if comm.size() > 1 {
        aggregate_skeleton(local.skeleton, total, comm)
    } else {
        Ok(local.skeleton)
    };

    // Coordinator-only work; its outcome doubles as the barrier after
    // directory creation.
    let prepared = skeleton.and_then(|skeleton| {
        if !comm.is_coordinator() {
            return Ok((skeleton, None));
        }
        let interpolated = if options.interpolate_nan_outputs {
            let default_kernel = LinearSimplexInterpolator::default();
            let kernel = hooks.interpolator.as_deref().unwrap_or(&default_kernel);
            Some(interp_nan_values(&combos, &global_results, kernel)?)
        } else {
            None
        };
        create_output_dirs(options)?;
        Ok((skeleton, interpolated))
    });
    let (skeleton, interpolated) = coordinator_outcome(comm, prepared)?;

    let header: Vec<String> = sweep_params
        .iter()
        .map(|p| p.name.clone())
        .chain(outputs.iter().map(|o| o.name.clone()))
        .collect();

    if let Some(dir) = &options.debugging_data_dir {
        let local_table = chunk.values.hstack(&local.results)?;
        write_table(&debug_dump_path(dir, comm.rank()), &header, &local_table, DEBUG_DELIMITER)?;
    }

    let table = combos.hstack(&global_results)?;
    let interpolated = interpolated
        .map(|clean| combos.hstack(&clean))
        .transpose()?;

    if comm.is_coordinator() {
        if let Some(csv) = &options.csv_results_file {
            write_global_artifacts(&GlobalArtifacts {
                csv_results_file: csv,
                results_fname: &options.results_fname,
                header: &header,
                table: &table,
                interpolated: interpolated.as_ref(),
                skeleton: &skeleton,
                write_artifact: options.write_artifact,
                text_summary: options.text_summary,
            })?;
        }
    }

    Ok(SweepResults {
        header,
        table,
        interpolated,
        skeleton,
        fail_count: local.fail_count,
        local_range: chunk.range,
    })
}
