//! Running a sweep file over an in-process worker group

use std::path::PathBuf;

use color_eyre::eyre::{bail, eyre};
use paramsweep_core::{
    AnalyticModel, Communicator, HookOptions, SweepHooks, SweepResults, parameter_sweep,
    run_local_group,
};
use tracing::info;

use crate::config::SweepFile;

/// What the coordinator reports once a sweep has finished
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub cases: usize,
    pub workers: usize,
    /// Cases whose final status was not `optimal`, over all workers
    pub failed: usize,
    /// Cases filled in by interpolation
    pub interpolated: usize,
    pub results_file: Option<PathBuf>,
    /// The coordinator's results
    pub results: SweepResults,
}

/// Run `file` with one thread per worker.
///
/// Every worker builds its own model instance. The model's
/// `initialize` is installed as the reinitialize hook.
pub fn run_sweep(file: &SweepFile) -> color_eyre::Result<RunSummary> {
    if file.workers == 0 {
        bail!("workers must be at least 1");
    }
    info!(model = ?file.model, workers = file.workers, "starting sweep");

    let outcomes = run_local_group(file.workers, |comm| {
        let mut model = file.model.build();
        let params = file.sweep_parameters(&model)?;
        let outputs = file.output_specs(&model)?;
        let hooks = SweepHooks::new()
            .with_reinitialize(|m: &mut AnalyticModel, _: &HookOptions| m.initialize());
        parameter_sweep(
            &mut model,
            &params,
            &outputs,
            &file.options,
            hooks,
            Some(comm as &dyn Communicator),
        )
    });

    let mut failed = 0;
    let mut coordinator = None;
    for (rank, outcome) in outcomes.into_iter().enumerate() {
        let results = outcome.map_err(|e| eyre!("worker {rank} failed: {e}"))?;
        failed += results.fail_count;
        if rank == 0 {
            coordinator = Some(results);
        }
    }
    let results = coordinator.ok_or_else(|| eyre!("sweep produced no coordinator results"))?;

    let interpolated = match &results.interpolated {
        Some(filled) => {
            let first_output = file.parameters.len();
            (0..filled.rows())
                .filter(|&i| {
                    results.table.row(i)[first_output].is_nan() && !filled.row(i)[first_output].is_nan()
                })
                .count()
        }
        None => 0,
    };

    let summary = RunSummary {
        cases: results.table.rows(),
        workers: file.workers,
        failed,
        interpolated,
        results_file: file.options.csv_results_file.clone(),
        results,
    };
    info!(
        cases = summary.cases,
        failed = summary.failed,
        interpolated = summary.interpolated,
        "sweep finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use paramsweep_core::read_artifact;

    fn desalination_file(workers: usize, csv: Option<PathBuf>) -> SweepFile {
        let mut file = SweepFile::from_yaml(
            r#"
model: desalination
parameters:
  - name: recovery
    sampling: [0.5, 0.9, 5]
  - name: cost
    target: membrane_cost
    sampling: [20.0, 40.0, 3]
outputs:
  - lcow
  - name: area
    target: membrane_area
options:
  interpolate_nan_outputs: true
"#,
        )
        .unwrap();
        file.apply_overrides(Some(workers), None, csv);
        file
    }

    #[test]
    fn test_run_counts_failures_across_workers() {
        let serial = run_sweep(&desalination_file(1, None)).unwrap();
        // recovery 0.9 exceeds the scaling limit at every cost
        assert_eq!(serial.cases, 15);
        assert_eq!(serial.failed, 3);
        assert_eq!(serial.interpolated, 0);

        let group = run_sweep(&desalination_file(3, None)).unwrap();
        assert_eq!(group.failed, 3);
        let (a, b) = (&group.results.table, &serial.results.table);
        assert_eq!(a.rows(), b.rows());
        for (x, y) in a.data().iter().zip(b.data()) {
            assert!(x == y || (x.is_nan() && y.is_nan()), "{x} vs {y}");
        }
    }

    #[test]
    fn test_run_writes_results() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("sweep.csv");
        let summary = run_sweep(&desalination_file(2, Some(csv.clone()))).unwrap();

        assert_eq!(summary.results_file.as_deref(), Some(csv.as_path()));
        assert!(csv.exists());
        assert!(dir.path().join("interpolated_sweep.csv").exists());
        let skeleton = read_artifact(&dir.path().join("output_dict.json")).unwrap();
        assert_eq!(skeleton.len(), 15);
        assert!(skeleton.outputs.contains_key("pump_power"));
        assert!(skeleton.sweep_params.contains_key("membrane_cost"));
    }

    #[test]
    fn test_bad_target_fails_every_worker() {
        let mut file = desalination_file(2, None);
        file.parameters[1].target = Some("lcow".to_string());
        let err = run_sweep(&file).unwrap_err();
        assert!(err.to_string().contains("worker 0"));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut file = desalination_file(1, None);
        file.workers = 0;
        assert!(run_sweep(&file).is_err());
    }
}
