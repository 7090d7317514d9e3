//! Files written by a sweep and their read-back

use std::fs;

use super::{assert_same_skeleton, cost_model, sweep_setup};
use crate::comm::{Communicator, run_local_group};
use crate::evaluate::SweepHooks;
use crate::persist::{TextSummary, read_artifact, read_table};
use crate::status::TerminationCondition;
use crate::sweep::{SweepOptions, SweepResults, parameter_sweep};

fn run(options: &SweepOptions) -> SweepResults {
    let mut model = cost_model();
    let (params, outputs) = sweep_setup(&model, (0.5, 0.9, 3usize), (20.0, 40.0, 2usize));
    parameter_sweep(&mut model, &params, &outputs, options, SweepHooks::new(), None).unwrap()
}

fn close(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || (a - b).abs() <= 1e-6 * b.abs()
}

#[test]
fn test_sweep_writes_all_global_files() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("nested").join("run");
    let csv = out.join("sweep.csv");
    let results = run(&SweepOptions::default().with_csv_results_file(&csv));

    assert!(csv.exists());
    assert!(out.join("output_dict.json").exists());
    assert!(out.join("output_dict.txt").exists());
    assert!(!out.join("interpolated_sweep.csv").exists());

    let (header, table) = read_table(&csv).unwrap();
    assert_eq!(header, results.header);
    assert_eq!((table.rows(), table.cols()), (6, 4));
    for (got, want) in table.data().iter().zip(results.table.data()) {
        assert!(close(*got, *want), "{got} vs {want}");
    }
    assert!(fs::read_to_string(&csv).unwrap().lines().nth(5).unwrap().ends_with("nan,nan"));
}

#[test]
fn test_artifact_round_trips_skeleton() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("sweep.csv");
    let results = run(&SweepOptions::default().with_csv_results_file(&csv));

    let restored = read_artifact(&dir.path().join("output_dict.json")).unwrap();
    assert_same_skeleton(&restored, &results.skeleton);
    assert_eq!(restored.solve_status[5], TerminationCondition::Infeasible);
    assert_eq!(restored.outputs["lcow"].lower_bound, None);

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("output_dict.json")).unwrap())
            .unwrap();
    assert_eq!(raw["outputs"]["capex"]["value"][4], serde_json::Value::Null);
    assert_eq!(raw["outputs"]["recovery"]["upper bound"], serde_json::json!(1.0));
    assert_eq!(raw["sweep_params"]["membrane_cost"]["units"], "USD/m^2");
    assert_eq!(raw["solve_status"][0], "optimal");
}

#[test]
fn test_text_summary_lists_keys() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("sweep.csv");
    run(&SweepOptions::default().with_csv_results_file(&csv));

    let text = fs::read_to_string(dir.path().join("output_dict.txt")).unwrap();
    let summary: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(
        summary["sweep_params"],
        serde_json::json!(["membrane_cost", "recovery"])
    );
    assert_eq!(
        summary["outputs"],
        serde_json::json!(["area", "capex", "lcow", "recovery"])
    );
    assert!(summary.get("solve_status").is_none());
}

#[test]
fn test_optional_outputs_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("sweep.csv");
    let mut options = SweepOptions::default().with_csv_results_file(&csv);
    options.write_artifact = false;
    options.text_summary = None;
    options.results_fname = "skeleton".to_string();
    run(&options);

    assert!(csv.exists());
    assert!(!dir.path().join("skeleton.json").exists());
    assert!(!dir.path().join("skeleton.txt").exists());
}

#[test]
fn test_metadata_summary_without_values() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("sweep.csv");
    let mut options = SweepOptions::default().with_csv_results_file(&csv);
    options.text_summary = Some(TextSummary::Metadata);
    run(&options);

    let text = fs::read_to_string(dir.path().join("output_dict.txt")).unwrap();
    let summary: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(summary["outputs"]["area"]["units"], "m^2");
    assert_eq!(summary["outputs"]["lcow"]["units"], "non-dimensional");
    assert!(summary["outputs"]["area"].get("value").is_none());
}

#[test]
fn test_no_files_without_results_path() {
    let dir = tempfile::tempdir().unwrap();
    let options = SweepOptions::default()
        .with_interpolation(true)
        .with_debugging_data_dir(dir.path().join("debug"));
    let results = run(&options);

    // Interpolation still happens in memory
    assert!(results.interpolated.is_some());
    let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
    assert!(dir.path().join("debug").join("local_results_000.csv").exists());
}

#[test]
fn test_group_writes_once_from_coordinator() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("sweep.csv");
    let options = SweepOptions::default()
        .with_csv_results_file(&csv)
        .with_interpolation(true);

    let group = run_local_group(3, |comm| {
        let mut model = cost_model();
        let (params, outputs) = sweep_setup(&model, (0.5, 0.9, 3usize), (20.0, 40.0, 2usize));
        parameter_sweep(
            &mut model,
            &params,
            &outputs,
            &options,
            SweepHooks::new(),
            Some(comm as &dyn Communicator),
        )
        .unwrap()
    });

    assert!(group[0].interpolated.is_some());
    assert!(group[1..].iter().all(|r| r.interpolated.is_none()));

    let restored = read_artifact(&dir.path().join("output_dict.json")).unwrap();
    assert_same_skeleton(&restored, &group[0].skeleton);
    let (_, table) = read_table(&csv).unwrap();
    assert_eq!(table.rows(), 6);
    assert!(dir.path().join("interpolated_sweep.csv").exists());
}
