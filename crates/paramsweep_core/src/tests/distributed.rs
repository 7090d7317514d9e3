//! Worker groups must reproduce the serial sweep exactly
//!
//! Each worker owns its own model instance and hooks, as separate processes
//! would. Whatever the group size, the global table, the coordinator's
//! skeleton and the total failure count match the single-worker run.

use super::{assert_same_matrix, assert_same_skeleton, cost_model, sweep_setup};
use crate::comm::{Communicator, run_local_group};
use crate::evaluate::SweepHooks;
use crate::persist::{DEBUG_DELIMITER, debug_dump_path, read_table};
use crate::sampling::SamplingSpec;
use crate::sweep::{SweepOptions, SweepResults, parameter_sweep};

type Specs = (SamplingSpec, SamplingSpec);

fn grid() -> Specs {
    (
        SamplingSpec::from((0.45, 0.85, 5usize)),
        SamplingSpec::from((20.0, 40.0, 3usize)),
    )
}

fn serial_run(specs: &Specs, options: &SweepOptions) -> SweepResults {
    let mut model = cost_model();
    let (params, outputs) = sweep_setup(&model, specs.0.clone(), specs.1.clone());
    parameter_sweep(&mut model, &params, &outputs, options, SweepHooks::new(), None).unwrap()
}

fn group_run(workers: usize, specs: &Specs, options: &SweepOptions) -> Vec<SweepResults> {
    run_local_group(workers, |comm| {
        let mut model = cost_model();
        let (params, outputs) = sweep_setup(&model, specs.0.clone(), specs.1.clone());
        parameter_sweep(
            &mut model,
            &params,
            &outputs,
            options,
            SweepHooks::new(),
            Some(comm as &dyn Communicator),
        )
        .unwrap()
    })
}

fn assert_matches_serial(serial: &SweepResults, group: &[SweepResults]) {
    let mut next = 0;
    for results in group {
        assert_same_matrix(&results.table, &serial.table);
        assert_eq!(results.header, serial.header);
        assert_eq!(results.local_range.start, next);
        next = results.local_range.end;
    }
    assert_eq!(next, serial.table.rows());

    let failed: usize = group.iter().map(|r| r.fail_count).sum();
    assert_eq!(failed, serial.fail_count);
    assert_same_skeleton(&group[0].skeleton, &serial.skeleton);
}

#[test]
fn test_group_sizes_match_serial_grid() {
    let specs = grid();
    let options = SweepOptions::default();
    let serial = serial_run(&specs, &options);
    assert_eq!(serial.table.rows(), 15);
    assert_eq!(serial.fail_count, 3);

    for workers in [1, 2, 3, 4, 7] {
        let group = group_run(workers, &specs, &options);
        assert_eq!(group.len(), workers);
        assert_matches_serial(&serial, &group);
    }
}

#[test]
fn test_chunks_are_balanced() {
    let group = group_run(4, &grid(), &SweepOptions::default());
    let sizes: Vec<usize> = group.iter().map(|r| r.local_range.len()).collect();
    assert_eq!(sizes, vec![4, 4, 4, 3]);
    // Non-coordinators only hold their own cases
    assert_eq!(group[3].skeleton.len(), 3);
}

#[test]
fn test_seeded_random_sweep_matches_serial() {
    let specs = (
        SamplingSpec::Uniform {
            lower: 0.6,
            upper: 0.95,
        },
        SamplingSpec::Normal {
            mean: 30.0,
            sd: 5.0,
        },
    );
    let options = SweepOptions::default().with_num_samples(11).with_seed(2024);
    let serial = serial_run(&specs, &options);

    for workers in [2, 3] {
        assert_matches_serial(&serial, &group_run(workers, &specs, &options));
    }
}

#[test]
fn test_unseeded_group_agrees_on_combinations() {
    let specs = (
        SamplingSpec::LatinHypercube {
            lower: 0.1,
            upper: 0.7,
        },
        SamplingSpec::LatinHypercube {
            lower: 10.0,
            upper: 50.0,
        },
    );
    let options = SweepOptions::default().with_num_samples(9);
    let group = group_run(3, &specs, &options);
    for results in &group[1..] {
        assert_same_matrix(&results.table, &group[0].table);
    }
}

#[test]
fn test_more_workers_than_cases() {
    let specs = (
        SamplingSpec::from((0.5, 0.9, 2usize)),
        SamplingSpec::from((25.0, 25.0, 1usize)),
    );
    let options = SweepOptions::default();
    let serial = serial_run(&specs, &options);
    let group = group_run(5, &specs, &options);

    assert_matches_serial(&serial, &group);
    assert!(group[2..].iter().all(|r| r.local_range.is_empty()));
    assert!(group[4].skeleton.is_empty());
}

#[test]
fn test_debug_dumps_hold_local_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let debug_dir = dir.path().join("debug");
    let options = SweepOptions::default().with_debugging_data_dir(&debug_dir);
    let group = group_run(2, &grid(), &options);

    for (rank, results) in group.iter().enumerate() {
        let path = debug_dump_path(&debug_dir, rank);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# recovery,cost,lcow,area\n"));
        assert!(text.contains(DEBUG_DELIMITER));

        let (header, local) = read_table(&path).unwrap();
        assert_eq!(header, results.header);
        assert_eq!(local.rows(), results.local_range.len());
        let expected = results.table.slice_rows(results.local_range.clone());
        for (got, want) in local.data().iter().zip(expected.data()) {
            assert!(
                (got.is_nan() && want.is_nan()) || (got - want).abs() <= 1e-6 * want.abs(),
                "{got} vs {want}"
            );
        }
    }
}
