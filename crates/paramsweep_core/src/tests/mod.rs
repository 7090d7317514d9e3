//! Scenario tests for the sweep engine
//!
//! Tests are organized by topic:
//! - `sweeps` - End-to-end serial sweeps, failures and configuration errors
//! - `distributed` - Worker groups of different sizes agree with the serial run
//! - `persistence` - Files written by a sweep and read back
//! - `interpolation` - Filling failed cases after a sweep

mod distributed;
mod persistence;

use crate::evaluate::OutputSpec;
use crate::matrix::Matrix;
use crate::model::AnalyticModel;
use crate::sampling::{SamplingSpec, SweepParameter};
use crate::skeleton::OutputSkeleton;

/// Small desalination-style cost model.
///
/// Recovery above 0.8 is rejected by a feasibility check.
pub(crate) fn cost_model() -> AnalyticModel {
    let mut m = AnalyticModel::new();
    let recovery = m.add_variable("recovery", 0.5);
    m.set_bounds(recovery, Some(0.0), Some(1.0));
    let price = m.add_parameter("membrane_cost", 30.0);
    m.set_units(price, "USD/m^2");
    let area = m.add_derived("area", |v| 100.0 / (1.0 - v.get("recovery")));
    m.set_units(area, "m^2");
    m.add_expression("capex", |v| v.get("area") * v.get("membrane_cost"));
    m.add_objective("lcow", |v| v.get("capex") / 1000.0 + 0.1 * v.get("recovery"));
    m.add_check("recovery limit", |v| v.get("recovery") <= 0.8);
    m
}

pub(crate) fn lcow(recovery: f64, membrane_cost: f64) -> f64 {
    100.0 / (1.0 - recovery) * membrane_cost / 1000.0 + 0.1 * recovery
}

pub(crate) fn sweep_setup(
    model: &AnalyticModel,
    recovery: impl Into<SamplingSpec>,
    membrane_cost: impl Into<SamplingSpec>,
) -> (Vec<SweepParameter>, Vec<OutputSpec>) {
    let params = vec![
        SweepParameter::new(model, "recovery", "recovery", recovery).unwrap(),
        SweepParameter::new(model, "cost", "membrane_cost", membrane_cost).unwrap(),
    ];
    let outputs = vec![
        OutputSpec::new(model, "lcow", "lcow").unwrap(),
        OutputSpec::new(model, "area", "area").unwrap(),
    ];
    (params, outputs)
}

fn same(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || a == b
}

/// Element-wise equality where NaN equals NaN
pub(crate) fn assert_same_matrix(a: &Matrix, b: &Matrix) {
    assert_eq!((a.rows(), a.cols()), (b.rows(), b.cols()));
    for (i, (x, y)) in a.data().iter().zip(b.data()).enumerate() {
        assert!(same(*x, *y), "element {i}: {x} != {y}");
    }
}

pub(crate) fn assert_same_skeleton(a: &OutputSkeleton, b: &OutputSkeleton) {
    assert_eq!(a.solve_status, b.solve_status);
    let names_a: Vec<&str> = a.leaves().map(|(n, _)| n).collect();
    let names_b: Vec<&str> = b.leaves().map(|(n, _)| n).collect();
    assert_eq!(names_a, names_b);
    for ((name, x), (_, y)) in a.leaves().zip(b.leaves()) {
        assert_eq!(x.lower_bound, y.lower_bound, "{name}");
        assert_eq!(x.upper_bound, y.upper_bound, "{name}");
        assert_eq!(x.units, y.units, "{name}");
        assert_eq!(x.value.len(), y.value.len(), "{name}");
        for (u, v) in x.value.iter().zip(&y.value) {
            assert!(same(*u, *v), "{name}: {u} != {v}");
        }
    }
}
