//! Per-component output records
//!
//! Alongside the flat results matrix, every worker keeps an
//! [`OutputSkeleton`]: one [`ComponentRecord`] per sweep input and per active
//! model output, plus the termination status of every case. The skeleton is
//! sized before any case runs and filled in case by case.

use std::collections::BTreeMap;

use crate::model::{ComponentId, Model};
use crate::sampling::SweepParameter;
use crate::status::TerminationCondition;

/// Unit label for components without units
pub const DIMENSIONLESS: &str = "non-dimensional";

/// Metadata and per-case values of one scalar component
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentRecord {
    pub value: Vec<f64>,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    pub units: String,
}

impl ComponentRecord {
    fn for_component<M: Model + ?Sized>(model: &M, id: ComponentId, cases: usize) -> Self {
        let component = model.component(id);
        Self {
            value: vec![0.0; cases],
            lower_bound: component.and_then(|c| c.lower),
            upper_bound: component.and_then(|c| c.upper),
            units: component
                .and_then(|c| c.units.clone())
                .unwrap_or_else(|| DIMENSIONLESS.to_string()),
        }
    }
}

/// Structured results keyed by component name
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutputSkeleton {
    pub sweep_params: BTreeMap<String, ComponentRecord>,
    pub outputs: BTreeMap<String, ComponentRecord>,
    pub solve_status: Vec<TerminationCondition>,
}

impl OutputSkeleton {
    /// Number of cases with a recorded status
    pub fn len(&self) -> usize {
        self.solve_status.len()
    }

    pub fn is_empty(&self) -> bool {
        self.solve_status.is_empty()
    }

    /// All records, inputs first, each group in name order.
    ///
    /// Workers sweeping the same model see the same sequence, which is what
    /// lets the aggregator gather leaf by leaf.
    pub fn leaves(&self) -> impl Iterator<Item = (&str, &ComponentRecord)> {
        self.sweep_params
            .iter()
            .chain(self.outputs.iter())
            .map(|(name, record)| (name.as_str(), record))
    }

    pub fn leaves_mut(&mut self) -> impl Iterator<Item = (&str, &mut ComponentRecord)> {
        self.sweep_params
            .iter_mut()
            .chain(self.outputs.iter_mut())
            .map(|(name, record)| (name.as_str(), record))
    }
}

/// Display name of a sweep input: its model component name when known
fn input_name<M: Model + ?Sized>(model: &M, param: &SweepParameter) -> String {
    model
        .component(param.target)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| param.name.clone())
}

/// A worker's skeleton plus the handles needed to fill it
#[derive(Debug, Clone)]
pub struct LocalSkeleton {
    skeleton: OutputSkeleton,
    inputs: Vec<(String, ComponentId)>,
    outputs: Vec<(String, ComponentId)>,
}

impl LocalSkeleton {
    /// Size a skeleton for `cases` local cases.
    ///
    /// Outputs are whatever the model reports as active right now.
    pub fn new<M: Model + ?Sized>(model: &M, params: &[SweepParameter], cases: usize) -> Self {
        let inputs: Vec<(String, ComponentId)> = params
            .iter()
            .map(|p| (input_name(model, p), p.target))
            .collect();
        let outputs = model.list_outputs();

        let mut skeleton = OutputSkeleton::default();
        for (name, id) in &inputs {
            skeleton
                .sweep_params
                .insert(name.clone(), ComponentRecord::for_component(model, *id, cases));
        }
        for (name, id) in &outputs {
            skeleton
                .outputs
                .insert(name.clone(), ComponentRecord::for_component(model, *id, cases));
        }
        skeleton.solve_status.reserve(cases);

        Self {
            skeleton,
            inputs,
            outputs,
        }
    }

    /// Record the model state after case `case` finished with `status`.
    ///
    /// Inputs are always captured. Outputs are captured for optimal cases;
    /// otherwise they become NaN, except outputs that are also sweep inputs.
    pub fn capture_case<M: Model + ?Sized>(
        &mut self,
        model: &M,
        case: usize,
        status: TerminationCondition,
    ) {
        let value_of = |id: ComponentId| model.value(id).unwrap_or(f64::NAN);

        for (name, id) in &self.inputs {
            if let Some(record) = self.skeleton.sweep_params.get_mut(name) {
                record.value[case] = value_of(*id);
            }
        }

        let optimal = status.is_optimal();
        for (name, id) in &self.outputs {
            let Some(record) = self.skeleton.outputs.get_mut(name) else {
                continue;
            };
            record.value[case] = if optimal || self.skeleton.sweep_params.contains_key(name) {
                value_of(*id)
            } else {
                f64::NAN
            };
        }

        self.skeleton.solve_status.push(status);
    }

    pub fn skeleton(&self) -> &OutputSkeleton {
        &self.skeleton
    }

    pub fn into_skeleton(self) -> OutputSkeleton {
        self.skeleton
    }
}
