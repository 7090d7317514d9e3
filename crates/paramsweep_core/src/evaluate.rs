//! Per-worker evaluation loop
//!
//! Each worker walks its own chunk of the combination array in order, applies
//! the case to the model, runs the evaluate hook and records the outcome. A
//! failed case never aborts the loop; it is recorded as a NaN row and a
//! non-optimal status.

use tracing::{debug, warn};

use crate::error::{ConfigError, Result};
use crate::interpolate::ScatteredInterpolator;
use crate::matrix::Matrix;
use crate::model::{ComponentId, ComponentKind, HookOptions, Model, SolveOutcome};
use crate::partition::LocalChunk;
use crate::sampling::SweepParameter;
use crate::skeleton::{LocalSkeleton, OutputSkeleton};
use crate::status::TerminationCondition;

/// Runs the model and reports how it terminated
pub type OptimizeHook<'a, M> = Box<dyn FnMut(&mut M, &HookOptions) -> SolveOutcome + 'a>;

/// Puts the model back into a state from which it can be solved
pub type ReinitializeHook<'a, M> = Box<dyn FnMut(&mut M, &HookOptions) + 'a>;

/// User-supplied hooks for one sweep
pub struct SweepHooks<'a, M> {
    /// Defaults to [`Model::solve`]
    pub optimize: Option<OptimizeHook<'a, M>>,
    pub reinitialize: Option<ReinitializeHook<'a, M>>,
    /// Kernel for filling failed cases; defaults to
    /// [`LinearSimplexInterpolator`](crate::interpolate::LinearSimplexInterpolator)
    pub interpolator: Option<Box<dyn ScatteredInterpolator + 'a>>,
}

impl<M> Default for SweepHooks<'_, M> {
    fn default() -> Self {
        Self {
            optimize: None,
            reinitialize: None,
            interpolator: None,
        }
    }
}

impl<'a, M> SweepHooks<'a, M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_optimize<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut M, &HookOptions) -> SolveOutcome + 'a,
    {
        self.optimize = Some(Box::new(f));
        self
    }

    pub fn with_reinitialize<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut M, &HookOptions) + 'a,
    {
        self.reinitialize = Some(Box::new(f));
        self
    }

    pub fn with_interpolator(mut self, kernel: impl ScatteredInterpolator + 'a) -> Self {
        self.interpolator = Some(Box::new(kernel));
        self
    }
}

impl<M> std::fmt::Debug for SweepHooks<'_, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SweepHooks")
            .field("optimize", &self.optimize.is_some())
            .field("reinitialize", &self.reinitialize.is_some())
            .field("interpolator", &self.interpolator.is_some())
            .finish()
    }
}

/// Hook settings taken from the sweep options
#[derive(Debug, Clone, Copy)]
pub struct EvaluationSettings<'o> {
    pub optimize_options: &'o HookOptions,
    pub reinitialize_options: &'o HookOptions,
    pub reinitialize_before_sweep: bool,
}

/// A tracked output column
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    /// Column header in the results table
    pub name: String,
    pub target: ComponentId,
}

impl OutputSpec {
    /// Resolve `target` on `model`. Indexed objects must have exactly one member.
    pub fn new<M: Model + ?Sized>(
        model: &M,
        name: impl Into<String>,
        target: &str,
    ) -> std::result::Result<Self, ConfigError> {
        match model.resolve(target).as_deref() {
            Some([id]) => Ok(Self {
                name: name.into(),
                target: *id,
            }),
            _ => Err(ConfigError::UnknownOutput(target.to_string())),
        }
    }
}

/// What one worker produced for its chunk
#[derive(Debug, Clone)]
pub struct LocalEvaluation {
    /// Local cases × tracked outputs, NaN rows for failed cases
    pub results: Matrix,
    pub skeleton: OutputSkeleton,
    /// Local cases whose final status is not `optimal`
    pub fail_count: usize,
}

/// Write one case into the model: variables are fixed, parameters are set
pub fn apply_case<M: Model + ?Sized>(model: &mut M, params: &[SweepParameter], values: &[f64]) {
    for (param, &value) in params.iter().zip(values) {
        match model.component(param.target).map(|c| c.kind) {
            Some(ComponentKind::Parameter) => model.set_value(param.target, value),
            _ => model.fix(param.target, value),
        }
    }
}

fn record_outputs<M: Model + ?Sized>(model: &M, outputs: &[OutputSpec], row: &mut [f64]) {
    for (slot, output) in row.iter_mut().zip(outputs) {
        *slot = model.value(output.target).unwrap_or(f64::NAN);
    }
}

/// Evaluate every case of `chunk` in row order.
pub fn evaluate_chunk<M: Model>(
    model: &mut M,
    params: &[SweepParameter],
    outputs: &[OutputSpec],
    chunk: &LocalChunk,
    hooks: &mut SweepHooks<'_, M>,
    settings: EvaluationSettings<'_>,
) -> Result<LocalEvaluation> {
    if settings.reinitialize_before_sweep && hooks.reinitialize.is_none() {
        return Err(ConfigError::MissingReinitializer.into());
    }

    let cases = chunk.len();
    let mut results = Matrix::zeros(cases, outputs.len());
    let mut skeleton = LocalSkeleton::new(model, params, cases);

    let mut optimize = |model: &mut M| match hooks.optimize.as_mut() {
        Some(f) => f(model, settings.optimize_options),
        None => model.solve(settings.optimize_options),
    };

    for k in 0..cases {
        apply_case(model, params, chunk.values.row(k));

        if settings.reinitialize_before_sweep {
            if let Some(reinit) = hooks.reinitialize.as_mut() {
                reinit(model, settings.reinitialize_options);
            }
        }

        let mut outcome = optimize(model);
        if outcome.is_optimal() {
            record_outputs(model, outputs, results.row_mut(k));
        } else {
            results.row_mut(k).fill(f64::NAN);

            if !settings.reinitialize_before_sweep {
                if let Some(reinit) = hooks.reinitialize.as_mut() {
                    debug!(case = chunk.range.start + k, status = %outcome.termination_condition, "retrying after reinitialize");
                    reinit(model, settings.reinitialize_options);
                    outcome = optimize(model);
                    if outcome.is_optimal() {
                        record_outputs(model, outputs, results.row_mut(k));
                    }
                }
            }
        }

        let status = outcome.termination_condition;
        if status.is_optimal() {
            debug!(case = chunk.range.start + k, %status, "case solved");
        } else {
            warn!(
                case = chunk.range.start + k,
                %status,
                message = outcome.message.as_deref().unwrap_or(""),
                "case failed"
            );
        }
        skeleton.capture_case(model, k, status);
    }

    let skeleton = skeleton.into_skeleton();
    let optimal = skeleton
        .solve_status
        .iter()
        .filter(|s| **s == TerminationCondition::Optimal)
        .count();

    Ok(LocalEvaluation {
        results,
        fail_count: cases - optimal,
        skeleton,
    })
}
