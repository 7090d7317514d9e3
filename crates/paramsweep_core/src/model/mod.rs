//! The model collaborator.
//!
//! The sweep engine never looks inside a model. Everything it needs (resolving
//! sweep targets, writing inputs, reading outputs, discovering the active
//! outputs and running the default solver) goes through the [`Model`] trait.

mod analytic;
mod ids;

pub use analytic::{AnalyticModel, Values};
pub use ids::ComponentId;

use serde::{Deserialize, Serialize};

use crate::status::TerminationCondition;

/// Keyword options forwarded to the evaluate and reinitialize hooks
pub type HookOptions = serde_json::Map<String, serde_json::Value>;

/// What kind of model object a component is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    /// Decision/state variable; sweeping fixes it
    Variable,
    /// Mutable parameter; sweeping sets its value
    Parameter,
    Expression,
    Objective,
}

/// Static description of a scalar model component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub kind: ComponentKind,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    /// `None` for dimensionless quantities
    pub units: Option<String>,
}

impl Component {
    pub fn new(name: impl Into<String>, kind: ComponentKind) -> Self {
        Self {
            name: name.into(),
            kind,
            lower: None,
            upper: None,
            units: None,
        }
    }

    /// Variables and parameters are the only valid sweep targets
    pub fn is_sweepable(&self) -> bool {
        matches!(self.kind, ComponentKind::Variable | ComponentKind::Parameter)
    }
}

/// Raw result of one evaluate-hook call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveOutcome {
    pub termination_condition: TerminationCondition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SolveOutcome {
    pub fn new(termination_condition: TerminationCondition) -> Self {
        Self {
            termination_condition,
            message: None,
        }
    }

    pub fn optimal() -> Self {
        Self::new(TerminationCondition::Optimal)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_optimal(&self) -> bool {
        self.termination_condition.is_optimal()
    }
}

/// A model that can be swept.
pub trait Model {
    /// Look up a named object. Indexed objects return all of their members;
    /// scalar objects return a single id.
    fn resolve(&self, name: &str) -> Option<Vec<ComponentId>>;

    /// Metadata for a scalar component
    fn component(&self, id: ComponentId) -> Option<&Component>;

    /// Current value, `None` if the component has no value yet
    fn value(&self, id: ComponentId) -> Option<f64>;

    /// Fix a variable at `value`
    fn fix(&mut self, id: ComponentId, value: f64);

    /// Set the value of a parameter
    fn set_value(&mut self, id: ComponentId, value: f64);

    /// All currently active outputs (variables, expressions and objectives)
    fn list_outputs(&self) -> Vec<(String, ComponentId)>;

    /// Run the model's own solver. This is the default evaluate hook.
    fn solve(&mut self, options: &HookOptions) -> SolveOutcome;
}
