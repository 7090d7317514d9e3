//! Closed-form reference model
//!
//! `AnalyticModel` holds named scalar components whose derived values are
//! computed by closures. "Solving" evaluates the closures in insertion order
//! and checks bounds and feasibility rules. It is used by the front end's
//! demonstration models and throughout the tests.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use super::{Component, ComponentId, ComponentKind, HookOptions, Model, SolveOutcome};
use crate::status::TerminationCondition;

type Formula = Arc<dyn Fn(&Values<'_>) -> f64 + Send + Sync>;
type Check = Arc<dyn Fn(&Values<'_>) -> bool + Send + Sync>;

/// Read-only view of model values handed to formulas and checks
pub struct Values<'a> {
    index: &'a FxHashMap<String, ComponentId>,
    values: &'a [Option<f64>],
}

impl Values<'_> {
    /// Value of the named component, NaN if unknown or unset
    pub fn get(&self, name: &str) -> f64 {
        self.index
            .get(name)
            .and_then(|id| self.values[id.index()])
            .unwrap_or(f64::NAN)
    }
}

#[derive(Clone)]
struct Entry {
    component: Component,
    initial: Option<f64>,
    fixed: bool,
    active: bool,
    formula: Option<Formula>,
}

#[derive(Clone, Default)]
pub struct AnalyticModel {
    entries: Vec<Entry>,
    values: Vec<Option<f64>>,
    index: FxHashMap<String, ComponentId>,
    groups: FxHashMap<String, Vec<ComponentId>>,
    checks: Vec<(String, Check)>,
}

impl std::fmt::Debug for AnalyticModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticModel")
            .field("components", &self.entries.len())
            .field("checks", &self.checks.len())
            .finish()
    }
}

impl AnalyticModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, component: Component, initial: Option<f64>, formula: Option<Formula>) -> ComponentId {
        let id = ComponentId(self.entries.len() as u32);
        self.index.insert(component.name.clone(), id);
        self.entries.push(Entry {
            component,
            initial,
            fixed: false,
            active: true,
            formula,
        });
        self.values.push(initial);
        id
    }

    /// Free variable with an initial value
    pub fn add_variable(&mut self, name: &str, initial: f64) -> ComponentId {
        self.push(Component::new(name, ComponentKind::Variable), Some(initial), None)
    }

    /// Mutable parameter
    pub fn add_parameter(&mut self, name: &str, value: f64) -> ComponentId {
        self.push(Component::new(name, ComponentKind::Parameter), Some(value), None)
    }

    /// Variable whose value the solver computes from `formula` unless fixed
    pub fn add_derived<F>(&mut self, name: &str, formula: F) -> ComponentId
    where
        F: Fn(&Values<'_>) -> f64 + Send + Sync + 'static,
    {
        self.push(
            Component::new(name, ComponentKind::Variable),
            None,
            Some(Arc::new(formula)),
        )
    }

    pub fn add_expression<F>(&mut self, name: &str, formula: F) -> ComponentId
    where
        F: Fn(&Values<'_>) -> f64 + Send + Sync + 'static,
    {
        self.push(
            Component::new(name, ComponentKind::Expression),
            None,
            Some(Arc::new(formula)),
        )
    }

    pub fn add_objective<F>(&mut self, name: &str, formula: F) -> ComponentId
    where
        F: Fn(&Values<'_>) -> f64 + Send + Sync + 'static,
    {
        self.push(
            Component::new(name, ComponentKind::Objective),
            None,
            Some(Arc::new(formula)),
        )
    }

    /// Indexed variable `name[key]` for each key, resolvable as a group by `name`
    pub fn add_indexed_variable(&mut self, name: &str, keys: &[&str], initial: f64) -> Vec<ComponentId> {
        let ids: Vec<ComponentId> = keys
            .iter()
            .map(|key| self.add_variable(&format!("{name}[{key}]"), initial))
            .collect();
        self.groups.insert(name.to_string(), ids.clone());
        ids
    }

    /// Feasibility rule checked after every solve
    pub fn add_check<F>(&mut self, name: &str, check: F)
    where
        F: Fn(&Values<'_>) -> bool + Send + Sync + 'static,
    {
        self.checks.push((name.to_string(), Arc::new(check)));
    }

    pub fn set_bounds(&mut self, id: ComponentId, lower: Option<f64>, upper: Option<f64>) {
        if let Some(entry) = self.entries.get_mut(id.index()) {
            entry.component.lower = lower;
            entry.component.upper = upper;
        }
    }

    pub fn set_units(&mut self, id: ComponentId, units: &str) {
        if let Some(entry) = self.entries.get_mut(id.index()) {
            entry.component.units = Some(units.to_string());
        }
    }

    /// Exclude a component from output discovery
    pub fn deactivate(&mut self, id: ComponentId) {
        if let Some(entry) = self.entries.get_mut(id.index()) {
            entry.active = false;
        }
    }

    pub fn is_fixed(&self, id: ComponentId) -> bool {
        self.entries.get(id.index()).is_some_and(|e| e.fixed)
    }

    /// Reset every derived value to its initial guess
    pub fn initialize(&mut self) {
        for (entry, value) in self.entries.iter().zip(self.values.iter_mut()) {
            if entry.formula.is_some() && !entry.fixed {
                *value = entry.initial;
            }
        }
    }

    fn view(&self) -> Values<'_> {
        Values {
            index: &self.index,
            values: &self.values,
        }
    }

    fn out_of_bounds(component: &Component, value: f64) -> bool {
        component.lower.is_some_and(|lb| value < lb) || component.upper.is_some_and(|ub| value > ub)
    }
}

impl Model for AnalyticModel {
    fn resolve(&self, name: &str) -> Option<Vec<ComponentId>> {
        if let Some(id) = self.index.get(name) {
            return Some(vec![*id]);
        }
        self.groups.get(name).cloned()
    }

    fn component(&self, id: ComponentId) -> Option<&Component> {
        self.entries.get(id.index()).map(|e| &e.component)
    }

    fn value(&self, id: ComponentId) -> Option<f64> {
        self.values.get(id.index()).copied().flatten()
    }

    fn fix(&mut self, id: ComponentId, value: f64) {
        if let Some(entry) = self.entries.get_mut(id.index()) {
            entry.fixed = true;
            self.values[id.index()] = Some(value);
        }
    }

    fn set_value(&mut self, id: ComponentId, value: f64) {
        if let Some(slot) = self.values.get_mut(id.index()) {
            *slot = Some(value);
        }
    }

    fn list_outputs(&self) -> Vec<(String, ComponentId)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.active && e.component.kind != ComponentKind::Parameter)
            .map(|(i, e)| (e.component.name.clone(), ComponentId(i as u32)))
            .collect()
    }

    fn solve(&mut self, options: &HookOptions) -> SolveOutcome {
        for k in 0..self.entries.len() {
            if self.entries[k].fixed {
                continue;
            }
            let Some(formula) = self.entries[k].formula.clone() else {
                continue;
            };
            let value = formula(&self.view());
            self.values[k] = Some(value);
        }

        let tee = options.get("tee").and_then(|v| v.as_bool()).unwrap_or(false);

        for (entry, value) in self.entries.iter().zip(&self.values) {
            if !entry.active {
                continue;
            }
            let Some(value) = value else {
                continue;
            };
            if !value.is_finite() {
                return SolveOutcome::new(TerminationCondition::Infeasible)
                    .with_message(format!("{} is not finite", entry.component.name));
            }
            if entry.component.kind == ComponentKind::Variable
                && !entry.fixed
                && Self::out_of_bounds(&entry.component, *value)
            {
                return SolveOutcome::new(TerminationCondition::Infeasible)
                    .with_message(format!("{} violates its bounds", entry.component.name));
            }
        }

        let view = self.view();
        for (name, check) in &self.checks {
            if !check(&view) {
                if tee {
                    debug!(check = %name, "feasibility check failed");
                }
                return SolveOutcome::new(TerminationCondition::Infeasible)
                    .with_message(format!("check '{name}' failed"));
            }
        }

        if tee {
            debug!(components = self.entries.len(), "analytic model solved");
        }
        SolveOutcome::optimal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_model() -> (AnalyticModel, ComponentId, ComponentId) {
        let mut m = AnalyticModel::new();
        let x = m.add_variable("x", 1.0);
        let y = m.add_derived("y", |v| v.get("x") * v.get("x"));
        (m, x, y)
    }

    #[test]
    fn test_solve_evaluates_formulas_in_order() {
        let (mut m, x, y) = square_model();
        m.add_expression("z", |v| v.get("y") + 1.0);
        m.fix(x, 3.0);

        let outcome = m.solve(&HookOptions::new());
        assert!(outcome.is_optimal());
        assert_eq!(m.value(y), Some(9.0));
        let z = m.resolve("z").unwrap()[0];
        assert_eq!(m.value(z), Some(10.0));
    }

    #[test]
    fn test_failed_check_is_infeasible() {
        let (mut m, x, _) = square_model();
        m.add_check("small", |v| v.get("y") < 5.0);
        m.fix(x, 3.0);
        let outcome = m.solve(&HookOptions::new());
        assert_eq!(outcome.termination_condition, TerminationCondition::Infeasible);
    }

    #[test]
    fn test_non_finite_value_is_infeasible() {
        let mut m = AnalyticModel::new();
        m.add_parameter("p", 0.0);
        m.add_expression("inv", |v| 1.0 / v.get("p"));
        assert_eq!(
            m.solve(&HookOptions::new()).termination_condition,
            TerminationCondition::Infeasible
        );
    }

    #[test]
    fn test_derived_bounds_are_enforced() {
        let (mut m, x, y) = square_model();
        m.set_bounds(y, None, Some(4.0));
        m.fix(x, 3.0);
        assert!(!m.solve(&HookOptions::new()).is_optimal());
        m.fix(x, 1.5);
        assert!(m.solve(&HookOptions::new()).is_optimal());
    }

    #[test]
    fn test_list_outputs_skips_parameters_and_inactive() {
        let (mut m, _, y) = square_model();
        m.add_parameter("p", 1.0);
        let hidden = m.add_expression("hidden", |_| 0.0);
        m.deactivate(hidden);

        let names: Vec<String> = m.list_outputs().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(m.component(y).unwrap().kind, ComponentKind::Variable);
    }

    #[test]
    fn test_indexed_group_resolution() {
        let mut m = AnalyticModel::new();
        let ids = m.add_indexed_variable("flow", &["a", "b"], 0.0);
        assert_eq!(m.resolve("flow"), Some(ids.clone()));
        assert_eq!(m.resolve("flow[b]"), Some(vec![ids[1]]));
        assert_eq!(m.resolve("missing"), None);
    }

    #[test]
    fn test_initialize_resets_unfixed_derived_values() {
        let (mut m, x, y) = square_model();
        m.fix(x, 2.0);
        m.solve(&HookOptions::new());
        assert_eq!(m.value(y), Some(4.0));
        m.initialize();
        assert_eq!(m.value(y), None);
        assert!(m.is_fixed(x));
        assert_eq!(m.value(x), Some(2.0));
    }
}
