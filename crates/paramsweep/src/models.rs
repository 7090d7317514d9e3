//! Demonstration models available from sweep files

use paramsweep_core::AnalyticModel;
use serde::{Deserialize, Serialize};

/// Models a sweep file can name in its `model` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemoModel {
    /// Reverse-osmosis style costing: recovery drives membrane area and the
    /// levelized cost of water. Recovery above 0.85 is infeasible.
    Desalination,
    /// Rosenbrock valley restricted to the disk of radius 1.5
    Rosenbrock,
    /// Two-stream heat exchanger with per-stream inlet temperatures
    HeatExchanger,
}

impl DemoModel {
    pub fn build(self) -> AnalyticModel {
        match self {
            DemoModel::Desalination => desalination(),
            DemoModel::Rosenbrock => rosenbrock(),
            DemoModel::HeatExchanger => heat_exchanger(),
        }
    }
}

fn desalination() -> AnalyticModel {
    let mut m = AnalyticModel::new();
    let recovery = m.add_variable("recovery", 0.5);
    m.set_bounds(recovery, Some(0.0), Some(1.0));
    let feed = m.add_parameter("feed_flow", 100.0);
    m.set_units(feed, "m^3/h");
    let price = m.add_parameter("membrane_cost", 30.0);
    m.set_units(price, "USD/m^2");
    let electricity = m.add_parameter("electricity_price", 0.08);
    m.set_units(electricity, "USD/kWh");

    let permeate = m.add_derived("permeate_flow", |v| v.get("feed_flow") * v.get("recovery"));
    m.set_units(permeate, "m^3/h");
    let area = m.add_derived("membrane_area", |v| {
        v.get("permeate_flow") / (20.0e-3 * (1.0 - v.get("recovery")))
    });
    m.set_units(area, "m^2");
    let power = m.add_derived("pump_power", |v| {
        // Osmotic pressure rises with concentration at the brine end
        let pressure_bar = 30.0 / (1.0 - v.get("recovery"));
        v.get("feed_flow") * pressure_bar / 36.0 / 0.8
    });
    m.set_bounds(power, Some(0.0), None);
    m.set_units(power, "kW");

    let capex = m.add_expression("capex", |v| v.get("membrane_area") * v.get("membrane_cost"));
    m.set_units(capex, "USD");
    let opex = m.add_expression("opex", |v| v.get("pump_power") * v.get("electricity_price") * 8000.0);
    m.set_units(opex, "USD/yr");
    let lcow = m.add_objective("lcow", |v| {
        (0.1 * v.get("capex") + v.get("opex")) / (v.get("permeate_flow") * 8000.0)
    });
    m.set_units(lcow, "USD/m^3");
    m.add_check("scaling limit", |v| v.get("recovery") <= 0.85);
    m
}

fn rosenbrock() -> AnalyticModel {
    let mut m = AnalyticModel::new();
    m.add_variable("x", 0.0);
    m.add_variable("y", 0.0);
    m.add_parameter("a", 1.0);
    m.add_parameter("b", 100.0);
    m.add_objective("f", |v| {
        let (x, y) = (v.get("x"), v.get("y"));
        (v.get("a") - x).powi(2) + v.get("b") * (y - x * x).powi(2)
    });
    m.add_check("disk", |v| v.get("x").powi(2) + v.get("y").powi(2) <= 2.25);
    m
}

fn heat_exchanger() -> AnalyticModel {
    let mut m = AnalyticModel::new();
    let inlets = m.add_indexed_variable("inlet_temperature", &["hot", "cold"], 300.0);
    for id in &inlets {
        m.set_units(*id, "K");
    }
    let area = m.add_parameter("area", 10.0);
    m.set_units(area, "m^2");
    m.add_parameter("u", 0.5);
    m.add_parameter("capacity_rate", 2.0);

    m.add_expression("ntu", |v| v.get("u") * v.get("area") / v.get("capacity_rate"));
    let duty = m.add_derived("duty", |v| {
        let effectiveness = 1.0 - (-v.get("ntu")).exp();
        effectiveness
            * v.get("capacity_rate")
            * (v.get("inlet_temperature[hot]") - v.get("inlet_temperature[cold]"))
    });
    m.set_bounds(duty, Some(0.0), None);
    m.set_units(duty, "kW");
    m
}
