//! YAML sweep descriptions
//!
//! ```yaml
//! model: desalination
//! workers: 4
//! parameters:
//!   - name: recovery
//!     sampling: [0.4, 0.8, 5]
//!   - name: cost
//!     target: membrane_cost
//!     sampling: { type: Uniform, lower: 20.0, upper: 40.0 }
//! outputs:
//!   - lcow
//!   - name: area
//!     target: membrane_area
//! options:
//!   csv_results_file: out/sweep.csv
//!   num_samples: 20
//! ```

use std::path::{Path, PathBuf};

use color_eyre::eyre::{WrapErr, eyre};
use paramsweep_core::error::ConfigError;
use paramsweep_core::{Model, OutputSpec, SamplingSpec, SweepOptions, SweepParameter};
use serde::{Deserialize, Serialize};

use crate::models::DemoModel;

fn default_workers() -> usize {
    1
}

/// Sampling rule, either a full spec or the `[lower, upper, count]` shorthand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SamplingEntry {
    Linear((f64, f64, usize)),
    Spec(SamplingSpec),
}

impl From<&SamplingEntry> for SamplingSpec {
    fn from(entry: &SamplingEntry) -> Self {
        match entry {
            SamplingEntry::Linear(tuple) => SamplingSpec::from(*tuple),
            SamplingEntry::Spec(spec) => spec.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterEntry {
    /// Column header
    pub name: String,
    /// Model component; defaults to `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub sampling: SamplingEntry,
}

/// Tracked output, either a bare component name or a renamed one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputEntry {
    Component(String),
    Named { name: String, target: String },
}

impl OutputEntry {
    fn name(&self) -> &str {
        match self {
            OutputEntry::Component(name) | OutputEntry::Named { name, .. } => name,
        }
    }

    fn target(&self) -> &str {
        match self {
            OutputEntry::Component(target) | OutputEntry::Named { target, .. } => target,
        }
    }
}

/// A complete sweep description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepFile {
    pub model: DemoModel,
    #[serde(default = "default_workers")]
    pub workers: usize,
    pub parameters: Vec<ParameterEntry>,
    pub outputs: Vec<OutputEntry>,
    #[serde(default)]
    pub options: SweepOptions,
}

impl SweepFile {
    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_saphyr::Error> {
        serde_saphyr::from_str(yaml)
    }

    /// Save to YAML string
    pub fn to_yaml(&self) -> Result<String, serde_saphyr::ser::Error> {
        serde_saphyr::to_string(self)
    }

    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read sweep file {}", path.display()))?;
        let file = Self::from_yaml(&yaml)
            .map_err(|e| eyre!("failed to parse sweep file {}: {e}", path.display()))?;
        Ok(file)
    }

    /// Command-line values take precedence over the file
    pub fn apply_overrides(&mut self, workers: Option<usize>, seed: Option<u64>, output: Option<PathBuf>) {
        if let Some(workers) = workers {
            self.workers = workers;
        }
        if let Some(seed) = seed {
            self.options.seed = Some(seed);
        }
        if let Some(output) = output {
            self.options.csv_results_file = Some(output);
        }
    }

    pub fn sweep_parameters<M: Model + ?Sized>(
        &self,
        model: &M,
    ) -> Result<Vec<SweepParameter>, ConfigError> {
        self.parameters
            .iter()
            .map(|p| {
                let target = p.target.as_deref().unwrap_or(&p.name);
                SweepParameter::new(model, p.name.as_str(), target, SamplingSpec::from(&p.sampling))
            })
            .collect()
    }

    pub fn output_specs<M: Model + ?Sized>(&self, model: &M) -> Result<Vec<OutputSpec>, ConfigError> {
        self.outputs
            .iter()
            .map(|o| OutputSpec::new(model, o.name(), o.target()))
            .collect()
    }
}
