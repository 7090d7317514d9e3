//! Sweep parameters and their sampling rules
//!
//! Every parameter carries a [`SamplingSpec`]. All parameters of one sweep
//! must share the same [`SamplingCategory`].

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand::seq::SliceRandom;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, UnknownCategoryError};
use crate::model::{ComponentId, Model};

/// How the combination array is built from the per-parameter samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingCategory {
    /// Cartesian product of evenly spaced values
    Fixed,
    /// Independent random draws per parameter, column stacked
    Random,
    /// Joint Latin-Hypercube sampling
    RandomLhs,
}

impl SamplingCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            SamplingCategory::Fixed => "fixed",
            SamplingCategory::Random => "random",
            SamplingCategory::RandomLhs => "random_lhs",
        }
    }
}

impl fmt::Display for SamplingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SamplingCategory {
    type Err = UnknownCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(SamplingCategory::Fixed),
            "random" => Ok(SamplingCategory::Random),
            "random_lhs" | "random-lhs" => Ok(SamplingCategory::RandomLhs),
            other => Err(UnknownCategoryError::SamplingCategory(other.to_string())),
        }
    }
}

/// Sampling rule for a single parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SamplingSpec {
    /// `count` evenly spaced values from `lower` to `upper` inclusive
    FixedLinear { lower: f64, upper: f64, count: usize },
    Uniform { lower: f64, upper: f64 },
    Normal { mean: f64, sd: f64 },
    /// Bounds of one Latin-Hypercube dimension; sampled jointly
    LatinHypercube { lower: f64, upper: f64 },
}

impl From<(f64, f64, usize)> for SamplingSpec {
    fn from((lower, upper, count): (f64, f64, usize)) -> Self {
        SamplingSpec::FixedLinear {
            lower,
            upper,
            count,
        }
    }
}

impl SamplingSpec {
    pub fn category(&self) -> SamplingCategory {
        match self {
            SamplingSpec::FixedLinear { .. } => SamplingCategory::Fixed,
            SamplingSpec::Uniform { .. } | SamplingSpec::Normal { .. } => SamplingCategory::Random,
            SamplingSpec::LatinHypercube { .. } => SamplingCategory::RandomLhs,
        }
    }

    /// Number of values this rule contributes on its own, if fixed
    pub fn fixed_count(&self) -> Option<usize> {
        match self {
            SamplingSpec::FixedLinear { count, .. } => Some(*count),
            _ => None,
        }
    }

    /// Reject rules that cannot be sampled. Cheap enough to run on every
    /// worker before the combination broadcast.
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        match self {
            SamplingSpec::Normal { mean, sd } if !(mean.is_finite() && sd.is_finite() && *sd >= 0.0) => {
                Err(ConfigError::InvalidDistribution {
                    parameter: name.to_string(),
                    mean: *mean,
                    sd: *sd,
                })
            }
            _ => Ok(()),
        }
    }

    /// Produce the raw sample vector for this parameter.
    ///
    /// `FixedLinear` ignores `count` and uses its own. `LatinHypercube`
    /// only contributes its `[lower, upper]` pair.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        name: &str,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<f64>, ConfigError> {
        match self {
            SamplingSpec::FixedLinear {
                lower,
                upper,
                count,
            } => Ok(linspace(*lower, *upper, *count)),
            SamplingSpec::Uniform { lower, upper } => Ok((0..count)
                .map(|_| lower + (upper - lower) * rng.random::<f64>())
                .collect()),
            SamplingSpec::Normal { mean, sd } => {
                let normal = Normal::new(*mean, *sd).map_err(|_| ConfigError::InvalidDistribution {
                    parameter: name.to_string(),
                    mean: *mean,
                    sd: *sd,
                })?;
                Ok((0..count).map(|_| normal.sample(rng)).collect())
            }
            SamplingSpec::LatinHypercube { lower, upper } => Ok(vec![*lower, *upper]),
        }
    }
}

/// Evenly spaced values, inclusive of both ends
pub fn linspace(lower: f64, upper: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![lower],
        _ => {
            let step = (upper - lower) / (count - 1) as f64;
            (0..count)
                .map(|i| {
                    if i == count - 1 {
                        upper
                    } else {
                        lower + step * i as f64
                    }
                })
                .collect()
        }
    }
}

/// Latin-Hypercube design over `bounds`, one row per sample.
///
/// Each dimension is cut into `num_samples` equal strata; every stratum gets
/// exactly one uniform draw, and the strata order is shuffled independently
/// per dimension.
pub fn latin_hypercube<R: Rng + ?Sized>(
    bounds: &[(f64, f64)],
    num_samples: usize,
    rng: &mut R,
) -> Vec<Vec<f64>> {
    let mut columns: Vec<Vec<f64>> = Vec::with_capacity(bounds.len());
    for &(lower, upper) in bounds {
        let mut strata: Vec<usize> = (0..num_samples).collect();
        strata.shuffle(rng);
        let width = (upper - lower) / num_samples as f64;
        columns.push(
            strata
                .into_iter()
                .map(|s| lower + width * (s as f64 + rng.random::<f64>()))
                .collect(),
        );
    }
    (0..num_samples)
        .map(|i| columns.iter().map(|c| c[i]).collect())
        .collect()
}

/// One swept input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepParameter {
    /// Short name used for table headers
    pub name: String,
    /// Scalar model component receiving the values
    pub target: ComponentId,
    pub sampling: SamplingSpec,
}

impl SweepParameter {
    /// Resolve `target` on `model` to a single scalar variable or parameter.
    ///
    /// An indexed object with exactly one member is unwrapped to that member.
    pub fn new<M: Model + ?Sized>(
        model: &M,
        name: impl Into<String>,
        target: &str,
        sampling: impl Into<SamplingSpec>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let invalid = |reason: String| ConfigError::InvalidParameter {
            name: name.clone(),
            reason,
        };

        let ids = model
            .resolve(target)
            .ok_or_else(|| invalid(format!("'{target}' is not a model component")))?;
        let [id] = ids.as_slice() else {
            return Err(invalid(format!(
                "'{target}' is indexed with {} members; sweep a single member",
                ids.len()
            )));
        };
        let component = model
            .component(*id)
            .ok_or_else(|| invalid(format!("'{target}' has no component data")))?;
        if !component.is_sweepable() {
            return Err(invalid(format!(
                "'{target}' is a {:?}, expected a variable or parameter",
                component.kind
            )));
        }

        Ok(Self {
            name,
            target: *id,
            sampling: sampling.into(),
        })
    }

    pub fn category(&self) -> SamplingCategory {
        self.sampling.category()
    }
}

/// Check that every parameter uses the same sampling category and return it
pub fn classify_parameters(params: &[SweepParameter]) -> Result<SamplingCategory, ConfigError> {
    let first = params.first().ok_or(ConfigError::EmptySweep)?;
    let expected = first.category();
    for param in &params[1..] {
        let found = param.category();
        if found != expected {
            return Err(ConfigError::MixedSamplingCategories {
                expected,
                found,
                parameter: param.name.clone(),
            });
        }
    }
    Ok(expected)
}
