use std::fmt;

use crate::sampling::SamplingCategory;

/// Errors in how a sweep was set up. Raised before any case is evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Parameters in one sweep use different sampling categories
    MixedSamplingCategories {
        expected: SamplingCategory,
        found: SamplingCategory,
        parameter: String,
    },
    /// `reinitialize_before_sweep` was requested but no reinitialize hook exists
    MissingReinitializer,
    /// The sweep target is not a single scalar variable or parameter
    InvalidParameter { name: String, reason: String },
    /// An output name does not refer to a component of the model
    UnknownOutput(String),
    /// Random and LHS sampling need an explicit sample count
    MissingSampleCount(SamplingCategory),
    InvalidDistribution {
        parameter: String,
        mean: f64,
        sd: f64,
    },
    EmptySweep,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MixedSamplingCategories {
                expected,
                found,
                parameter,
            } => write!(
                f,
                "cannot mix sampling types: parameter '{parameter}' uses {found} but the sweep uses {expected}"
            ),
            ConfigError::MissingReinitializer => write!(
                f,
                "reinitialize_before_sweep is enabled but no reinitialize function was given"
            ),
            ConfigError::InvalidParameter { name, reason } => {
                write!(f, "invalid sweep parameter '{name}': {reason}")
            }
            ConfigError::UnknownOutput(name) => {
                write!(f, "output '{name}' does not name a model component")
            }
            ConfigError::MissingSampleCount(category) => {
                write!(f, "{category} sampling requires num_samples")
            }
            ConfigError::InvalidDistribution {
                parameter,
                mean,
                sd,
            } => write!(
                f,
                "invalid normal distribution for '{parameter}' (mean={mean}, sd={sd}): sd must be non-negative and finite"
            ),
            ConfigError::EmptySweep => write!(f, "at least one sweep parameter is required"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Row/column counts that do not line up across the distributed arrays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    /// The total number of cases cannot be represented
    CountOverflow,
    /// A buffer handed to a collective has the wrong length
    BufferMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A chunk was requested for a rank outside the worker group
    RankOutOfRange { rank: usize, size: usize },
    /// A table row does not have the same width as the header
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeError::CountOverflow => {
                write!(f, "total number of samples is not representable")
            }
            ShapeError::BufferMismatch {
                context,
                expected,
                actual,
            } => write!(
                f,
                "{context}: buffer size mismatch (expected {expected}, got {actual})"
            ),
            ShapeError::RankOutOfRange { rank, size } => {
                write!(f, "rank {rank} is outside a group of {size} workers")
            }
            ShapeError::RaggedRow {
                row,
                expected,
                actual,
            } => write!(f, "row {row} has {actual} columns, expected {expected}"),
        }
    }
}

impl std::error::Error for ShapeError {}

/// A categorical value outside its closed set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnknownCategoryError {
    SamplingCategory(String),
    TerminationStatus(String),
    TerminationCode(i64),
}

impl fmt::Display for UnknownCategoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnknownCategoryError::SamplingCategory(name) => {
                write!(f, "unknown sampling type: {name}")
            }
            UnknownCategoryError::TerminationStatus(name) => {
                write!(f, "termination condition '{name}' not found in known list")
            }
            UnknownCategoryError::TerminationCode(code) => {
                write!(f, "termination condition code {code} not found in known list")
            }
        }
    }
}

impl std::error::Error for UnknownCategoryError {}

/// A collective operation could not complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommError {
    /// Another worker panicked while holding the shared exchange state
    Poisoned,
    /// The root rank is not part of the group
    InvalidRoot { root: usize, size: usize },
    /// A coordinator-only step failed; the coordinator holds the cause
    CoordinatorFailed,
}

impl fmt::Display for CommError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommError::Poisoned => write!(f, "worker group state poisoned by a failed worker"),
            CommError::InvalidRoot { root, size } => {
                write!(f, "root {root} >= group size {size}")
            }
            CommError::CoordinatorFailed => write!(f, "coordinator failed, aborting sweep"),
        }
    }
}

impl std::error::Error for CommError {}

/// Errors while writing or reading sweep artifacts
#[derive(Debug)]
pub enum PersistError {
    Io(std::io::Error),
    Json(serde_json::Error),
    /// A results table could not be parsed
    Malformed { line: usize, reason: String },
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistError::Io(e) => write!(f, "i/o error: {e}"),
            PersistError::Json(e) => write!(f, "artifact encoding error: {e}"),
            PersistError::Malformed { line, reason } => {
                write!(f, "malformed table at line {line}: {reason}")
            }
        }
    }
}

impl std::error::Error for PersistError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistError::Io(e) => Some(e),
            PersistError::Json(e) => Some(e),
            PersistError::Malformed { .. } => None,
        }
    }
}

impl From<std::io::Error> for PersistError {
    fn from(err: std::io::Error) -> Self {
        PersistError::Io(err)
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(err: serde_json::Error) -> Self {
        PersistError::Json(err)
    }
}

/// Any error that aborts a whole sweep.
///
/// Solver failures are not represented here: a non-optimal case is recorded
/// as a NaN row plus its termination status.
#[derive(Debug)]
pub enum SweepError {
    Config(ConfigError),
    Shape(ShapeError),
    UnknownCategory(UnknownCategoryError),
    Comm(CommError),
    Persist(PersistError),
}

impl fmt::Display for SweepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepError::Config(e) => write!(f, "configuration error: {e}"),
            SweepError::Shape(e) => write!(f, "shape error: {e}"),
            SweepError::UnknownCategory(e) => write!(f, "{e}"),
            SweepError::Comm(e) => write!(f, "communication error: {e}"),
            SweepError::Persist(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SweepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SweepError::Config(e) => Some(e),
            SweepError::Shape(e) => Some(e),
            SweepError::UnknownCategory(e) => Some(e),
            SweepError::Comm(e) => Some(e),
            SweepError::Persist(e) => Some(e),
        }
    }
}

impl From<ConfigError> for SweepError {
    fn from(err: ConfigError) -> Self {
        SweepError::Config(err)
    }
}

impl From<ShapeError> for SweepError {
    fn from(err: ShapeError) -> Self {
        SweepError::Shape(err)
    }
}

impl From<UnknownCategoryError> for SweepError {
    fn from(err: UnknownCategoryError) -> Self {
        SweepError::UnknownCategory(err)
    }
}

impl From<CommError> for SweepError {
    fn from(err: CommError) -> Self {
        SweepError::Comm(err)
    }
}

impl From<PersistError> for SweepError {
    fn from(err: PersistError) -> Self {
        SweepError::Persist(err)
    }
}

impl From<std::io::Error> for SweepError {
    fn from(err: std::io::Error) -> Self {
        SweepError::Persist(PersistError::Io(err))
    }
}

pub type Result<T> = std::result::Result<T, SweepError>;
