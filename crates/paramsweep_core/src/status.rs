//! Solver termination conditions
//!
//! The set of conditions is closed. Each condition has a stable integer code
//! (its position in [`TerminationCondition::ALL`]) so that per-case statuses
//! can travel through numeric-only collectives and be decoded on the
//! coordinator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnknownCategoryError;

/// Outcome of one solve attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TerminationCondition {
    Unknown,
    MaxTimeLimit,
    MaxIterations,
    MinFunctionValue,
    MinStepLength,
    GloballyOptimal,
    LocallyOptimal,
    Feasible,
    Optimal,
    MaxEvaluations,
    Other,
    Unbounded,
    Infeasible,
    InfeasibleOrUnbounded,
    InvalidProblem,
    IntermediateNonInteger,
    NoSolution,
    SolverFailure,
    InternalSolverError,
    Error,
    UserInterrupt,
    ResourceInterrupt,
    LicensingProblems,
}

impl TerminationCondition {
    /// Every known condition, in code order
    pub const ALL: [TerminationCondition; 23] = [
        TerminationCondition::Unknown,
        TerminationCondition::MaxTimeLimit,
        TerminationCondition::MaxIterations,
        TerminationCondition::MinFunctionValue,
        TerminationCondition::MinStepLength,
        TerminationCondition::GloballyOptimal,
        TerminationCondition::LocallyOptimal,
        TerminationCondition::Feasible,
        TerminationCondition::Optimal,
        TerminationCondition::MaxEvaluations,
        TerminationCondition::Other,
        TerminationCondition::Unbounded,
        TerminationCondition::Infeasible,
        TerminationCondition::InfeasibleOrUnbounded,
        TerminationCondition::InvalidProblem,
        TerminationCondition::IntermediateNonInteger,
        TerminationCondition::NoSolution,
        TerminationCondition::SolverFailure,
        TerminationCondition::InternalSolverError,
        TerminationCondition::Error,
        TerminationCondition::UserInterrupt,
        TerminationCondition::ResourceInterrupt,
        TerminationCondition::LicensingProblems,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TerminationCondition::Unknown => "unknown",
            TerminationCondition::MaxTimeLimit => "maxTimeLimit",
            TerminationCondition::MaxIterations => "maxIterations",
            TerminationCondition::MinFunctionValue => "minFunctionValue",
            TerminationCondition::MinStepLength => "minStepLength",
            TerminationCondition::GloballyOptimal => "globallyOptimal",
            TerminationCondition::LocallyOptimal => "locallyOptimal",
            TerminationCondition::Feasible => "feasible",
            TerminationCondition::Optimal => "optimal",
            TerminationCondition::MaxEvaluations => "maxEvaluations",
            TerminationCondition::Other => "other",
            TerminationCondition::Unbounded => "unbounded",
            TerminationCondition::Infeasible => "infeasible",
            TerminationCondition::InfeasibleOrUnbounded => "infeasibleOrUnbounded",
            TerminationCondition::InvalidProblem => "invalidProblem",
            TerminationCondition::IntermediateNonInteger => "intermediateNonInteger",
            TerminationCondition::NoSolution => "noSolution",
            TerminationCondition::SolverFailure => "solverFailure",
            TerminationCondition::InternalSolverError => "internalSolverError",
            TerminationCondition::Error => "error",
            TerminationCondition::UserInterrupt => "userInterrupt",
            TerminationCondition::ResourceInterrupt => "resourceInterrupt",
            TerminationCondition::LicensingProblems => "licensingProblems",
        }
    }

    /// Whether outputs of a solve ending this way can be trusted
    pub fn is_optimal(self) -> bool {
        matches!(
            self,
            TerminationCondition::Optimal
                | TerminationCondition::LocallyOptimal
                | TerminationCondition::GloballyOptimal
        )
    }

    /// Stable integer code used to move statuses through numeric collectives
    pub fn code(self) -> i64 {
        // ALL is ordered like the enum declaration
        self as i64
    }

    pub fn from_code(code: i64) -> Result<Self, UnknownCategoryError> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
            .ok_or(UnknownCategoryError::TerminationCode(code))
    }
}

impl fmt::Display for TerminationCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TerminationCondition {
    type Err = UnknownCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategoryError::TerminationStatus(s.to_string()))
    }
}

/// Encode a status list for a numeric gather
pub fn encode_statuses(statuses: &[TerminationCondition]) -> Vec<i64> {
    statuses.iter().map(|s| s.code()).collect()
}

/// Decode a gathered status list, failing on any code outside the known set
pub fn decode_statuses(codes: &[i64]) -> Result<Vec<TerminationCondition>, UnknownCategoryError> {
    codes.iter().map(|&c| TerminationCondition::from_code(c)).collect()
}
