use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized terminal status of one solver run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    TranslationMemOut,
    TranslationTimeOut,
    SolveMemOut,
    SolveTimeOut,
    SolveNodeOut,
    SolverCrash,
    Unsat,
    /// At least one solution found, optimality not proven.
    Solved,
    /// Satisfiable and proven optimal (or simply solved, for decision problems).
    CompleteProof,
    /// Assigned after the fact when a run's answer is shown to be wrong.
    Error,
}

impl RunStatus {
    /// The run produced an answer about the instance.
    pub fn is_solved(self) -> bool {
        matches!(self, Self::Unsat | Self::Solved | Self::CompleteProof)
    }

    /// The run settled the instance completely.
    pub fn is_complete(self) -> bool {
        matches!(self, Self::Unsat | Self::CompleteProof)
    }

    pub fn is_translation_failure(self) -> bool {
        matches!(self, Self::TranslationMemOut | Self::TranslationTimeOut)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TranslationMemOut => "translationMemOut",
            Self::TranslationTimeOut => "translationTimeOut",
            Self::SolveMemOut => "solveMemOut",
            Self::SolveTimeOut => "solveTimeOut",
            Self::SolveNodeOut => "solveNodeOut",
            Self::SolverCrash => "solverCrash",
            Self::Unsat => "unsat",
            Self::Solved => "solved",
            Self::CompleteProof => "completeProof",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
