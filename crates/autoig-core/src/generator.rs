//! Interface to the instance generator.

use crate::config::GeneratorSettings;
use crate::domain::{EvalError, Result, RunStatus, TunerScore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Penalty for a generator configuration whose solve timed out.
pub const SCORE_GENERATOR_TIMEOUT: f64 = 2.0;

/// Outcome of solving the generator model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum GeneratorStatus {
    Sat,
    Unsat,
    SolveTimeOut,
    SolveMemOut,
    TranslationTimeOut,
    TranslationMemOut,
}

impl GeneratorStatus {
    pub fn from_run_status(status: RunStatus) -> Result<Self> {
        match status {
            RunStatus::Solved | RunStatus::CompleteProof => Ok(Self::Sat),
            RunStatus::Unsat => Ok(Self::Unsat),
            RunStatus::SolveTimeOut | RunStatus::SolveNodeOut => Ok(Self::SolveTimeOut),
            RunStatus::SolveMemOut => Ok(Self::SolveMemOut),
            RunStatus::TranslationTimeOut => Ok(Self::TranslationTimeOut),
            RunStatus::TranslationMemOut => Ok(Self::TranslationMemOut),
            RunStatus::SolverCrash | RunStatus::Error => Err(EvalError::ToolFailed {
                tool: "generator".to_string(),
                reason: format!("generator solve ended with {status}"),
            }),
        }
    }

    /// Score for a configuration that produced no instance; `None` for `sat`.
    pub fn rejection_score(self) -> Option<TunerScore> {
        match self {
            Self::Sat => None,
            Self::SolveTimeOut => Some(TunerScore::Value(SCORE_GENERATOR_TIMEOUT)),
            _ => Some(TunerScore::Reject),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sat => "sat",
            Self::Unsat => "unsat",
            Self::SolveTimeOut => "solveTimeOut",
            Self::SolveMemOut => "solveMemOut",
            Self::TranslationTimeOut => "translationTimeOut",
            Self::TranslationMemOut => "translationMemOut",
        }
    }
}

impl fmt::Display for GeneratorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What gets logged about the generator run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorRecord {
    /// Parameter file the generator was solved with.
    pub instance: String,
    pub status: GeneratorStatus,
    pub translation_time: f64,
    pub solver_time: f64,
}

/// A solver-level assignment that later solves of the same generator
/// instance must not produce again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegativeTableEntry {
    /// Translated generator instance holding the table.
    pub solver_input: PathBuf,
    /// Space-separated values, in the solver's print order.
    pub assignment: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorOutcome {
    pub status: GeneratorStatus,
    /// Produced instance; present exactly when the status is `sat`.
    pub solution_file: Option<PathBuf>,
    pub record: GeneratorRecord,
    /// Set when the generator can be told to skip this instance next time.
    pub exclusion: Option<NegativeTableEntry>,
}

/// Turns tuner parameters into a candidate instance.
#[async_trait]
pub trait InstanceGenerator: Send + Sync {
    async fn solve_generator(
        &self,
        config_id: &str,
        params: &BTreeMap<String, String>,
        settings: &GeneratorSettings,
        seed: u64,
        out_dir: &Path,
    ) -> Result<GeneratorOutcome>;

    /// Forbid an instance that has been evaluated.
    async fn exclude_instance(&self, _entry: &NegativeTableEntry) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GeneratorStatus::from_run_status(RunStatus::CompleteProof).unwrap(),
            GeneratorStatus::Sat
        );
        assert_eq!(
            GeneratorStatus::from_run_status(RunStatus::SolveNodeOut).unwrap(),
            GeneratorStatus::SolveTimeOut
        );
        assert!(GeneratorStatus::from_run_status(RunStatus::SolverCrash).is_err());
    }

    #[test]
    fn test_rejection_scores() {
        assert_eq!(GeneratorStatus::Sat.rejection_score(), None);
        assert_eq!(
            GeneratorStatus::SolveTimeOut.rejection_score(),
            Some(TunerScore::Value(2.0))
        );
        assert_eq!(
            GeneratorStatus::TranslationMemOut.rejection_score(),
            Some(TunerScore::Reject)
        );
        assert_eq!(
            GeneratorStatus::Unsat.rejection_score(),
            Some(TunerScore::Reject)
        );
    }
}
