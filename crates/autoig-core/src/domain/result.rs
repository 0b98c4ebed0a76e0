//! Evaluation outcomes handed back to the tuner.

use super::run::RunRecord;
use crate::scoring::BordaScores;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Role a solver plays within one evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum SolverRole {
    Main,
    Oracle,
    Base,
    Favoured,
}

impl SolverRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Oracle => "oracle",
            Self::Base => "base",
            Self::Favoured => "favoured",
        }
    }
}

impl fmt::Display for SolverRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final classification of an instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum EvalStatus {
    UnwantedType,
    TooEasy,
    TooDifficult,
    TooDifficultOracle,
    IncorrectInstanceType,
    IncorrectObjectiveValue,
    IncorrectOptimalValue,
    InconsistentInstanceTypes,
    InconsistentOptimalValues,
    Graded,
    FavouredTooDifficult,
    BaseTooEasy,
    /// Discriminating evaluation completed and produced a ratio score.
    #[serde(rename = "ok")]
    Scored,
}

impl EvalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnwantedType => "unwantedType",
            Self::TooEasy => "tooEasy",
            Self::TooDifficult => "tooDifficult",
            Self::TooDifficultOracle => "tooDifficultOracle",
            Self::IncorrectInstanceType => "incorrectInstanceType",
            Self::IncorrectObjectiveValue => "incorrectObjectiveValue",
            Self::IncorrectOptimalValue => "incorrectOptimalValue",
            Self::InconsistentInstanceTypes => "inconsistentInstanceTypes",
            Self::InconsistentOptimalValues => "inconsistentOptimalValues",
            Self::Graded => "graded",
            Self::FavouredTooDifficult => "favouredTooDifficult",
            Self::BaseTooEasy => "baseTooEasy",
            Self::Scored => "ok",
        }
    }
}

impl fmt::Display for EvalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status and score of an evaluation, set exactly once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub status: EvalStatus,
    pub score: f64,
}

impl Verdict {
    pub fn new(status: EvalStatus, score: f64) -> Self {
        Self { status, score }
    }
}

/// Runs recorded for one role, in repetition order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RoleRuns {
    pub solver: String,
    pub runs: Vec<RunRecord>,
}

/// Everything an evaluation produced for one instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceResult {
    pub instance: String,
    pub status: EvalStatus,
    pub score: f64,
    pub results: BTreeMap<SolverRole, RoleRuns>,
    /// Per-repetition Borda points, discriminating mode only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub borda: Vec<BordaScores>,
}

impl InstanceResult {
    pub fn runs(&self, role: SolverRole) -> &[RunRecord] {
        self.results
            .get(&role)
            .map(|r| r.runs.as_slice())
            .unwrap_or(&[])
    }
}

/// Score reported to the tuner. Lower is better; `Reject` prints as `Inf`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TunerScore {
    Value(f64),
    Reject,
}

impl fmt::Display for TunerScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v}"),
            Self::Reject => f.write_str("Inf"),
        }
    }
}

impl Serialize for TunerScore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Value(v) => serializer.serialize_f64(*v),
            Self::Reject => serializer.serialize_str("Inf"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&EvalStatus::Scored).unwrap(),
            "\"ok\""
        );
        assert_eq!(
            serde_json::to_string(&EvalStatus::FavouredTooDifficult).unwrap(),
            "\"favouredTooDifficult\""
        );
        assert_eq!(EvalStatus::TooDifficultOracle.to_string(), "tooDifficultOracle");
    }

    #[test]
    fn test_tuner_score_display() {
        assert_eq!(TunerScore::Value(-1.0).to_string(), "-1");
        assert_eq!(TunerScore::Value(0.0).to_string(), "0");
        assert_eq!(TunerScore::Value(-0.25).to_string(), "-0.25");
        assert_eq!(TunerScore::Reject.to_string(), "Inf");
        assert_eq!(serde_json::to_string(&TunerScore::Reject).unwrap(), "\"Inf\"");
    }

    #[test]
    fn test_missing_role_has_no_runs() {
        let result = InstanceResult {
            instance: "inst-1.param".to_string(),
            status: EvalStatus::Graded,
            score: -1.0,
            results: BTreeMap::new(),
            borda: Vec::new(),
        };
        assert!(result.runs(SolverRole::Oracle).is_empty());
    }
}
