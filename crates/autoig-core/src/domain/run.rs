//! The normalized record of a single solver invocation.

use super::error::{EvalError, Result};
use super::status::RunStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Satisfiability of an instance as reported by a run.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum InstanceType {
    Sat,
    Unsat,
    #[default]
    Unknown,
}

impl InstanceType {
    pub fn is_decided(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Instance type implied by a normalized status.
    pub fn from_status(status: RunStatus) -> Self {
        match status {
            RunStatus::Unsat => Self::Unsat,
            RunStatus::Solved | RunStatus::CompleteProof => Self::Sat,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sat => "sat",
            Self::Unsat => "unsat",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceType {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "sat" => Ok(Self::Sat),
            "unsat" => Ok(Self::Unsat),
            "unknown" => Ok(Self::Unknown),
            other => Err(EvalError::InvalidConfig(format!(
                "unknown instance type: {other}"
            ))),
        }
    }
}

/// Whether the model-to-solver translation step completed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TranslationStatus {
    Ok,
    #[default]
    Failed,
}

/// An improving solution: seconds since the run started and objective value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ObjectivePoint {
    pub elapsed: f64,
    pub value: f64,
}

/// Backend-specific details attached to a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunExtra {
    /// Improving objective values in order of discovery.
    #[serde(default)]
    pub objective_trace: Vec<ObjectivePoint>,
    #[serde(default)]
    pub instance_type: InstanceType,
    #[serde(default)]
    pub translation_status: TranslationStatus,
}

impl RunExtra {
    /// Defaults for backends that only report a status and timings.
    pub fn from_status(status: RunStatus) -> Self {
        Self {
            objective_trace: Vec::new(),
            instance_type: InstanceType::from_status(status),
            translation_status: if status.is_translation_failure() {
                TranslationStatus::Failed
            } else {
                TranslationStatus::Ok
            },
        }
    }

    pub fn with_trace(mut self, trace: Vec<ObjectivePoint>) -> Self {
        self.objective_trace = trace;
        self
    }
}

/// Normalized result of one solver invocation on one instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub seed: Option<u64>,
    pub status: RunStatus,
    /// Total wall time in seconds, translation included.
    pub time: f64,
    pub solver_time: f64,
    pub translation_time: f64,
    pub extra: RunExtra,
}

impl RunRecord {
    /// Build a record whose total time is translation time plus solver time.
    pub fn new(
        seed: Option<u64>,
        status: RunStatus,
        translation_time: f64,
        solver_time: f64,
        extra: RunExtra,
    ) -> Self {
        Self {
            seed,
            status,
            time: translation_time + solver_time,
            solver_time,
            translation_time,
            extra,
        }
    }

    pub fn is_solved(&self) -> bool {
        self.status.is_solved()
    }

    pub fn translation_failed(&self) -> bool {
        self.extra.translation_status == TranslationStatus::Failed
    }

    pub fn final_objective(&self) -> Option<f64> {
        self.extra.objective_trace.last().map(|p| p.value)
    }

    /// Seconds until the last improving solution was found.
    pub fn time_to_final_objective(&self) -> Option<f64> {
        self.extra.objective_trace.last().map(|p| p.elapsed)
    }

    /// Copy of this record attributed to a different seed.
    pub fn restamped(&self, seed: Option<u64>) -> Self {
        Self {
            seed,
            ..self.clone()
        }
    }

    /// A solved run must state whether the instance is sat or unsat.
    pub fn check_consistent(&self) -> Result<()> {
        if self.status.is_solved() && !self.extra.instance_type.is_decided() {
            return Err(EvalError::InvariantViolation(format!(
                "run with status {} reports instance type {}",
                self.status, self.extra.instance_type
            )));
        }
        if self.time < 0.0 || self.solver_time < 0.0 || self.translation_time < 0.0 {
            return Err(EvalError::InvariantViolation(format!(
                "negative timing in run record (time {})",
                self.time
            )));
        }
        Ok(())
    }
}
