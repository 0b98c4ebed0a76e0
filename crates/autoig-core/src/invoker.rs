//! The seam between evaluation logic and solver toolchains.

use crate::domain::{Result, RunRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A solver and the extra flags it is run with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SolverSpec {
    pub name: String,
    #[serde(default)]
    pub flags: String,
    /// Repeating the run with another seed cannot change its outcome.
    #[serde(default)]
    pub deterministic: bool,
}

impl SolverSpec {
    pub fn new(name: impl Into<String>, flags: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: flags.into(),
            deterministic: false,
        }
    }

    pub fn deterministic(mut self) -> Self {
        self.deterministic = true;
        self
    }
}

/// The model and instance file pair being evaluated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunTarget {
    pub model: PathBuf,
    pub instance: PathBuf,
}

impl RunTarget {
    pub fn new(model: impl Into<PathBuf>, instance: impl Into<PathBuf>) -> Self {
        Self {
            model: model.into(),
            instance: instance.into(),
        }
    }

    /// File name of the instance, used to label sessions and log lines.
    pub fn instance_name(&self) -> String {
        file_name(&self.instance)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// One solver invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub target: RunTarget,
    pub solver: SolverSpec,
    pub seed: Option<u64>,
    /// Seconds; 0 means unbounded.
    pub translation_time_limit: f64,
    /// Seconds.
    pub solve_time_limit: f64,
    pub mem_limit_mb: u64,
}

impl RunRequest {
    pub fn new(target: &RunTarget, solver: &SolverSpec, seed: Option<u64>, time_limit: f64) -> Self {
        Self {
            target: target.clone(),
            solver: solver.clone(),
            seed,
            translation_time_limit: 0.0,
            solve_time_limit: time_limit,
            mem_limit_mb: 8192,
        }
    }

    pub fn with_mem_limit(mut self, mem_limit_mb: u64) -> Self {
        self.mem_limit_mb = mem_limit_mb;
        self
    }

    pub fn with_translation_time_limit(mut self, seconds: f64) -> Self {
        self.translation_time_limit = seconds;
        self
    }
}

/// Runs one solver on one instance and returns a normalized record.
///
/// Timeouts and resource exhaustion come back as ordinary records; only
/// failures that make the run meaningless are errors.
#[async_trait]
pub trait RunInvoker: Send + Sync {
    async fn invoke(&self, request: &RunRequest) -> Result<RunRecord>;
}
