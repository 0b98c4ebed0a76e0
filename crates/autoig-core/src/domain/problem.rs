//! Problem type detection from model files.

use super::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Whether the model minimises, maximises or merely asks for a solution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProblemType {
    Min,
    Max,
    Sat,
}

impl ProblemType {
    pub fn is_optimisation(self) -> bool {
        !matches!(self, Self::Sat)
    }

    /// True when objective `a` is strictly better than `b`.
    pub fn is_better(self, a: f64, b: f64) -> bool {
        match self {
            Self::Min => a < b,
            Self::Max => a > b,
            Self::Sat => false,
        }
    }

    /// Scan MiniZinc source for its solve item. `%` comment lines are ignored.
    pub fn from_minizinc_source(source: &str) -> Option<Self> {
        let code: Vec<&str> = source
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('%'))
            .collect();
        if code.iter().any(|l| l.contains("minimize")) {
            Some(Self::Min)
        } else if code.iter().any(|l| l.contains("maximize")) {
            Some(Self::Max)
        } else if code.iter().any(|l| l.contains("satisfy")) {
            Some(Self::Sat)
        } else {
            None
        }
    }

    /// Scan Essence source for an objective. Models without one are decision problems.
    pub fn from_essence_source(source: &str) -> Self {
        let code = source
            .lines()
            .map(|l| l.split('$').next().unwrap_or(""))
            .collect::<Vec<_>>()
            .join("\n");
        if code.contains("minimising") {
            Self::Min
        } else if code.contains("maximising") {
            Self::Max
        } else {
            Self::Sat
        }
    }

    /// Read the problem type from a `.mzn` or `.essence` model file.
    pub fn from_model_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("mzn") => Self::from_minizinc_source(&source)
                .ok_or_else(|| EvalError::UnknownProblemType(path.to_path_buf())),
            Some("essence") => Ok(Self::from_essence_source(&source)),
            _ => Err(EvalError::UnknownProblemType(path.to_path_buf())),
        }
    }
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Sat => "SAT",
        })
    }
}
