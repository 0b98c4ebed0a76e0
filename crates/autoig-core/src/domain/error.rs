//! Error taxonomy for instance evaluation.

use std::path::PathBuf;

/// Errors raised while invoking solvers, normalizing their output or scoring.
///
/// Resource exhaustion and timeouts are *not* errors: they are ordinary
/// [`RunStatus`](crate::domain::RunStatus) values. Only conditions that make
/// an evaluation meaningless end up here.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("solver {solver} crashed (exit code {exit_code:?}): {output}")]
    SolverCrash {
        solver: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("{tool} failed: {reason}")]
    ToolFailed { tool: String, reason: String },

    #[error("arbitration solver {solver} could not decide satisfiability of {instance}")]
    ArbitrationFailed { solver: String, instance: String },

    #[error("gave up after {waited_secs}s waiting for {}", path.display())]
    MissingArtifact { path: PathBuf, waited_secs: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("cannot determine problem type of {}", .0.display())]
    UnknownProblemType(PathBuf),

    #[error("unsupported solver: {0}")]
    UnsupportedSolver(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for evaluation operations.
pub type Result<T> = std::result::Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_error_display() {
        let err = EvalError::InvalidConfig("nEvaluations must be positive".to_string());
        assert!(err.to_string().contains("invalid configuration"));

        let err = EvalError::SolverCrash {
            solver: "chuffed".to_string(),
            exit_code: Some(139),
            output: "segfault".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("chuffed"));
        assert!(msg.contains("139"));
    }

    #[test]
    fn test_missing_artifact_mentions_path() {
        let err = EvalError::MissingArtifact {
            path: PathBuf::from("/tmp/model-inst.eprime-info"),
            waited_secs: 60,
        };
        let msg = err.to_string();
        assert!(msg.contains("model-inst.eprime-info"));
        assert!(msg.contains("60s"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: EvalError = io.into();
        assert!(matches!(err, EvalError::Io(_)));
    }
}
