//! Domain types shared by the invoker, the scoring engine and the evaluators.

pub mod error;
pub mod problem;
pub mod result;
pub mod run;
pub mod status;

pub use error::{EvalError, Result};
pub use problem::ProblemType;
pub use result::{EvalStatus, InstanceResult, RoleRuns, SolverRole, TunerScore, Verdict};
pub use run::{InstanceType, ObjectivePoint, RunExtra, RunRecord, TranslationStatus};
pub use status::RunStatus;
