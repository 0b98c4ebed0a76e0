//! Evaluation state machines for the graded and discriminating modes.
//!
//! Each evaluator drives one [`EvaluationSession`] from `Init` to `Terminal`,
//! invoking solvers strictly one after another and closing the session at
//! the first check that settles the verdict.

pub mod discriminating;
pub mod graded;

pub use discriminating::DiscriminatingEvaluator;
pub use graded::GradedEvaluator;

use crate::domain::{Result, RunRecord, SolverRole};
use crate::invoker::{RunInvoker, RunRequest};
use crate::session::EvaluationSession;
use tracing::debug;

/// Seed of repetition `index`; runs are unseeded when no initial seed is set.
pub fn repetition_seed(init_seed: Option<u64>, index: usize) -> Option<u64> {
    init_seed.map(|s| s + index as u64)
}

/// Run one repetition of a role and append it to the session.
///
/// Repetition 0 is always invoked. Later repetitions reuse it, re-stamped
/// with the new seed, when the solver is deterministic or translation
/// already failed, since another invocation cannot change the outcome.
pub(crate) async fn run_repetition(
    invoker: &dyn RunInvoker,
    session: &mut EvaluationSession,
    role: SolverRole,
    request: RunRequest,
) -> Result<RunRecord> {
    let reusable = session
        .runs(role)
        .first()
        .filter(|first| request.solver.deterministic || first.translation_failed())
        .map(|first| first.restamped(request.seed));

    let record = match reusable {
        Some(record) => {
            debug!(
                role = %role,
                solver = %request.solver.name,
                seed = ?request.seed,
                "reusing first repetition"
            );
            record
        }
        None => invoker.invoke(&request).await?,
    };
    session.append(role, record).cloned()
}
