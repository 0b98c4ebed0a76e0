//! Structured observability hooks for the evaluation lifecycle.
//!
//! This module provides:
//! - Session-scoped tracing spans via the `SessionSpan` RAII guard
//! - Emission functions for key lifecycle events: run recorded, arbitration,
//!   record repaired, session closed, generator finished
//!
//! Events are emitted at `info!` level, repairs at `warn!`. Filtering follows
//! `RUST_LOG`; see [`crate::telemetry::init_tracing`].

use crate::domain::{EvalStatus, InstanceType, RunStatus, SolverRole};
use tracing::{info, warn};

/// RAII guard that enters a session-scoped span for the duration of an evaluation.
///
/// # Example
///
/// ```ignore
/// let _span = SessionSpan::enter(&session_id, "inst-3-17.dzn");
/// // Every event below carries session_id and instance.
/// ```
pub struct SessionSpan {
    _span: tracing::span::EnteredSpan,
}

impl SessionSpan {
    pub fn enter(session_id: &str, instance: &str) -> Self {
        let span = tracing::info_span!("autoig.session", session_id = %session_id, instance = %instance);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: a run was appended to the session.
pub fn emit_run_recorded(
    role: SolverRole,
    solver: &str,
    seed: Option<u64>,
    status: RunStatus,
    time: f64,
) {
    info!(
        event = "run.recorded",
        role = %role,
        solver = %solver,
        seed = ?seed,
        status = %status,
        time = time,
    );
}

/// Emit event: runs disagreed on satisfiability and the arbiter decided.
pub fn emit_arbitration(instance: &str, solver: &str, verdict: InstanceType, cached: bool) {
    info!(
        event = "oracle.arbitrated",
        instance = %instance,
        solver = %solver,
        verdict = %verdict,
        cached = cached,
    );
}

/// Emit event: a recorded run was shown to be wrong (warning level).
pub fn emit_record_repaired(
    role: SolverRole,
    solver: &str,
    instance: &str,
    seed: Option<u64>,
    reason: &str,
) {
    warn!(
        event = "run.repaired",
        role = %role,
        solver = %solver,
        instance = %instance,
        seed = ?seed,
        reason = %reason,
    );
}

/// Emit event: the session reached its terminal verdict.
pub fn emit_session_closed(instance: &str, status: EvalStatus, score: f64, runs: usize) {
    info!(
        event = "session.closed",
        instance = %instance,
        status = %status,
        score = score,
        runs = runs,
    );
}

/// Emit event: the generator model was solved.
pub fn emit_generator_finished(config_id: &str, status: &str, time: f64) {
    info!(
        event = "generator.finished",
        config_id = %config_id,
        status = %status,
        time = time,
    );
}
