//! In-memory fakes for the run invoker (testing only)
//!
//! `ScriptedInvoker` replays canned run records per solver name and keeps
//! every request it receives, so tests can drive the evaluators without a
//! solver toolchain.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{EvalError, ObjectivePoint, Result, RunExtra, RunRecord, RunStatus};
use crate::invoker::{RunInvoker, RunRequest};

// ---------------------------------------------------------------------------
// Record builders
// ---------------------------------------------------------------------------

/// A run with no objective trace.
pub fn run(status: RunStatus, time: f64) -> RunRecord {
    RunRecord::new(None, status, 0.0, time, RunExtra::from_status(status))
}

/// A run with `(elapsed, value)` objective points.
pub fn optimisation_run(status: RunStatus, time: f64, trace: &[(f64, f64)]) -> RunRecord {
    let trace = trace
        .iter()
        .map(|&(elapsed, value)| ObjectivePoint { elapsed, value })
        .collect();
    RunRecord::new(
        None,
        status,
        0.0,
        time,
        RunExtra::from_status(status).with_trace(trace),
    )
}

// ---------------------------------------------------------------------------
// ScriptedInvoker
// ---------------------------------------------------------------------------

/// Invoker that pops pre-scripted records, per solver name, in order.
#[derive(Debug, Default)]
pub struct ScriptedInvoker {
    scripts: Mutex<HashMap<String, VecDeque<RunRecord>>>,
    requests: Mutex<Vec<RunRequest>>,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue records to be returned for `solver`.
    pub fn with_runs(self, solver: &str, runs: impl IntoIterator<Item = RunRecord>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(solver.to_string())
            .or_default()
            .extend(runs);
        self
    }

    pub fn calls_for(&self, solver: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.solver.name == solver)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<RunRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RunInvoker for ScriptedInvoker {
    async fn invoke(&self, request: &RunRequest) -> Result<RunRecord> {
        self.requests.lock().unwrap().push(request.clone());
        let mut scripts = self.scripts.lock().unwrap();
        let record = scripts
            .get_mut(&request.solver.name)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| {
                EvalError::InvariantViolation(format!(
                    "no scripted run left for solver {}",
                    request.solver.name
                ))
            })?;
        Ok(record.restamped(request.seed))
    }
}
