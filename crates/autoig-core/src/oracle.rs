//! Consistency oracle: settles disagreements about satisfiability.
//!
//! When two runs on the same instance report different instance types, an
//! arbitration solver is run once and its answer is cached for the rest of
//! the session.

use crate::config::OracleSpec;
use crate::domain::{EvalError, InstanceType, Result, RunRecord};
use crate::invoker::{RunInvoker, RunRequest, RunTarget};
use crate::obs;
use tracing::info;

pub struct ConsistencyOracle {
    arbiter: OracleSpec,
    mem_limit_mb: u64,
    verdict: Option<InstanceType>,
    runs: Vec<RunRecord>,
}

impl ConsistencyOracle {
    pub fn new(arbiter: OracleSpec, mem_limit_mb: u64) -> Self {
        Self {
            arbiter,
            mem_limit_mb,
            verdict: None,
            runs: Vec::new(),
        }
    }

    pub fn verdict(&self) -> Option<InstanceType> {
        self.verdict
    }

    /// Arbitration runs performed so far (at most one).
    pub fn runs(&self) -> &[RunRecord] {
        &self.runs
    }

    /// Decide the instance type, invoking the arbiter only the first time.
    pub async fn arbitrate(
        &mut self,
        invoker: &dyn RunInvoker,
        target: &RunTarget,
        seed: Option<u64>,
    ) -> Result<InstanceType> {
        let instance = target.instance_name();
        if let Some(verdict) = self.verdict {
            obs::emit_arbitration(&instance, &self.arbiter.solver.name, verdict, true);
            return Ok(verdict);
        }

        info!(
            solver = %self.arbiter.solver.name,
            instance = %instance,
            "inconsistent instance types, running arbitration solver"
        );
        let request = RunRequest::new(target, &self.arbiter.solver, seed, self.arbiter.time_limit)
            .with_mem_limit(self.mem_limit_mb);
        let record = invoker.invoke(&request).await?;
        let verdict = record.extra.instance_type;
        self.runs.push(record);

        if !verdict.is_decided() {
            return Err(EvalError::ArbitrationFailed {
                solver: self.arbiter.solver.name.clone(),
                instance,
            });
        }
        obs::emit_arbitration(&instance, &self.arbiter.solver.name, verdict, false);
        self.verdict = Some(verdict);
        Ok(verdict)
    }
}
