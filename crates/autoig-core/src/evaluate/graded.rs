//! Graded evaluation: is the instance hard but solvable for one solver?

use super::{repetition_seed, run_repetition};
use crate::config::{GradedConfig, SolverKind};
use crate::domain::{
    EvalError, EvalStatus, InstanceResult, InstanceType, ProblemType, Result, SolverRole, Verdict,
};
use crate::invoker::{RunInvoker, RunRequest, RunTarget};
use crate::obs::SessionSpan;
use crate::scoring::graded::SCORE_INCORRECT_ANSWER;
use crate::scoring::{
    classify, median_run, screen_median, unwanted_verdict, GradedCriteria, OptimumTracker,
};
use crate::session::{EvalPhase, EvaluationSession, TypeObservation};
use tracing::{info, warn};

pub struct GradedEvaluator<'a> {
    invoker: &'a dyn RunInvoker,
    config: GradedConfig,
}

impl<'a> GradedEvaluator<'a> {
    pub fn new(invoker: &'a dyn RunInvoker, config: GradedConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { invoker, config })
    }

    /// Evaluate an instance, reading the problem type from the model file.
    pub async fn evaluate(&self, target: &RunTarget) -> Result<InstanceResult> {
        let problem_type = ProblemType::from_model_file(&target.model)?;
        self.evaluate_as(target, problem_type).await
    }

    pub async fn evaluate_as(
        &self,
        target: &RunTarget,
        problem_type: ProblemType,
    ) -> Result<InstanceResult> {
        let instance = target.instance_name();
        let mut roles = vec![(SolverRole::Main, self.config.solver.name.as_str())];
        if let Some(oracle) = &self.config.oracle {
            roles.push((SolverRole::Oracle, oracle.solver.name.as_str()));
        }
        let mut session = EvaluationSession::new(&instance, problem_type, &roles);
        let _span = SessionSpan::enter(&session.id().to_string(), &instance);
        info!(
            solver = %self.config.solver.name,
            repetitions = self.config.n_evaluations,
            problem_type = %problem_type,
            "graded evaluation started"
        );

        let verdict = self.drive(&mut session, target).await?;
        session.close(verdict)?;
        session.into_result()
    }

    fn request(&self, target: &RunTarget, seed: Option<u64>) -> RunRequest {
        RunRequest::new(target, &self.config.solver, seed, self.config.time_limit)
            .with_mem_limit(self.config.mem_limit_mb)
    }

    async fn drive(&self, session: &mut EvaluationSession, target: &RunTarget) -> Result<Verdict> {
        let config = &self.config;
        let problem_type = session.problem_type();

        if let Some(verdict) = self.prescreen(session, target).await? {
            return Ok(verdict);
        }

        session.transition(EvalPhase::RunningMain);
        let mut optimum = OptimumTracker::default();
        for index in 0..config.n_evaluations {
            let seed = repetition_seed(config.init_seed, index);
            let record =
                run_repetition(self.invoker, session, SolverRole::Main, self.request(target, seed))
                    .await?;

            if record.is_solved() {
                let reported = record.extra.instance_type;
                if let TypeObservation::Conflicts { believed } =
                    session.observe_instance_type(reported)
                {
                    warn!(
                        believed = %believed,
                        reported = %reported,
                        seed = ?seed,
                        "inconsistent instance type between repetitions"
                    );
                    return Ok(Verdict::new(
                        EvalStatus::InconsistentInstanceTypes,
                        SCORE_INCORRECT_ANSWER,
                    ));
                }
            }
            if let Some(verdict) = optimum.observe(&record) {
                warn!(seed = ?seed, "inconsistent optimal value between repetitions");
                return Ok(verdict);
            }
            if let Some(verdict) = unwanted_verdict(session.instance_type(), &config.unwanted) {
                return Ok(verdict);
            }
        }

        let median = median_run(session.runs(SolverRole::Main), problem_type)
            .cloned()
            .ok_or_else(|| {
                EvalError::InvariantViolation("graded evaluation recorded no runs".to_string())
            })?;
        if let Some(verdict) = screen_median(&median, config.min_time) {
            return Ok(verdict);
        }

        let oracle_run = match &config.oracle {
            Some(oracle) => {
                session.transition(EvalPhase::RunningOracle);
                let seed = repetition_seed(config.init_seed, config.n_evaluations - 1);
                let request = RunRequest::new(target, &oracle.solver, seed, oracle.time_limit)
                    .with_mem_limit(config.mem_limit_mb);
                let record = self.invoker.invoke(&request).await?;
                Some(session.append(SolverRole::Oracle, record)?.clone())
            }
            None => None,
        };

        session.transition(EvalPhase::Scoring);
        let criteria = GradedCriteria {
            problem_type,
            solver_kind: config.solver_kind,
            min_time: config.min_time,
            unwanted: &config.unwanted,
        };
        Ok(classify(
            session.runs(SolverRole::Main),
            oracle_run.as_ref(),
            &criteria,
        ))
    }

    /// Incomplete solvers cannot prove unsatisfiability, so unwanted unsat
    /// instances are caught by a short oracle run before the main solver runs.
    async fn prescreen(
        &self,
        session: &mut EvaluationSession,
        target: &RunTarget,
    ) -> Result<Option<Verdict>> {
        let config = &self.config;
        let Some(oracle) = &config.oracle else {
            return Ok(None);
        };
        if config.solver_kind != SolverKind::Incomplete
            || !config.unwanted.contains(InstanceType::Unsat)
        {
            return Ok(None);
        }

        session.transition(EvalPhase::RunningOracle);
        let request = RunRequest::new(
            target,
            &oracle.solver,
            config.init_seed,
            config.prescreen_time_limit,
        )
        .with_mem_limit(config.mem_limit_mb);
        let record = self.invoker.invoke(&request).await?;
        let record = session.append(SolverRole::Oracle, record)?;
        if record.extra.instance_type == InstanceType::Unsat {
            info!("oracle pre-screen found an unwanted unsat instance");
            return Ok(unwanted_verdict(Some(InstanceType::Unsat), &config.unwanted));
        }
        Ok(None)
    }
}
