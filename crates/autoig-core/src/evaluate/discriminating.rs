//! Discriminating evaluation: does the favoured solver beat the base solver?

use super::{repetition_seed, run_repetition};
use crate::config::DiscriminatingConfig;
use crate::domain::{
    EvalStatus, InstanceResult, InstanceType, ProblemType, Result, SolverRole, Verdict,
};
use crate::invoker::{RunInvoker, RunRequest, RunTarget, SolverSpec};
use crate::obs::SessionSpan;
use crate::oracle::ConsistencyOracle;
use crate::scoring::{
    base_too_easy, beats_optimum, discriminating_score, favoured_solved_any, reference_optimum,
    repetition_scores, sum_scores, unwanted_verdict, SCORE_BASE_TOO_EASY,
    SCORE_FAVOURED_TOO_DIFFICULT,
};
use crate::session::{EvalPhase, EvaluationSession, TypeObservation};
use tracing::{info, warn};

pub struct DiscriminatingEvaluator<'a> {
    invoker: &'a dyn RunInvoker,
    config: DiscriminatingConfig,
}

impl<'a> DiscriminatingEvaluator<'a> {
    pub fn new(invoker: &'a dyn RunInvoker, config: DiscriminatingConfig) -> Result<Self> {
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
        let config = &self.config;
        let instance = target.instance_name();
        let mut session = EvaluationSession::new(
            &instance,
            problem_type,
            &[
                (SolverRole::Favoured, config.favoured.name.as_str()),
                (SolverRole::Base, config.base.name.as_str()),
            ],
        );
        let _span = SessionSpan::enter(&session.id().to_string(), &instance);
        info!(
            favoured = %config.favoured.name,
            base = %config.base.name,
            repetitions = config.n_evaluations,
            problem_type = %problem_type,
            "discriminating evaluation started"
        );

        let mut oracle = ConsistencyOracle::new(config.arbiter.clone(), config.mem_limit_mb);
        let verdict = self.drive(&mut session, &mut oracle, target).await?;
        session.close(verdict)?;
        session.into_result()
    }

    async fn drive(
        &self,
        session: &mut EvaluationSession,
        oracle: &mut ConsistencyOracle,
        target: &RunTarget,
    ) -> Result<Verdict> {
        let config = &self.config;

        session.transition(EvalPhase::RunningFavoured);
        if let Some(verdict) = self
            .run_role(session, oracle, target, SolverRole::Favoured, &config.favoured)
            .await?
        {
            return Ok(verdict);
        }
        if !favoured_solved_any(session.runs(SolverRole::Favoured)) {
            return Ok(Verdict::new(
                EvalStatus::FavouredTooDifficult,
                SCORE_FAVOURED_TOO_DIFFICULT,
            ));
        }

        session.transition(EvalPhase::RunningBase);
        if let Some(verdict) = self
            .run_role(session, oracle, target, SolverRole::Base, &config.base)
            .await?
        {
            return Ok(verdict);
        }
        if base_too_easy(session.runs(SolverRole::Base), config.base_min_time) {
            return Ok(Verdict::new(EvalStatus::BaseTooEasy, SCORE_BASE_TOO_EASY));
        }

        session.transition(EvalPhase::Scoring);
        self.cross_check_objectives(session);

        let problem_type = session.problem_type();
        let scores = repetition_scores(
            session.runs(SolverRole::Base),
            session.runs(SolverRole::Favoured),
            problem_type,
            config.zero_score_when_both_fail,
        )?;
        let totals = sum_scores(&scores, config.scoring_method);
        session.record_borda(scores);
        info!(
            base_total = totals.base,
            favoured_total = totals.favoured,
            method = %config.scoring_method,
            "borda totals"
        );
        let score = discriminating_score(totals, config.n_evaluations)?;
        Ok(Verdict::new(EvalStatus::Scored, score))
    }

    /// Run every repetition of one role, arbitrating on type conflicts.
    async fn run_role(
        &self,
        session: &mut EvaluationSession,
        oracle: &mut ConsistencyOracle,
        target: &RunTarget,
        role: SolverRole,
        solver: &SolverSpec,
    ) -> Result<Option<Verdict>> {
        let config = &self.config;
        for index in 0..config.n_evaluations {
            let seed = repetition_seed(config.init_seed, index);
            let request = RunRequest::new(target, solver, seed, config.time_limit)
                .with_mem_limit(config.mem_limit_mb);
            let record = run_repetition(self.invoker, session, role, request).await?;

            if record.is_solved() {
                let reported = record.extra.instance_type;
                if let TypeObservation::Conflicts { believed } =
                    session.observe_instance_type(reported)
                {
                    warn!(
                        believed = %believed,
                        reported = %reported,
                        solver = %solver.name,
                        seed = ?seed,
                        "solvers disagree on instance type"
                    );
                    let phase = session.phase();
                    session.transition(EvalPhase::OracleArbitration);
                    let known = oracle.verdict().is_some();
                    let verdict = oracle.arbitrate(self.invoker, target, seed).await?;
                    if !known {
                        if let Some(arbitration) = oracle.runs().last() {
                            session.register(SolverRole::Oracle, &config.arbiter.solver.name);
                            session.append(SolverRole::Oracle, arbitration.clone())?;
                        }
                    }
                    session.settle_instance_type(verdict);
                    session.transition(phase);
                }
            }

            if let Some(verdict) = unwanted_verdict(session.instance_type(), &config.unwanted) {
                return Ok(Some(verdict));
            }
        }
        Ok(None)
    }

    /// Use the trusted reference solver's optimality proof to flag runs of the
    /// other solver that claim an impossible objective.
    fn cross_check_objectives(&self, session: &mut EvaluationSession) {
        let problem_type = session.problem_type();
        if session.instance_type() != Some(InstanceType::Sat) || !problem_type.is_optimisation() {
            return;
        }
        let reference = &self.config.reference_solver;
        let (trusted, checked) = if &self.config.base.name == reference {
            (SolverRole::Base, SolverRole::Favoured)
        } else if &self.config.favoured.name == reference {
            (SolverRole::Favoured, SolverRole::Base)
        } else {
            return;
        };
        let Some(optimum) = reference_optimum(session.runs(trusted)) else {
            return;
        };
        session.mark_errors(
            |role, run| role == checked && beats_optimum(run, optimum, problem_type),
            "objective better than the proven optimum",
        );
    }
}
