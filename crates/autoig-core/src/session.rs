//! Per-instance evaluation session.
//!
//! The session owns every run recorded for one instance, the instance type
//! once it is known, and the terminal verdict. Records are append-only; a
//! repair never edits a record in place but swaps in a reconciled copy of
//! the run table.

use crate::domain::{
    EvalError, InstanceResult, InstanceType, ProblemType, Result, RoleRuns, RunRecord, RunStatus,
    SolverRole, Verdict,
};
use crate::obs;
use crate::scoring::BordaScores;
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalPhase {
    Init,
    RunningMain,
    RunningFavoured,
    OracleArbitration,
    RunningOracle,
    RunningBase,
    Scoring,
    Terminal,
}

/// Outcome of comparing a run's instance type with the session's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeObservation {
    First,
    Agrees,
    Conflicts { believed: InstanceType },
}

/// A record marked as erroneous by a repair.
#[derive(Debug, Clone, PartialEq)]
pub struct Repair {
    pub role: SolverRole,
    pub solver: String,
    pub index: usize,
    pub seed: Option<u64>,
    pub previous: RunStatus,
}

pub struct EvaluationSession {
    id: Uuid,
    instance: String,
    problem_type: ProblemType,
    phase: EvalPhase,
    solvers: BTreeMap<SolverRole, String>,
    runs: BTreeMap<SolverRole, Vec<RunRecord>>,
    instance_type: Option<InstanceType>,
    borda: Vec<BordaScores>,
    terminal: Option<Verdict>,
}

impl EvaluationSession {
    /// Open a session with the roles it will record, in the order given.
    pub fn new(instance: &str, problem_type: ProblemType, roles: &[(SolverRole, &str)]) -> Self {
        Self {
            id: Uuid::new_v4(),
            instance: instance.to_string(),
            problem_type,
            phase: EvalPhase::Init,
            solvers: roles
                .iter()
                .map(|(role, solver)| (*role, solver.to_string()))
                .collect(),
            runs: roles.iter().map(|(role, _)| (*role, Vec::new())).collect(),
            instance_type: None,
            borda: Vec::new(),
            terminal: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn problem_type(&self) -> ProblemType {
        self.problem_type
    }

    pub fn phase(&self) -> EvalPhase {
        self.phase
    }

    pub fn instance_type(&self) -> Option<InstanceType> {
        self.instance_type
    }

    pub fn is_closed(&self) -> bool {
        self.terminal.is_some()
    }

    pub fn runs(&self, role: SolverRole) -> &[RunRecord] {
        self.runs.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn solver(&self, role: SolverRole) -> &str {
        self.solvers.get(&role).map(String::as_str).unwrap_or("")
    }

    /// Register a role after the session has opened. A role that is already
    /// known keeps its solver and runs.
    pub fn register(&mut self, role: SolverRole, solver: &str) {
        self.solvers
            .entry(role)
            .or_insert_with(|| solver.to_string());
        self.runs.entry(role).or_default();
    }

    pub fn transition(&mut self, phase: EvalPhase) {
        debug!(from = ?self.phase, to = ?phase, "session phase change");
        self.phase = phase;
    }

    /// Append a run for a registered role.
    pub fn append(&mut self, role: SolverRole, record: RunRecord) -> Result<&RunRecord> {
        if self.is_closed() {
            return Err(EvalError::InvariantViolation(format!(
                "run appended to closed session for {}",
                self.instance
            )));
        }
        record.check_consistent()?;
        let solver = self.solver(role).to_string();
        let runs = self.runs.get_mut(&role).ok_or_else(|| {
            EvalError::InvariantViolation(format!("role {role} is not part of this session"))
        })?;
        obs::emit_run_recorded(role, &solver, record.seed, record.status, record.time);
        runs.push(record);
        Ok(&runs[runs.len() - 1])
    }

    /// Compare a reported instance type with the one the session believes.
    ///
    /// The first decided type becomes the session's type.
    pub fn observe_instance_type(&mut self, reported: InstanceType) -> TypeObservation {
        if !reported.is_decided() {
            return TypeObservation::Agrees;
        }
        match self.instance_type {
            None => {
                self.instance_type = Some(reported);
                TypeObservation::First
            }
            Some(believed) if believed == reported => TypeObservation::Agrees,
            Some(believed) => TypeObservation::Conflicts { believed },
        }
    }

    /// Replace the believed instance type and mark every run that contradicts it.
    pub fn settle_instance_type(&mut self, verdict: InstanceType) -> Vec<Repair> {
        self.instance_type = Some(verdict);
        self.mark_errors(
            |_, run| {
                run.status != RunStatus::Error
                    && run.extra.instance_type.is_decided()
                    && run.extra.instance_type != verdict
            },
            "reported instance type contradicts arbitration",
        )
    }

    /// Mark runs selected by `offending` as erroneous.
    ///
    /// Builds a reconciled copy of the run table and swaps it in; records that
    /// are not selected come through untouched.
    pub fn mark_errors<F>(&mut self, mut offending: F, reason: &str) -> Vec<Repair>
    where
        F: FnMut(SolverRole, &RunRecord) -> bool,
    {
        let mut repairs = Vec::new();
        let mut reconciled = BTreeMap::new();
        for (role, runs) in &self.runs {
            let mut copy = Vec::with_capacity(runs.len());
            for (index, run) in runs.iter().enumerate() {
                if offending(*role, run) {
                    let repair = Repair {
                        role: *role,
                        solver: self.solver(*role).to_string(),
                        index,
                        seed: run.seed,
                        previous: run.status,
                    };
                    obs::emit_record_repaired(
                        *role,
                        &repair.solver,
                        &self.instance,
                        run.seed,
                        reason,
                    );
                    repairs.push(repair);
                    copy.push(RunRecord {
                        status: RunStatus::Error,
                        ..run.clone()
                    });
                } else {
                    copy.push(run.clone());
                }
            }
            reconciled.insert(*role, copy);
        }
        self.runs = reconciled;
        repairs
    }

    pub fn record_borda(&mut self, scores: Vec<BordaScores>) {
        self.borda = scores;
    }

    /// Set the terminal verdict. A session closes exactly once.
    pub fn close(&mut self, verdict: Verdict) -> Result<()> {
        if let Some(existing) = self.terminal {
            return Err(EvalError::InvariantViolation(format!(
                "session for {} already closed as {}",
                self.instance, existing.status
            )));
        }
        let recorded: usize = self.runs.values().map(Vec::len).sum();
        obs::emit_session_closed(&self.instance, verdict.status, verdict.score, recorded);
        self.terminal = Some(verdict);
        self.phase = EvalPhase::Terminal;
        Ok(())
    }

    pub fn into_result(self) -> Result<InstanceResult> {
        let verdict = self.terminal.ok_or_else(|| {
            EvalError::InvariantViolation(format!(
                "session for {} finished without a verdict",
                self.instance
            ))
        })?;
        let mut solvers = self.solvers;
        let results = self
            .runs
            .into_iter()
            .map(|(role, runs)| {
                let solver = solvers.remove(&role).unwrap_or_default();
                (role, RoleRuns { solver, runs })
            })
            .collect();
        Ok(InstanceResult {
            instance: self.instance,
            status: verdict.status,
            score: verdict.score,
            results,
            borda: self.borda,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EvalStatus, RunExtra};

    fn run(status: RunStatus, seed: u64) -> RunRecord {
        RunRecord::new(Some(seed), status, 0.1, 1.0, RunExtra::from_status(status))
    }

    fn session() -> EvaluationSession {
        EvaluationSession::new(
            "inst-1-7.dzn",
            ProblemType::Sat,
            &[(SolverRole::Favoured, "ortools"), (SolverRole::Base, "chuffed")],
        )
    }

    #[test]
    fn test_append_and_read_back_in_order() {
        let mut s = session();
        s.append(SolverRole::Base, run(RunStatus::Solved, 1)).unwrap();
        s.append(SolverRole::Base, run(RunStatus::SolveTimeOut, 2)).unwrap();
        let seeds: Vec<_> = s.runs(SolverRole::Base).iter().map(|r| r.seed).collect();
        assert_eq!(seeds, vec![Some(1), Some(2)]);
        assert!(s.runs(SolverRole::Favoured).is_empty());
    }

    #[test]
    fn test_unregistered_role_rejected() {
        let mut s = session();
        assert!(s.append(SolverRole::Main, run(RunStatus::Solved, 1)).is_err());
    }

    #[test]
    fn test_late_registration() {
        let mut s = session();
        s.register(SolverRole::Oracle, "cplex");
        s.append(SolverRole::Oracle, run(RunStatus::CompleteProof, 1)).unwrap();
        s.register(SolverRole::Oracle, "gurobi");
        assert_eq!(s.solver(SolverRole::Oracle), "cplex");
        assert_eq!(s.runs(SolverRole::Oracle).len(), 1);
    }

    #[test]
    fn test_instance_type_observation() {
        let mut s = session();
        assert_eq!(s.observe_instance_type(InstanceType::Unknown), TypeObservation::Agrees);
        assert_eq!(s.observe_instance_type(InstanceType::Sat), TypeObservation::First);
        assert_eq!(s.observe_instance_type(InstanceType::Sat), TypeObservation::Agrees);
        assert_eq!(
            s.observe_instance_type(InstanceType::Unsat),
            TypeObservation::Conflicts {
                believed: InstanceType::Sat
            }
        );
    }

    #[test]
    fn test_settle_marks_only_contradicting_runs() {
        let mut s = session();
        s.append(SolverRole::Favoured, run(RunStatus::Unsat, 1)).unwrap();
        s.append(SolverRole::Base, run(RunStatus::CompleteProof, 1)).unwrap();
        s.append(SolverRole::Base, run(RunStatus::SolveTimeOut, 2)).unwrap();
        let repairs = s.settle_instance_type(InstanceType::Sat);

        assert_eq!(repairs.len(), 1);
        assert_eq!(repairs[0].role, SolverRole::Favoured);
        assert_eq!(repairs[0].solver, "ortools");
        assert_eq!(repairs[0].previous, RunStatus::Unsat);
        assert_eq!(s.runs(SolverRole::Favoured)[0].status, RunStatus::Error);
        assert_eq!(s.runs(SolverRole::Base)[0].status, RunStatus::CompleteProof);
        assert_eq!(s.instance_type(), Some(InstanceType::Sat));
    }

    #[test]
    fn test_close_exactly_once() {
        let mut s = session();
        s.close(Verdict::new(EvalStatus::FavouredTooDifficult, 0.0)).unwrap();
        assert_eq!(s.phase(), EvalPhase::Terminal);
        assert!(s.close(Verdict::new(EvalStatus::Scored, -1.0)).is_err());
        assert!(s.append(SolverRole::Base, run(RunStatus::Solved, 3)).is_err());

        let result = s.into_result().unwrap();
        assert_eq!(result.status, EvalStatus::FavouredTooDifficult);
        assert_eq!(result.results[&SolverRole::Base].solver, "chuffed");
    }

    #[test]
    fn test_unclosed_session_has_no_result() {
        assert!(matches!(
            session().into_result(),
            Err(EvalError::InvariantViolation(_))
        ));
    }
}
