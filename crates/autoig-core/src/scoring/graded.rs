//! Gradedness classification for a single target solver.
//!
//! Checks run in a fixed order and the first one that fires decides the
//! verdict. The evaluator applies the cheap checks as runs arrive and calls
//! [`classify`] once everything is in.

use super::order::median_run;
use crate::config::{SolverKind, UnwantedTypes};
use crate::domain::{EvalStatus, InstanceType, ProblemType, RunRecord, RunStatus, Verdict};

pub const SCORE_UNWANTED_TYPE: f64 = 0.0;
pub const SCORE_TOO_EASY: f64 = 0.0;
pub const SCORE_TOO_DIFFICULT: f64 = 0.0;
pub const SCORE_INCORRECT_ANSWER: f64 = 0.0;
pub const SCORE_GRADED: f64 = -1.0;

/// Thresholds and context for classification.
#[derive(Debug, Clone)]
pub struct GradedCriteria<'a> {
    pub problem_type: ProblemType,
    pub solver_kind: SolverKind,
    /// Complete proofs faster than this are too easy.
    pub min_time: f64,
    pub unwanted: &'a UnwantedTypes,
}

/// Unwanted-type check against the session's instance type.
pub fn unwanted_verdict(
    instance_type: Option<InstanceType>,
    unwanted: &UnwantedTypes,
) -> Option<Verdict> {
    instance_type
        .filter(|t| unwanted.contains(*t))
        .map(|_| Verdict::new(EvalStatus::UnwantedType, SCORE_UNWANTED_TYPE))
}

/// Tracks the proven optimum across repetitions of the main solver.
#[derive(Debug, Clone, Default)]
pub struct OptimumTracker {
    optimum: Option<f64>,
}

impl OptimumTracker {
    /// Returns a verdict when a complete proof disagrees with an earlier one.
    pub fn observe(&mut self, run: &RunRecord) -> Option<Verdict> {
        if run.status != RunStatus::CompleteProof {
            return None;
        }
        let value = run.final_objective()?;
        match self.optimum {
            None => {
                self.optimum = Some(value);
                None
            }
            Some(known) if known != value => Some(Verdict::new(
                EvalStatus::InconsistentOptimalValues,
                SCORE_INCORRECT_ANSWER,
            )),
            Some(_) => None,
        }
    }
}

/// Too easy or too difficult, judged on the median run alone.
pub fn screen_median(median: &RunRecord, min_time: f64) -> Option<Verdict> {
    if median.status == RunStatus::CompleteProof && median.time < min_time {
        return Some(Verdict::new(EvalStatus::TooEasy, SCORE_TOO_EASY));
    }
    if !median.is_solved() {
        return Some(Verdict::new(EvalStatus::TooDifficult, SCORE_TOO_DIFFICULT));
    }
    None
}

/// Full classification of the main runs, optionally against an oracle run.
pub fn classify(
    main_runs: &[RunRecord],
    oracle: Option<&RunRecord>,
    criteria: &GradedCriteria<'_>,
) -> Verdict {
    let problem_type = criteria.problem_type;

    if main_runs
        .iter()
        .any(|r| r.is_solved() && criteria.unwanted.contains(r.extra.instance_type))
    {
        return Verdict::new(EvalStatus::UnwantedType, SCORE_UNWANTED_TYPE);
    }

    let Some(median) = median_run(main_runs, problem_type) else {
        return Verdict::new(EvalStatus::TooDifficult, SCORE_TOO_DIFFICULT);
    };
    if let Some(verdict) = screen_median(median, criteria.min_time) {
        return verdict;
    }

    let Some(oracle) = oracle else {
        return Verdict::new(EvalStatus::Graded, SCORE_GRADED);
    };
    if !oracle.status.is_complete() {
        return Verdict::new(EvalStatus::TooDifficultOracle, SCORE_TOO_DIFFICULT);
    }

    let oracle_type = oracle.extra.instance_type;
    if main_runs
        .iter()
        .any(|r| r.is_solved() && r.extra.instance_type != oracle_type)
    {
        return incorrect(EvalStatus::IncorrectInstanceType);
    }

    let optimum = oracle.final_objective();
    if oracle_type == InstanceType::Sat && problem_type.is_optimisation() {
        if let Some(optimum) = optimum {
            let impossible = main_runs.iter().any(|r| {
                r.is_solved()
                    && r.extra
                        .objective_trace
                        .iter()
                        .any(|p| problem_type.is_better(p.value, optimum))
            });
            if impossible {
                return incorrect(EvalStatus::IncorrectObjectiveValue);
            }

            let wrong_proof = main_runs.iter().any(|r| {
                r.status == RunStatus::CompleteProof && r.final_objective() != Some(optimum)
            });
            if wrong_proof {
                return incorrect(EvalStatus::IncorrectOptimalValue);
            }

            // Incomplete solvers never prove optimality; judge them on reaching it.
            if criteria.solver_kind == SolverKind::Incomplete {
                if median.final_objective() != Some(optimum) {
                    return Verdict::new(EvalStatus::TooDifficult, SCORE_TOO_DIFFICULT);
                }
                let reached = median.time_to_final_objective().unwrap_or(median.time);
                if reached < criteria.min_time {
                    return Verdict::new(EvalStatus::TooEasy, SCORE_TOO_EASY);
                }
            }
        }
    }

    Verdict::new(EvalStatus::Graded, SCORE_GRADED)
}

fn incorrect(status: EvalStatus) -> Verdict {
    Verdict::new(status, SCORE_INCORRECT_ANSWER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ObjectivePoint, RunExtra};

    fn run(status: RunStatus, time: f64) -> RunRecord {
        RunRecord::new(None, status, 0.0, time, RunExtra::from_status(status))
    }

    fn opt_run(status: RunStatus, time: f64, trace: &[(f64, f64)]) -> RunRecord {
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

    fn criteria(
        problem_type: ProblemType,
        kind: SolverKind,
        unwanted: &UnwantedTypes,
    ) -> GradedCriteria<'_> {
        GradedCriteria {
            problem_type,
            solver_kind: kind,
            min_time: 10.0,
            unwanted,
        }
    }

    #[test]
    fn test_unsat_in_five_seconds_is_graded() {
        let none = UnwantedTypes::default();
        let v = classify(
            &[run(RunStatus::Unsat, 5.0)],
            None,
            &criteria(ProblemType::Sat, SolverKind::Complete, &none),
        );
        assert_eq!(v, Verdict::new(EvalStatus::Graded, -1.0));
    }

    #[test]
    fn test_fast_proof_is_too_easy() {
        let none = UnwantedTypes::default();
        let v = classify(
            &[run(RunStatus::CompleteProof, 2.0)],
            None,
            &criteria(ProblemType::Sat, SolverKind::Complete, &none),
        );
        assert_eq!(v.status, EvalStatus::TooEasy);
    }

    #[test]
    fn test_unsolved_median_is_too_difficult() {
        let none = UnwantedTypes::default();
        let runs = [
            run(RunStatus::SolveTimeOut, 60.0),
            run(RunStatus::SolveTimeOut, 60.0),
            run(RunStatus::CompleteProof, 30.0),
        ];
        let v = classify(
            &runs,
            None,
            &criteria(ProblemType::Sat, SolverKind::Complete, &none),
        );
        assert_eq!(v.status, EvalStatus::TooDifficult);
    }

    #[test]
    fn test_unwanted_type() {
        let unwanted = UnwantedTypes::new([InstanceType::Unsat]);
        let v = classify(
            &[run(RunStatus::Unsat, 20.0)],
            None,
            &criteria(ProblemType::Sat, SolverKind::Complete, &unwanted),
        );
        assert_eq!(v.status, EvalStatus::UnwantedType);
        assert_eq!(
            unwanted_verdict(Some(InstanceType::Unsat), &unwanted).map(|v| v.status),
            Some(EvalStatus::UnwantedType)
        );
        assert!(unwanted_verdict(Some(InstanceType::Sat), &unwanted).is_none());
        assert!(unwanted_verdict(None, &unwanted).is_none());
    }

    #[test]
    fn test_oracle_checks() {
        let none = UnwantedTypes::default();
        let c = criteria(ProblemType::Min, SolverKind::Complete, &none);
        let main = [opt_run(RunStatus::Solved, 60.0, &[(12.0, 15.0)])];

        let oracle_timeout = run(RunStatus::SolveTimeOut, 3600.0);
        assert_eq!(
            classify(&main, Some(&oracle_timeout), &c).status,
            EvalStatus::TooDifficultOracle
        );

        let oracle_unsat = run(RunStatus::Unsat, 100.0);
        assert_eq!(
            classify(&main, Some(&oracle_unsat), &c).status,
            EvalStatus::IncorrectInstanceType
        );

        let oracle_opt = opt_run(RunStatus::CompleteProof, 100.0, &[(90.0, 20.0)]);
        assert_eq!(
            classify(&main, Some(&oracle_opt), &c).status,
            EvalStatus::IncorrectObjectiveValue
        );

        let oracle_opt = opt_run(RunStatus::CompleteProof, 100.0, &[(90.0, 14.0)]);
        assert_eq!(
            classify(&main, Some(&oracle_opt), &c),
            Verdict::new(EvalStatus::Graded, SCORE_GRADED)
        );
    }

    #[test]
    fn test_wrong_optimal_proof() {
        let none = UnwantedTypes::default();
        let c = criteria(ProblemType::Max, SolverKind::Complete, &none);
        let main = [opt_run(RunStatus::CompleteProof, 40.0, &[(30.0, 7.0)])];
        let oracle = opt_run(RunStatus::CompleteProof, 100.0, &[(90.0, 9.0)]);
        assert_eq!(
            classify(&main, Some(&oracle), &c).status,
            EvalStatus::IncorrectOptimalValue
        );
    }

    #[test]
    fn test_incomplete_solver_refinements() {
        let none = UnwantedTypes::default();
        let c = criteria(ProblemType::Min, SolverKind::Incomplete, &none);
        let oracle = opt_run(RunStatus::CompleteProof, 100.0, &[(90.0, 5.0)]);

        let short_of_optimum = [opt_run(RunStatus::Solved, 60.0, &[(20.0, 6.0)])];
        assert_eq!(
            classify(&short_of_optimum, Some(&oracle), &c).status,
            EvalStatus::TooDifficult
        );

        let quick = [opt_run(RunStatus::Solved, 60.0, &[(1.0, 7.0), (3.0, 5.0)])];
        assert_eq!(
            classify(&quick, Some(&oracle), &c).status,
            EvalStatus::TooEasy
        );

        let slow = [opt_run(RunStatus::Solved, 60.0, &[(45.0, 5.0)])];
        assert_eq!(classify(&slow, Some(&oracle), &c).status, EvalStatus::Graded);
    }

    #[test]
    fn test_optimum_tracker() {
        let mut tracker = OptimumTracker::default();
        assert!(tracker
            .observe(&opt_run(RunStatus::CompleteProof, 20.0, &[(15.0, 3.0)]))
            .is_none());
        assert!(tracker
            .observe(&opt_run(RunStatus::Solved, 60.0, &[(15.0, 4.0)]))
            .is_none());
        assert_eq!(
            tracker
                .observe(&opt_run(RunStatus::CompleteProof, 20.0, &[(15.0, 4.0)]))
                .map(|v| v.status),
            Some(EvalStatus::InconsistentOptimalValues)
        );
    }
}
