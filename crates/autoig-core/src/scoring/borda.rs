//! Pairwise Borda points for two runs on the same instance.
//!
//! Every comparison hands out one point in total unless both runs fail and
//! the zero-when-both-fail rule is on. Without that rule a double failure
//! follows the competition convention and the second run takes the point. Two rule sets are computed side by
//! side: the complete rules reward optimality proofs, the incomplete rules
//! only look at solution quality.

use super::order::compare_objectives;
use crate::domain::{ProblemType, RunRecord, RunStatus};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Which Borda rule set decides the discriminating score.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMethod {
    #[default]
    Complete,
    Incomplete,
}

impl FromStr for ScoringMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "complete" => Ok(Self::Complete),
            "incomplete" => Ok(Self::Incomplete),
            other => Err(format!("unknown scoring method: {other}")),
        }
    }
}

impl fmt::Display for ScoringMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Complete => "complete",
            Self::Incomplete => "incomplete",
        })
    }
}

/// Points for (first run, second run) under both rule sets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BordaScores {
    pub complete: (f64, f64),
    pub incomplete: (f64, f64),
}

impl BordaScores {
    pub fn for_method(&self, method: ScoringMethod) -> (f64, f64) {
        match method {
            ScoringMethod::Complete => self.complete,
            ScoringMethod::Incomplete => self.incomplete,
        }
    }
}

/// Score two runs of different solvers on the same instance and repetition.
pub fn borda_scores(
    first: &RunRecord,
    second: &RunRecord,
    problem_type: ProblemType,
    zero_when_both_fail: bool,
) -> BordaScores {
    if !problem_type.is_optimisation() {
        let points = decision_points(first, second, zero_when_both_fail);
        return BordaScores {
            complete: points,
            incomplete: points,
        };
    }
    BordaScores {
        complete: optimisation_points(
            first,
            second,
            |a, b| better_complete(a, b, problem_type),
            zero_when_both_fail,
        ),
        incomplete: optimisation_points(
            first,
            second,
            |a, b| better_incomplete(a, b, problem_type),
            zero_when_both_fail,
        ),
    }
}

fn decision_points(a: &RunRecord, b: &RunRecord, zero_when_both_fail: bool) -> (f64, f64) {
    match (a.is_solved(), b.is_solved()) {
        (true, false) => (1.0, 0.0),
        (false, true) => (0.0, 1.0),
        (true, true) => time_share(a.time, b.time),
        (false, false) => both_failed(zero_when_both_fail),
    }
}

fn optimisation_points<F>(
    a: &RunRecord,
    b: &RunRecord,
    better: F,
    zero_when_both_fail: bool,
) -> (f64, f64)
where
    F: Fn(&RunRecord, &RunRecord) -> bool,
{
    if better(a, b) {
        return (1.0, 0.0);
    }
    if better(b, a) {
        return (0.0, 1.0);
    }
    if !a.is_solved() && !b.is_solved() {
        return both_failed(zero_when_both_fail);
    }
    if a.status.is_complete() && b.status.is_complete() {
        return time_share(a.time, b.time);
    }
    // Same quality without a proof on both sides: whoever got there first.
    time_share(
        a.time_to_final_objective().unwrap_or(a.time),
        b.time_to_final_objective().unwrap_or(b.time),
    )
}

fn better_complete(a: &RunRecord, b: &RunRecord, problem_type: ProblemType) -> bool {
    if a.is_solved() && !b.is_solved() {
        return true;
    }
    if a.status.is_complete() && !b.status.is_complete() {
        return true;
    }
    a.status == RunStatus::Solved
        && b.status == RunStatus::Solved
        && compare_objectives(a.final_objective(), b.final_objective(), problem_type)
            == Ordering::Greater
}

fn better_incomplete(a: &RunRecord, b: &RunRecord, problem_type: ProblemType) -> bool {
    if a.is_solved() && !b.is_solved() {
        return true;
    }
    a.is_solved()
        && b.is_solved()
        && compare_objectives(a.final_objective(), b.final_objective(), problem_type)
            == Ordering::Greater
}

/// Split one point in inverse proportion to the times taken.
fn time_share(a: f64, b: f64) -> (f64, f64) {
    let total = a + b;
    if total <= 0.0 {
        return (0.5, 0.5);
    }
    (b / total, a / total)
}

fn both_failed(zero_when_both_fail: bool) -> (f64, f64) {
    if zero_when_both_fail {
        (0.0, 0.0)
    } else {
        (0.0, 1.0)
    }
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

    fn close(actual: (f64, f64), expected: (f64, f64)) -> bool {
        (actual.0 - expected.0).abs() < 1e-9 && (actual.1 - expected.1).abs() < 1e-9
    }

    #[test]
    fn test_decision_both_solved_share_by_time() {
        let s = borda_scores(
            &run(RunStatus::CompleteProof, 1.0),
            &run(RunStatus::CompleteProof, 3.0),
            ProblemType::Sat,
            true,
        );
        assert!(close(s.complete, (0.75, 0.25)));
        assert_eq!(s.complete, s.incomplete);
    }

    #[test]
    fn test_decision_one_solved() {
        let s = borda_scores(
            &run(RunStatus::SolveTimeOut, 60.0),
            &run(RunStatus::Unsat, 5.0),
            ProblemType::Sat,
            true,
        );
        assert!(close(s.complete, (0.0, 1.0)));
    }

    #[test]
    fn test_both_fail_rule() {
        let a = run(RunStatus::SolveTimeOut, 60.0);
        let b = run(RunStatus::SolveMemOut, 20.0);
        let s = borda_scores(&a, &b, ProblemType::Min, true);
        assert!(close(s.complete, (0.0, 0.0)));
        assert!(close(s.incomplete, (0.0, 0.0)));
    }

    #[test]
    fn test_both_fail_competition_convention() {
        let a = run(RunStatus::SolveTimeOut, 60.0);
        let b = run(RunStatus::SolveMemOut, 20.0);
        for problem_type in [ProblemType::Sat, ProblemType::Min] {
            let s = borda_scores(&a, &b, problem_type, false);
            assert!(close(s.complete, (0.0, 1.0)), "{problem_type}: {:?}", s);
            assert!(close(s.incomplete, (0.0, 1.0)), "{problem_type}: {:?}", s);
        }
        // the point goes to the second run whatever the order
        let s = borda_scores(&b, &a, ProblemType::Sat, false);
        assert!(close(s.complete, (0.0, 1.0)));
    }

    #[test]
    fn test_zero_times_split_evenly() {
        let s = borda_scores(
            &run(RunStatus::CompleteProof, 0.0),
            &run(RunStatus::CompleteProof, 0.0),
            ProblemType::Sat,
            true,
        );
        assert!(close(s.complete, (0.5, 0.5)));
    }

    #[test]
    fn test_proof_vs_better_incumbent_differs_by_rule_set() {
        // a proves optimum 10, b only reaches 10 without proof
        let a = opt_run(RunStatus::CompleteProof, 30.0, &[(25.0, 10.0)]);
        let b = opt_run(RunStatus::Solved, 60.0, &[(5.0, 10.0)]);
        let s = borda_scores(&a, &b, ProblemType::Min, true);
        assert!(close(s.complete, (1.0, 0.0)));
        // equal quality: time to reach 25 vs 5
        assert!(close(s.incomplete, (5.0 / 30.0, 25.0 / 30.0)));
    }

    #[test]
    fn test_better_objective_wins_both_rule_sets() {
        let a = opt_run(RunStatus::Solved, 60.0, &[(5.0, 8.0)]);
        let b = opt_run(RunStatus::Solved, 60.0, &[(1.0, 12.0)]);
        let s = borda_scores(&a, &b, ProblemType::Min, true);
        assert!(close(s.complete, (1.0, 0.0)));
        assert!(close(s.incomplete, (1.0, 0.0)));
        let s = borda_scores(&a, &b, ProblemType::Max, true);
        assert!(close(s.complete, (0.0, 1.0)));
    }

    #[test]
    fn test_points_never_exceed_one() {
        let runs = [
            opt_run(RunStatus::CompleteProof, 3.0, &[(2.0, 4.0)]),
            opt_run(RunStatus::Solved, 10.0, &[(2.0, 4.0)]),
            opt_run(RunStatus::Solved, 10.0, &[(7.0, 6.0)]),
            run(RunStatus::SolveTimeOut, 10.0),
            run(RunStatus::Unsat, 1.0),
        ];
        for a in &runs {
            for b in &runs {
                for zero in [true, false] {
                    let s = borda_scores(a, b, ProblemType::Max, zero);
                    for (x, y) in [s.complete, s.incomplete] {
                        assert!(x >= 0.0 && y >= 0.0);
                        assert!(x + y <= 1.0 + 1e-9);
                    }
                }
            }
        }
    }

    #[test]
    fn test_scoring_method_parse() {
        assert_eq!("incomplete".parse::<ScoringMethod>().unwrap(), ScoringMethod::Incomplete);
        assert!("borda".parse::<ScoringMethod>().is_err());
    }
}
