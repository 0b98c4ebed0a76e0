//! Discriminating score: how much better the favoured solver does than the base solver.

use super::borda::{borda_scores, BordaScores, ScoringMethod};
use crate::domain::{EvalError, ProblemType, Result, RunRecord, RunStatus};

pub const SCORE_FAVOURED_TOO_DIFFICULT: f64 = 0.0;
pub const SCORE_BASE_TOO_EASY: f64 = 0.0;
/// Favoured solver solved everything, base solver nothing.
pub const SCORE_BEST: f64 = -9999.0;

/// Summed Borda points over all repetitions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BordaTotals {
    pub base: f64,
    pub favoured: f64,
}

/// The favoured solver answered on at least one repetition.
pub fn favoured_solved_any(runs: &[RunRecord]) -> bool {
    runs.iter().any(RunRecord::is_solved)
}

/// Every base run settled the instance and did so quickly on average.
pub fn base_too_easy(runs: &[RunRecord], base_min_time: f64) -> bool {
    if runs.is_empty() || !runs.iter().all(|r| r.status.is_complete()) {
        return false;
    }
    let mean = runs.iter().map(|r| r.time).sum::<f64>() / runs.len() as f64;
    mean < base_min_time
}

/// Borda points for each repetition, base run first.
pub fn repetition_scores(
    base_runs: &[RunRecord],
    favoured_runs: &[RunRecord],
    problem_type: ProblemType,
    zero_when_both_fail: bool,
) -> Result<Vec<BordaScores>> {
    if base_runs.len() != favoured_runs.len() {
        return Err(EvalError::InvariantViolation(format!(
            "{} base runs but {} favoured runs",
            base_runs.len(),
            favoured_runs.len()
        )));
    }
    Ok(base_runs
        .iter()
        .zip(favoured_runs)
        .map(|(b, f)| borda_scores(b, f, problem_type, zero_when_both_fail))
        .collect())
}

pub fn sum_scores(scores: &[BordaScores], method: ScoringMethod) -> BordaTotals {
    scores
        .iter()
        .map(|s| s.for_method(method))
        .fold(BordaTotals::default(), |acc, (base, favoured)| BordaTotals {
            base: acc.base + base,
            favoured: acc.favoured + favoured,
        })
}

/// Turn summed points into the tuner score.
///
/// A base total of zero means the favoured solver won every repetition
/// outright, which yields the best possible score.
pub fn discriminating_score(totals: BordaTotals, repetitions: usize) -> Result<f64> {
    if totals.favoured == 0.0 {
        return Ok(0.0);
    }
    if totals.base == 0.0 {
        if totals.favoured != repetitions as f64 {
            return Err(EvalError::InvariantViolation(format!(
                "base scored nothing but favoured total is {} over {} repetitions",
                totals.favoured, repetitions
            )));
        }
        return Ok(SCORE_BEST);
    }
    Ok(-totals.favoured / totals.base)
}

/// Optimum proven by the first complete run that reports one.
pub fn reference_optimum(runs: &[RunRecord]) -> Option<f64> {
    runs.iter()
        .filter(|r| r.status == RunStatus::CompleteProof)
        .find_map(RunRecord::final_objective)
}

/// Solved runs whose final objective beats a proven optimum.
pub fn beats_optimum(run: &RunRecord, optimum: f64, problem_type: ProblemType) -> bool {
    run.is_solved()
        && run
            .final_objective()
            .map_or(false, |o| problem_type.is_better(o, optimum))
}
