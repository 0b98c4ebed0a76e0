//! Quality ordering of runs, used to pick the median repetition.

use crate::domain::{ProblemType, RunRecord};
use std::cmp::Ordering;

/// Compare two runs from worst to best: `Greater` means `a` is the better run.
///
/// Decision problems: solved beats unsolved, then the faster run wins.
/// Optimisation problems: solved beats unsolved, complete beats incomplete,
/// then the better final objective, then the faster run (time to the last
/// improving solution when neither run is complete).
pub fn compare_runs(a: &RunRecord, b: &RunRecord, problem_type: ProblemType) -> Ordering {
    let solved = a.is_solved().cmp(&b.is_solved());
    if solved != Ordering::Equal || !a.is_solved() {
        return solved;
    }
    if !problem_type.is_optimisation() {
        return faster(a.time, b.time);
    }

    let complete = a.status.is_complete().cmp(&b.status.is_complete());
    if complete != Ordering::Equal {
        return complete;
    }
    if a.status.is_complete() {
        return faster(a.time, b.time);
    }

    let objective = compare_objectives(a.final_objective(), b.final_objective(), problem_type);
    if objective != Ordering::Equal {
        return objective;
    }
    faster(
        a.time_to_final_objective().unwrap_or(a.time),
        b.time_to_final_objective().unwrap_or(b.time),
    )
}

/// `Greater` when objective `a` is better. A missing objective is worst.
pub fn compare_objectives(a: Option<f64>, b: Option<f64>, problem_type: ProblemType) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) if problem_type.is_better(x, y) => Ordering::Greater,
        (Some(x), Some(y)) if problem_type.is_better(y, x) => Ordering::Less,
        (Some(_), Some(_)) | (None, None) => Ordering::Equal,
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
    }
}

fn faster(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

/// The run at position `n / 2` once the runs are sorted from worst to best.
///
/// The stored runs keep their repetition order; sorting happens on a view.
pub fn median_run(runs: &[RunRecord], problem_type: ProblemType) -> Option<&RunRecord> {
    let mut sorted: Vec<&RunRecord> = runs.iter().collect();
    sorted.sort_by(|a, b| compare_runs(a, b, problem_type));
    sorted.get(runs.len() / 2).copied()
}
