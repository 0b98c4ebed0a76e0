//! Scoring engine: run ordering, Borda points, graded and discriminating verdicts.

pub mod borda;
pub mod discriminating;
pub mod graded;
pub mod order;

pub use borda::{borda_scores, BordaScores, ScoringMethod};
pub use discriminating::{
    base_too_easy, beats_optimum, discriminating_score, favoured_solved_any, reference_optimum,
    repetition_scores, sum_scores, BordaTotals, SCORE_BASE_TOO_EASY, SCORE_BEST,
    SCORE_FAVOURED_TOO_DIFFICULT,
};
pub use graded::{classify, screen_median, unwanted_verdict, GradedCriteria, OptimumTracker};
pub use order::{compare_runs, median_run};
