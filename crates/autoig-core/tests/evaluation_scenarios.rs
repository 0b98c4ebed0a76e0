//! End-to-end evaluation scenarios driven through the scripted invoker.

use autoig_core::config::{DiscriminatingConfig, GradedConfig, OracleSpec, SolverKind, UnwantedTypes};
use autoig_core::fakes::{optimisation_run, run, ScriptedInvoker};
use autoig_core::scoring::discriminating::SCORE_BEST;
use autoig_core::scoring::ScoringMethod;
use autoig_core::{
    DiscriminatingEvaluator, EvalStatus, GradedEvaluator, InstanceType, ProblemType, RunStatus,
    RunTarget, SolverRole, SolverSpec,
};
use std::io::Write;

fn graded(n: usize, min_time: f64, unwanted: UnwantedTypes) -> GradedConfig {
    GradedConfig {
        solver: SolverSpec::new("chuffed", "-f"),
        solver_kind: SolverKind::Complete,
        n_evaluations: n,
        min_time,
        time_limit: 60.0,
        unwanted,
        oracle: None,
        prescreen_time_limit: 120.0,
        mem_limit_mb: 8192,
        init_seed: Some(42),
    }
}

fn discriminating(n: usize, base_min_time: f64) -> DiscriminatingConfig {
    DiscriminatingConfig {
        base: SolverSpec::new("gecode", ""),
        favoured: SolverSpec::new("chuffed", "-f"),
        n_evaluations: n,
        base_min_time,
        time_limit: 60.0,
        unwanted: UnwantedTypes::default(),
        scoring_method: ScoringMethod::Complete,
        zero_score_when_both_fail: true,
        arbiter: OracleSpec {
            solver: SolverSpec::new("cplex", ""),
            time_limit: 60.0,
        },
        reference_solver: "ortools".to_string(),
        mem_limit_mb: 8192,
        init_seed: Some(42),
    }
}

fn target() -> RunTarget {
    RunTarget::new("problem.mzn", "detailed-output/inst-7-42.dzn")
}

#[tokio::test]
async fn unsat_decision_instance_is_graded() {
    let invoker = ScriptedInvoker::new().with_runs("chuffed", [run(RunStatus::Unsat, 5.0)]);
    let evaluator = GradedEvaluator::new(&invoker, graded(1, 10.0, UnwantedTypes::default()))
        .unwrap();
    let result = evaluator
        .evaluate_as(&target(), ProblemType::Sat)
        .await
        .unwrap();

    assert_eq!(result.status, EvalStatus::Graded);
    assert_eq!(result.score, -1.0);
    assert_eq!(result.runs(SolverRole::Main).len(), 1);
}

#[tokio::test]
async fn unwanted_unsat_stops_after_first_run() {
    let invoker = ScriptedInvoker::new().with_runs(
        "chuffed",
        (0..5).map(|_| run(RunStatus::Unsat, 20.0)),
    );
    let unwanted = UnwantedTypes::new([InstanceType::Unsat]);
    let evaluator = GradedEvaluator::new(&invoker, graded(5, 10.0, unwanted)).unwrap();
    let result = evaluator
        .evaluate_as(&target(), ProblemType::Sat)
        .await
        .unwrap();

    assert_eq!(result.status, EvalStatus::UnwantedType);
    assert_eq!(result.score, 0.0);
    assert_eq!(invoker.calls_for("chuffed"), 1);
}

#[tokio::test]
async fn favoured_failing_everywhere_skips_base() {
    let invoker = ScriptedInvoker::new().with_runs(
        "chuffed",
        (0..3).map(|_| run(RunStatus::SolveTimeOut, 60.0)),
    );
    let evaluator = DiscriminatingEvaluator::new(&invoker, discriminating(3, 10.0)).unwrap();
    let result = evaluator
        .evaluate_as(&target(), ProblemType::Sat)
        .await
        .unwrap();

    assert_eq!(result.status, EvalStatus::FavouredTooDifficult);
    assert_eq!(result.score, 0.0);
    assert_eq!(invoker.calls_for("gecode"), 0);
    assert_eq!(invoker.calls_for("chuffed"), 3);
}

#[tokio::test]
async fn quick_base_solver_makes_instance_too_easy() {
    let invoker = ScriptedInvoker::new()
        .with_runs(
            "chuffed",
            (0..3).map(|_| run(RunStatus::CompleteProof, 1.0)),
        )
        .with_runs(
            "gecode",
            [
                run(RunStatus::CompleteProof, 2.0),
                run(RunStatus::CompleteProof, 3.0),
                run(RunStatus::CompleteProof, 2.0),
            ],
        );
    let evaluator = DiscriminatingEvaluator::new(&invoker, discriminating(3, 10.0)).unwrap();
    let result = evaluator
        .evaluate_as(&target(), ProblemType::Sat)
        .await
        .unwrap();

    assert_eq!(result.status, EvalStatus::BaseTooEasy);
    assert_eq!(result.score, 0.0);
    assert!(result.borda.is_empty());
}

#[tokio::test]
async fn clean_sweep_yields_best_score() {
    let invoker = ScriptedInvoker::new()
        .with_runs(
            "chuffed",
            (0..3).map(|_| run(RunStatus::CompleteProof, 1.0)),
        )
        .with_runs(
            "gecode",
            (0..3).map(|_| run(RunStatus::SolveTimeOut, 60.0)),
        );
    let evaluator = DiscriminatingEvaluator::new(&invoker, discriminating(3, 10.0)).unwrap();
    let result = evaluator
        .evaluate_as(&target(), ProblemType::Sat)
        .await
        .unwrap();

    assert_eq!(result.status, EvalStatus::Scored);
    assert_eq!(result.score, SCORE_BEST);
    assert_eq!(result.borda.len(), 3);
    for scores in &result.borda {
        assert_eq!(scores.complete, (0.0, 1.0));
    }
}

#[tokio::test]
async fn incomplete_scoring_method_rewards_equal_quality_speed() {
    let mut config = discriminating(1, 0.0);
    config.scoring_method = ScoringMethod::Incomplete;
    let invoker = ScriptedInvoker::new()
        .with_runs(
            "chuffed",
            [optimisation_run(RunStatus::Solved, 60.0, &[(1.0, 9.0), (3.0, 7.0)])],
        )
        .with_runs(
            "gecode",
            [optimisation_run(RunStatus::CompleteProof, 9.0, &[(9.0, 7.0)])],
        );
    let evaluator = DiscriminatingEvaluator::new(&invoker, config).unwrap();
    let result = evaluator
        .evaluate_as(&target(), ProblemType::Min)
        .await
        .unwrap();

    // equal objectives: base reached it at 9s, favoured at 3s
    assert_eq!(result.status, EvalStatus::Scored);
    assert!((result.score + 3.0).abs() < 1e-9);
    // the complete rule set would have preferred the base solver's proof
    assert_eq!(result.borda[0].complete, (1.0, 0.0));
}

#[tokio::test]
async fn graded_run_reads_problem_type_from_model() {
    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("problem.mzn");
    let mut file = std::fs::File::create(&model).unwrap();
    writeln!(file, "var 1..100: x;\nsolve minimize x;").unwrap();

    let invoker = ScriptedInvoker::new().with_runs(
        "chuffed",
        [optimisation_run(RunStatus::CompleteProof, 30.0, &[(12.0, 4.0), (29.0, 1.0)])],
    );
    let evaluator =
        GradedEvaluator::new(&invoker, graded(1, 10.0, UnwantedTypes::default())).unwrap();
    let result = evaluator
        .evaluate(&RunTarget::new(&model, dir.path().join("inst.dzn")))
        .await
        .unwrap();
    assert_eq!(result.status, EvalStatus::Graded);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["status"], "graded");
    assert_eq!(json["results"]["main"]["runs"][0]["seed"], 42);
    assert_eq!(
        json["results"]["main"]["runs"][0]["extra"]["objectiveTrace"][1]["value"],
        1.0
    );
}
