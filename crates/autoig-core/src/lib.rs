//! AutoIG Core Library
//!
//! Instance evaluation for automated instance generation: status
//! normalization, consistency checks, scoring and the evaluation state
//! machines that turn solver runs into a tuner score.

pub mod config;
pub mod domain;
pub mod evaluate;
pub mod fakes;
pub mod generator;
pub mod invoker;
pub mod normalize;
pub mod obs;
pub mod oracle;
pub mod reporting;
pub mod scoring;
pub mod session;
pub mod telemetry;

pub use config::{
    DiscriminatingConfig, EvaluationSettings, ExperimentConfig, ExperimentType,
    GeneratorSettings, GradedConfig, ModelLanguage, OracleSpec, SolverKind, ToolchainConfig,
    UnwantedTypes,
};

pub use domain::{
    EvalError, EvalStatus, InstanceResult, InstanceType, ObjectivePoint, ProblemType, Result,
    RoleRuns, RunExtra, RunRecord, RunStatus, SolverRole, TranslationStatus, TunerScore, Verdict,
};

pub use evaluate::{DiscriminatingEvaluator, GradedEvaluator};

pub use generator::{
    GeneratorOutcome, GeneratorRecord, GeneratorStatus, InstanceGenerator, NegativeTableEntry,
    SCORE_GENERATOR_TIMEOUT,
};

pub use invoker::{RunInvoker, RunRequest, RunTarget, SolverSpec};

pub use normalize::{enforce_crash_policy, normalize, InfoFile, RawOutcome, WatchReport};

pub use oracle::ConsistencyOracle;

pub use reporting::{instance_digest, DetailedResult, DetailedResultsLog, InstanceHashIndex};

pub use scoring::{BordaScores, ScoringMethod};

pub use session::{EvalPhase, EvaluationSession};

pub use telemetry::init_tracing;
