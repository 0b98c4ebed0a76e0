//! Experiment configuration.
//!
//! `config.json` is written by the setup step with flat camelCase keys.
//! It is read once into [`ExperimentConfig`] and converted into typed,
//! validated per-mode settings.

use crate::domain::{EvalError, InstanceType, Result};
use crate::invoker::SolverSpec;
use crate::scoring::ScoringMethod;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Solvers that may prove optimality versus local-search solvers that cannot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    Complete,
    Incomplete,
}

/// Instance types that end an evaluation early.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnwantedTypes(BTreeSet<InstanceType>);

impl UnwantedTypes {
    pub fn new(types: impl IntoIterator<Item = InstanceType>) -> Self {
        Self(types.into_iter().collect())
    }

    /// Derive the unwanted set from the `instanceValidTypes` setting.
    pub fn from_valid_types(valid: &str) -> Result<Self> {
        let valid: String = valid.chars().filter(|c| !c.is_whitespace()).collect();
        match valid.as_str() {
            "all" | "sat,unsat" | "unsat,sat" => Ok(Self::default()),
            "sat" => Ok(Self::new([InstanceType::Unsat])),
            "unsat" => Ok(Self::new([InstanceType::Sat])),
            other => Err(EvalError::InvalidConfig(format!(
                "instanceValidTypes must be one of all, sat, unsat, sat,unsat (got {other:?})"
            ))),
        }
    }

    pub fn contains(&self, instance_type: InstanceType) -> bool {
        self.0.contains(&instance_type)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A reference solver run with its own time budget.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleSpec {
    pub solver: SolverSpec,
    pub time_limit: f64,
}

/// Settings for graded evaluation of one solver.
#[derive(Debug, Clone)]
pub struct GradedConfig {
    pub solver: SolverSpec,
    pub solver_kind: SolverKind,
    pub n_evaluations: usize,
    pub min_time: f64,
    pub time_limit: f64,
    pub unwanted: UnwantedTypes,
    pub oracle: Option<OracleSpec>,
    /// Budget for the oracle pre-screen that filters unwanted unsat instances.
    pub prescreen_time_limit: f64,
    pub mem_limit_mb: u64,
    pub init_seed: Option<u64>,
}

impl GradedConfig {
    pub fn validate(&self) -> Result<()> {
        validate_common(self.n_evaluations, self.time_limit, self.min_time)?;
        if let Some(oracle) = &self.oracle {
            if oracle.time_limit <= 0.0 {
                return Err(EvalError::InvalidConfig(
                    "oracle time limit must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Settings for discriminating a favoured solver from a base solver.
#[derive(Debug, Clone)]
pub struct DiscriminatingConfig {
    pub base: SolverSpec,
    pub favoured: SolverSpec,
    pub n_evaluations: usize,
    /// Mean base time under which the instance is too easy.
    pub base_min_time: f64,
    pub time_limit: f64,
    pub unwanted: UnwantedTypes,
    pub scoring_method: ScoringMethod,
    pub zero_score_when_both_fail: bool,
    /// Solver consulted when runs disagree on satisfiability.
    pub arbiter: OracleSpec,
    /// Solver whose optimality proofs are trusted for objective cross-checks.
    pub reference_solver: String,
    pub mem_limit_mb: u64,
    pub init_seed: Option<u64>,
}

impl DiscriminatingConfig {
    pub fn validate(&self) -> Result<()> {
        validate_common(self.n_evaluations, self.time_limit, self.base_min_time)?;
        if self.base.name == self.favoured.name && self.base.flags == self.favoured.flags {
            return Err(EvalError::InvalidConfig(format!(
                "base and favoured solver are identical ({})",
                self.base.name
            )));
        }
        Ok(())
    }
}

fn validate_common(n_evaluations: usize, time_limit: f64, min_time: f64) -> Result<()> {
    if n_evaluations == 0 {
        return Err(EvalError::InvalidConfig(
            "nRunsPerInstance must be at least 1".to_string(),
        ));
    }
    if time_limit <= 0.0 {
        return Err(EvalError::InvalidConfig(
            "maxSolverTime must be positive".to_string(),
        ));
    }
    if min_time < 0.0 || min_time >= time_limit {
        return Err(EvalError::InvalidConfig(format!(
            "minSolverTime {min_time} must lie within [0, {time_limit})"
        )));
    }
    Ok(())
}

/// The two evaluation modes.
#[derive(Debug, Clone)]
pub enum EvaluationSettings {
    Graded(GradedConfig),
    Discriminating(DiscriminatingConfig),
}

impl EvaluationSettings {
    pub fn n_evaluations(&self) -> usize {
        match self {
            Self::Graded(c) => c.n_evaluations,
            Self::Discriminating(c) => c.n_evaluations,
        }
    }
}

/// External tools and fixed policies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolchainConfig {
    pub minizinc: PathBuf,
    pub conjure: PathBuf,
    pub savilerow: PathBuf,
    pub minion: PathBuf,
    /// Babysitter used to enforce wall-clock and memory limits, if installed.
    pub runsolver: Option<PathBuf>,
    pub kill_delay_secs: u64,
    /// Extra seconds granted on top of the time limits before a run is killed.
    pub grace_secs: f64,
    pub info_poll_attempts: u32,
    pub info_poll_interval_ms: u64,
    pub deterministic_solvers: Vec<String>,
    /// Solvers that misbehave under the babysitter.
    pub unwatched_solvers: Vec<String>,
    pub incomplete_solvers: Vec<String>,
    pub oracle_solver: String,
    pub oracle_flags: String,
    pub oracle_time_limit: f64,
    pub prescreen_time_limit: f64,
    pub arbiter_solver: String,
    pub arbiter_flags: String,
    pub reference_solver: String,
    pub abort_if_solver_crash: bool,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            minizinc: PathBuf::from("minizinc"),
            conjure: PathBuf::from("conjure"),
            savilerow: PathBuf::from("savilerow"),
            minion: PathBuf::from("minion"),
            runsolver: None,
            kill_delay_secs: 2,
            grace_secs: 5.0,
            info_poll_attempts: 60,
            info_poll_interval_ms: 1000,
            deterministic_solvers: vec!["ortools".to_string()],
            unwatched_solvers: vec!["yuck".to_string()],
            incomplete_solvers: vec!["yuck".to_string()],
            oracle_solver: "ortools".to_string(),
            oracle_flags: "-f".to_string(),
            oracle_time_limit: 3600.0,
            prescreen_time_limit: 120.0,
            arbiter_solver: "chuffed".to_string(),
            arbiter_flags: "-f".to_string(),
            reference_solver: "ortools".to_string(),
            abort_if_solver_crash: true,
        }
    }
}

impl ToolchainConfig {
    /// Describe a solver, marking it deterministic when listed as such.
    pub fn solver(&self, name: &str, flags: &str) -> SolverSpec {
        SolverSpec {
            name: name.to_string(),
            flags: flags.to_string(),
            deterministic: self.deterministic_solvers.iter().any(|s| s == name),
        }
    }

    pub fn is_incomplete(&self, solver: &str) -> bool {
        self.incomplete_solvers.iter().any(|s| s == solver)
    }

    pub fn is_unwatched(&self, solver: &str) -> bool {
        self.unwatched_solvers.iter().any(|s| s == solver)
    }
}

/// Evaluation mode requested by the experiment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentType {
    Graded,
    Discriminating,
}

/// Settings for solving the generator model.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorSettings {
    pub solver: String,
    pub solver_time_limit: f64,
    pub solver_flags: String,
    pub sr_time_limit: f64,
    pub sr_flags: String,
}

fn default_mem_limit() -> u64 {
    8192
}

/// Contents of `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentConfig {
    pub instance_setting: ExperimentType,
    pub problem_model: PathBuf,
    pub generator_model: PathBuf,
    pub run_dir: PathBuf,
    pub n_runs_per_instance: usize,
    pub instance_valid_types: String,
    pub min_solver_time: f64,
    pub max_solver_time: f64,

    #[serde(default)]
    pub solver: Option<String>,
    #[serde(default)]
    pub solver_flags: String,
    /// Overrides the solver classification derived from the toolchain.
    #[serde(default)]
    pub solver_type: Option<SolverKind>,

    #[serde(default)]
    pub base_solver: Option<String>,
    #[serde(default)]
    pub base_solver_flags: String,
    #[serde(default)]
    pub favoured_solver: Option<String>,
    #[serde(default)]
    pub favoured_solver_flags: String,
    #[serde(default)]
    pub scoring_method: ScoringMethod,

    pub gen_solver: String,
    pub gen_solver_time_limit: f64,
    #[serde(default)]
    pub gen_solver_flags: String,
    #[serde(rename = "genSRTimeLimit")]
    pub gen_sr_time_limit: f64,
    #[serde(rename = "genSRFlags", default)]
    pub gen_sr_flags: String,

    /// Translation time limit for the evaluated instances; 0 means unbounded.
    #[serde(rename = "SRTimeLimit", default)]
    pub sr_time_limit: f64,
    #[serde(rename = "SRFlags", default)]
    pub sr_flags: String,
    #[serde(default = "default_mem_limit")]
    pub mem_limit: u64,

    #[serde(default)]
    pub toolchain: ToolchainConfig,
}

/// Model language of the problem model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelLanguage {
    MiniZinc,
    Essence,
}

impl ExperimentConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn model_language(&self) -> Result<ModelLanguage> {
        match self.problem_model.extension().and_then(|e| e.to_str()) {
            Some("mzn") => Ok(ModelLanguage::MiniZinc),
            Some("essence") => Ok(ModelLanguage::Essence),
            _ => Err(EvalError::InvalidConfig(format!(
                "problem model {} must be a .mzn or .essence file",
                self.problem_model.display()
            ))),
        }
    }

    pub fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            solver: self.gen_solver.clone(),
            solver_time_limit: self.gen_solver_time_limit,
            solver_flags: self.gen_solver_flags.clone(),
            sr_time_limit: self.gen_sr_time_limit,
            sr_flags: self.gen_sr_flags.clone(),
        }
    }

    /// Typed, validated settings for the configured mode.
    pub fn evaluation_settings(&self, init_seed: Option<u64>) -> Result<EvaluationSettings> {
        let tools = &self.toolchain;
        let unwanted = UnwantedTypes::from_valid_types(&self.instance_valid_types)?;
        let required = |value: &Option<String>, key: &str| {
            value
                .clone()
                .ok_or_else(|| EvalError::InvalidConfig(format!("{key} is required")))
        };

        let settings = match self.instance_setting {
            ExperimentType::Graded => {
                let solver = required(&self.solver, "solver")?;
                let solver_kind = self.solver_type.unwrap_or(if tools.is_incomplete(&solver) {
                    SolverKind::Incomplete
                } else {
                    SolverKind::Complete
                });
                let oracle = (solver_kind == SolverKind::Incomplete).then(|| OracleSpec {
                    solver: tools.solver(&tools.oracle_solver, &tools.oracle_flags),
                    time_limit: tools.oracle_time_limit,
                });
                let config = GradedConfig {
                    solver: tools.solver(&solver, &self.solver_flags),
                    solver_kind,
                    n_evaluations: self.n_runs_per_instance,
                    min_time: self.min_solver_time,
                    time_limit: self.max_solver_time,
                    unwanted,
                    oracle,
                    prescreen_time_limit: tools.prescreen_time_limit,
                    mem_limit_mb: self.mem_limit,
                    init_seed,
                };
                config.validate()?;
                EvaluationSettings::Graded(config)
            }
            ExperimentType::Discriminating => {
                let base = required(&self.base_solver, "baseSolver")?;
                let favoured = required(&self.favoured_solver, "favouredSolver")?;
                let config = DiscriminatingConfig {
                    base: tools.solver(&base, &self.base_solver_flags),
                    favoured: tools.solver(&favoured, &self.favoured_solver_flags),
                    n_evaluations: self.n_runs_per_instance,
                    base_min_time: self.min_solver_time,
                    time_limit: self.max_solver_time,
                    unwanted,
                    scoring_method: self.scoring_method,
                    zero_score_when_both_fail: true,
                    arbiter: OracleSpec {
                        solver: tools.solver(&tools.arbiter_solver, &tools.arbiter_flags),
                        time_limit: self.max_solver_time,
                    },
                    reference_solver: tools.reference_solver.clone(),
                    mem_limit_mb: self.mem_limit,
                    init_seed,
                };
                config.validate()?;
                EvaluationSettings::Discriminating(config)
            }
        };
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRADED: &str = r#"{
        "instanceSetting": "graded",
        "problemModel": "problem.mzn",
        "generatorModel": "generator.essence",
        "runDir": "/tmp/run",
        "nRunsPerInstance": 3,
        "instanceValidTypes": "sat",
        "minSolverTime": 10,
        "maxSolverTime": 60,
        "solver": "yuck",
        "solverFlags": "-f",
        "genSolver": "minion",
        "genSolverTimeLimit": 5,
        "genSolverFlags": "",
        "genSRTimeLimit": 5,
        "genSRFlags": ""
    }"#;

    const DISCRIMINATING: &str = r#"{
        "instanceSetting": "discriminating",
        "problemModel": "problem.mzn",
        "generatorModel": "generator.essence",
        "runDir": "/tmp/run",
        "nRunsPerInstance": 5,
        "instanceValidTypes": "all",
        "minSolverTime": 1,
        "maxSolverTime": 60,
        "baseSolver": "chuffed",
        "baseSolverFlags": "-f",
        "favouredSolver": "ortools",
        "favouredSolverFlags": "-f",
        "genSolver": "minion",
        "genSolverTimeLimit": 5,
        "genSRTimeLimit": 5,
        "memLimit": 4096
    }"#;

    #[test]
    fn test_unwanted_types_mapping() {
        assert!(UnwantedTypes::from_valid_types("all").unwrap().is_empty());
        assert!(UnwantedTypes::from_valid_types(" unsat , sat ").unwrap().is_empty());
        let sat_only = UnwantedTypes::from_valid_types("sat").unwrap();
        assert!(sat_only.contains(InstanceType::Unsat));
        assert!(!sat_only.contains(InstanceType::Sat));
        assert!(matches!(
            UnwantedTypes::from_valid_types("both"),
            Err(EvalError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_graded_settings_for_incomplete_solver() {
        let config = ExperimentConfig::from_json(GRADED).unwrap();
        assert_eq!(config.model_language().unwrap(), ModelLanguage::MiniZinc);
        let EvaluationSettings::Graded(graded) = config.evaluation_settings(Some(42)).unwrap()
        else {
            panic!("expected graded settings");
        };
        assert_eq!(graded.solver_kind, SolverKind::Incomplete);
        assert_eq!(graded.init_seed, Some(42));
        assert_eq!(graded.mem_limit_mb, 8192);
        let oracle = graded.oracle.unwrap();
        assert_eq!(oracle.solver.name, "ortools");
        assert!(oracle.solver.deterministic);
        assert_eq!(oracle.time_limit, 3600.0);
    }

    #[test]
    fn test_discriminating_settings() {
        let config = ExperimentConfig::from_json(DISCRIMINATING).unwrap();
        let settings = config.evaluation_settings(None).unwrap();
        assert_eq!(settings.n_evaluations(), 5);
        let EvaluationSettings::Discriminating(d) = settings else {
            panic!("expected discriminating settings");
        };
        assert_eq!(d.scoring_method, ScoringMethod::Complete);
        assert!(d.zero_score_when_both_fail);
        assert!(d.favoured.deterministic);
        assert!(!d.base.deterministic);
        assert_eq!(d.arbiter.solver.name, "chuffed");
        assert_eq!(d.mem_limit_mb, 4096);
    }

    #[test]
    fn test_missing_solver_is_invalid() {
        let mut config = ExperimentConfig::from_json(GRADED).unwrap();
        config.solver = None;
        assert!(matches!(
            config.evaluation_settings(None),
            Err(EvalError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validation_rejects_zero_repetitions() {
        let mut config = ExperimentConfig::from_json(DISCRIMINATING).unwrap();
        config.n_runs_per_instance = 0;
        assert!(config.evaluation_settings(None).is_err());

        let mut config = ExperimentConfig::from_json(DISCRIMINATING).unwrap();
        config.min_solver_time = 120.0;
        assert!(config.evaluation_settings(None).is_err());
    }

    #[test]
    fn test_min_time_must_be_below_time_limit() {
        let mut config = ExperimentConfig::from_json(GRADED).unwrap();
        config.min_solver_time = config.max_solver_time;
        assert!(matches!(
            config.evaluation_settings(None),
            Err(EvalError::InvalidConfig(_))
        ));

        let mut config = ExperimentConfig::from_json(DISCRIMINATING).unwrap();
        config.min_solver_time = config.max_solver_time;
        assert!(config.evaluation_settings(None).is_err());
        config.min_solver_time = config.max_solver_time - 1.0;
        assert!(config.evaluation_settings(None).is_ok());
    }

    #[test]
    fn test_toolchain_defaults_and_overrides() {
        let tools: ToolchainConfig =
            serde_json::from_str(r#"{"runsolver": "/usr/bin/runsolver", "infoPollAttempts": 3}"#)
                .unwrap();
        assert_eq!(tools.info_poll_attempts, 3);
        assert_eq!(tools.kill_delay_secs, 2);
        assert!(tools.is_unwatched("yuck"));
        assert!(tools.abort_if_solver_crash);
        assert_eq!(tools.runsolver, Some(PathBuf::from("/usr/bin/runsolver")));
    }
}
