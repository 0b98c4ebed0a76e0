//! Command-line conventions of the solvers reachable through Conjure.

use autoig_core::{EvalError, Result};

/// Unit a solver expects its time limit in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Milliseconds,
}

/// How a random seed reaches the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOption {
    /// Flag glued to the seed value, e.g. `--seed=`.
    Prefix(&'static str),
    /// Written to a parameter file passed with `--readParam`.
    ParamFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolverInfo {
    pub name: &'static str,
    pub time_unit: TimeUnit,
    pub time_limit_prefix: &'static str,
    pub seed: SeedOption,
}

const fn info(
    name: &'static str,
    time_unit: TimeUnit,
    time_limit_prefix: &'static str,
    seed: SeedOption,
) -> SolverInfo {
    SolverInfo {
        name,
        time_unit,
        time_limit_prefix,
        seed,
    }
}

use SeedOption::{ParamFile, Prefix};
use TimeUnit::{Milliseconds, Seconds};

const CATALOGUE: &[SolverInfo] = &[
    info("cplex", Milliseconds, "--time-limit ", ParamFile),
    info("chuffed", Milliseconds, "-t ", Prefix("--rnd-seed ")),
    info("minion", Seconds, "-timelimit ", Prefix("-randomseed ")),
    info("gecode", Milliseconds, "-time ", Prefix("-r ")),
    info("glucose", Seconds, "-cpu-lim=", Prefix("-rnd-seed=")),
    info("glucose-syrup", Seconds, "-cpu-lim=", Prefix("-rnd-seed=")),
    info("lingeling", Seconds, "-T ", Prefix("--seed ")),
    info("cadical", Seconds, "-t ", Prefix("--seed=")),
    info("open-wbo", Seconds, "-cpu-lim=", Prefix("-rnd-seed=")),
    info("boolector", Seconds, "--time=", Prefix("--seed=")),
    info("kissat", Seconds, "--time=", Prefix("--seed=")),
];

pub fn lookup_solver(name: &str) -> Result<&'static SolverInfo> {
    CATALOGUE
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| EvalError::UnsupportedSolver(name.to_string()))
}

impl SolverInfo {
    /// Time limit option, or `None` when unbounded. Fractions are truncated.
    pub fn time_limit_option(&self, seconds: f64) -> Option<String> {
        if seconds <= 0.0 {
            return None;
        }
        let value = match self.time_unit {
            TimeUnit::Seconds => seconds as u64,
            TimeUnit::Milliseconds => (seconds * 1000.0) as u64,
        };
        Some(format!("{}{}", self.time_limit_prefix, value))
    }

    /// Seed option for prefix-style solvers.
    pub fn seed_option(&self, seed: u64) -> Option<String> {
        match self.seed {
            SeedOption::Prefix(prefix) => Some(format!("{prefix}{seed}")),
            SeedOption::ParamFile => None,
        }
    }

    /// Contents of the seed parameter file for `ParamFile` solvers.
    pub fn seed_param_file(&self, seed: u64) -> Option<String> {
        match self.seed {
            SeedOption::ParamFile => Some(format!("CPXPARAM_RandomSeed {seed}")),
            SeedOption::Prefix(_) => None,
        }
    }
}
