//! Status normalization.
//!
//! Maps the raw signals a toolchain leaves behind (exit code, combined
//! output, the translator's info file, the babysitter's report) onto one
//! [`RunStatus`]. Signals are checked in a fixed priority order, so a run
//! that shows several of them still gets a single answer:
//!
//! 1. translation memory exhaustion
//! 2. translation timeout
//! 3. solving memory exhaustion
//! 4. solving timeout
//! 5. node limit
//! 6. unexplained crash
//! 7. unsat, complete proof, solved

use crate::domain::{EvalError, Result, RunStatus};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Markers of the translator running out of memory.
const TRANSLATION_MEMOUT: &[&str] = &["insufficient memory", "increase MAX_VARS"];

/// Memory markers whose phase depends on whether translation had finished.
const MEMOUT: &[&str] = &[
    "GC overhead limit exceeded",
    "OutOfMemoryError",
    "std::bad_alloc",
    "MiniZinc: internal error: out of memory",
];

const TRANSLATION_TIMEOUT: &[&str] = &["Savile Row timed out"];

const SOLVE_MEMOUT: &[&str] = &[
    "Error: maximum memory exceeded",
    "Out of memory",
    "Memory exhausted!",
];

const SOLVE_TIMEOUT: &[&str] = &["=====UNKNOWN=====", "Time out."];

const CRASH: &[&str] = &["=====ERROR=====", "Sub-process exited with error code:139"];

const UNSAT: &[&str] = &["=====UNSATISFIABLE=====", "Solutions Found: 0"];

/// Printed by MiniZinc once the search space is exhausted.
const SEARCH_COMPLETE: &str = "==========";

/// Printed by MiniZinc after each solution.
const SOLUTION_SEPARATOR: &str = "----------";

/// Printed by MiniZinc's statistics once flattening is done.
const FLATTEN_DONE: &str = "flatTime=";

/// Everything the normalizer looks at for one run.
#[derive(Debug, Clone, Default)]
pub struct RawOutcome {
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr.
    pub output: String,
    /// Contents of the translator's info file, when one was produced.
    pub info: Option<String>,
    /// Contents of the babysitter's report, when one was used.
    pub watch: Option<String>,
    /// The wall-clock guard killed the process.
    pub wall_clock_exceeded: bool,
    /// Solving time limit in seconds; 0 means unbounded.
    pub solve_time_limit: f64,
}

/// `key:value` lines written by the translator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfoFile {
    fields: BTreeMap<String, String>,
}

impl InfoFile {
    pub fn parse(text: &str) -> Self {
        let fields = text
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// A `1` valued flag.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key) == Some("1")
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.parse().ok())
    }
}

/// What the babysitter observed about the child process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchReport {
    pub wall_clock_exceeded: bool,
    pub memory_exceeded: bool,
    pub child_status: Option<i32>,
}

impl WatchReport {
    pub fn parse(text: &str) -> Self {
        let mut report = Self::default();
        for line in text.lines() {
            if line.contains("Maximum wall clock time exceeded") {
                report.wall_clock_exceeded = true;
            } else if line.contains("Maximum VSize exceeded") {
                report.memory_exceeded = true;
            } else if let Some(rest) = line.split("Child status:").nth(1) {
                report.child_status = rest.trim().parse().ok();
            }
        }
        report
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn solution_count_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"nSolutions=(\d+)").expect("valid regex"))
}

/// The output shows at least one solution.
pub fn has_incumbent(output: &str) -> bool {
    output.contains("_objective")
        || output.lines().any(|l| l.trim() == SOLUTION_SEPARATOR)
        || solution_count_re()
            .captures_iter(output)
            .any(|c| c[1].parse::<u64>().map_or(false, |n| n > 0))
}

pub fn translation_completed(output: &str, info: Option<&InfoFile>) -> bool {
    info.is_some() || output.contains(FLATTEN_DONE)
}

/// Classify a run. Pure: the same outcome always yields the same status.
pub fn normalize(raw: &RawOutcome) -> RunStatus {
    let info = raw.info.as_deref().map(InfoFile::parse);
    let info = info.as_ref();
    let watch = raw
        .watch
        .as_deref()
        .map(WatchReport::parse)
        .unwrap_or_default();
    let out = raw.output.as_str();

    let translated = translation_completed(out, info);
    let incumbent = has_incumbent(out);
    let limit_hit = raw.wall_clock_exceeded || watch.wall_clock_exceeded;
    let flag = |key: &str| info.map_or(false, |i| i.flag(key));

    let memout = watch.memory_exceeded || contains_any(out, MEMOUT);
    if contains_any(out, TRANSLATION_MEMOUT) || (!translated && memout) {
        return RunStatus::TranslationMemOut;
    }

    if contains_any(out, TRANSLATION_TIMEOUT)
        || flag("SavileRowTimeOut")
        || flag("SavileRowClauseOut")
        || (!translated && limit_hit)
    {
        return RunStatus::TranslationTimeOut;
    }

    if memout || contains_any(out, SOLVE_MEMOUT) || flag("SolverMemOut") {
        return RunStatus::SolveMemOut;
    }

    // Some solvers exit cleanly after overrunning their limit.
    let overran = raw.solve_time_limit > 0.0
        && info
            .and_then(|i| i.number("SolverTotalTime"))
            .map_or(false, |t| t > raw.solve_time_limit);
    if flag("SolverTimeOut")
        || contains_any(out, SOLVE_TIMEOUT)
        || overran
        || (limit_hit && !incumbent)
    {
        return RunStatus::SolveTimeOut;
    }

    if flag("SolverNodeOut") {
        return RunStatus::SolveNodeOut;
    }

    let exit_code = if limit_hit {
        Some(0)
    } else {
        watch.child_status.or(raw.exit_code)
    };
    if exit_code != Some(0) || contains_any(out, CRASH) {
        return RunStatus::SolverCrash;
    }

    if contains_any(out, UNSAT) {
        return RunStatus::Unsat;
    }
    if let Some(info) = info {
        return if info.flag("SolverSatisfiable") {
            RunStatus::CompleteProof
        } else {
            RunStatus::Unsat
        };
    }
    if out.contains(SEARCH_COMPLETE) {
        return RunStatus::CompleteProof;
    }
    if incumbent {
        return RunStatus::Solved;
    }
    RunStatus::SolveTimeOut
}

/// Apply the crash policy to a normalized status.
///
/// With `abort` set, an unexplained crash aborts the whole evaluation
/// instead of being recorded as a `solverCrash` run.
pub fn enforce_crash_policy(
    status: RunStatus,
    abort: bool,
    solver: &str,
    exit_code: Option<i32>,
    output: &str,
) -> Result<RunStatus> {
    if status == RunStatus::SolverCrash && abort {
        return Err(EvalError::SolverCrash {
            solver: solver.to_string(),
            exit_code,
            output: output.to_string(),
        });
    }
    Ok(status)
}
