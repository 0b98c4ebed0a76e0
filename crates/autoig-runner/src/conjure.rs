//! Conjure and Savile Row backend.
//!
//! Conjure reports far less than MiniZinc: a status and two timings read
//! from the Savile Row info file. Records built here carry the default
//! `extra` derived from the status.

use crate::process::{run_bounded, CommandLine, ProcessOutput};
use crate::scratch::{scratch_path, ScratchFiles};
use crate::solvers::{lookup_solver, SolverInfo};
use async_trait::async_trait;
use autoig_core::{
    enforce_crash_policy, normalize, EvalError, InfoFile, RawOutcome, Result, RunExtra,
    RunInvoker, RunRecord, RunRequest, RunStatus, ToolchainConfig,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Intermediate files Savile Row leaves next to the eprime model.
const TEMP_SUFFIXES: &[&str] = &[
    ".eprime-infor",
    ".eprime-minion",
    ".eprime-dimacs",
    ".eprime-param.fzn",
    ".eprime.mzn",
    ".eprime-param",
];

/// One `conjure solve` call against an existing eprime model.
#[derive(Debug, Clone, PartialEq)]
pub struct ConjureSolve {
    pub essence_model: PathBuf,
    pub eprime_model: PathBuf,
    pub instance: PathBuf,
    pub solver: String,
    /// Seconds; 0 means unbounded.
    pub sr_time_limit: f64,
    pub sr_flags: String,
    /// Seconds; 0 means unbounded.
    pub solver_time_limit: f64,
    pub solver_flags: String,
    pub seed: Option<u64>,
}

/// What a `conjure solve` call left behind.
#[derive(Debug, Clone)]
pub struct ConjureOutcome {
    pub status: RunStatus,
    pub translation_time: f64,
    pub solver_time: f64,
    pub process: ProcessOutput,
    /// Info file after renaming, when Savile Row wrote one.
    pub info_file: Option<PathBuf>,
}

fn stem(path: &Path, extension: &str) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.strip_suffix(extension).unwrap_or(&name).to_string()
}

fn seed_label(seed: Option<u64>) -> String {
    seed.map_or_else(|| "none".to_string(), |s| s.to_string())
}

impl ConjureSolve {
    /// Directory conjure writes into: the one holding the eprime model.
    pub fn out_dir(&self) -> PathBuf {
        match self.eprime_model.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// `<eprime stem>-<instance stem>` inside the output directory.
    fn base_name(&self) -> String {
        format!(
            "{}-{}",
            stem(&self.eprime_model, ".eprime"),
            stem(&self.instance, ".param")
        )
    }

    pub fn info_file(&self) -> PathBuf {
        self.out_dir()
            .join(format!("{}.eprime-info", self.base_name()))
    }

    /// Info file name that keeps runs with other seeds and solvers apart.
    pub fn seeded_info_file(&self) -> PathBuf {
        self.out_dir().join(format!(
            "{}-seed_{}-{}.eprime-info",
            self.base_name(),
            seed_label(self.seed),
            self.solver
        ))
    }

    fn temp_files(&self) -> Vec<PathBuf> {
        let dir = self.out_dir();
        let base = self.base_name();
        TEMP_SUFFIXES
            .iter()
            .map(|suffix| dir.join(format!("{base}{suffix}")))
            .collect()
    }

    /// Solution files of this model and instance pair.
    pub fn solution_files(&self) -> Vec<PathBuf> {
        let base = self.base_name();
        let Ok(entries) = std::fs::read_dir(self.out_dir()) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|path| {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                name.starts_with(&base)
                    && (name.ends_with(".solution") || name.ends_with(".eprime-solution"))
            })
            .collect();
        files.sort();
        files
    }

    fn seed_param_file(&self) -> PathBuf {
        scratch_path(&self.instance, &self.solver, self.seed, "cplexseed")
    }

    fn savilerow_options(&self) -> String {
        let mut options = Vec::new();
        if self.sr_time_limit > 0.0 {
            options.push(format!("-timelimit {}", self.sr_time_limit as u64));
        }
        if !self.sr_flags.trim().is_empty() {
            options.push(self.sr_flags.trim().to_string());
        }
        options.join(" ")
    }

    fn solver_options(&self, info: &SolverInfo) -> String {
        let mut options = Vec::new();
        options.extend(info.time_limit_option(self.solver_time_limit));
        if let Some(seed) = self.seed {
            if let Some(option) = info.seed_option(seed) {
                options.push(option);
            } else if info.seed_param_file(seed).is_some() {
                options.push(format!("--readParam {}", self.seed_param_file().display()));
            }
        }
        if !self.solver_flags.trim().is_empty() {
            options.push(self.solver_flags.trim().to_string());
        }
        options.join(" ")
    }

    fn guard(&self, toolchain: &ToolchainConfig) -> Option<Duration> {
        if self.sr_time_limit <= 0.0 || self.solver_time_limit <= 0.0 {
            return None;
        }
        let seconds = self.sr_time_limit
            + self.solver_time_limit
            + toolchain.grace_secs
            + toolchain.kill_delay_secs as f64;
        Some(Duration::from_secs_f64(seconds))
    }

    /// Run the solve, wait for the info file and classify the outcome.
    ///
    /// Intermediate files are removed on return; solution files are left
    /// for the caller.
    pub async fn run(&self, toolchain: &ToolchainConfig) -> Result<ConjureOutcome> {
        let solver_info = lookup_solver(&self.solver)?;

        let mut scratch = ScratchFiles::new();
        for path in self.temp_files() {
            scratch.track(path);
        }
        if let Some(seed) = self.seed {
            if let Some(contents) = solver_info.seed_param_file(seed) {
                let path = self.seed_param_file();
                tokio::fs::write(&path, contents).await?;
                scratch.track(path);
            }
        }

        let cmd = conjure_solve_command(&toolchain.conjure, self, solver_info);
        info!(command = %cmd, "running conjure");
        let out = run_bounded(&cmd, self.guard(toolchain), None).await?;
        debug!(output = %out.combined(), "conjure output");

        let mut raw = RawOutcome {
            exit_code: out.exit_code,
            output: out.combined(),
            info: None,
            watch: None,
            wall_clock_exceeded: out.wall_clock_exceeded,
            solve_time_limit: self.solver_time_limit,
        };

        // Translation failures never produce an info file.
        let early = normalize(&raw);
        if early.is_translation_failure() {
            let status = enforce_crash_policy(
                early,
                toolchain.abort_if_solver_crash,
                &self.solver,
                raw.exit_code,
                &raw.output,
            )?;
            return Ok(ConjureOutcome {
                status,
                translation_time: out.elapsed,
                solver_time: 0.0,
                process: out,
                info_file: None,
            });
        }
        let crashed = early == RunStatus::SolverCrash;
        if crashed {
            enforce_crash_policy(
                early,
                toolchain.abort_if_solver_crash,
                &self.solver,
                raw.exit_code,
                &raw.output,
            )?;
        }

        let info_file = match self.wait_for_info(toolchain).await {
            Some(path) => {
                let renamed = self.seeded_info_file();
                tokio::fs::rename(&path, &renamed).await?;
                Some(renamed)
            }
            None if crashed => {
                warn!(solver = %self.solver, "no info file after solver crash");
                None
            }
            None => {
                return Err(EvalError::MissingArtifact {
                    path: self.info_file(),
                    waited_secs: poll_window(toolchain).as_secs(),
                })
            }
        };

        let info = match &info_file {
            Some(path) => Some(tokio::fs::read_to_string(path).await?),
            None => None,
        };
        let parsed = info.as_deref().map(InfoFile::parse).unwrap_or_default();
        raw.info = info;

        let status = if crashed {
            RunStatus::SolverCrash
        } else {
            enforce_crash_policy(
                normalize(&raw),
                toolchain.abort_if_solver_crash,
                &self.solver,
                raw.exit_code,
                &raw.output,
            )?
        };

        Ok(ConjureOutcome {
            status,
            translation_time: parsed.number("SavileRowTotalTime").unwrap_or(0.0),
            solver_time: parsed.number("SolverTotalTime").unwrap_or(0.0),
            process: out,
            info_file,
        })
    }

    async fn wait_for_info(&self, toolchain: &ToolchainConfig) -> Option<PathBuf> {
        let path = self.info_file();
        let interval = Duration::from_millis(toolchain.info_poll_interval_ms);
        for attempt in 0..=toolchain.info_poll_attempts {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Some(path);
            }
            if attempt < toolchain.info_poll_attempts {
                debug!(path = %path.display(), attempt, "waiting for info file");
                tokio::time::sleep(interval).await;
            }
        }
        None
    }
}

fn poll_window(toolchain: &ToolchainConfig) -> Duration {
    Duration::from_millis(toolchain.info_poll_interval_ms * u64::from(toolchain.info_poll_attempts))
}

/// `conjure solve <essence> <instance> -o <dir> --use-existing-models=<eprime> ...`
pub fn conjure_solve_command(conjure: &Path, solve: &ConjureSolve, info: &SolverInfo) -> CommandLine {
    let eprime = solve
        .eprime_model
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    CommandLine::new(conjure)
        .arg("solve")
        .arg(solve.essence_model.display().to_string())
        .arg(solve.instance.display().to_string())
        .arg("-o")
        .arg(solve.out_dir().display().to_string())
        .arg(format!("--use-existing-models={eprime}"))
        .arg("--savilerow-options")
        .arg(solve.savilerow_options())
        .arg("--solver-options")
        .arg(solve.solver_options(info))
        .arg(format!("--solver={}", solve.solver))
}

/// Evaluates instances of an Essence problem through Conjure.
pub struct ConjureInvoker {
    toolchain: ToolchainConfig,
    eprime_model: PathBuf,
    sr_time_limit: f64,
    sr_flags: String,
}

impl ConjureInvoker {
    pub fn new(
        toolchain: ToolchainConfig,
        eprime_model: impl Into<PathBuf>,
        sr_time_limit: f64,
        sr_flags: impl Into<String>,
    ) -> Self {
        Self {
            toolchain,
            eprime_model: eprime_model.into(),
            sr_time_limit,
            sr_flags: sr_flags.into(),
        }
    }

    fn solve_for(&self, request: &RunRequest) -> ConjureSolve {
        let sr_time_limit = if request.translation_time_limit > 0.0 {
            request.translation_time_limit
        } else {
            self.sr_time_limit
        };
        ConjureSolve {
            essence_model: request.target.model.clone(),
            eprime_model: self.eprime_model.clone(),
            instance: request.target.instance.clone(),
            solver: request.solver.name.clone(),
            sr_time_limit,
            sr_flags: self.sr_flags.clone(),
            solver_time_limit: request.solve_time_limit,
            solver_flags: request.solver.flags.clone(),
            seed: request.seed,
        }
    }
}

#[async_trait]
impl RunInvoker for ConjureInvoker {
    async fn invoke(&self, request: &RunRequest) -> Result<RunRecord> {
        let solve = self.solve_for(request);
        let outcome = solve.run(&self.toolchain).await?;

        let mut solutions = ScratchFiles::new();
        for path in solve.solution_files() {
            solutions.track(path);
        }

        info!(
            solver = %solve.solver,
            seed = ?solve.seed,
            status = %outcome.status,
            translation_time = outcome.translation_time,
            solver_time = outcome.solver_time,
            "conjure run finished"
        );
        Ok(RunRecord::new(
            request.seed,
            outcome.status,
            outcome.translation_time,
            outcome.solver_time,
            RunExtra::from_status(outcome.status),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solve(solver: &str, seed: Option<u64>) -> ConjureSolve {
        ConjureSolve {
            essence_model: PathBuf::from("problem.essence"),
            eprime_model: PathBuf::from("detailed-output/problem.eprime"),
            instance: PathBuf::from("detailed-output/inst-3-11.param"),
            solver: solver.to_string(),
            sr_time_limit: 20.0,
            sr_flags: "-S0".to_string(),
            solver_time_limit: 1.5,
            solver_flags: "-f".to_string(),
            seed,
        }
    }

    #[test]
    fn test_solve_command() {
        let s = solve("chuffed", Some(4));
        let info = lookup_solver("chuffed").unwrap();
        let cmd = conjure_solve_command(Path::new("conjure"), &s, info);
        assert_eq!(
            cmd.args,
            [
                "solve",
                "problem.essence",
                "detailed-output/inst-3-11.param",
                "-o",
                "detailed-output",
                "--use-existing-models=problem.eprime",
                "--savilerow-options",
                "-timelimit 20 -S0",
                "--solver-options",
                "-t 1500 --rnd-seed 4 -f",
                "--solver=chuffed",
            ]
        );
    }

    #[test]
    fn test_cplex_seed_goes_through_param_file() {
        let s = solve("cplex", Some(4));
        let info = lookup_solver("cplex").unwrap();
        assert_eq!(
            s.solver_options(info),
            "--time-limit 1500 --readParam detailed-output/inst-3-11.param.cplex.seed_4.cplexseed -f"
        );
    }

    #[test]
    fn test_unbounded_options_are_empty() {
        let mut s = solve("minion", None);
        s.sr_time_limit = 0.0;
        s.sr_flags.clear();
        s.solver_time_limit = 0.0;
        s.solver_flags.clear();
        let info = lookup_solver("minion").unwrap();
        assert_eq!(s.savilerow_options(), "");
        assert_eq!(s.solver_options(info), "");
        assert_eq!(s.guard(&ToolchainConfig::default()), None);
    }

    #[test]
    fn test_info_file_names() {
        let s = solve("gecode", Some(8));
        assert_eq!(
            s.info_file(),
            PathBuf::from("detailed-output/problem-inst-3-11.eprime-info")
        );
        assert_eq!(
            s.seeded_info_file(),
            PathBuf::from("detailed-output/problem-inst-3-11-seed_8-gecode.eprime-info")
        );
    }

    #[test]
    fn test_solution_files_match_pair() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = solve("minion", Some(1));
        s.eprime_model = dir.path().join("generator.eprime");
        s.instance = dir.path().join("gen-inst-3-11.param");
        std::fs::write(dir.path().join("generator-gen-inst-3-11.solution"), "x").unwrap();
        std::fs::write(dir.path().join("generator-gen-inst-9-9.solution"), "x").unwrap();
        std::fs::write(dir.path().join("generator-gen-inst-3-11.eprime-solution"), "x").unwrap();
        let files = s.solution_files();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.to_string_lossy().contains("gen-inst-3-11")));
    }

    #[tokio::test]
    async fn test_unsupported_solver() {
        let s = solve("yuck", Some(1));
        let err = s.run(&ToolchainConfig::default()).await.unwrap_err();
        assert!(matches!(err, EvalError::UnsupportedSolver(_)));
    }
}
