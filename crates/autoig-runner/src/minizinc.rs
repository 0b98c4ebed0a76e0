//! MiniZinc backend.
//!
//! Runs `minizinc` on a model and `.dzn` instance, optionally under the
//! `runsolver` babysitter, and reports the objective trace, flattening time
//! and instance type alongside the normalized status.

use crate::process::{run_bounded, CommandLine, ProcessOutput, TimedLine};
use crate::scratch::{scratch_path, ScratchFiles};
use async_trait::async_trait;
use autoig_core::{
    enforce_crash_policy, normalize, ObjectivePoint, ProblemType, RawOutcome, Result, RunExtra,
    RunInvoker, RunRecord, RunRequest, ToolchainConfig,
};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

fn objective_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*_objective\s*=\s*([^;\s]+)\s*;").expect("valid regex"))
}

fn flat_time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"flatTime=([0-9.eE+-]+)").expect("valid regex"))
}

/// Improving objective values with the time their line arrived.
pub fn parse_objective_trace(lines: &[TimedLine]) -> Vec<ObjectivePoint> {
    lines
        .iter()
        .filter_map(|line| {
            let caps = objective_re().captures(&line.text)?;
            let value = caps[1].parse().ok()?;
            Some(ObjectivePoint {
                elapsed: line.elapsed,
                value,
            })
        })
        .collect()
}

/// Flattening time reported in the solver statistics.
pub fn parse_flat_time(output: &str) -> Option<f64> {
    flat_time_re()
        .captures(output)
        .and_then(|caps| caps[1].parse().ok())
}

pub struct MiniZincInvoker {
    toolchain: ToolchainConfig,
}

impl MiniZincInvoker {
    pub fn new(toolchain: ToolchainConfig) -> Self {
        Self { toolchain }
    }

    /// Babysitter binary to use for `solver`, if any.
    fn babysitter(&self, solver: &str) -> Option<&Path> {
        if !cfg!(target_os = "linux") || self.toolchain.is_unwatched(solver) {
            return None;
        }
        self.toolchain.runsolver.as_deref()
    }

    pub fn command(
        &self,
        request: &RunRequest,
        problem_type: ProblemType,
        watch_file: Option<&Path>,
    ) -> CommandLine {
        let limit_ms = (request.solve_time_limit * 1000.0) as u64;
        let mut cmd = CommandLine::new(&self.toolchain.minizinc)
            .arg("--time-limit")
            .arg(limit_ms.to_string())
            .arg("--solver")
            .arg(request.solver.name.as_str());
        if problem_type.is_optimisation() {
            cmd = cmd.arg("-i");
        }
        if let Some(seed) = request.seed {
            cmd = cmd.arg("-r").arg(seed.to_string());
        }
        cmd = cmd
            .flags(&request.solver.flags)
            .arg(request.target.model.display().to_string())
            .arg(request.target.instance.display().to_string())
            .args(["--output-mode", "dzn"]);
        if problem_type.is_optimisation() {
            cmd = cmd.arg("--output-objective");
        }
        cmd = cmd.arg("-s");

        match (self.babysitter(&request.solver.name), watch_file) {
            (Some(runsolver), Some(watch)) => cmd.wrapped_by(
                CommandLine::new(runsolver)
                    .arg("-w")
                    .arg(watch.display().to_string())
                    .arg("-d")
                    .arg(self.toolchain.kill_delay_secs.to_string())
                    .arg("--wall-clock-limit")
                    .arg((request.solve_time_limit.ceil() as u64).to_string())
                    .arg("--vsize-limit")
                    .arg(request.mem_limit_mb.to_string()),
            ),
            _ => cmd,
        }
    }

    fn guard(&self, request: &RunRequest) -> Duration {
        let seconds = request.translation_time_limit
            + request.solve_time_limit
            + self.toolchain.grace_secs
            + self.toolchain.kill_delay_secs as f64;
        Duration::from_secs_f64(seconds.max(0.0))
    }

    fn record(
        &self,
        request: &RunRequest,
        problem_type: ProblemType,
        out: &ProcessOutput,
        watch: Option<String>,
    ) -> Result<RunRecord> {
        let output = out.combined();
        let raw = RawOutcome {
            exit_code: out.exit_code,
            output,
            info: None,
            watch,
            wall_clock_exceeded: out.wall_clock_exceeded,
            solve_time_limit: request.solve_time_limit,
        };
        let status = normalize(&raw);
        let status = enforce_crash_policy(
            status,
            self.toolchain.abort_if_solver_crash,
            &request.solver.name,
            raw.exit_code,
            &raw.output,
        )?;

        let translation_time = parse_flat_time(&raw.output)
            .unwrap_or(0.0)
            .clamp(0.0, out.elapsed);
        let trace = if problem_type.is_optimisation() {
            parse_objective_trace(&out.stdout)
        } else {
            Vec::new()
        };
        let extra = RunExtra::from_status(status).with_trace(trace);
        Ok(RunRecord::new(
            request.seed,
            status,
            translation_time,
            out.elapsed - translation_time,
            extra,
        ))
    }
}

#[async_trait]
impl RunInvoker for MiniZincInvoker {
    async fn invoke(&self, request: &RunRequest) -> Result<RunRecord> {
        let problem_type = ProblemType::from_model_file(&request.target.model)?;
        let solver = request.solver.name.as_str();

        let mut scratch = ScratchFiles::new();
        let watch_file = self.babysitter(solver).map(|_| {
            let path = scratch_path(&request.target.instance, solver, request.seed, "runsolver");
            scratch.track(&path);
            path
        });

        let cmd = self.command(request, problem_type, watch_file.as_deref());
        info!(command = %cmd, "running minizinc");
        let out = run_bounded(&cmd, Some(self.guard(request)), None).await?;
        debug!(output = %out.combined(), "minizinc output");

        let watch = match &watch_file {
            Some(path) => tokio::fs::read_to_string(path).await.ok(),
            None => None,
        };
        let record = self.record(request, problem_type, &out, watch)?;
        info!(
            solver = %solver,
            seed = ?record.seed,
            status = %record.status,
            time = record.time,
            objectives = record.extra.objective_trace.len(),
            "minizinc run finished"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoig_core::{InstanceType, RunStatus, RunTarget, SolverSpec};
    use std::path::PathBuf;

    fn request(seed: Option<u64>) -> RunRequest {
        let target = RunTarget::new("problem.mzn", "inst-1-5.dzn");
        RunRequest::new(&target, &SolverSpec::new("chuffed", "-f"), seed, 30.0)
    }

    fn line(elapsed: f64, text: &str) -> TimedLine {
        TimedLine {
            elapsed,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_optimisation_command() {
        let invoker = MiniZincInvoker::new(ToolchainConfig::default());
        let cmd = invoker.command(&request(Some(9)), ProblemType::Min, None);
        assert_eq!(
            cmd.to_string(),
            "minizinc --time-limit 30000 --solver chuffed -i -r 9 -f problem.mzn inst-1-5.dzn \
             --output-mode dzn --output-objective -s"
        );
    }

    #[test]
    fn test_decision_command_without_seed() {
        let invoker = MiniZincInvoker::new(ToolchainConfig::default());
        let cmd = invoker.command(&request(None), ProblemType::Sat, None);
        assert_eq!(
            cmd.to_string(),
            "minizinc --time-limit 30000 --solver chuffed -f problem.mzn inst-1-5.dzn \
             --output-mode dzn -s"
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_babysitter_prefix() {
        let toolchain = ToolchainConfig {
            runsolver: Some(PathBuf::from("runsolver")),
            ..Default::default()
        };
        let invoker = MiniZincInvoker::new(toolchain);
        let watch = PathBuf::from("inst-1-5.dzn.chuffed.seed_9.runsolver");
        let cmd = invoker.command(&request(Some(9)), ProblemType::Sat, Some(&watch));
        assert_eq!(cmd.program, PathBuf::from("runsolver"));
        assert!(cmd.to_string().starts_with(
            "runsolver -w inst-1-5.dzn.chuffed.seed_9.runsolver -d 2 \
             --wall-clock-limit 30 --vsize-limit 8192 minizinc --time-limit 30000"
        ));

        let mut yuck = request(Some(9));
        yuck.solver = SolverSpec::new("yuck", "");
        let cmd = invoker.command(&yuck, ProblemType::Sat, Some(&watch));
        assert_eq!(cmd.program, PathBuf::from("minizinc"));
    }

    #[test]
    fn test_objective_trace_parsing() {
        let lines = [
            line(0.1, "%%%mzn-stat: flatTime=0.05"),
            line(0.8, "_objective = 12;"),
            line(0.8, "----------"),
            line(2.5, "_objective = -3.5;"),
            line(2.6, "x = 4;"),
        ];
        let trace = parse_objective_trace(&lines);
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[0], ObjectivePoint { elapsed: 0.8, value: 12.0 });
        assert_eq!(trace[1].value, -3.5);
        assert_eq!(parse_flat_time("%%%mzn-stat: flatTime=0.05\n"), Some(0.05));
        assert_eq!(parse_flat_time("nothing here"), None);
    }

    #[test]
    fn test_record_from_output() {
        let invoker = MiniZincInvoker::new(ToolchainConfig::default());
        let out = ProcessOutput {
            exit_code: Some(0),
            stdout: vec![
                line(0.2, "%%%mzn-stat: flatTime=0.5"),
                line(1.0, "_objective = 7;"),
                line(1.0, "----------"),
                line(1.4, "=========="),
            ],
            stderr: String::new(),
            elapsed: 1.5,
            wall_clock_exceeded: false,
        };
        let record = invoker
            .record(&request(Some(3)), ProblemType::Max, &out, None)
            .unwrap();
        assert_eq!(record.status, RunStatus::CompleteProof);
        assert_eq!(record.extra.instance_type, InstanceType::Sat);
        assert_eq!(record.final_objective(), Some(7.0));
        assert!((record.translation_time - 0.5).abs() < 1e-9);
        assert!((record.time - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_crash_aborts_by_default() {
        let invoker = MiniZincInvoker::new(ToolchainConfig::default());
        let out = ProcessOutput {
            exit_code: Some(1),
            stdout: vec![line(0.2, "%%%mzn-stat: flatTime=0.5")],
            stderr: "segfault\n".to_string(),
            elapsed: 0.4,
            wall_clock_exceeded: false,
        };
        assert!(invoker
            .record(&request(Some(3)), ProblemType::Sat, &out, None)
            .is_err());

        let lenient = MiniZincInvoker::new(ToolchainConfig {
            abort_if_solver_crash: false,
            ..Default::default()
        });
        let record = lenient
            .record(&request(Some(3)), ProblemType::Sat, &out, None)
            .unwrap();
        assert_eq!(record.status, RunStatus::SolverCrash);
    }
}
