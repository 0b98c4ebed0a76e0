//! Generator solving with Savile Row and Minion called directly.
//!
//! The translated generator instance is kept between tuner calls for the
//! same configuration. Every instance that gets evaluated is appended to a
//! negative table in it, so later seeds cannot produce it again.

use crate::process::{run_bounded, CommandLine, ProcessOutput};
use crate::scratch::ScratchFiles;
use autoig_core::{EvalError, Result, RunStatus, ToolchainConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const TABLE_SECTION: &str = "TUPLELIST";
const TABLE_NAME: &str = "negativeSol";

/// Sections written first, in this order; any others follow as read.
const SECTION_ORDER: &[&str] = &["VARIABLES", "SEARCH", TABLE_SECTION, "CONSTRAINTS"];

const TRANSLATION_MEMOUT: &[&str] = &[
    "GC overhead limit exceeded",
    "OutOfMemoryError",
    "insufficient memory",
];
const TRANSLATION_TIMEOUT: &str = "Savile Row timed out";
const MINION_TIMEOUT: &str = "Time out.";
const MINION_MEMOUT: &[&str] = &[
    "Error: maximum memory exceeded",
    "Out of memory",
    "Memory exhausted!",
];
const MINION_NO_SOLUTION: &str = "Solutions Found: 0";

fn minion_error(reason: impl Into<String>) -> EvalError {
    EvalError::ToolFailed {
        tool: "minion".to_string(),
        reason: reason.into(),
    }
}

/// A Minion 3 input file split into its `**SECTION**` blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinionModel {
    sections: Vec<(String, Vec<String>)>,
}

impl MinionModel {
    pub fn parse(text: &str) -> Self {
        let mut model = Self::default();
        let mut current: Option<usize> = None;
        for line in text.lines() {
            let Some(start) = line.find("**") else {
                let line = line.trim();
                if let (Some(index), false) = (current, line.is_empty()) {
                    model.sections[index].1.push(line.to_string());
                }
                continue;
            };
            // content sharing a line with the next header
            let before = line[..start].trim();
            if let (Some(index), false) = (current, before.is_empty()) {
                model.sections[index].1.push(before.to_string());
            }
            let name = line[start..].replace('*', "").trim().to_string();
            current = (name != "EOF").then(|| model.section_index(&name));
        }
        model
    }

    fn section_index(&mut self, name: &str) -> usize {
        match self.sections.iter().position(|(n, _)| n == name) {
            Some(index) => index,
            None => {
                self.sections.push((name.to_string(), Vec::new()));
                self.sections.len() - 1
            }
        }
    }

    pub fn section(&self, name: &str) -> &[String] {
        self.sections
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, lines)| lines.as_slice())
            .unwrap_or(&[])
    }

    /// Variables of the `PRINT` line, in print order.
    pub fn print_variables(&self) -> Result<Vec<String>> {
        let printed = self
            .section("SEARCH")
            .iter()
            .find_map(|line| line.split_once("PRINT").map(|(_, vars)| vars))
            .ok_or_else(|| minion_error("no PRINT line in the SEARCH section"))?;
        Ok(printed
            .replace(['[', ']'], "")
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .collect())
    }

    /// Position of the negative table header and its tuple count.
    fn table_header(&self) -> Option<(usize, usize)> {
        self.section(TABLE_SECTION)
            .iter()
            .enumerate()
            .find_map(|(index, line)| {
                let mut words = line.split_whitespace();
                (words.next() == Some(TABLE_NAME))
                    .then(|| words.next().and_then(|n| n.parse().ok()))
                    .flatten()
                    .map(|count| (index, count))
            })
    }

    /// Assignments already forbidden.
    pub fn forbidden(&self) -> Vec<String> {
        match self.table_header() {
            Some((index, count)) => self
                .section(TABLE_SECTION)
                .iter()
                .skip(index + 1)
                .take(count)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Add `assignment` to the negative table, creating the table and its
    /// constraint on first use. Returns `false` if it was already forbidden.
    pub fn forbid(&mut self, assignment: &str) -> Result<bool> {
        let values: Vec<&str> = assignment.split_whitespace().collect();
        let variables = self.print_variables()?;
        if values.len() != variables.len() {
            return Err(minion_error(format!(
                "assignment has {} values for {} printed variables",
                values.len(),
                variables.len()
            )));
        }
        let tuple = values.join(" ");
        let mut tuples = self.forbidden();
        if tuples.contains(&tuple) {
            return Ok(false);
        }
        tuples.push(tuple);

        let header = self.table_header();
        let table = self.section_index(TABLE_SECTION);
        let lines = &mut self.sections[table].1;
        if let Some((index, count)) = header {
            let end = (index + 1 + count).min(lines.len());
            lines.drain(index..end);
        }
        lines.push(format!("{TABLE_NAME} {} {}", tuples.len(), variables.len()));
        lines.extend(tuples);

        if header.is_none() {
            let constraints = self.section_index("CONSTRAINTS");
            self.sections[constraints].1.push(format!(
                "negativetable([{}],{TABLE_NAME})",
                variables.join(",")
            ));
        }
        Ok(true)
    }

    pub fn render(&self) -> String {
        let mut text = String::from("MINION 3\n");
        let others = self
            .sections
            .iter()
            .map(|(name, _)| name.as_str())
            .filter(|name| !SECTION_ORDER.contains(name));
        for name in SECTION_ORDER.iter().copied().chain(others) {
            let Some((_, lines)) = self.sections.iter().find(|(n, _)| n == name) else {
                continue;
            };
            text.push_str(&format!("**{name}**\n"));
            for line in lines {
                text.push_str(line);
                text.push('\n');
            }
        }
        text.push_str("**EOF**\n");
        text
    }
}

/// Forbid `assignment` in the Minion file at `minion_file`.
///
/// An empty assignment leaves the file untouched.
pub async fn encode_negative_table(minion_file: &Path, assignment: &str) -> Result<bool> {
    if assignment.trim().is_empty() {
        return Ok(false);
    }
    let mut model = MinionModel::parse(&tokio::fs::read_to_string(minion_file).await?);
    let added = model.forbid(assignment)?;
    if added {
        tokio::fs::write(minion_file, model.render()).await?;
    }
    info!(
        minion_file = %minion_file.display(),
        forbidden = model.forbidden().len(),
        added,
        "negative table updated"
    );
    Ok(added)
}

fn require_success(cmd: &CommandLine, out: &ProcessOutput) -> Result<()> {
    if out.success() {
        return Ok(());
    }
    Err(EvalError::ToolFailed {
        tool: cmd.to_string(),
        reason: format!("exit code {:?}: {}", out.exit_code, out.combined().trim()),
    })
}

/// Savile Row outcome; `None` when the translation succeeded.
fn translation_failure(cmd: &CommandLine, out: &ProcessOutput) -> Result<Option<RunStatus>> {
    let text = out.combined();
    if TRANSLATION_MEMOUT.iter().any(|m| text.contains(m)) {
        return Ok(Some(RunStatus::TranslationMemOut));
    }
    if text.contains(TRANSLATION_TIMEOUT) || out.wall_clock_exceeded {
        return Ok(Some(RunStatus::TranslationTimeOut));
    }
    require_success(cmd, out)?;
    Ok(None)
}

/// Minion outcome. A found solution is `solved`; the generator only asks
/// for one.
fn minion_status(cmd: &CommandLine, out: &ProcessOutput) -> Result<RunStatus> {
    let text = out.combined();
    if text.contains(MINION_TIMEOUT) || out.wall_clock_exceeded {
        return Ok(RunStatus::SolveTimeOut);
    }
    if MINION_MEMOUT.iter().any(|m| text.contains(m)) {
        return Ok(RunStatus::SolveMemOut);
    }
    require_success(cmd, out)?;
    if text.contains(MINION_NO_SOLUTION) {
        return Ok(RunStatus::Unsat);
    }
    Ok(RunStatus::Solved)
}

/// One solve of a generator instance.
#[derive(Debug, Clone)]
pub struct MinionGeneration {
    pub eprime_model: PathBuf,
    pub essence_param: PathBuf,
    /// Translated instance, shared by every seed of the same configuration.
    pub minion_file: PathBuf,
    pub sr_time_limit: f64,
    pub sr_flags: String,
    pub solver_time_limit: f64,
    pub solver_flags: String,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MinionOutcome {
    pub status: RunStatus,
    pub translation_time: f64,
    pub solver_time: f64,
    /// Values Minion printed for the solution it found.
    pub assignment: Option<String>,
    /// Essence solution, for solved runs.
    pub solution_file: Option<PathBuf>,
}

impl MinionGeneration {
    pub fn aux_file(&self) -> PathBuf {
        self.minion_file.with_extension("aux")
    }

    fn eprime_param(&self) -> PathBuf {
        self.essence_param.with_extension("eprime-param")
    }

    fn minion_solution(&self) -> PathBuf {
        self.essence_param.with_extension("minion-solution")
    }

    fn eprime_solution(&self) -> PathBuf {
        self.essence_param.with_extension("eprime-solution")
    }

    pub fn essence_solution(&self) -> PathBuf {
        self.essence_param.with_extension("solution")
    }

    pub fn translate_parameter_command(&self, conjure: &Path) -> CommandLine {
        CommandLine::new(conjure)
            .arg("translate-parameter")
            .arg(format!("--eprime={}", self.eprime_model.display()))
            .arg(format!("--essence-param={}", self.essence_param.display()))
            .arg(format!("--eprime-param={}", self.eprime_param().display()))
    }

    pub fn savilerow_command(&self, savilerow: &Path) -> CommandLine {
        let mut cmd = CommandLine::new(savilerow)
            .arg(self.eprime_model.display().to_string())
            .arg(self.eprime_param().display().to_string())
            .arg("-out-aux")
            .arg(self.aux_file().display().to_string())
            .arg("-out-minion")
            .arg(self.minion_file.display().to_string())
            .arg("-save-symbols");
        if self.sr_time_limit > 0.0 {
            cmd = cmd
                .arg("-timelimit")
                .arg((self.sr_time_limit as u64).to_string());
        }
        cmd.flags(&self.sr_flags)
    }

    pub fn minion_command(&self, minion: &Path) -> CommandLine {
        let mut cmd = CommandLine::new(minion)
            .arg(self.minion_file.display().to_string())
            .arg("-solsout")
            .arg(self.minion_solution().display().to_string())
            .arg("-randomseed")
            .arg(self.seed.to_string());
        if self.solver_time_limit > 0.0 {
            cmd = cmd
                .arg("-timelimit")
                .arg((self.solver_time_limit as u64).to_string());
        }
        cmd.flags(&self.solver_flags)
    }

    pub fn read_solution_command(&self, savilerow: &Path) -> CommandLine {
        CommandLine::new(savilerow)
            .arg(self.eprime_model.display().to_string())
            .args(["-mode", "ReadSolution", "-out-aux"])
            .arg(self.aux_file().display().to_string())
            .arg("-out-solution")
            .arg(self.eprime_solution().display().to_string())
            .arg("-minion-sol-file")
            .arg(self.minion_solution().display().to_string())
    }

    pub fn translate_solution_command(&self, conjure: &Path) -> CommandLine {
        CommandLine::new(conjure)
            .arg("translate-solution")
            .arg(format!("--eprime={}", self.eprime_model.display()))
            .arg(format!("--essence-param={}", self.essence_param.display()))
            .arg(format!("--eprime-solution={}", self.eprime_solution().display()))
            .arg("--essence-solution")
            .arg(self.essence_solution().display().to_string())
    }

    fn guard(limit: f64, toolchain: &ToolchainConfig) -> Option<Duration> {
        (limit > 0.0).then(|| {
            Duration::from_secs_f64(limit + toolchain.grace_secs + toolchain.kill_delay_secs as f64)
        })
    }

    async fn run_step(cmd: &CommandLine, limit: Option<Duration>) -> Result<ProcessOutput> {
        info!(command = %cmd, "running generator step");
        let out = run_bounded(cmd, limit, None).await?;
        debug!(output = %out.combined(), "generator step output");
        Ok(out)
    }

    /// Translate the generator instance unless an earlier seed already did.
    async fn translate(
        &self,
        toolchain: &ToolchainConfig,
        scratch: &mut ScratchFiles,
    ) -> Result<(f64, Option<RunStatus>)> {
        if tokio::fs::try_exists(&self.minion_file).await.unwrap_or(false) {
            debug!(minion_file = %self.minion_file.display(), "reusing translated generator instance");
            return Ok((0.0, None));
        }
        let cmd = self.translate_parameter_command(&toolchain.conjure);
        let out = Self::run_step(&cmd, None).await?;
        require_success(&cmd, &out)?;

        let cmd = self.savilerow_command(&toolchain.savilerow);
        let out = Self::run_step(&cmd, Self::guard(self.sr_time_limit, toolchain)).await?;
        let failure = translation_failure(&cmd, &out);
        if !matches!(failure, Ok(None)) {
            // a partial translation must not be reused
            scratch.track(&self.minion_file).track(self.aux_file());
        }
        Ok((out.elapsed, failure?))
    }

    pub async fn run(&self, toolchain: &ToolchainConfig) -> Result<MinionOutcome> {
        let mut scratch = ScratchFiles::new();
        scratch
            .track(self.eprime_param())
            .track(self.minion_solution())
            .track(self.eprime_solution());

        let (translation_time, failure) = self.translate(toolchain, &mut scratch).await?;
        if let Some(status) = failure {
            return Ok(MinionOutcome {
                status,
                translation_time,
                solver_time: 0.0,
                assignment: None,
                solution_file: None,
            });
        }

        let cmd = self.minion_command(&toolchain.minion);
        let out = Self::run_step(&cmd, Self::guard(self.solver_time_limit, toolchain)).await?;
        let status = minion_status(&cmd, &out)?;
        let mut outcome = MinionOutcome {
            status,
            translation_time,
            solver_time: out.elapsed,
            assignment: None,
            solution_file: None,
        };
        if status != RunStatus::Solved {
            return Ok(outcome);
        }

        let solution = tokio::fs::read_to_string(self.minion_solution())
            .await
            .map_err(|_| EvalError::MissingArtifact {
                path: self.minion_solution(),
                waited_secs: 0,
            })?;
        outcome.assignment = solution
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(String::from);

        let cmd = self.read_solution_command(&toolchain.savilerow);
        require_success(&cmd, &Self::run_step(&cmd, None).await?)?;
        let cmd = self.translate_solution_command(&toolchain.conjure);
        require_success(&cmd, &Self::run_step(&cmd, None).await?)?;

        outcome.solution_file = Some(self.essence_solution());
        Ok(outcome)
    }
}
