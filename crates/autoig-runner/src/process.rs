//! Bounded process execution.

use autoig_core::{EvalError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long output readers may lag behind a finished or killed child.
///
/// Grandchildren that inherited the pipes can keep them open after the
/// direct child is gone; whatever arrived by then is kept.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// A program and its arguments, without a shell in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append whitespace-separated user flags.
    pub fn flags(self, flags: &str) -> Self {
        self.args(flags.split_whitespace())
    }

    /// Put `prefix` in front, e.g. a babysitter.
    pub fn wrapped_by(self, prefix: CommandLine) -> Self {
        let mut args = prefix.args;
        args.push(self.program.display().to_string());
        args.extend(self.args);
        Self {
            program: prefix.program,
            args,
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// One output line and the seconds since spawn at which it arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedLine {
    pub elapsed: f64,
    pub text: String,
}

/// Result of a bounded execution.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// `None` when the process was killed or ended by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<TimedLine>,
    pub stderr: String,
    /// Wall time in seconds.
    pub elapsed: f64,
    pub wall_clock_exceeded: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        let mut text = String::new();
        for line in &self.stdout {
            text.push_str(&line.text);
            text.push('\n');
        }
        text
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut text = self.stdout_text();
        text.push_str(&self.stderr);
        text
    }
}

fn spawn_reader<R>(reader: R, start: Instant, tx: mpsc::UnboundedSender<TimedLine>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\n', '\r'])
                        .to_string();
                    let line = TimedLine {
                        elapsed: start.elapsed().as_secs_f64(),
                        text,
                    };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

async fn drain(task: JoinHandle<()>, rx: &mut mpsc::UnboundedReceiver<TimedLine>) -> Vec<TimedLine> {
    let abort = task.abort_handle();
    if tokio::time::timeout(DRAIN_TIMEOUT, task).await.is_err() {
        debug!("output reader still busy after child exit, dropping it");
        abort.abort();
    }
    let mut lines = Vec::new();
    while let Ok(line) = rx.try_recv() {
        lines.push(line);
    }
    lines
}

/// Run `cmd` to completion, killing it once `limit` has elapsed.
///
/// A missing executable is a [`EvalError::ToolFailed`]; a nonzero exit is
/// not an error and is reported through `exit_code`.
pub async fn run_bounded(
    cmd: &CommandLine,
    limit: Option<Duration>,
    cwd: Option<&Path>,
) -> Result<ProcessOutput> {
    let start = Instant::now();

    let mut command = Command::new(&cmd.program);
    command
        .args(&cmd.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let mut child = command.spawn().map_err(|e| EvalError::ToolFailed {
        tool: cmd.program.display().to_string(),
        reason: format!("failed to spawn: {e}"),
    })?;

    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let (err_tx, mut err_rx) = mpsc::unbounded_channel();
    let out_task = child.stdout.take().map(|s| spawn_reader(s, start, out_tx));
    let err_task = child.stderr.take().map(|s| spawn_reader(s, start, err_tx));

    let mut wall_clock_exceeded = false;
    let status = match limit {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => Some(status?),
            Err(_) => {
                warn!(
                    command = %cmd,
                    limit_secs = limit.as_secs_f64(),
                    "wall-clock limit exceeded, killing process"
                );
                wall_clock_exceeded = true;
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill process");
                }
                None
            }
        },
        None => Some(child.wait().await?),
    };

    let stdout = match out_task {
        Some(task) => drain(task, &mut out_rx).await,
        None => Vec::new(),
    };
    let stderr = match err_task {
        Some(task) => drain(task, &mut err_rx).await,
        None => Vec::new(),
    };
    let stderr = stderr
        .into_iter()
        .map(|l| l.text + "\n")
        .collect::<String>();

    Ok(ProcessOutput {
        exit_code: status.and_then(|s| s.code()),
        stdout,
        stderr,
        elapsed: start.elapsed().as_secs_f64(),
        wall_clock_exceeded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_spaced_args() {
        let cmd = CommandLine::new("conjure")
            .arg("solve")
            .arg("--solver-options")
            .arg("-t 1000 --rnd-seed 3")
            .arg("");
        assert_eq!(
            cmd.to_string(),
            "conjure solve --solver-options \"-t 1000 --rnd-seed 3\" \"\""
        );
    }

    #[test]
    fn test_wrapped_by_prefix() {
        let cmd = CommandLine::new("minizinc").flags(" --solver  chuffed ");
        let wrapped = cmd.wrapped_by(CommandLine::new("runsolver").args(["-d", "2"]));
        assert_eq!(wrapped.to_string(), "runsolver -d 2 minizinc --solver chuffed");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_both_streams() {
        let cmd = CommandLine::new("sh").args(["-c", "echo one; echo two; echo oops >&2; exit 3"]);
        let out = run_bounded(&cmd, Some(Duration::from_secs(10)), None)
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
        assert!(!out.wall_clock_exceeded);
        let lines: Vec<_> = out.stdout.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(lines, ["one", "two"]);
        assert_eq!(out.stderr, "oops\n");
        assert_eq!(out.combined(), "one\ntwo\noops\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_limit_kills_process() {
        let cmd = CommandLine::new("sh").args(["-c", "echo started; exec sleep 30"]);
        let out = run_bounded(&cmd, Some(Duration::from_millis(300)), None)
            .await
            .unwrap();
        assert!(out.wall_clock_exceeded);
        assert_eq!(out.exit_code, None);
        assert!(out.elapsed < 10.0);
        assert_eq!(out.stdout[0].text, "started");
    }

    #[tokio::test]
    async fn test_missing_program_is_tool_failure() {
        let cmd = CommandLine::new("/nonexistent/autoig-test-binary");
        let err = run_bounded(&cmd, None, None).await.unwrap_err();
        assert!(matches!(err, EvalError::ToolFailed { .. }));
    }
}
