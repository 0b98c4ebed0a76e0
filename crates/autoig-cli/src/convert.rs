//! Essence parameter files to MiniZinc data files.

use autoig_core::{EvalError, Result};
use autoig_runner::{run_bounded, CommandLine, ScratchFiles};
use std::path::Path;
use tracing::info;

/// Comment conjure prints before pretty-printing a parameter file.
const PARSING_BANNER: &str = "Parsing as a parameter file";

async fn run_conjure(cmd: CommandLine) -> Result<String> {
    info!(command = %cmd, "running conjure");
    let out = run_bounded(&cmd, None, None).await?;
    if !out.success() {
        return Err(EvalError::ToolFailed {
            tool: cmd.to_string(),
            reason: format!("exit code {:?}: {}", out.exit_code, out.combined().trim()),
        });
    }
    Ok(out.stdout_text())
}

/// Write `essence_param` as a `.dzn` file at `output`, without auxiliary
/// variables.
pub async fn convert_essence_instance_to_mzn(
    conjure: &Path,
    essence_param: &Path,
    output: &Path,
) -> Result<()> {
    let stem = essence_param
        .to_string_lossy()
        .trim_end_matches(".param")
        .to_string();
    let aux_removed = format!("{stem}.auxRemoved.param");
    let mut scratch = ScratchFiles::new();
    scratch.track(&aux_removed);

    run_conjure(
        CommandLine::new(conjure)
            .args(["autoig", "--remove-aux"])
            .arg(essence_param.display().to_string())
            .arg(aux_removed.as_str()),
    )
    .await?;

    let pretty = run_conjure(
        CommandLine::new(conjure)
            .arg("pretty")
            .arg(aux_removed.as_str())
            .arg("--output-format=minizinc"),
    )
    .await?;

    tokio::fs::write(output, pretty.replace(PARSING_BANNER, "")).await?;
    info!(output = %output.display(), "instance converted to minizinc");
    Ok(())
}
