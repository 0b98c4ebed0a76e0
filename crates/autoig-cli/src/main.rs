//! AutoIG - automated instance generation wrapper
//!
//! The `autoig` command is called by the tuner once per candidate generator
//! configuration:
//!
//! ```text
//! autoig <configId> <instanceId> <seed> <instanceName> -param1 value1 -param2 value2 ...
//! ```
//!
//! It solves the generator model with the suggested parameter values,
//! evaluates the produced instance with the configured solvers and prints
//! `<score> <totalTime>` as its last line on stdout.

mod convert;
mod generator;
mod wrapper;

use anyhow::{Context, Result};
use autoig_core::{ExperimentConfig, ModelLanguage, RunInvoker};
use autoig_runner::{ConjureInvoker, MiniZincInvoker};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};

use generator::ConjureGenerator;
use wrapper::{parse_params, TunerCall, Wrapper, DETAILED_OUTPUT_DIR};

#[derive(Parser)]
#[command(name = "autoig")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generate and evaluate solver benchmark instances", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Experiment directory holding config.json and the models
    #[arg(long, env = "AUTOIG_RUN_DIR", default_value = ".")]
    run_dir: PathBuf,

    /// Experiment settings, relative to the run directory
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Candidate configuration id
    config_id: String,

    /// Instance id (unused, always 1)
    instance_id: String,

    /// Random seed chosen by the tuner
    seed: u64,

    /// Dummy instance name
    instance_name: String,

    /// Generator parameters as `-name value` pairs
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    params: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    autoig_core::init_tracing(cli.json, level);

    let config_path = cli.run_dir.join(&cli.config);
    let config = ExperimentConfig::from_file(&config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;
    info!(
        config_id = %cli.config_id,
        instance_id = %cli.instance_id,
        instance_name = %cli.instance_name,
        seed = cli.seed,
        experiment = ?config.instance_setting,
        "tuner call"
    );
    let call = TunerCall {
        config_id: cli.config_id,
        seed: cli.seed,
        params: parse_params(&cli.params)?,
    };

    let out_dir = cli.run_dir.join(DETAILED_OUTPUT_DIR);
    let generator = ConjureGenerator::new(
        config.toolchain.clone(),
        cli.run_dir.join(&config.generator_model),
        out_dir.join("generator.eprime"),
    );
    let invoker: Box<dyn RunInvoker> = match config.model_language()? {
        ModelLanguage::MiniZinc => Box::new(MiniZincInvoker::new(config.toolchain.clone())),
        ModelLanguage::Essence => Box::new(ConjureInvoker::new(
            config.toolchain.clone(),
            out_dir.join("problem.eprime"),
            config.sr_time_limit,
            config.sr_flags.clone(),
        )),
    };

    let wrapper = Wrapper {
        config: &config,
        run_dir: cli.run_dir.clone(),
        generator: &generator,
        invoker: invoker.as_ref(),
    };
    let outcome = wrapper.run(&call).await?;
    info!(
        status = %outcome.status,
        score = %outcome.score,
        total_time = outcome.total_time,
        "tuner call finished"
    );

    println!("{}", outcome.score_line());
    Ok(())
}
