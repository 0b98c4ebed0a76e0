//! Instance generation by solving the Essence generator model.
//!
//! Minion runs go through Savile Row directly so that instances already
//! produced can be forbidden; other solvers go through `conjure solve`.

use async_trait::async_trait;
use autoig_core::{
    EvalError, GeneratorOutcome, GeneratorRecord, GeneratorSettings, GeneratorStatus,
    InstanceGenerator, NegativeTableEntry, Result, ToolchainConfig,
};
use autoig_runner::{encode_negative_table, ConjureSolve, MinionGeneration, ScratchFiles};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

/// Essence parameter file assigning each tuner parameter.
pub fn generator_param_file(params: &BTreeMap<String, String>) -> String {
    let mut text = String::new();
    for (name, value) in params {
        let _ = writeln!(text, "letting {name} be {value}");
    }
    text
}

pub struct ConjureGenerator {
    toolchain: ToolchainConfig,
    essence_model: PathBuf,
    eprime_model: PathBuf,
}

impl ConjureGenerator {
    pub fn new(
        toolchain: ToolchainConfig,
        essence_model: impl Into<PathBuf>,
        eprime_model: impl Into<PathBuf>,
    ) -> Self {
        Self {
            toolchain,
            essence_model: essence_model.into(),
            eprime_model: eprime_model.into(),
        }
    }
}

#[async_trait]
impl InstanceGenerator for ConjureGenerator {
    async fn solve_generator(
        &self,
        config_id: &str,
        params: &BTreeMap<String, String>,
        settings: &GeneratorSettings,
        seed: u64,
        out_dir: &Path,
    ) -> Result<GeneratorOutcome> {
        let param_file = out_dir.join(format!("gen-inst-{config_id}-{seed}.param"));
        tokio::fs::write(&param_file, generator_param_file(params)).await?;
        if settings.solver == "minion" {
            let minion_file = out_dir.join(format!("gen-inst-{config_id}.minion"));
            return self
                .solve_with_minion(param_file, minion_file, settings, seed)
                .await;
        }

        let solve = ConjureSolve {
            essence_model: self.essence_model.clone(),
            eprime_model: self.eprime_model.clone(),
            instance: param_file.clone(),
            solver: settings.solver.clone(),
            sr_time_limit: settings.sr_time_limit,
            sr_flags: settings.sr_flags.clone(),
            solver_time_limit: settings.solver_time_limit,
            solver_flags: settings.solver_flags.clone(),
            seed: Some(seed),
        };
        let outcome = solve.run(&self.toolchain).await?;
        let status = GeneratorStatus::from_run_status(outcome.status)?;

        // Only the Essence solution is kept; everything else is scratch.
        let mut scratch = ScratchFiles::new();
        let mut solution_file = None;
        for path in solve.solution_files() {
            let is_essence_solution = path
                .file_name()
                .map_or(false, |n| !n.to_string_lossy().ends_with(".eprime-solution"));
            if status == GeneratorStatus::Sat && is_essence_solution && solution_file.is_none() {
                solution_file = Some(path);
            } else {
                scratch.track(path);
            }
        }
        if status == GeneratorStatus::Sat && solution_file.is_none() {
            return Err(EvalError::MissingArtifact {
                path: solve.out_dir().join(format!(
                    "{}-gen-inst-{config_id}-{seed}.solution",
                    self.eprime_model
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default()
                )),
                waited_secs: 0,
            });
        }

        info!(
            config_id = %config_id,
            status = %status,
            solution = ?solution_file,
            "generator solved"
        );
        Ok(GeneratorOutcome {
            status,
            solution_file,
            record: GeneratorRecord {
                instance: param_file.display().to_string(),
                status,
                translation_time: outcome.translation_time,
                solver_time: outcome.solver_time,
            },
            exclusion: None,
        })
    }

    async fn exclude_instance(&self, entry: &NegativeTableEntry) -> Result<()> {
        encode_negative_table(&entry.solver_input, &entry.assignment).await?;
        Ok(())
    }
}

impl ConjureGenerator {
    async fn solve_with_minion(
        &self,
        param_file: PathBuf,
        minion_file: PathBuf,
        settings: &GeneratorSettings,
        seed: u64,
    ) -> Result<GeneratorOutcome> {
        let generation = MinionGeneration {
            eprime_model: self.eprime_model.clone(),
            essence_param: param_file.clone(),
            minion_file,
            sr_time_limit: settings.sr_time_limit,
            sr_flags: settings.sr_flags.clone(),
            solver_time_limit: settings.solver_time_limit,
            solver_flags: settings.solver_flags.clone(),
            seed,
        };
        let outcome = generation.run(&self.toolchain).await?;
        let status = GeneratorStatus::from_run_status(outcome.status)?;
        let exclusion = outcome.assignment.map(|assignment| NegativeTableEntry {
            solver_input: generation.minion_file.clone(),
            assignment,
        });

        info!(
            param_file = %param_file.display(),
            status = %status,
            solution = ?outcome.solution_file,
            "generator solved with minion"
        );
        Ok(GeneratorOutcome {
            status,
            solution_file: outcome.solution_file,
            record: GeneratorRecord {
                instance: param_file.display().to_string(),
                status,
                translation_time: outcome.translation_time,
                solver_time: outcome.solver_time,
            },
            exclusion,
        })
    }
}
