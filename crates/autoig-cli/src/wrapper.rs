//! One tuner call: generate an instance, evaluate it, log and score it.

use crate::convert::convert_essence_instance_to_mzn;
use anyhow::{bail, Context, Result};
use autoig_core::obs::emit_generator_finished;
use autoig_core::{
    DetailedResult, DetailedResultsLog, DiscriminatingEvaluator, EvaluationSettings,
    ExperimentConfig, GradedEvaluator, InstanceGenerator, InstanceHashIndex, InstanceResult,
    ModelLanguage, RunInvoker, RunTarget, TunerScore,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

pub const DETAILED_OUTPUT_DIR: &str = "detailed-output";

/// Arguments of one tuner call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunerCall {
    pub config_id: String,
    pub seed: u64,
    /// Generator parameter values, keyed without the leading dash.
    pub params: BTreeMap<String, String>,
}

/// Parse `-name value` pairs.
pub fn parse_params(args: &[String]) -> Result<BTreeMap<String, String>> {
    if args.len() % 2 != 0 {
        bail!("generator parameters must come in `-name value` pairs: {args:?}");
    }
    let mut params = BTreeMap::new();
    for pair in args.chunks(2) {
        let Some(name) = pair[0].strip_prefix('-') else {
            bail!("parameter name must start with '-': {}", pair[0]);
        };
        params.insert(name.to_string(), pair[1].clone());
    }
    Ok(params)
}

#[derive(Debug)]
pub struct TunerOutcome {
    pub score: TunerScore,
    pub status: String,
    pub total_time: f64,
    pub instance: Option<InstanceResult>,
}

impl TunerOutcome {
    /// `<score> <totalTime>`, the line the tuner reads.
    pub fn score_line(&self) -> String {
        format!("{} {:.2}", self.score, self.total_time)
    }
}

pub struct Wrapper<'a> {
    pub config: &'a ExperimentConfig,
    pub run_dir: PathBuf,
    pub generator: &'a dyn InstanceGenerator,
    pub invoker: &'a dyn RunInvoker,
}

impl<'a> Wrapper<'a> {
    pub fn detailed_output_dir(&self) -> PathBuf {
        self.run_dir.join(DETAILED_OUTPUT_DIR)
    }

    pub async fn run(&self, call: &TunerCall) -> Result<TunerOutcome> {
        let start = Instant::now();
        let out_dir = self.detailed_output_dir();
        tokio::fs::create_dir_all(&out_dir)
            .await
            .with_context(|| format!("Failed to create {}", out_dir.display()))?;
        let log = DetailedResultsLog::in_dir(&out_dir);

        let generated = self
            .generator
            .solve_generator(
                &call.config_id,
                &call.params,
                &self.config.generator_settings(),
                call.seed,
                &out_dir,
            )
            .await
            .context("Failed to solve the generator model")?;
        emit_generator_finished(
            &call.config_id,
            generated.status.as_str(),
            generated.record.translation_time + generated.record.solver_time,
        );

        let gen_status = format!("gen{}", generated.status);
        if let Some(score) = generated.status.rejection_score() {
            info!(status = %gen_status, "no instance generated");
            let outcome = TunerOutcome {
                score,
                status: gen_status,
                total_time: start.elapsed().as_secs_f64(),
                instance: None,
            };
            let entry = DetailedResult::new(
                outcome.total_time,
                generated.record,
                None,
                outcome.status.clone(),
                outcome.score,
            )?;
            log.append(&entry)
                .context("Failed to write detailed results")?;
            return Ok(outcome);
        }

        let solution = generated
            .solution_file
            .clone()
            .context("generator reported sat without a solution file")?;
        let inst_file = out_dir.join(format!("inst-{}-{}.param", call.config_id, call.seed));
        tokio::fs::rename(&solution, &inst_file)
            .await
            .with_context(|| format!("Failed to move {}", solution.display()))?;

        let result = self.evaluate(call, &inst_file).await?;
        let outcome = TunerOutcome {
            score: TunerScore::Value(result.score),
            status: result.status.to_string(),
            total_time: start.elapsed().as_secs_f64(),
            instance: None,
        };
        debug!(
            results = %serde_json::to_string(&result).unwrap_or_default(),
            "instance results"
        );

        let entry = DetailedResult::new(
            outcome.total_time,
            generated.record,
            Some(&result),
            outcome.status.clone(),
            outcome.score,
        )?;
        log.append(&entry)
            .context("Failed to write detailed results")?;
        InstanceHashIndex::in_dir(&out_dir)
            .record(&inst_file)
            .context("Failed to record instance hash")?;
        if let Some(entry) = &generated.exclusion {
            self.generator
                .exclude_instance(entry)
                .await
                .context("Failed to forbid the evaluated instance")?;
        }

        Ok(TunerOutcome {
            instance: Some(result),
            ..outcome
        })
    }

    async fn evaluate(&self, call: &TunerCall, inst_file: &Path) -> Result<InstanceResult> {
        let config = self.config;
        let model = self.run_dir.join(&config.problem_model);

        let (target, init_seed) = match config.model_language()? {
            ModelLanguage::Essence => (RunTarget::new(model, inst_file), Some(call.seed)),
            ModelLanguage::MiniZinc => {
                let dzn = inst_file.with_extension("dzn");
                convert_essence_instance_to_mzn(&config.toolchain.conjure, inst_file, &dzn)
                    .await
                    .context("Failed to convert the instance to MiniZinc")?;
                // a single run is never seeded
                let seed = (config.n_runs_per_instance > 1).then_some(call.seed);
                (RunTarget::new(model, dzn), seed)
            }
        };

        let result = match config.evaluation_settings(init_seed)? {
            EvaluationSettings::Graded(settings) => {
                GradedEvaluator::new(self.invoker, settings)?
                    .evaluate(&target)
                    .await?
            }
            EvaluationSettings::Discriminating(settings) => {
                DiscriminatingEvaluator::new(self.invoker, settings)?
                    .evaluate(&target)
                    .await?
            }
        };
        Ok(result)
    }
}
