//! Result logs written next to the generated instances.
//!
//! `detailed-results.json` gets one JSON object per tuner call, and
//! `instance-md5sum.csv` maps each evaluated instance to a content digest so
//! duplicate instances can be spotted offline.

use crate::domain::{InstanceResult, Result, TunerScore};
use crate::generator::GeneratorRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DETAILED_RESULTS_FILE: &str = "detailed-results.json";
pub const INSTANCE_HASH_FILE: &str = "instance-md5sum.csv";

/// One line of the detailed results log. `totalTime` must stay the first key.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedResult {
    pub total_time: f64,
    pub gen_results: GeneratorRecord,
    /// Empty object when the generator produced no instance.
    pub instance_results: serde_json::Value,
    pub status: String,
    pub score: TunerScore,
    pub recorded_at: DateTime<Utc>,
}

impl DetailedResult {
    pub fn new(
        total_time: f64,
        gen_results: GeneratorRecord,
        instance_results: Option<&InstanceResult>,
        status: String,
        score: TunerScore,
    ) -> Result<Self> {
        let instance_results = match instance_results {
            Some(result) => serde_json::to_value(result)?,
            None => serde_json::json!({}),
        };
        Ok(Self {
            total_time,
            gen_results,
            instance_results,
            status,
            score,
            recorded_at: Utc::now(),
        })
    }
}

/// Append-only JSON-lines log of tuner calls.
#[derive(Debug, Clone)]
pub struct DetailedResultsLog {
    path: PathBuf,
}

impl DetailedResultsLog {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(DETAILED_RESULTS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &DetailedResult) -> Result<()> {
        let line = serde_json::to_string(entry)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

/// `instance,hashValue` CSV of evaluated instances.
#[derive(Debug, Clone)]
pub struct InstanceHashIndex {
    path: PathBuf,
}

impl InstanceHashIndex {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(INSTANCE_HASH_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hash `instance_file` and append a row, writing the header on first use.
    pub fn record(&self, instance_file: &Path) -> Result<String> {
        let digest = instance_digest(instance_file)?;
        let is_new = !self.path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if is_new {
            writeln!(file, "instance,hashValue")?;
        }
        writeln!(file, "{},{}", instance_file.display(), digest)?;
        Ok(digest)
    }
}

/// Hex SHA-256 of a file's contents.
pub fn instance_digest(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
