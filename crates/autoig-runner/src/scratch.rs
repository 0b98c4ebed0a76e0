//! Temporary files created around a solver run.

use std::path::{Path, PathBuf};
use tracing::debug;

/// `<instance>.<solver>.seed_<seed>.<suffix>`, next to the instance.
///
/// Instance files already carry the configuration id and tuner seed, so
/// two sessions never share a scratch path.
pub fn scratch_path(instance: &Path, solver: &str, seed: Option<u64>, suffix: &str) -> PathBuf {
    let seed = seed.map_or_else(|| "none".to_string(), |s| s.to_string());
    let mut name = instance.as_os_str().to_owned();
    name.push(format!(".{solver}.seed_{seed}.{suffix}"));
    PathBuf::from(name)
}

/// Files removed when the guard goes out of scope, on every exit path.
#[derive(Debug, Default)]
pub struct ScratchFiles {
    paths: Vec<PathBuf>,
}

impl ScratchFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.paths.push(path.into());
        self
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        for path in &self.paths {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "removed scratch file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => debug!(path = %path.display(), error = %e, "could not remove scratch file"),
            }
        }
    }
}
