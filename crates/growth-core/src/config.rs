//! Optional TOML settings for the upload collaborator. CLI flags stay
//! in the binary; this file only carries the knobs with sensible
//! defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{PipelineError, Result};
use crate::upload::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    pub table: String,
    pub chunk_size: usize,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    /// Staging directory for the file-based uploader.
    pub stage_dir: PathBuf,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            table: "CHILD_GROWTH_MEASUREMENTS".to_string(),
            chunk_size: 10_000,
            max_attempts: 3,
            base_delay_ms: 1_000,
            stage_dir: PathBuf::from("data/warehouse"),
        }
    }
}

impl UploadSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub upload: UploadSettings,
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|err| PipelineError::Config(format!("{}: {err}", path.display())))
    }
}
