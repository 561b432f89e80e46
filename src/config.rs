//! Ingestion settings.
//!
//! An [`IngestConfig`] is passed explicitly to the assembler and the decoders.
//! It can be built in code or loaded from JSON; every field is optional in the
//! file and falls back to its default.
//!
//! ```
//! use affyingest::config::{ExecMode, IngestConfig};
//!
//! let cfg = IngestConfig::from_json_str(r#"{ "mode": { "kind": "parallel", "threads": 4 } }"#)?;
//! assert_eq!(cfg.mode, ExecMode::Parallel { threads: Some(4) });
//! assert_eq!(cfg.max_intensity, 65536.0);
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Upper bound of a valid intensity reading.
pub const DEFAULT_MAX_INTENSITY: f64 = 65536.0;

/// How [`crate::DatasetAssembler::populate`] schedules file decodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecMode {
    /// One file at a time, decoded straight into its store column.
    #[default]
    Sequential,
    /// Files decoded concurrently on a rayon pool; `None` uses one thread per CPU.
    Parallel { threads: Option<usize> },
}

impl ExecMode {
    /// Worker count this mode runs with.
    #[must_use]
    pub fn threads(&self) -> usize {
        match *self {
            Self::Sequential => 1,
            Self::Parallel { threads } => threads.unwrap_or_else(num_cpus::get).max(1),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub mode: ExecMode,
    /// Intensities above this (or negative, or NaN) are rejected by the text
    /// and XDA decoders.
    pub max_intensity: f64,
    /// Inflate gzip/zstd inputs transparently.
    pub decompress: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            mode: ExecMode::Sequential,
            max_intensity: DEFAULT_MAX_INTENSITY,
            decompress: true,
        }
    }
}

impl IngestConfig {
    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid JSON or out-of-range values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json).context("parse ingest config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid config.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("load config {}", path.display()))
    }

    /// Pretty JSON form, as accepted by [`Self::from_json_str`].
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serialize ingest config")
    }

    #[must_use]
    pub fn with_mode(mut self, mode: ExecMode) -> Self {
        self.mode = mode;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.max_intensity.is_finite() && self.max_intensity > 0.0) {
            bail!("max_intensity must be a positive number, got {}", self.max_intensity);
        }
        if let ExecMode::Parallel { threads: Some(0) } = self.mode {
            bail!("parallel mode needs at least one thread");
        }
        Ok(())
    }
}
