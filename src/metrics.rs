//! Counters and timing for an ingestion run.
//!
//! The assembler owns an [`IngestMetrics`] and bumps its counters as chip
//! descriptions load, batches validate and arrays decode. The collector is
//! cheap to clone and shared between worker threads.
//!
//! ```no_run
//! use affyingest::{DatasetAssembler, IngestConfig};
//! use affyingest::store::DenseColumnStore;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut asm = DatasetAssembler::new(IngestConfig::default());
//! asm.load_chip_description("HG-U133A.cdf".as_ref())?;
//! asm.validate_glob("arrays/*.CEL")?;
//! asm.populate(&mut DenseColumnStore::new())?;
//!
//! asm.metrics().log_summary();
//! asm.metrics().save_to_file("ingest-metrics.json")?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::info;

pub const CHIP_DESCRIPTIONS_LOADED: &str = "chip_descriptions_loaded";
pub const PROBE_SETS_INDEXED: &str = "probe_sets_indexed";
pub const FILES_VALIDATED: &str = "files_validated";
pub const BATCHES_REJECTED: &str = "batches_rejected";
pub const ARRAYS_DECODED: &str = "arrays_decoded";
pub const CELLS_WRITTEN: &str = "cells_written";

/// Thread-safe counter and timer collection.
#[derive(Clone, Debug, Default)]
pub struct IngestMetrics {
    inner: Arc<Mutex<MetricsInner>>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    counters: BTreeMap<String, u64>,
    start_time: Option<Instant>,
    end_time: Option<Instant>,
}

impl IngestMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MetricsInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark the start of a timed phase, clearing any previous end mark.
    pub fn record_start(&self) {
        let mut inner = self.lock();
        inner.start_time = Some(Instant::now());
        inner.end_time = None;
    }

    pub fn record_end(&self) {
        self.lock().end_time = Some(Instant::now());
    }

    /// Time between the last start and end marks.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let inner = self.lock();
        match (inner.start_time, inner.end_time) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            _ => None,
        }
    }

    /// Add `by` to the named counter, creating it at zero if absent.
    pub fn increment(&self, name: &str, by: u64) {
        let mut inner = self.lock();
        *inner.counters.entry(name.to_string()).or_insert(0) += by;
    }

    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        self.lock().counters.get(name).copied().unwrap_or(0)
    }

    /// All counters by name.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.lock().counters.clone()
    }

    /// Counters plus `elapsed_ms` when a timed phase has completed.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let inner = self.lock();
        let mut obj = serde_json::Map::new();
        for (name, value) in &inner.counters {
            obj.insert(name.clone(), json!(value));
        }
        if let (Some(start), Some(end)) = (inner.start_time, inner.end_time) {
            obj.insert(
                "elapsed_ms".to_string(),
                json!(end.duration_since(start).as_millis() as u64),
            );
        }
        Value::Object(obj)
    }

    /// Write [`Self::to_json`] as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let formatted = serde_json::to_string_pretty(&self.to_json())?;
        fs::write(path, formatted).with_context(|| format!("write metrics to {}", path.display()))
    }

    /// Emit every counter as one `info` event.
    pub fn log_summary(&self) {
        let elapsed_ms = self.elapsed().map(|d| d.as_millis() as u64);
        let counters = self.snapshot();
        info!(?elapsed_ms, ?counters, "ingest metrics");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate_across_clones() {
        let m = IngestMetrics::new();
        let shared = m.clone();
        m.increment(ARRAYS_DECODED, 2);
        shared.increment(ARRAYS_DECODED, 3);
        assert_eq!(m.counter(ARRAYS_DECODED), 5);
        assert_eq!(m.counter(CELLS_WRITTEN), 0);
        assert_eq!(m.to_json()[ARRAYS_DECODED], json!(5));
    }

    #[test]
    fn test_elapsed_needs_both_marks() {
        let m = IngestMetrics::new();
        assert!(m.elapsed().is_none());
        m.record_start();
        assert!(m.elapsed().is_none());
        m.record_end();
        assert!(m.elapsed().is_some());
        assert!(m.to_json().get("elapsed_ms").is_some());
    }
}
