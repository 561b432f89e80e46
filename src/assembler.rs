//! The dataset assembler: chip description, batch validation, population.
//!
//! [`DatasetAssembler`] is a small state machine:
//!
//! ```text
//! Empty --load_chip_description--> ChipLoaded --validate_batch--> Validated --populate--> Populated
//! ```
//!
//! Loading a chip description is allowed from any state and discards a
//! previous batch. A rejected batch leaves the assembler at `ChipLoaded`. A
//! failed populate leaves it at `Validated`; the store it was writing into
//! holds partial data and must be discarded.

use crate::cdf;
use crate::cel::{CelHeader, decode_cel, read_cel_header};
use crate::chip::{ChipDescription, ChipGeometry};
use crate::config::{ExecMode, IngestConfig};
use crate::error::{IngestError, Result};
use crate::index::ProbeCellSet;
use crate::io::glob::expand_glob_required;
use crate::metrics::{
    ARRAYS_DECODED, BATCHES_REJECTED, CELLS_WRITTEN, CHIP_DESCRIPTIONS_LOADED, FILES_VALIDATED,
    IngestMetrics, PROBE_SETS_INDEXED,
};
use crate::progress::{NoProgress, ProgressSink};
use crate::store::{ColumnHandle, ColumnStore, ColumnWriter};
use anyhow::Context;
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum AssemblerState {
    Empty,
    ChipLoaded,
    Validated,
    Populated,
}

impl fmt::Display for AssemblerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Empty => "Empty",
            Self::ChipLoaded => "ChipLoaded",
            Self::Validated => "Validated",
            Self::Populated => "Populated",
        })
    }
}

/// Intensity files that all match one chip description.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArrayBatch {
    /// Chip type of the description the batch was validated against.
    pub chip_type: String,
    pub geometry: ChipGeometry,
    /// Headers in the order the files were given.
    pub arrays: Vec<CelHeader>,
}

impl ArrayBatch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

/// What [`DatasetAssembler::populate`] wrote.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PopulateSummary {
    pub chip_type: String,
    /// Array names in column order.
    pub arrays: Vec<String>,
    pub columns: Vec<ColumnHandle>,
    pub rows: usize,
    pub cells_written: u64,
    pub elapsed_ms: u64,
}

/// Shared flag that stops a running populate before its next file.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous cancellation.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Loads a chip description, validates intensity batches against it and
/// streams their cells into a [`ColumnStore`].
pub struct DatasetAssembler {
    config: IngestConfig,
    state: AssemblerState,
    chip: Option<ChipDescription>,
    batch: Option<ArrayBatch>,
    progress: Arc<dyn ProgressSink>,
    metrics: IngestMetrics,
    cancel: CancelToken,
}

impl fmt::Debug for DatasetAssembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetAssembler")
            .field("state", &self.state)
            .field("chip_type", &self.chip.as_ref().map(|c| c.chip_type.as_str()))
            .field("arrays", &self.batch.as_ref().map(ArrayBatch::len))
            .finish_non_exhaustive()
    }
}

impl DatasetAssembler {
    #[must_use]
    pub fn new(config: IngestConfig) -> Self {
        Self {
            config,
            state: AssemblerState::Empty,
            chip: None,
            batch: None,
            progress: Arc::new(NoProgress),
            metrics: IngestMetrics::new(),
            cancel: CancelToken::new(),
        }
    }

    /// Report per-unit progress of chip-description loads to `sink`.
    #[must_use]
    pub fn with_progress(mut self, sink: impl ProgressSink + 'static) -> Self {
        self.progress = Arc::new(sink);
        self
    }

    #[must_use]
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> AssemblerState {
        self.state
    }

    #[must_use]
    pub fn chip(&self) -> Option<&ChipDescription> {
        self.chip.as_ref()
    }

    #[must_use]
    pub fn batch(&self) -> Option<&ArrayBatch> {
        self.batch.as_ref()
    }

    /// Probe set by exact name in the loaded chip description.
    #[must_use]
    pub fn probe_set(&self, name: &str) -> Option<&ProbeCellSet> {
        self.chip.as_ref()?.probe_set(name)
    }

    /// Array names of the validated batch, in column order.
    #[must_use]
    pub fn array_names(&self) -> Vec<&str> {
        self.batch
            .iter()
            .flat_map(|b| b.arrays.iter().map(|a| a.array_name.as_str()))
            .collect()
    }

    #[must_use]
    pub fn metrics(&self) -> &IngestMetrics {
        &self.metrics
    }

    /// Handle for cancelling [`Self::populate`] from another thread.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Sniff and decode a chip description, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Any decoding failure; the assembler keeps its previous state.
    pub fn load_chip_description(&mut self, path: &Path) -> Result<&ChipDescription> {
        let chip = cdf::load_chip_description(path, &self.config, self.progress.as_ref())?;
        self.metrics.increment(CHIP_DESCRIPTIONS_LOADED, 1);
        self.metrics.increment(PROBE_SETS_INDEXED, chip.n_probe_sets() as u64);
        self.batch = None;
        self.state = AssemblerState::ChipLoaded;
        Ok(self.chip.insert(chip))
    }

    /// Read the header of every file and check it against the chip description.
    ///
    /// No cell data is read. On success the batch replaces any previous one.
    ///
    /// # Errors
    ///
    /// [`IngestError::InvalidState`] without a chip description,
    /// [`IngestError::EmptyBatch`] for no files, and the first
    /// [`IngestError::ChipTypeMismatch`], [`IngestError::DimensionMismatch`] or
    /// header decoding error in file order. Any failure drops the previous
    /// batch and leaves the assembler at `ChipLoaded`.
    pub fn validate_batch<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<&ArrayBatch> {
        let Some(chip) = self.chip.as_ref() else {
            return Err(IngestError::InvalidState {
                operation: "validate_batch",
                required: "a loaded chip description",
                actual: self.state.to_string(),
            });
        };
        match check_batch(chip, paths, &self.config, &self.metrics) {
            Ok(batch) => {
                info!(chip_type = %batch.chip_type, arrays = batch.len(), "validated array batch");
                self.state = AssemblerState::Validated;
                Ok(self.batch.insert(batch))
            }
            Err(e) => {
                warn!(error = %e, "rejected array batch");
                self.metrics.increment(BATCHES_REJECTED, 1);
                self.batch = None;
                self.state = AssemblerState::ChipLoaded;
                Err(e)
            }
        }
    }

    /// Expand `pattern` (sorted, at least one match) and validate the files.
    ///
    /// # Errors
    ///
    /// Glob failures and everything [`Self::validate_batch`] reports.
    pub fn validate_glob(&mut self, pattern: &str) -> anyhow::Result<&ArrayBatch> {
        let paths = expand_glob_required(pattern)?;
        self.validate_batch(&paths)
            .with_context(|| format!("validate arrays matching {pattern}"))
    }

    /// Decode every file of the validated batch into `store`, one column per
    /// file in batch order.
    ///
    /// # Errors
    ///
    /// [`IngestError::InvalidState`] before validation,
    /// [`IngestError::Cancelled`] after [`CancelToken::cancel`], and the first
    /// decoding error in file order. On error `store` holds partial data.
    pub fn populate<S: ColumnStore + ?Sized>(&mut self, store: &mut S) -> Result<PopulateSummary> {
        let (Some(chip), Some(batch), AssemblerState::Validated | AssemblerState::Populated) =
            (self.chip.as_ref(), self.batch.as_ref(), self.state)
        else {
            return Err(IngestError::InvalidState {
                operation: "populate",
                required: "a validated batch",
                actual: self.state.to_string(),
            });
        };

        self.metrics.record_start();
        let rows = batch.geometry.n_cells();
        store.set_row_count(rows);
        let columns: Vec<ColumnHandle> = batch.arrays.iter().map(|_| store.append_column()).collect();

        let job = PopulateJob {
            config: &self.config,
            geometry: batch.geometry,
            arrays: &batch.arrays,
            cancel: &self.cancel,
            metrics: &self.metrics,
        };
        match self.config.mode {
            ExecMode::Sequential => job.run_sequential(store, &columns)?,
            ExecMode::Parallel { .. } => job.run_parallel(store, &columns, self.config.mode.threads())?,
        }
        self.metrics.record_end();

        let summary = PopulateSummary {
            chip_type: chip.chip_type.clone(),
            arrays: batch.arrays.iter().map(|a| a.array_name.clone()).collect(),
            columns,
            rows,
            cells_written: (rows * batch.len()) as u64,
            elapsed_ms: self.metrics.elapsed().map_or(0, |d| d.as_millis() as u64),
        };
        info!(
            chip_type = %summary.chip_type,
            arrays = summary.arrays.len(),
            cells = summary.cells_written,
            elapsed_ms = summary.elapsed_ms,
            "populated column store"
        );
        self.state = AssemblerState::Populated;
        Ok(summary)
    }
}

fn check_batch<P: AsRef<Path>>(
    chip: &ChipDescription,
    paths: &[P],
    config: &IngestConfig,
    metrics: &IngestMetrics,
) -> Result<ArrayBatch> {
    if paths.is_empty() {
        return Err(IngestError::EmptyBatch);
    }
    let mut arrays = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        let header = read_cel_header(path, config)?;
        if !chip.matches_chip_type(&header.chip_type) {
            return Err(IngestError::ChipTypeMismatch {
                path: path.to_path_buf(),
                expected: chip.chip_type.clone(),
                actual: header.chip_type,
            });
        }
        if header.geometry != chip.geometry {
            return Err(IngestError::DimensionMismatch {
                path: path.to_path_buf(),
                expected: chip.geometry,
                actual: header.geometry,
            });
        }
        debug!(path = %path.display(), format = %header.format, "array header accepted");
        metrics.increment(FILES_VALIDATED, 1);
        arrays.push(header);
    }
    Ok(ArrayBatch {
        chip_type: chip.chip_type.clone(),
        geometry: chip.geometry,
        arrays,
    })
}

/// Borrowed view of everything a populate run needs besides the store.
struct PopulateJob<'a> {
    config: &'a IngestConfig,
    geometry: ChipGeometry,
    arrays: &'a [CelHeader],
    cancel: &'a CancelToken,
    metrics: &'a IngestMetrics,
}

impl PopulateJob<'_> {
    fn check_cancel(&self, completed: usize) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(IngestError::Cancelled {
                completed,
                total: self.arrays.len(),
            });
        }
        Ok(())
    }

    fn record(&self, path: &Path) {
        self.metrics.increment(ARRAYS_DECODED, 1);
        self.metrics.increment(CELLS_WRITTEN, self.geometry.n_cells() as u64);
        debug!(path = %path.display(), "array decoded");
    }

    /// Decode each file straight into its column.
    fn run_sequential<S: ColumnStore + ?Sized>(&self, store: &mut S, columns: &[ColumnHandle]) -> Result<()> {
        for (i, (array, &column)) in self.arrays.iter().zip(columns).enumerate() {
            self.check_cancel(i)?;
            let mut sink = ColumnWriter::new(&mut *store, column);
            decode_cel(&array.path, self.config, Some(self.geometry), &mut sink)?;
            self.record(&array.path);
        }
        Ok(())
    }

    /// Decode up to `threads` files at a time into buffers, then copy them into
    /// their columns in file order.
    fn run_parallel<S: ColumnStore + ?Sized>(
        &self,
        store: &mut S,
        columns: &[ColumnHandle],
        threads: usize,
    ) -> Result<()> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| IngestError::WorkerPool(e.to_string()))?;
        let n_cells = self.geometry.n_cells();

        for (chunk_no, chunk) in self.arrays.chunks(threads).enumerate() {
            let base = chunk_no * threads;
            self.check_cancel(base)?;
            let decoded: Vec<Result<Vec<f64>>> = pool.install(|| {
                chunk
                    .par_iter()
                    .map(|array| -> Result<Vec<f64>> {
                        self.check_cancel(base)?;
                        let mut values = vec![0.0; n_cells];
                        decode_cel(&array.path, self.config, Some(self.geometry), &mut values)?;
                        Ok(values)
                    })
                    .collect()
            });
            for (offset, (result, array)) in decoded.into_iter().zip(chunk).enumerate() {
                let values = result?;
                let column = columns[base + offset];
                for (row, value) in values.into_iter().enumerate() {
                    store.write(column, row, value);
                }
                self.record(&array.path);
            }
        }
        Ok(())
    }
}
