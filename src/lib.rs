//! # affyingest
//!
//! An **ingestion engine** for Affymetrix-style microarray files. It decodes a
//! chip description (CDF) in any of four wire formats into a probe-location
//! index, validates a batch of intensity files (CEL) against it, and writes
//! their intensities into a numeric column store, one column per array.
//!
//! ## Key Features
//!
//! - **Four formats for each file kind** - plain text, binary XDA, Calvin
//!   containers and RME caches, detected from the leading bytes
//! - **Balanced probe-set index** - name lookup in `O(log n)`, perfect-match and
//!   mismatch cells stored as linear cell indices
//! - **Header-only batch validation** - chip type and dimensions are checked
//!   before any intensity data is read
//! - **Sequential and parallel population** - choose the right mode for your
//!   workload; both produce identical columns
//! - **Transparent decompression** - `.gz` and `.zst` inputs (feature flags)
//! - **RME caches** - write decoded descriptions and intensities back out for
//!   fast reloads
//!
//! ## Quick Start
//!
//! ```no_run
//! use affyingest::store::DenseColumnStore;
//! use affyingest::{DatasetAssembler, ExecMode, IngestConfig};
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let config = IngestConfig::default().with_mode(ExecMode::Parallel { threads: None });
//! let mut assembler = DatasetAssembler::new(config);
//!
//! assembler.load_chip_description("HG-U133A.cdf".as_ref())?;
//! assembler.validate_glob("arrays/*.CEL")?;
//!
//! let mut store = DenseColumnStore::new();
//! let summary = assembler.populate(&mut store)?;
//! println!("{} arrays x {} cells", summary.arrays.len(), summary.rows);
//!
//! if let Some(set) = assembler.probe_set("AFFX-BioB-5_at") {
//!     println!("{} PM cells", set.pm_count());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Chip description
//!
//! A [`ChipDescription`] carries the chip type, its [`ChipGeometry`] and a
//! [`ProbeLocationIndex`]. Cell `(x, y)` is stored as the linear index
//! `x + rows * y`; a cell is perfect-match when its probe and target bases are
//! complementary (see [`cdf::classify_cell`]).
//!
//! ### Batch
//!
//! [`DatasetAssembler::validate_batch`] reads only the header of each intensity
//! file. Every array must name the loaded chip type (or an alias) and share its
//! dimensions; any failure rejects the whole batch.
//!
//! ### Column store
//!
//! [`store::ColumnStore`] is the sink for population. Rows are chip cells and
//! columns are arrays in batch order.
//!
//! ## Feature Flags
//!
//! - `compression-gzip` - Read and write gzip-compressed files
//! - `compression-zstd` - Read and write zstd-compressed files
//! - `cli` - Build the `affyingest` command-line tool
//!
//! ## Module Overview
//!
//! - [`assembler`] - Load, validate and populate state machine
//! - [`cdf`] - Chip-description decoders and the RME cache writer
//! - [`cel`] - Intensity-file decoders and the RME cache writer
//! - [`index`] - Balanced probe-set index
//! - [`sniff`] - Wire-format detection
//! - [`io`] - Byte sources, binary and text cursors, Calvin containers
//! - [`config`] - Execution mode and limits
//! - [`testing`] - Fixture encoders and assertions

pub mod assembler;
pub mod cdf;
pub mod cel;
pub mod chip;
pub mod config;
pub mod error;
pub mod index;
pub mod io;
pub mod metrics;
pub mod progress;
pub mod sniff;
pub mod store;
pub mod testing;

pub use assembler::{ArrayBatch, AssemblerState, CancelToken, DatasetAssembler, PopulateSummary};
pub use cel::CelHeader;
pub use chip::{ChipDescription, ChipGeometry};
pub use config::{ExecMode, IngestConfig};
pub use error::{IngestError, Result};
pub use index::{ProbeCellSet, ProbeLocationIndex};
pub use metrics::IngestMetrics;
pub use progress::{NoProgress, ProgressSink};
pub use sniff::{FileFormat, FileKind};
