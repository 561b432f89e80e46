//! Error types for affyingest.
//!
//! Every failure in the ingestion core is a variant of [`IngestError`]. Variants
//! carry the offending file and the expected/actual values as structured fields,
//! so callers can build their own diagnostics instead of parsing messages.

use crate::chip::ChipGeometry;
use crate::sniff::FileKind;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Error types that can occur while loading chip descriptions and intensity files.
#[derive(Debug, Error)]
pub enum IngestError {
    /// No decoder recognized the file's leading bytes.
    #[error("{}: unrecognized {kind} file format", .path.display())]
    UnrecognizedFormat {
        /// File that could not be classified
        path: PathBuf,
        /// Whether a CDF or a CEL file was expected
        kind: FileKind,
    },

    /// The file ended (or a required key was missing) before the header was complete.
    #[error("{}: header truncated while reading {field}", .path.display())]
    HeaderTruncated {
        /// File being decoded
        path: PathBuf,
        /// Header field that could not be read
        field: String,
    },

    /// Fewer intensity records than the header declared.
    #[error("{}: intensity data truncated: expected {expected} cells, read {actual}", .path.display())]
    IntensityTruncated {
        /// File being decoded
        path: PathBuf,
        /// Declared cell count
        expected: usize,
        /// Cells read before the data ran out
        actual: usize,
    },

    /// An intensity was negative, above the ceiling, or NaN.
    #[error("{}: corrupt intensity {value} at cell {cell}", .path.display())]
    CorruptIntensity {
        /// File being decoded
        path: PathBuf,
        /// Linear cell index
        cell: usize,
        /// Offending value
        value: f64,
    },

    /// The intensity file header carries no chip type name.
    #[error("{}: no chip type name found in header", .path.display())]
    ChipNameMissing {
        /// File being decoded
        path: PathBuf,
    },

    /// Declared geometry differs from the chip description.
    #[error("{}: dimension mismatch: expected {expected}, found {actual}", .path.display())]
    DimensionMismatch {
        /// Offending file
        path: PathBuf,
        /// Reference geometry
        expected: ChipGeometry,
        /// Geometry declared by the file
        actual: ChipGeometry,
    },

    /// A binary header's cell count disagrees with its own rows and cols.
    #[error("{}: dimension mismatch: header declares {geometry} but {n_cells} cells", .path.display())]
    CellCountMismatch {
        /// File being decoded
        path: PathBuf,
        /// Declared geometry
        geometry: ChipGeometry,
        /// Declared cell count
        n_cells: usize,
    },

    /// Declared chip type differs (case-insensitively) from the chip description.
    #[error("{}: chip type mismatch: expected {expected}, found {actual}", .path.display())]
    ChipTypeMismatch {
        /// Offending file
        path: PathBuf,
        /// Reference chip type
        expected: String,
        /// Chip type declared by the file
        actual: String,
    },

    /// A unit of a non-expression type was found in a chip description.
    #[error("{}: unit {unit} has unsupported unit type {unit_type}", .path.display())]
    UnsupportedUnitType {
        /// File being decoded
        path: PathBuf,
        /// Unit name or ordinal
        unit: String,
        /// Declared unit type
        unit_type: i64,
    },

    /// The same probe-set name appeared twice in one chip description.
    #[error("{}: duplicate probe set {name}", .path.display())]
    DuplicateProbeSet {
        /// File being decoded
        path: PathBuf,
        /// Repeated probe-set name
        name: String,
    },

    /// The magic number matched but the format version did not.
    #[error("{}: unsupported {format} version: expected {expected}, found {actual}", .path.display())]
    VersionMismatch {
        /// File being decoded
        path: PathBuf,
        /// Format family
        format: &'static str,
        /// Supported version(s)
        expected: String,
        /// Version found in the file
        actual: i64,
    },

    /// A field was present but could not be interpreted.
    #[error("{}{}: {msg}", .path.display(), .line.map(|l| format!(":{l}")).unwrap_or_default())]
    Malformed {
        /// File being decoded
        path: PathBuf,
        /// 1-based line number for text formats
        line: Option<usize>,
        /// What was wrong
        msg: String,
    },

    /// An assembler operation was invoked out of order.
    #[error("invalid assembler state: {operation} requires {required}, current state is {actual}")]
    InvalidState {
        /// Operation attempted
        operation: &'static str,
        /// State(s) the operation accepts
        required: &'static str,
        /// State the assembler was in
        actual: String,
    },

    /// Population stopped because cancellation was requested.
    #[error("cancelled after {completed} of {total} arrays")]
    Cancelled {
        /// Arrays fully decoded before cancellation
        completed: usize,
        /// Arrays in the batch
        total: usize,
    },

    /// A batch with no files was submitted for validation.
    #[error("array batch is empty")]
    EmptyBatch,

    /// The worker pool for parallel population could not be built.
    #[error("could not start decode workers: {0}")]
    WorkerPool(String),

    /// I/O error
    #[error("{}: I/O error: {source}", .path.display())]
    Io {
        /// File being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

impl IngestError {
    /// Shorthand for [`IngestError::Malformed`].
    pub fn malformed(path: &Path, line: Option<usize>, msg: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.to_path_buf(),
            line,
            msg: msg.into(),
        }
    }

    /// Shorthand for [`IngestError::HeaderTruncated`].
    pub fn truncated(path: &Path, field: impl Into<String>) -> Self {
        Self::HeaderTruncated {
            path: path.to_path_buf(),
            field: field.into(),
        }
    }

    /// Wrap an I/O error; an unexpected EOF becomes [`IngestError::HeaderTruncated`].
    pub fn from_io(path: &Path, field: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::UnexpectedEof {
            Self::truncated(path, field)
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    /// The file this error refers to, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::UnrecognizedFormat { path, .. }
            | Self::HeaderTruncated { path, .. }
            | Self::IntensityTruncated { path, .. }
            | Self::CorruptIntensity { path, .. }
            | Self::ChipNameMissing { path }
            | Self::DimensionMismatch { path, .. }
            | Self::CellCountMismatch { path, .. }
            | Self::ChipTypeMismatch { path, .. }
            | Self::UnsupportedUnitType { path, .. }
            | Self::DuplicateProbeSet { path, .. }
            | Self::VersionMismatch { path, .. }
            | Self::Malformed { path, .. }
            | Self::Io { path, .. } => Some(path),
            Self::InvalidState { .. }
            | Self::Cancelled { .. }
            | Self::EmptyBatch
            | Self::WorkerPool(_) => None,
        }
    }
}
