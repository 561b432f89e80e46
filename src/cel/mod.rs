//! Intensity (CEL) decoding.
//!
//! Every format has two entry points: a header-only read used to validate a
//! batch without touching cell data, and a full decode that streams
//! `rows * cols` intensities into a [`CellSink`] at their linear cell index.

pub mod calvin;
pub mod rme;
pub mod text;
pub mod xda;

use crate::chip::ChipGeometry;
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::sniff::{FileFormat, FileKind, open_and_sniff};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

pub use rme::write_rme_cel;

/// Destination of decoded intensities.
pub trait CellSink {
    /// Store the intensity of the cell with linear index `index`.
    fn set(&mut self, index: usize, value: f64);
}

impl CellSink for Vec<f64> {
    fn set(&mut self, index: usize, value: f64) {
        if let Some(slot) = self.get_mut(index) {
            *slot = value;
        }
    }
}

impl<S: CellSink + ?Sized> CellSink for &mut S {
    fn set(&mut self, index: usize, value: f64) {
        (**self).set(index, value);
    }
}

/// What an intensity file declares about itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CelHeader {
    pub path: PathBuf,
    /// Sample name; the file name stem.
    pub array_name: String,
    pub chip_type: String,
    pub geometry: ChipGeometry,
    pub format: FileFormat,
}

/// Chip type embedded in a `DatHeader` line: the token before `.1sq`.
static DAT_HEADER_CHIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^\s\x14]+)\.1sq").expect("valid chip type pattern"));

pub(crate) fn chip_type_from_dat_header(dat_header: &str) -> Option<String> {
    DAT_HEADER_CHIP
        .captures(dat_header)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Reject negative, NaN and out-of-range readings.
pub(crate) fn check_intensity(path: &Path, cell: usize, value: f64, max: f64) -> Result<f64> {
    if value.is_nan() || value < 0.0 || value > max {
        return Err(IngestError::CorruptIntensity {
            path: path.to_path_buf(),
            cell,
            value,
        });
    }
    Ok(value)
}

/// Read only the header of an intensity file.
///
/// # Errors
///
/// Sniffing, I/O and header decoding failures.
pub fn read_cel_header(path: &Path, config: &IngestConfig) -> Result<CelHeader> {
    let (format, mut source) = open_and_sniff(path, FileKind::Intensity, config.decompress)?;
    match format {
        FileFormat::Text => text::read_header(&mut source, path),
        FileFormat::BinaryXda => xda::read_header(&mut source, path),
        FileFormat::Calvin => calvin::read_header(&mut source, path),
        FileFormat::RmeCache => rme::read_header(&mut source, path),
    }
}

/// Decode an intensity file into `sink`.
///
/// With `expected` set, the declared geometry is checked before any cell is read.
///
/// # Errors
///
/// [`IngestError::DimensionMismatch`] if the geometry differs from `expected`,
/// plus any sniffing, I/O or decoding failure.
pub fn decode_cel(
    path: &Path,
    config: &IngestConfig,
    expected: Option<ChipGeometry>,
    sink: &mut dyn CellSink,
) -> Result<CelHeader> {
    let (format, mut source) = open_and_sniff(path, FileKind::Intensity, config.decompress)?;
    let header = match format {
        FileFormat::Text => text::read_header(&mut source, path)?,
        FileFormat::BinaryXda => xda::read_header(&mut source, path)?,
        FileFormat::Calvin => calvin::read_header(&mut source, path)?,
        FileFormat::RmeCache => rme::read_header(&mut source, path)?,
    };
    if let Some(expected) = expected
        && expected != header.geometry
    {
        return Err(IngestError::DimensionMismatch {
            path: path.to_path_buf(),
            expected,
            actual: header.geometry,
        });
    }
    match format {
        FileFormat::Text => text::read_cells(&mut source, &header, config, sink)?,
        FileFormat::BinaryXda => xda::read_cells(&mut source, &header, config, sink)?,
        FileFormat::Calvin => calvin::read_cells(&mut source, &header, sink)?,
        FileFormat::RmeCache => rme::read_cells(&mut source, &header, sink)?,
    }
    debug!(path = %path.display(), %format, cells = header.geometry.n_cells(), "decoded intensities");
    Ok(header)
}

/// Decode an intensity file into a fresh vector indexed by linear cell index.
///
/// # Errors
///
/// See [`decode_cel`].
pub fn read_cel_intensities(path: &Path, config: &IngestConfig) -> Result<(CelHeader, Vec<f64>)> {
    let header = read_cel_header(path, config)?;
    let mut values = vec![0.0; header.geometry.n_cells()];
    let header = decode_cel(path, config, Some(header.geometry), &mut values)?;
    Ok((header, values))
}
