//! RME intensity cache.
//!
//! ```text
//! type        i32 len + "RMECEL" (or "CEL")
//! version     i32 (1)
//! array name, chip type   i32 len + bytes
//! rows i32, cols i32
//! rows * cols x f64, by linear cell index
//! ```
//!
//! Values were validated when the cache was written and are loaded as-is.

use super::{CelHeader, CellSink};
use crate::cdf::geometry_from;
use crate::chip::ChipGeometry;
use crate::error::{IngestError, Result};
use crate::io::binary::{BinReader, write_prefixed_str_le};
use crate::sniff::FileFormat;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::io::{self, Read, Write};
use std::path::Path;

pub const RME_CEL_TAG: &str = "RMECEL";
pub const RME_CEL_VERSION: i32 = 1;

pub(crate) fn read_header<R: Read>(reader: &mut R, path: &Path) -> Result<CelHeader> {
    let mut r = BinReader::new(reader, path);
    let tag = r.prefixed_str_le("type tag", Some(16))?;
    if tag != "CEL" && tag != RME_CEL_TAG {
        return Err(IngestError::malformed(
            path,
            None,
            format!("RME type tag {tag:?} is not an intensity file"),
        ));
    }
    let version = r.i32_le("version")?;
    if version != RME_CEL_VERSION {
        return Err(IngestError::VersionMismatch {
            path: path.to_path_buf(),
            format: "RME CEL",
            expected: RME_CEL_VERSION.to_string(),
            actual: i64::from(version),
        });
    }
    let array_name = r.prefixed_str_le("array name", None)?;
    let chip_type = r.prefixed_str_le("chip type", None)?;
    if chip_type.is_empty() {
        return Err(IngestError::ChipNameMissing {
            path: path.to_path_buf(),
        });
    }
    let rows = r.i32_le("rows")?;
    let cols = r.i32_le("cols")?;
    let geometry = geometry_from(path, i64::from(rows), i64::from(cols))?;
    Ok(CelHeader {
        path: path.to_path_buf(),
        array_name,
        chip_type,
        geometry,
        format: FileFormat::RmeCache,
    })
}

pub(crate) fn read_cells<R: Read>(
    reader: &mut R,
    header: &CelHeader,
    sink: &mut dyn CellSink,
) -> Result<()> {
    let path = header.path.as_path();
    let expected = header.geometry.n_cells();
    let n_bytes = expected
        .checked_mul(8)
        .ok_or_else(|| IngestError::malformed(path, None, format!("{expected} cells overflow the byte count")))?;
    let mut raw = Vec::with_capacity(n_bytes.min(64 << 20));
    reader
        .take(n_bytes as u64)
        .read_to_end(&mut raw)
        .map_err(|e| IngestError::from_io(path, "intensities", e))?;
    if raw.len() < n_bytes {
        return Err(IngestError::IntensityTruncated {
            path: path.to_path_buf(),
            expected,
            actual: raw.len() / 8,
        });
    }
    for (i, chunk) in raw.chunks_exact(8).enumerate() {
        sink.set(i, LittleEndian::read_f64(chunk));
    }
    Ok(())
}

/// Write an intensity cache readable by this module.
///
/// `values` are indexed by linear cell index and must hold `rows * cols` entries.
///
/// # Errors
///
/// `InvalidInput` when `values` has the wrong length; otherwise propagates
/// write failures.
pub fn write_rme_cel<W: Write>(
    w: &mut W,
    array_name: &str,
    chip_type: &str,
    geometry: ChipGeometry,
    values: &[f64],
) -> io::Result<()> {
    if values.len() != geometry.n_cells() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} values for a {geometry} chip", values.len()),
        ));
    }
    let dim = |n: usize| {
        i32::try_from(n).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "dimension exceeds i32"))
    };
    write_prefixed_str_le(w, RME_CEL_TAG)?;
    w.write_i32::<LittleEndian>(RME_CEL_VERSION)?;
    write_prefixed_str_le(w, array_name)?;
    write_prefixed_str_le(w, chip_type)?;
    w.write_i32::<LittleEndian>(dim(geometry.rows)?)?;
    w.write_i32::<LittleEndian>(dim(geometry.cols)?)?;
    for &v in values {
        w.write_f64::<LittleEndian>(v)?;
    }
    Ok(())
}
