//! Binary ("XDA", version 4) CEL decoder. All fields are little-endian.
//!
//! ```text
//! magic i32 (64), version i32 (4), rows i32, cols i32, n_cells i32
//! header, algorithm, algorithm_parameters   i32 len + bytes each
//! cell_margin i32, n_outliers u32, n_masks u32, n_subgrids i32
//! n_cells x (intensity f32, stddev f32, npixels i16)
//! ```
//!
//! The header string holds the text-format `key=value` header, including the
//! `DatHeader` line that names the chip type.

use super::{CelHeader, CellSink, check_intensity, chip_type_from_dat_header};
use crate::cdf::geometry_from;
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::io::binary::BinReader;
use crate::io::source::stem_name;
use crate::sniff::{FileFormat, XDA_CEL_MAGIC, XDA_CEL_VERSION};
use byteorder::{ByteOrder, LittleEndian};
use std::io::Read;
use std::path::Path;

/// Bytes per cell record.
pub const CELL_RECORD_LEN: usize = 10;

pub(crate) fn read_header<R: Read>(reader: &mut R, path: &Path) -> Result<CelHeader> {
    let mut r = BinReader::new(reader, path);
    let magic = r.i32_le("magic")?;
    if magic != XDA_CEL_MAGIC {
        return Err(IngestError::malformed(
            path,
            None,
            format!("XDA CEL magic {magic}, expected {XDA_CEL_MAGIC}"),
        ));
    }
    let version = r.i32_le("version")?;
    if version != XDA_CEL_VERSION {
        return Err(IngestError::VersionMismatch {
            path: path.to_path_buf(),
            format: "XDA CEL",
            expected: XDA_CEL_VERSION.to_string(),
            actual: i64::from(version),
        });
    }
    let rows = r.i32_le("rows")?;
    let cols = r.i32_le("cols")?;
    let n_cells = r.i32_le("cell count")?;
    let geometry = geometry_from(path, i64::from(rows), i64::from(cols))?;
    if usize::try_from(n_cells).ok() != Some(geometry.n_cells()) {
        return Err(IngestError::CellCountMismatch {
            path: path.to_path_buf(),
            geometry,
            n_cells: usize::try_from(n_cells).unwrap_or(0),
        });
    }

    let header = r.prefixed_str_le("header", None)?;
    let _algorithm = r.prefixed_str_le("algorithm", None)?;
    let _parameters = r.prefixed_str_le("algorithm parameters", None)?;
    let _cell_margin = r.i32_le("cell margin")?;
    let _n_outliers = r.u32_le("outlier count")?;
    let _n_masks = r.u32_le("mask count")?;
    let _n_subgrids = r.i32_le("subgrid count")?;

    let chip_type = chip_type_from_dat_header(&header).ok_or_else(|| IngestError::ChipNameMissing {
        path: path.to_path_buf(),
    })?;
    Ok(CelHeader {
        path: path.to_path_buf(),
        array_name: stem_name(path),
        chip_type,
        geometry,
        format: FileFormat::BinaryXda,
    })
}

/// Continue after [`read_header`]; cell `i` is written to linear index `i`.
pub(crate) fn read_cells<R: Read>(
    reader: &mut R,
    header: &CelHeader,
    config: &IngestConfig,
    sink: &mut dyn CellSink,
) -> Result<()> {
    let path = header.path.as_path();
    let expected = header.geometry.n_cells();
    let n_bytes = expected
        .checked_mul(CELL_RECORD_LEN)
        .ok_or_else(|| IngestError::malformed(path, None, format!("{expected} cells overflow the byte count")))?;
    let mut records = Vec::with_capacity(n_bytes.min(64 << 20));
    reader
        .take(n_bytes as u64)
        .read_to_end(&mut records)
        .map_err(|e| IngestError::from_io(path, "cell records", e))?;
    let actual = records.len() / CELL_RECORD_LEN;
    if actual < expected {
        return Err(IngestError::IntensityTruncated {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }
    for (i, record) in records.chunks_exact(CELL_RECORD_LEN).enumerate() {
        let value = f64::from(LittleEndian::read_f32(&record[..4]));
        sink.set(i, check_intensity(path, i, value, config.max_intensity)?);
    }
    Ok(())
}
