//! Calvin-container CEL decoder.
//!
//! The header read stops after the data header; the full decode re-reads the
//! container and takes intensities from the `Intensity` data set, or failing
//! that, the first data set whose first column is floating point.

use super::{CelHeader, CellSink};
use crate::cdf::calvin::{ARRAY_TYPE, CEL_COLS, CEL_ROWS};
use crate::cdf::geometry_from;
use crate::error::{IngestError, Result};
use crate::io::binary::BinReader;
use crate::io::calvin::{CalvinFile, ColumnType, DataSet, NameValueTriplet, read_headers};
use crate::io::source::stem_name;
use crate::sniff::{CALVIN_CEL_TYPE, FileFormat};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

pub const INTENSITY_DATASET: &str = "Intensity";

pub(crate) fn read_header<R: Read>(reader: &mut R, path: &Path) -> Result<CelHeader> {
    let mut r = BinReader::new(reader, path);
    let (_, header) = read_headers(&mut r)?;
    if header.data_type_id != CALVIN_CEL_TYPE {
        return Err(IngestError::malformed(
            path,
            None,
            format!("Calvin data type {:?} is not an intensity file", header.data_type_id),
        ));
    }
    let dim = |key: &str| -> Result<i64> {
        header
            .find_nvt(key)
            .and_then(NameValueTriplet::as_i64)
            .ok_or_else(|| IngestError::truncated(path, key))
    };
    let geometry = geometry_from(path, dim(CEL_ROWS)?, dim(CEL_COLS)?)?;
    let chip_type = header
        .find_nvt(ARRAY_TYPE)
        .and_then(NameValueTriplet::as_text)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| IngestError::ChipNameMissing {
            path: path.to_path_buf(),
        })?;
    Ok(CelHeader {
        path: path.to_path_buf(),
        array_name: stem_name(path),
        chip_type,
        geometry,
        format: FileFormat::Calvin,
    })
}

fn is_float(ds: &DataSet) -> bool {
    ds.columns
        .first()
        .is_some_and(|c| matches!(c.kind, ColumnType::F32 | ColumnType::F64))
}

pub(crate) fn read_cells<R: Read + Seek>(
    reader: &mut R,
    header: &CelHeader,
    sink: &mut dyn CellSink,
) -> Result<()> {
    let path = header.path.as_path();
    reader
        .seek(SeekFrom::Start(0))
        .map_err(|e| IngestError::from_io(path, "Calvin file header", e))?;
    let file = CalvinFile::read(reader, path)?;
    let datasets = || file.groups.iter().flat_map(|g| g.datasets.iter());
    let ds = datasets()
        .find(|ds| ds.name == INTENSITY_DATASET && is_float(ds))
        .or_else(|| datasets().find(|ds| is_float(ds)))
        .ok_or_else(|| IngestError::malformed(path, None, "no floating-point intensity data set"))?;
    let values = ds
        .data
        .first()
        .and_then(|col| col.to_f64_vec())
        .unwrap_or_default();

    let expected = header.geometry.n_cells();
    if values.len() < expected {
        return Err(IngestError::IntensityTruncated {
            path: path.to_path_buf(),
            expected,
            actual: values.len(),
        });
    }
    for (i, value) in values.into_iter().take(expected).enumerate() {
        sink.set(i, value);
    }
    Ok(())
}
