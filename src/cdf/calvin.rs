//! Calvin-container CDF decoder.
//!
//! Dimensions and chip type come from the data header triplets. Every data
//! group is one probe set, named by the group; every data set in it is a block
//! with `X`, `Y`, `PBase` and `TBase` columns.

use super::{IndexBuilder, ProbeSetBuilder, geometry_from};
use crate::chip::ChipDescription;
use crate::error::{IngestError, Result};
use crate::io::calvin::{CalvinFile, ColumnData, DataSet, NameValueTriplet};
use crate::io::source::stem_name;
use crate::progress::ProgressSink;
use crate::sniff::{CALVIN_CDF_TYPE, FileFormat};
use std::io::{Read, Seek};
use std::path::Path;
use tracing::{debug, warn};

pub const ARRAY_TYPE: &str = "affymetrix-array-type";
pub const CDF_ROWS: &str = "affymetrix-cdf-rows";
pub const CDF_COLS: &str = "affymetrix-cdf-cols";
pub const CEL_ROWS: &str = "affymetrix-cel-rows";
pub const CEL_COLS: &str = "affymetrix-cel-cols";
pub const UNIT_TYPE: &str = "affymetrix-unit-type";
/// `affymetrix-unit-type` of an expression probe set.
pub const EXPRESSION_UNIT: i64 = 1;

pub(crate) fn decode<R: Read + Seek>(
    reader: R,
    path: &Path,
    progress: &dyn ProgressSink,
) -> Result<ChipDescription> {
    let file = CalvinFile::read(reader, path)?;
    let header = &file.data_header;
    if header.data_type_id != CALVIN_CDF_TYPE {
        return Err(IngestError::malformed(
            path,
            None,
            format!("Calvin data type {:?} is not a CDF", header.data_type_id),
        ));
    }

    let dim = |primary: &str, fallback: &str| -> Result<i64> {
        header
            .find_nvt(primary)
            .or_else(|| header.find_nvt(fallback))
            .and_then(NameValueTriplet::as_i64)
            .ok_or_else(|| IngestError::truncated(path, primary))
    };
    let geometry = geometry_from(path, dim(CDF_ROWS, CEL_ROWS)?, dim(CDF_COLS, CEL_COLS)?)?;
    let chip_type = match header.find_nvt(ARRAY_TYPE).and_then(NameValueTriplet::as_text) {
        Some(name) if !name.is_empty() => name,
        _ => {
            let stem = stem_name(path);
            warn!(path = %path.display(), chip_type = %stem, "Calvin CDF has no array type, using file name");
            stem
        }
    };

    let total = file.groups.len();
    let mut index = IndexBuilder::new(path);
    for (u, group) in file.groups.iter().enumerate() {
        let mut set = ProbeSetBuilder::new(group.name.clone());
        for ds in &group.datasets {
            check_unit_type(path, &group.name, ds)?;
            let x = int_column(path, ds, "X")?;
            let y = int_column(path, ds, "Y")?;
            let pbase = base_column(path, ds, "PBase")?;
            let tbase = base_column(path, ds, "TBase")?;
            for row in 0..x.len().min(y.len()).min(pbase.len()).min(tbase.len()) {
                set.push_cell(geometry, x[row], y[row], pbase[row], tbase[row], path)?;
            }
        }
        debug!(probe_set = set.name(), blocks = group.datasets.len(), "decoded unit");
        index.add(set)?;
        progress.on_unit_processed(u, total);
    }
    Ok(index.finish(chip_type, geometry, FileFormat::Calvin))
}

fn check_unit_type(path: &Path, unit: &str, ds: &DataSet) -> Result<()> {
    let Some(unit_type) = ds.param(UNIT_TYPE).and_then(NameValueTriplet::as_i64) else {
        return Ok(());
    };
    if unit_type != EXPRESSION_UNIT {
        return Err(IngestError::UnsupportedUnitType {
            path: path.to_path_buf(),
            unit: unit.to_string(),
            unit_type,
        });
    }
    Ok(())
}

fn column<'a>(path: &Path, ds: &'a DataSet, name: &str) -> Result<&'a ColumnData> {
    ds.column(name).ok_or_else(|| {
        IngestError::malformed(path, None, format!("data set {:?} has no {name} column", ds.name))
    })
}

fn int_column(path: &Path, ds: &DataSet, name: &str) -> Result<Vec<usize>> {
    let col = column(path, ds, name)?;
    (0..col.len())
        .map(|row| {
            col.get(row)
                .and_then(|v| v.as_i64())
                .and_then(|v| usize::try_from(v).ok())
                .ok_or_else(|| {
                    IngestError::malformed(
                        path,
                        None,
                        format!("data set {:?} column {name} row {row} is not a coordinate", ds.name),
                    )
                })
        })
        .collect()
}

/// Bases are stored either as ASCII codes in an integer column or as strings.
fn base_column(path: &Path, ds: &DataSet, name: &str) -> Result<Vec<char>> {
    let col = column(path, ds, name)?;
    (0..col.len())
        .map(|row| {
            let value = col.get(row);
            let base = match &value {
                Some(v) => v
                    .as_str()
                    .and_then(|s| s.chars().next())
                    .or_else(|| v.as_i64().and_then(|c| u8::try_from(c).ok()).map(char::from)),
                None => None,
            };
            base.ok_or_else(|| {
                IngestError::malformed(
                    path,
                    None,
                    format!("data set {:?} column {name} row {row} is not a base", ds.name),
                )
            })
        })
        .collect()
}
