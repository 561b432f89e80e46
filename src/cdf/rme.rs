//! RME chip-description cache: a compact little-endian dump of a decoded
//! probe-location index, versions 1 to 3.
//!
//! ```text
//! type     i32 len + "RMECDF" (or "CDF")
//! version  i32 (1..=3)
//! v1, v2   chip type string
//! v3       i32 n_names + names, i32 n_descriptions + descriptions
//! rows i32, cols i32, n_probesets i32
//! per probe set
//!   name
//!   v1     pm_count i32, pm_count x i32 location
//!   v2, v3 pm_count i32 [+ locations if > 0], mm_count i32 [+ locations if > 0]
//! ```
//!
//! Locations are linear cell indices. Strings are `i32` length + bytes.

use super::{IndexBuilder, geometry_from};
use crate::chip::{ChipDescription, ChipGeometry};
use crate::error::{IngestError, Result};
use crate::io::binary::{BinReader, write_prefixed_str_le};
use crate::io::source::stem_name;
use crate::progress::ProgressSink;
use crate::sniff::FileFormat;
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::warn;

pub const RME_CDF_TAG: &str = "RMECDF";
pub const RME_CDF_VERSIONS: std::ops::RangeInclusive<i32> = 1..=3;
pub const RME_CDF_LATEST: i32 = 3;

pub(crate) fn decode<R: Read>(
    reader: R,
    path: &Path,
    progress: &dyn ProgressSink,
) -> Result<ChipDescription> {
    let mut r = BinReader::new(reader, path);
    let tag = r.prefixed_str_le("type tag", Some(16))?;
    if tag != "CDF" && tag != RME_CDF_TAG {
        return Err(IngestError::malformed(
            path,
            None,
            format!("RME type tag {tag:?} is not a chip description"),
        ));
    }
    let version = r.i32_le("version")?;
    if !RME_CDF_VERSIONS.contains(&version) {
        return Err(IngestError::VersionMismatch {
            path: path.to_path_buf(),
            format: "RME CDF",
            expected: "1-3".to_string(),
            actual: i64::from(version),
        });
    }

    let (mut names, descriptions) = if version >= 3 {
        let n_names = r.i32_le("chip name count")?;
        let names = read_strings(&mut r, n_names, "chip name")?;
        let n_desc = r.i32_le("description count")?;
        let descriptions = read_strings(&mut r, n_desc, "description")?;
        (names, descriptions)
    } else {
        (vec![r.prefixed_str_le("chip type", None)?], Vec::new())
    };
    if names.first().is_none_or(String::is_empty) {
        let stem = stem_name(path);
        warn!(path = %path.display(), chip_type = %stem, "RME CDF has no chip name, using file name");
        if names.is_empty() {
            names.push(stem);
        } else {
            names[0] = stem;
        }
    }

    let rows = r.i32_le("rows")?;
    let cols = r.i32_le("cols")?;
    let geometry = geometry_from(path, i64::from(rows), i64::from(cols))?;
    let n_sets = r.i32_le("probe set count")?;
    let n_sets = usize::try_from(n_sets).map_err(|_| {
        IngestError::malformed(path, None, format!("negative probe set count {n_sets}"))
    })?;

    let mut index = IndexBuilder::new(path);
    for u in 0..n_sets {
        let name = r.prefixed_str_le("probe set name", None)?;
        let pm_count = r.i32_le("PM count")?;
        let pm = if version == 1 || pm_count > 0 {
            read_locations(&mut r, pm_count, geometry, "PM location")?
        } else {
            Vec::new()
        };
        let mm = if version >= 2 {
            let mm_count = r.i32_le("MM count")?;
            (mm_count > 0)
                .then(|| read_locations(&mut r, mm_count, geometry, "MM location"))
                .transpose()?
        } else {
            None
        };
        index.add_indices(name, pm, mm)?;
        progress.on_unit_processed(u, n_sets);
    }

    let mut names = names.into_iter();
    let chip_type = names.next().unwrap_or_default();
    let mut chip = index.finish(chip_type, geometry, FileFormat::RmeCache);
    chip.aliases = names.collect();
    chip.descriptions = descriptions;
    Ok(chip)
}

fn read_strings<R: Read>(r: &mut BinReader<R>, n: i32, field: &str) -> Result<Vec<String>> {
    let n = usize::try_from(n)
        .map_err(|_| IngestError::malformed(r.path(), None, format!("negative {field} count {n}")))?;
    (0..n).map(|_| r.prefixed_str_le(field, None)).collect()
}

fn read_locations<R: Read>(
    r: &mut BinReader<R>,
    n: i32,
    geometry: ChipGeometry,
    field: &str,
) -> Result<Vec<usize>> {
    let n = usize::try_from(n)
        .map_err(|_| IngestError::malformed(r.path(), None, format!("negative {field} count {n}")))?;
    let mut out = Vec::with_capacity(n.min(1 << 16));
    for _ in 0..n {
        let loc = r.i32_le(field)?;
        match usize::try_from(loc) {
            Ok(idx) if idx < geometry.n_cells() => out.push(idx),
            _ => {
                return Err(IngestError::malformed(
                    r.path(),
                    None,
                    format!("{field} {loc} outside the {geometry} chip"),
                ));
            }
        }
    }
    Ok(out)
}

/// Write `chip` as an RME version 3 cache: every chip name and every
/// description string exactly once, in order.
///
/// # Errors
///
/// Propagates write failures.
pub fn write_rme_cdf<W: Write>(w: &mut W, chip: &ChipDescription) -> io::Result<()> {
    write_rme_cdf_version(w, chip, RME_CDF_LATEST)
}

/// Write `chip` in a specific RME version (1, 2 or 3).
///
/// Version 1 has no mismatch lists; version 2 keeps only the primary chip name.
///
/// # Errors
///
/// `InvalidInput` for an unknown version or a count that does not fit `i32`;
/// otherwise propagates write failures.
pub fn write_rme_cdf_version<W: Write>(
    w: &mut W,
    chip: &ChipDescription,
    version: i32,
) -> io::Result<()> {
    if !RME_CDF_VERSIONS.contains(&version) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported RME CDF version {version}"),
        ));
    }
    write_prefixed_str_le(w, RME_CDF_TAG)?;
    w.write_i32::<LittleEndian>(version)?;
    if version >= 3 {
        w.write_i32::<LittleEndian>(to_i32(1 + chip.aliases.len())?)?;
        write_prefixed_str_le(w, &chip.chip_type)?;
        for alias in &chip.aliases {
            write_prefixed_str_le(w, alias)?;
        }
        w.write_i32::<LittleEndian>(to_i32(chip.descriptions.len())?)?;
        for description in &chip.descriptions {
            write_prefixed_str_le(w, description)?;
        }
    } else {
        write_prefixed_str_le(w, &chip.chip_type)?;
    }
    w.write_i32::<LittleEndian>(to_i32(chip.geometry.rows)?)?;
    w.write_i32::<LittleEndian>(to_i32(chip.geometry.cols)?)?;
    w.write_i32::<LittleEndian>(to_i32(chip.index.len())?)?;

    for set in &chip.index {
        write_prefixed_str_le(w, set.name())?;
        write_locations(w, set.pm())?;
        if version >= 2 {
            write_locations(w, set.mm().unwrap_or_default())?;
        }
    }
    Ok(())
}

fn write_locations<W: Write>(w: &mut W, locations: &[usize]) -> io::Result<()> {
    w.write_i32::<LittleEndian>(to_i32(locations.len())?)?;
    for &loc in locations {
        w.write_i32::<LittleEndian>(to_i32(loc)?)?;
    }
    Ok(())
}

fn to_i32(n: usize) -> io::Result<i32> {
    i32::try_from(n).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "value exceeds i32"))
}
