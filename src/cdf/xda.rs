//! Binary ("XDA") CDF decoder. All fields are little-endian.
//!
//! ```text
//! magic i32 (67), version i32 (1), cols i16, rows i16,
//! n_units i32, n_qc_units i32, len_ref_seq i32, ref_seq[len_ref_seq]
//! unit names      n_units x char[64]
//! record offsets  (n_qc_units + n_units) x i32, QC units first
//! QC unit         type u16, n_probes i32, n_probes x (x u16, y u16, len u8, pm u8, bg u8)
//! unit            unittype u16, direction u8, natoms i32, nblocks i32, ncells i32,
//!                 unitnumber i32, ncellperatom u8, then nblocks blocks
//! block           natoms i32, ncells i32, ncellperatom u8, direction u8,
//!                 firstatom i32, reserved i32, name char[64], then ncells cells
//! cell            atom i32, x u16, y u16, indexpos i32, pbase u8, tbase u8
//! ```
//!
//! XDA files carry no chip name; the chip type is the file name stem.

use super::{IndexBuilder, ProbeSetBuilder, geometry_from};
use crate::chip::{ChipDescription, ChipGeometry};
use crate::error::{IngestError, Result};
use crate::io::binary::BinReader;
use crate::io::source::stem_name;
use crate::progress::ProgressSink;
use crate::sniff::{FileFormat, XDA_CDF_MAGIC, XDA_CDF_VERSION};
use std::io::{Read, Seek};
use std::path::Path;
use tracing::debug;

/// Width of the fixed name fields.
pub const NAME_WIDTH: usize = 64;
/// `unittype` of an expression unit.
pub const EXPRESSION_UNIT: u16 = 1;

pub(crate) fn decode<R: Read + Seek>(
    reader: R,
    path: &Path,
    progress: &dyn ProgressSink,
) -> Result<ChipDescription> {
    let mut r = BinReader::new(reader, path);
    let magic = r.i32_le("magic")?;
    if magic != XDA_CDF_MAGIC {
        return Err(IngestError::malformed(
            path,
            None,
            format!("XDA CDF magic {magic}, expected {XDA_CDF_MAGIC}"),
        ));
    }
    let version = r.i32_le("version")?;
    if version != XDA_CDF_VERSION {
        return Err(IngestError::VersionMismatch {
            path: path.to_path_buf(),
            format: "XDA CDF",
            expected: XDA_CDF_VERSION.to_string(),
            actual: i64::from(version),
        });
    }
    let cols = r.i16_le("cols")?;
    let rows = r.i16_le("rows")?;
    let geometry = geometry_from(path, i64::from(rows), i64::from(cols))?;
    let n_units = r.i32_le("unit count")?;
    let n_units = count(&r, n_units, "unit count")?;
    let n_qc = r.i32_le("QC unit count")?;
    let n_qc = count(&r, n_qc, "QC unit count")?;
    let ref_len = r.i32_le("reference sequence length")?;
    let ref_len = count(&r, ref_len, "reference sequence length")?;
    r.skip(ref_len as u64, "reference sequence")?;

    let mut names = Vec::with_capacity(n_units.min(1 << 20));
    for _ in 0..n_units {
        names.push(r.fixed_str(NAME_WIDTH, "unit name")?);
    }
    let mut qc_offsets = Vec::with_capacity(n_qc.min(1 << 20));
    for _ in 0..n_qc {
        qc_offsets.push(r.i32_le("QC unit offset")?);
    }
    let mut unit_offsets = Vec::with_capacity(n_units.min(1 << 20));
    for _ in 0..n_units {
        unit_offsets.push(r.i32_le("unit offset")?);
    }

    for offset in qc_offsets {
        let offset = offset_u64(&r, offset)?;
        r.seek_to(offset, "QC unit")?;
        read_qc_unit(&mut r, geometry)?;
    }

    let mut index = IndexBuilder::new(path);
    for (u, (name, offset)) in names.into_iter().zip(unit_offsets).enumerate() {
        let offset = offset_u64(&r, offset)?;
        r.seek_to(offset, "unit")?;
        let set = read_unit(&mut r, name, geometry)?;
        debug!(unit = u, probe_set = set.name(), "decoded unit");
        index.add(set)?;
        progress.on_unit_processed(u, n_units);
    }

    let mut chip = index.finish(stem_name(path), geometry, FileFormat::BinaryXda);
    chip.qc_units = n_qc;
    Ok(chip)
}

fn count<R: Read>(r: &BinReader<R>, n: i32, field: &str) -> Result<usize> {
    usize::try_from(n)
        .map_err(|_| IngestError::malformed(r.path(), None, format!("negative {field} {n}")))
}

fn offset_u64<R: Read>(r: &BinReader<R>, offset: i32) -> Result<u64> {
    u64::try_from(offset)
        .map_err(|_| IngestError::malformed(r.path(), None, format!("negative record offset {offset}")))
}

fn read_qc_unit<R: Read>(r: &mut BinReader<R>, geometry: ChipGeometry) -> Result<()> {
    let _qc_type = r.u16_le("QC unit type")?;
    let n_probes = r.i32_le("QC probe count")?;
    let n_probes = count(r, n_probes, "QC probe count")?;
    for _ in 0..n_probes {
        let x = r.u16_le("QC probe x")?;
        let y = r.u16_le("QC probe y")?;
        let _len = r.u8("QC probe length")?;
        let _pm = r.u8("QC probe pm flag")?;
        let _bg = r.u8("QC probe background flag")?;
        if !geometry.contains(usize::from(x), usize::from(y)) {
            return Err(IngestError::malformed(
                r.path(),
                None,
                format!("QC probe ({x}, {y}) lies outside the {geometry} chip"),
            ));
        }
    }
    Ok(())
}

fn read_unit<R: Read>(
    r: &mut BinReader<R>,
    name: String,
    geometry: ChipGeometry,
) -> Result<ProbeSetBuilder> {
    let unit_type = r.u16_le("unit type")?;
    if unit_type != EXPRESSION_UNIT {
        return Err(IngestError::UnsupportedUnitType {
            path: r.path().to_path_buf(),
            unit: name,
            unit_type: i64::from(unit_type),
        });
    }
    let _direction = r.u8("unit direction")?;
    let _natoms = r.i32_le("unit atom count")?;
    let n_blocks = r.i32_le("unit block count")?;
    let _ncells = r.i32_le("unit cell count")?;
    let _unit_number = r.i32_le("unit number")?;
    let _cells_per_atom = r.u8("unit cells per atom")?;

    let n_blocks = count(r, n_blocks, "unit block count")?;
    let mut set = ProbeSetBuilder::new(name);
    for _ in 0..n_blocks {
        let _natoms = r.i32_le("block atom count")?;
        let n_cells = r.i32_le("block cell count")?;
        let _cells_per_atom = r.u8("block cells per atom")?;
        let _direction = r.u8("block direction")?;
        let _first_atom = r.i32_le("block first atom")?;
        let _reserved = r.i32_le("block reserved")?;
        let _block_name = r.fixed_str(NAME_WIDTH, "block name")?;
        let n_cells = count(r, n_cells, "block cell count")?;
        for _ in 0..n_cells {
            let _atom = r.i32_le("cell atom")?;
            let x = r.u16_le("cell x")?;
            let y = r.u16_le("cell y")?;
            let _index_pos = r.i32_le("cell index position")?;
            let pbase = r.u8("cell probe base")?;
            let tbase = r.u8("cell target base")?;
            set.push_cell(
                geometry,
                usize::from(x),
                usize::from(y),
                char::from(pbase),
                char::from(tbase),
                r.path(),
            )?;
        }
    }
    Ok(set)
}
