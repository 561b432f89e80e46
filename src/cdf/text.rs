//! Plain-text CDF decoder.
//!
//! The file is INI-like: `[CDF]`, `[Chip]`, optional `[QC…]` sections, then one
//! `[UnitN]` section per unit followed by its `[UnitN_BlockM]` sections. A block
//! ends with `CellHeader=` and exactly `NumCells` `CellK=` lines whose values
//! are tab-separated in the order the header names.

use super::{IndexBuilder, ProbeSetBuilder, geometry_from};
use crate::chip::{ChipDescription, ChipGeometry};
use crate::error::{IngestError, Result};
use crate::io::source::stem_name;
use crate::io::text::{LineCursor, Section};
use crate::progress::ProgressSink;
use crate::sniff::FileFormat;
use std::io::BufRead;
use std::path::Path;
use tracing::{debug, warn};

/// `UnitType=` value of an expression unit.
const EXPRESSION_UNIT: i64 = 3;
/// Value positions of the probe and target base when `CellHeader=` does not name them.
const DEFAULT_PBASE_POS: usize = 8;
const DEFAULT_TBASE_POS: usize = 9;

pub(crate) fn decode<R: BufRead>(
    reader: R,
    path: &Path,
    progress: &dyn ProgressSink,
) -> Result<ChipDescription> {
    let mut cursor = LineCursor::new(reader, path);
    cursor.seek_section("[CDF]", |n| n == "CDF")?;
    let chip_name = cursor.seek_section("[Chip]", |n| n == "Chip")?;
    let chip = cursor.read_section(&chip_name, None)?;

    let chip_type = match chip.get("Name").filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => {
            let stem = stem_name(path);
            warn!(path = %path.display(), chip_type = %stem, "CDF has no chip name, using file name");
            stem
        }
    };
    let geometry = geometry_from(path, chip.parsed("Rows")?, chip.parsed("Cols")?)?;
    let n_units: usize = chip.parsed("NumberOfUnits")?;
    let qc_units: usize = chip
        .get("NumQCUnits")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let mut index = IndexBuilder::new(path);
    for u in 0..n_units {
        let unit_name = cursor.seek_section("[Unit]", |n| n.starts_with("Unit") && !n.contains("_Block"))?;
        let unit = cursor.read_section(&unit_name, None)?;
        check_unit_type(path, &unit)?;
        let n_blocks: usize = unit.parsed("NumberBlocks")?;

        let mut set: Option<ProbeSetBuilder> = None;
        let block_prefix = format!("{unit_name}_Block");
        for _ in 0..n_blocks {
            let block_name = cursor.seek_section(&format!("[{block_prefix}]"), |n| n.starts_with(&block_prefix))?;
            let block = cursor.read_section(&block_name, Some("CellHeader"))?;
            let name = block.require("Name")?.to_string();
            let set = set.get_or_insert_with(|| ProbeSetBuilder::new(name));
            read_cells(&mut cursor, &block, set, geometry)?;
        }
        if let Some(set) = set {
            debug!(unit = %unit_name, probe_set = set.name(), "decoded unit");
            index.add(set)?;
        }
        progress.on_unit_processed(u, n_units);
    }

    let mut chip = index.finish(chip_type, geometry, FileFormat::Text);
    chip.qc_units = qc_units;
    Ok(chip)
}

fn check_unit_type(path: &Path, unit: &Section) -> Result<()> {
    let unit_type: i64 = unit.parsed("UnitType")?;
    if unit_type <= 0 {
        return Err(IngestError::malformed(
            path,
            None,
            format!("[{}] has invalid UnitType={unit_type}", unit.name()),
        ));
    }
    if unit_type != EXPRESSION_UNIT {
        return Err(IngestError::UnsupportedUnitType {
            path: path.to_path_buf(),
            unit: unit.name().to_string(),
            unit_type,
        });
    }
    Ok(())
}

fn read_cells<R: BufRead>(
    cursor: &mut LineCursor<R>,
    block: &Section,
    set: &mut ProbeSetBuilder,
    geometry: ChipGeometry,
) -> Result<()> {
    let n_cells: usize = block.parsed("NumCells")?;
    let header: Vec<&str> = block.require("CellHeader")?.split('\t').map(str::trim).collect();
    let pbase_pos = header.iter().position(|h| *h == "PBASE").unwrap_or(DEFAULT_PBASE_POS);
    let tbase_pos = header.iter().position(|h| *h == "TBASE").unwrap_or(DEFAULT_TBASE_POS);

    for k in 0..n_cells {
        let next = cursor
            .next_line()?
            .map(|line| parse_cell_line(line, pbase_pos, tbase_pos));
        let Some(parsed) = next else {
            return Err(IngestError::truncated(
                cursor.path(),
                format!("[{}] Cell{}", block.name(), k + 1),
            ));
        };
        let (x, y, pbase, tbase) = parsed
            .ok_or_else(|| cursor.error(format!("unparseable cell line in [{}]", block.name())))?;
        set.push_cell(geometry, x, y, pbase, tbase, cursor.path())?;
    }
    Ok(())
}

/// `CellK=x<TAB>y<TAB>…` into `(x, y, pbase, tbase)`.
fn parse_cell_line(line: &str, pbase_pos: usize, tbase_pos: usize) -> Option<(usize, usize, char, char)> {
    let (key, values) = line.split_once('=')?;
    if !key.trim().starts_with("Cell") {
        return None;
    }
    let tokens: Vec<&str> = values.split('\t').map(str::trim).collect();
    let x = tokens.first()?.parse().ok()?;
    let y = tokens.get(1)?.parse().ok()?;
    let pbase = tokens.get(pbase_pos)?.chars().next()?;
    let tbase = tokens.get(tbase_pos)?.chars().next()?;
    Some((x, y, pbase, tbase))
}
