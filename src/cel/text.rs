//! Plain-text (version 3) CEL decoder.
//!
//! `[HEADER]` declares `Cols=`, `Rows=` and a `DatHeader=` carrying the chip
//! type. `[INTENSITY]` holds an optional `NumberCells=`, a `CellHeader=` and
//! one whitespace-separated `x y mean …` line per cell.

use super::{CelHeader, CellSink, check_intensity, chip_type_from_dat_header};
use crate::cdf::geometry_from;
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::io::source::stem_name;
use crate::io::text::{LineCursor, section_name};
use crate::sniff::FileFormat;
use std::io::{BufRead, Seek, SeekFrom};
use std::path::Path;

pub(crate) fn read_header<R: BufRead>(reader: &mut R, path: &Path) -> Result<CelHeader> {
    let mut cursor = LineCursor::new(reader, path);
    cursor.seek_section("[CEL]", |n| n == "CEL")?;
    let name = cursor.seek_section("[HEADER]", |n| n == "HEADER")?;
    let header = cursor.read_section(&name, None)?;

    let cols: i64 = header.parsed("Cols")?;
    let rows: i64 = header.parsed("Rows")?;
    let geometry = geometry_from(path, rows, cols)?;
    let chip_type = header
        .get("DatHeader")
        .and_then(chip_type_from_dat_header)
        .ok_or_else(|| IngestError::ChipNameMissing {
            path: path.to_path_buf(),
        })?;
    Ok(CelHeader {
        path: path.to_path_buf(),
        array_name: stem_name(path),
        chip_type,
        geometry,
        format: FileFormat::Text,
    })
}

pub(crate) fn read_cells<R: BufRead + Seek>(
    reader: &mut R,
    header: &CelHeader,
    config: &IngestConfig,
    sink: &mut dyn CellSink,
) -> Result<()> {
    let path = header.path.as_path();
    reader
        .seek(SeekFrom::Start(0))
        .map_err(|e| IngestError::from_io(path, "[INTENSITY]", e))?;
    let mut cursor = LineCursor::new(reader, path);
    let name = cursor.seek_section("[INTENSITY]", |n| n == "INTENSITY")?;
    let section = cursor.read_section(&name, Some("CellHeader"))?;
    section.require("CellHeader")?;

    let geometry = header.geometry;
    let expected = geometry.n_cells();
    if let Some(declared) = section.get("NumberCells")
        && declared.parse::<usize>().ok() != Some(expected)
    {
        return Err(IngestError::malformed(
            path,
            Some(cursor.line_no()),
            format!("NumberCells={declared} but the header declares {geometry}"),
        ));
    }

    let mut seen = vec![false; expected];
    let mut read = 0;
    while read < expected {
        let next = cursor.next_line()?.map(parse_cell_line);
        let Some(parsed) = next else { break };
        let Some(cell) = parsed else {
            return Err(cursor.error("expected `x y mean` intensity line"));
        };
        let (x, y, mean) = match cell {
            CellLine::Blank => continue,
            CellLine::SectionEnd => break,
            CellLine::Cell(x, y, mean) => (x, y, mean),
        };
        let Some(idx) = geometry.checked_cell_index(x, y) else {
            return Err(cursor.error(format!("cell ({x}, {y}) lies outside the {geometry} chip")));
        };
        if std::mem::replace(&mut seen[idx], true) {
            return Err(cursor.error(format!("cell ({x}, {y}) appears twice")));
        }
        sink.set(idx, check_intensity(path, idx, mean, config.max_intensity)?);
        read += 1;
    }
    if read < expected {
        return Err(IngestError::IntensityTruncated {
            path: path.to_path_buf(),
            expected,
            actual: read,
        });
    }
    Ok(())
}

enum CellLine {
    Blank,
    /// The next `[SECTION]` header; the intensity block ended early.
    SectionEnd,
    Cell(usize, usize, f64),
}

fn parse_cell_line(line: &str) -> Option<CellLine> {
    if section_name(line).is_some() {
        return Some(CellLine::SectionEnd);
    }
    let mut tokens = line.split_whitespace();
    let Some(first) = tokens.next() else {
        return Some(CellLine::Blank);
    };
    let x = first.parse().ok()?;
    let y = tokens.next()?.parse().ok()?;
    let mean = tokens.next()?.parse().ok()?;
    Some(CellLine::Cell(x, y, mean))
}
