//! Encoders that write fixture files in every supported wire format.
//!
//! Output goes through [`auto_detect_writer`], so a path ending in `.gz` or
//! `.zst` produces a compressed file. The RME caches are written with the
//! library's own writers ([`write_rme_cdf`](crate::cdf::write_rme_cdf),
//! [`write_rme_cel`](crate::cel::write_rme_cel)).

use super::fixtures::ChipLayout;
use crate::cdf::calvin::{ARRAY_TYPE, CDF_COLS, CDF_ROWS, CEL_COLS, CEL_ROWS, EXPRESSION_UNIT, UNIT_TYPE};
use crate::cdf::xda::NAME_WIDTH;
use crate::chip::ChipGeometry;
use crate::io::binary::{write_fixed_str, write_prefixed_str_le};
use crate::io::calvin::ColumnData;
use crate::io::calvin::NameValueTriplet;
use crate::io::calvin::writer::{CalvinWriter, DataSetBuilder};
use crate::io::compression::auto_detect_writer;
use crate::sniff::{CALVIN_CDF_TYPE, CALVIN_CEL_TYPE, XDA_CDF_MAGIC, XDA_CDF_VERSION, XDA_CEL_MAGIC, XDA_CEL_VERSION};
use anyhow::{Context, Result, ensure};
use byteorder::{LittleEndian, WriteBytesExt};
use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const PM_BASES: (char, char) = ('T', 'A');
const MM_BASES: (char, char) = ('A', 'A');

/// Write `bytes` to `path`, compressing by extension.
///
/// # Errors
///
/// Propagates file-system and codec failures.
pub fn write_fixture(path: &Path, bytes: &[u8]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = auto_detect_writer(file, path)?;
    w.write_all(bytes)?;
    w.flush()?;
    Ok(())
}

fn cells_of(layout: &ChipLayout) -> impl Iterator<Item = (&str, Vec<(usize, usize, char, char)>)> {
    layout.probe_sets.iter().map(|set| {
        let pm = set.pm.iter().map(|&(x, y)| (x, y, PM_BASES.0, PM_BASES.1));
        let mm = set.mm.iter().map(|&(x, y)| (x, y, MM_BASES.0, MM_BASES.1));
        (set.name.as_str(), pm.chain(mm).collect())
    })
}

// ---------------------------------------------------------------------------
// Chip descriptions
// ---------------------------------------------------------------------------

/// Plain-text CDF body. Each probe set is one `UnitType=3` unit with a single
/// block; a QC section precedes the units.
#[must_use]
pub fn text_cdf_string(layout: &ChipLayout) -> String {
    let g = layout.geometry;
    let mut s = String::new();
    let _ = write!(
        s,
        "[CDF]\nVersion=GC3.0\n\n[Chip]\nName={}\nRows={}\nCols={}\nNumberOfUnits={}\nMaxUnit={}\nNumQCUnits=1\nChipReference=\n\n",
        layout.chip_type,
        g.rows,
        g.cols,
        layout.probe_sets.len(),
        layout.probe_sets.len() + 1000,
    );
    let _ = write!(
        s,
        "[QC1]\nType=1\nNumberCells=1\nCellHeader=X\tY\tPROBE\tPLEN\tINDEX\tMATCH\tBG\nCell1=0\t0\tN\t25\t0\t0\t0\n\n"
    );
    for (u, (name, cells)) in cells_of(layout).enumerate() {
        let unit = u + 1;
        let _ = write!(
            s,
            "[Unit{unit}]\nName=NONE\nDirection=1\nNumAtoms={n}\nNumCells={n}\nUnitNumber={unit}\nUnitType=3\nNumberBlocks=1\n\n",
            n = cells.len(),
        );
        let _ = write!(
            s,
            "[Unit{unit}_Block1]\nName={name}\nBlockNumber=1\nNumAtoms={n}\nNumCells={n}\nStartPosition=0\nStopPosition={stop}\n\
             CellHeader=X\tY\tPROBE\tFEAT\tQUAL\tEXPOS\tPOS\tCBASE\tPBASE\tTBASE\tATOM\tINDEX\tCODONIND\tCODON\tREGIONTYPE\tREGION\n",
            n = cells.len(),
            stop = cells.len().saturating_sub(1),
        );
        for (k, (x, y, pbase, tbase)) in cells.iter().enumerate() {
            let _ = writeln!(
                s,
                "Cell{}={x}\t{y}\tN\tcontrol\t{name}\t{k}\t13\tA\t{pbase}\t{tbase}\t{k}\t{}\t-1\t-1\t99\t",
                k + 1,
                g.cell_index(*x, *y),
            );
        }
        s.push('\n');
    }
    s
}

/// # Errors
///
/// Propagates write failures.
pub fn write_text_cdf(path: &Path, layout: &ChipLayout) -> Result<()> {
    write_fixture(path, text_cdf_string(layout).as_bytes())
}

fn xda_cdf_unit(name: &str, cells: &[(usize, usize, char, char)]) -> Result<Vec<u8>> {
    let n = i32::try_from(cells.len())?;
    let mut u = Vec::new();
    u.write_u16::<LittleEndian>(crate::cdf::xda::EXPRESSION_UNIT)?;
    u.write_u8(1)?;
    u.write_i32::<LittleEndian>(n)?;
    u.write_i32::<LittleEndian>(1)?;
    u.write_i32::<LittleEndian>(n)?;
    u.write_i32::<LittleEndian>(0)?;
    u.write_u8(1)?;

    u.write_i32::<LittleEndian>(n)?;
    u.write_i32::<LittleEndian>(n)?;
    u.write_u8(1)?;
    u.write_u8(1)?;
    u.write_i32::<LittleEndian>(0)?;
    u.write_i32::<LittleEndian>(0)?;
    write_fixed_str(&mut u, name, NAME_WIDTH)?;
    for (k, &(x, y, pbase, tbase)) in cells.iter().enumerate() {
        u.write_i32::<LittleEndian>(i32::try_from(k)?)?;
        u.write_u16::<LittleEndian>(u16::try_from(x)?)?;
        u.write_u16::<LittleEndian>(u16::try_from(y)?)?;
        u.write_i32::<LittleEndian>(i32::try_from(k)?)?;
        u.write_u8(u8::try_from(pbase)?)?;
        u.write_u8(u8::try_from(tbase)?)?;
    }
    Ok(u)
}

/// Binary XDA CDF with the given header version and one QC unit.
///
/// # Errors
///
/// Fails when a dimension or coordinate does not fit its field.
pub fn xda_cdf_bytes(layout: &ChipLayout, version: i32) -> Result<Vec<u8>> {
    let g = layout.geometry;
    let n_units = layout.probe_sets.len();
    let mut qc = Vec::new();
    qc.write_u16::<LittleEndian>(1)?;
    qc.write_i32::<LittleEndian>(1)?;
    qc.write_u16::<LittleEndian>(0)?;
    qc.write_u16::<LittleEndian>(0)?;
    qc.write_u8(25)?;
    qc.write_u8(1)?;
    qc.write_u8(0)?;
    let units = cells_of(layout)
        .map(|(name, cells)| xda_cdf_unit(name, &cells))
        .collect::<Result<Vec<_>>>()?;

    let header_len = 4 + 4 + 2 + 2 + 4 + 4 + 4;
    let names_len = n_units * NAME_WIDTH;
    let offsets_len = (1 + n_units) * 4;
    let mut next = header_len + names_len + offsets_len;

    let mut out = Vec::new();
    out.write_i32::<LittleEndian>(XDA_CDF_MAGIC)?;
    out.write_i32::<LittleEndian>(version)?;
    out.write_i16::<LittleEndian>(i16::try_from(g.cols)?)?;
    out.write_i16::<LittleEndian>(i16::try_from(g.rows)?)?;
    out.write_i32::<LittleEndian>(i32::try_from(n_units)?)?;
    out.write_i32::<LittleEndian>(1)?;
    out.write_i32::<LittleEndian>(0)?;
    for set in &layout.probe_sets {
        write_fixed_str(&mut out, &set.name, NAME_WIDTH)?;
    }
    out.write_i32::<LittleEndian>(i32::try_from(next)?)?;
    next += qc.len();
    for unit in &units {
        out.write_i32::<LittleEndian>(i32::try_from(next)?)?;
        next += unit.len();
    }
    ensure!(out.len() == header_len + names_len + offsets_len, "XDA CDF header size");
    out.extend_from_slice(&qc);
    for unit in units {
        out.extend_from_slice(&unit);
    }
    Ok(out)
}

/// # Errors
///
/// Propagates encoding and write failures.
pub fn write_xda_cdf(path: &Path, layout: &ChipLayout) -> Result<()> {
    write_fixture(path, &xda_cdf_bytes(layout, XDA_CDF_VERSION)?)
}

/// Calvin CDF writer with one group per probe set and one block data set.
///
/// # Errors
///
/// Fails when a dimension or coordinate does not fit its field.
pub fn calvin_cdf_writer(layout: &ChipLayout) -> Result<CalvinWriter> {
    let g = layout.geometry;
    let mut writer = CalvinWriter::new(CALVIN_CDF_TYPE)
        .file_id("fixture-cdf")
        .param(NameValueTriplet::text(ARRAY_TYPE, &layout.chip_type))
        .param(NameValueTriplet::int(CDF_ROWS, i32::try_from(g.rows)?, 4))
        .param(NameValueTriplet::int(CDF_COLS, i32::try_from(g.cols)?, 4));
    for (name, cells) in cells_of(layout) {
        let xs = cells.iter().map(|c| u16::try_from(c.0)).collect::<Result<Vec<_>, _>>()?;
        let ys = cells.iter().map(|c| u16::try_from(c.1)).collect::<Result<Vec<_>, _>>()?;
        let pbases = cells.iter().map(|c| u8::try_from(c.2)).collect::<Result<Vec<_>, _>>()?;
        let tbases = cells.iter().map(|c| u8::try_from(c.3)).collect::<Result<Vec<_>, _>>()?;
        let block = DataSetBuilder::new(name)
            .param(NameValueTriplet::int(UNIT_TYPE, i32::try_from(EXPRESSION_UNIT)?, 1))
            .column("X", ColumnData::U16(xs))
            .column("Y", ColumnData::U16(ys))
            .column("PBase", ColumnData::U8(pbases))
            .column("TBase", ColumnData::U8(tbases));
        writer = writer.group(name, vec![block]);
    }
    Ok(writer)
}

/// # Errors
///
/// Propagates encoding and write failures.
pub fn write_calvin_cdf(path: &Path, layout: &ChipLayout) -> Result<()> {
    write_fixture(path, &calvin_cdf_writer(layout)?.to_bytes()?)
}

// ---------------------------------------------------------------------------
// Intensity files
// ---------------------------------------------------------------------------

/// `DatHeader=` value naming `chip_type` the way scanner software does.
#[must_use]
pub fn dat_header(chip_type: &str, geometry: ChipGeometry) -> String {
    format!(
        "[0..46101]  fixture:CLS={cols} RWS={rows} XIN=3  YIN=3  VE=17        2.0 05/09/03 11:33:31    \u{14}  \u{14} {chip_type}.1sq \u{14}  \u{14}  \u{14} 6",
        cols = geometry.cols,
        rows = geometry.rows,
    )
}

fn text_cel_header(chip_type: &str, geometry: ChipGeometry) -> String {
    format!(
        "Cols={cols}\nRows={rows}\nTotalX={cols}\nTotalY={rows}\nOffsetX=0\nOffsetY=0\n\
         GridCornerUL=217 214\nGridCornerUR=4522 211\nGridCornerLR=4525 4517\nGridCornerLL=220 4520\n\
         Axis-invertX=0\nAxisInvertY=0\nswapXY=0\nDatHeader={dat}\nAlgorithm=Percentile\n\
         AlgorithmParameters=Percentile:75;CellMargin:2;OutlierHigh:1.500;OutlierLow:1.004\n",
        cols = geometry.cols,
        rows = geometry.rows,
        dat = dat_header(chip_type, geometry),
    )
}

/// Text CEL body. With `values` of `None` the `[INTENSITY]` section is
/// omitted, which leaves a file whose header validates but whose cells
/// cannot be read.
#[must_use]
pub fn text_cel_string(chip_type: &str, geometry: ChipGeometry, values: Option<&[f64]>) -> String {
    let mut s = format!("[CEL]\nVersion=3\n\n[HEADER]\n{}\n", text_cel_header(chip_type, geometry));
    let Some(values) = values else {
        return s;
    };
    let _ = write!(
        s,
        "[INTENSITY]\nNumberCells={}\nCellHeader=X\tY\tMEAN\tSTDV\tNPIXELS\n",
        geometry.n_cells()
    );
    for y in 0..geometry.rows {
        for x in 0..geometry.cols {
            let v = values.get(geometry.cell_index(x, y)).copied().unwrap_or(0.0);
            let _ = writeln!(s, "{x:>3}\t{y:>3}\t{v:.1}\t{sd:.1}\t 16", sd = v / 10.0);
        }
    }
    s.push_str("\n[MASKS]\nNumberCells=0\nCellHeader=X\tY\n\n[OUTLIERS]\nNumberCells=0\nCellHeader=X\tY\n");
    s
}

/// # Errors
///
/// Propagates write failures.
pub fn write_text_cel(path: &Path, chip_type: &str, geometry: ChipGeometry, values: &[f64]) -> Result<()> {
    write_fixture(path, text_cel_string(chip_type, geometry, Some(values)).as_bytes())
}

/// Binary XDA CEL. `values` are written in record order, which is linear
/// cell order; `n_cells` may be overridden to produce an inconsistent header.
///
/// # Errors
///
/// Fails when a dimension does not fit its field.
pub fn xda_cel_bytes(
    chip_type: &str,
    geometry: ChipGeometry,
    values: &[f64],
    n_cells: Option<usize>,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.write_i32::<LittleEndian>(XDA_CEL_MAGIC)?;
    out.write_i32::<LittleEndian>(XDA_CEL_VERSION)?;
    out.write_i32::<LittleEndian>(i32::try_from(geometry.rows)?)?;
    out.write_i32::<LittleEndian>(i32::try_from(geometry.cols)?)?;
    out.write_i32::<LittleEndian>(i32::try_from(n_cells.unwrap_or(geometry.n_cells()))?)?;
    write_prefixed_str_le(&mut out, &text_cel_header(chip_type, geometry))?;
    write_prefixed_str_le(&mut out, "Percentile")?;
    write_prefixed_str_le(&mut out, "Percentile:75;CellMargin:2")?;
    out.write_i32::<LittleEndian>(2)?;
    out.write_u32::<LittleEndian>(0)?;
    out.write_u32::<LittleEndian>(0)?;
    out.write_i32::<LittleEndian>(0)?;
    for &v in values {
        out.write_f32::<LittleEndian>(v as f32)?;
        out.write_f32::<LittleEndian>((v / 10.0) as f32)?;
        out.write_i16::<LittleEndian>(16)?;
    }
    Ok(out)
}

/// # Errors
///
/// Propagates encoding and write failures.
pub fn write_xda_cel(path: &Path, chip_type: &str, geometry: ChipGeometry, values: &[f64]) -> Result<()> {
    write_fixture(path, &xda_cel_bytes(chip_type, geometry, values, None)?)
}

/// Calvin CEL writer with `Intensity`, `StdDev` and `Pixel` data sets.
///
/// # Errors
///
/// Fails when a dimension does not fit its field.
pub fn calvin_cel_writer(chip_type: &str, geometry: ChipGeometry, values: &[f64]) -> Result<CalvinWriter> {
    let intensity: Vec<f32> = values.iter().map(|&v| v as f32).collect();
    let stddev: Vec<f32> = values.iter().map(|&v| (v / 10.0) as f32).collect();
    let pixels = vec![16i16; values.len()];
    Ok(CalvinWriter::new(CALVIN_CEL_TYPE)
        .file_id("fixture-cel")
        .param(NameValueTriplet::text(ARRAY_TYPE, chip_type))
        .param(NameValueTriplet::int(CEL_ROWS, i32::try_from(geometry.rows)?, 4))
        .param(NameValueTriplet::int(CEL_COLS, i32::try_from(geometry.cols)?, 4))
        .group(
            "Default Group",
            vec![
                DataSetBuilder::new("Intensity").column("Intensity", ColumnData::F32(intensity)),
                DataSetBuilder::new("StdDev").column("StdDev", ColumnData::F32(stddev)),
                DataSetBuilder::new("Pixel").column("Pixel", ColumnData::I16(pixels)),
            ],
        ))
}

/// # Errors
///
/// Propagates encoding and write failures.
pub fn write_calvin_cel(path: &Path, chip_type: &str, geometry: ChipGeometry, values: &[f64]) -> Result<()> {
    write_fixture(path, &calvin_cel_writer(chip_type, geometry, values)?.to_bytes()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_layout;

    #[test]
    fn test_xda_offsets_point_at_records() -> Result<()> {
        let layout = sample_layout();
        let bytes = xda_cdf_bytes(&layout, XDA_CDF_VERSION)?;
        let offsets_at = 28 + layout.probe_sets.len() * NAME_WIDTH;
        let first_unit = i32::from_le_bytes(bytes[offsets_at + 4..offsets_at + 8].try_into()?);
        let unit_type = u16::from_le_bytes(bytes[first_unit as usize..first_unit as usize + 2].try_into()?);
        assert_eq!(unit_type, crate::cdf::xda::EXPRESSION_UNIT);
        Ok(())
    }

    #[test]
    fn test_header_only_text_cel_has_no_intensity_section() {
        let g = ChipGeometry::new(2, 2).unwrap();
        let s = text_cel_string("Test3", g, None);
        assert!(s.contains("DatHeader="));
        assert!(!s.contains("[INTENSITY]"));
    }
}
