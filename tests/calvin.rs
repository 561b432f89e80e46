//! Tests for the Calvin container: named-value lookup through parent
//! headers and the layout variations the CDF and CEL decoders accept.

use affyingest::cdf::calvin::{ARRAY_TYPE, CDF_COLS, CDF_ROWS, CEL_COLS, CEL_ROWS, UNIT_TYPE};
use affyingest::cdf::load_chip_description;
use affyingest::cel::read_cel_intensities;
use affyingest::io::calvin::writer::{CalvinWriter, DataSetBuilder};
use affyingest::io::calvin::{CalvinFile, ColumnData, DataHeader, NameValueTriplet, ParamValue, find_nvt};
use affyingest::sniff::{CALVIN_CDF_TYPE, CALVIN_CEL_TYPE};
use affyingest::testing::*;
use affyingest::{IngestConfig, IngestError, NoProgress};
use anyhow::Result;
use std::io::Cursor;
use std::path::Path;

fn header(id: &str, params: Vec<NameValueTriplet>, parents: Vec<DataHeader>) -> DataHeader {
    DataHeader {
        data_type_id: id.to_string(),
        params,
        parents,
        ..DataHeader::default()
    }
}

#[test]
fn test_find_nvt_searches_parents_depth_first() {
    let grandparent = header(
        "affymetrix-calvin-scan-acquisition",
        vec![NameValueTriplet::text(ARRAY_TYPE, "Test3"), NameValueTriplet::int("depth", 2, 4)],
        Vec::new(),
    );
    let first_parent = header(
        "affymetrix-calvin-intensity",
        vec![NameValueTriplet::int("depth", 1, 4)],
        vec![grandparent],
    );
    let second_parent = header(
        "affymetrix-calvin-other",
        vec![NameValueTriplet::ascii("only-here", "x")],
        Vec::new(),
    );
    let root = header(
        CALVIN_CEL_TYPE,
        vec![NameValueTriplet::int("own", 0, 4)],
        vec![first_parent, second_parent],
    );

    assert_eq!(find_nvt(&root, "own").and_then(NameValueTriplet::as_i64), Some(0));
    // The first parent's own value wins over its parent's.
    assert_eq!(find_nvt(&root, "depth").and_then(NameValueTriplet::as_i64), Some(1));
    assert_eq!(
        find_nvt(&root, ARRAY_TYPE).and_then(NameValueTriplet::as_text).as_deref(),
        Some("Test3")
    );
    assert_eq!(
        root.find_nvt("only-here").and_then(NameValueTriplet::as_text).as_deref(),
        Some("x")
    );
    assert!(find_nvt(&root, "absent").is_none());
}

#[test]
fn test_parent_headers_survive_encoding() -> Result<()> {
    let parent = header(
        "affymetrix-calvin-scan-acquisition",
        vec![NameValueTriplet::float("scan-temperature", 24.5)],
        Vec::new(),
    );
    let bytes = CalvinWriter::new(CALVIN_CEL_TYPE)
        .file_id("0000-1111")
        .parent(parent)
        .to_bytes()?;
    let file = CalvinFile::read(Cursor::new(bytes), Path::new("mem.CEL"))?;

    assert_eq!(file.data_header.file_id, "0000-1111");
    assert_eq!(file.data_header.parents.len(), 1);
    let temp = file.find_nvt("scan-temperature").map(NameValueTriplet::typed);
    assert_eq!(temp, Some(ParamValue::F32(24.5)));
    assert!(file.groups.is_empty());
    Ok(())
}

#[test]
fn test_padded_string_cells_keep_later_columns_aligned() -> Result<()> {
    // Length prefixes that count trailing NULs: the cells fill their width
    // exactly and must not be padded again on read.
    let bytes = CalvinWriter::new(CALVIN_CEL_TYPE)
        .group(
            "Default Group",
            vec![
                DataSetBuilder::new("labels")
                    .column("Label", ColumnData::WStr(vec!["ab\0\0".into(), "cd\0\0".into()]))
                    .column("Code", ColumnData::AStr(vec!["x\0\0".into(), "yz\0".into()]))
                    .column("Value", ColumnData::F32(vec![1.5, 2.5])),
            ],
        )
        .to_bytes()?;
    let file = CalvinFile::read(Cursor::new(bytes), Path::new("padded.CEL"))?;

    let ds = &file.groups[0].datasets[0];
    assert_eq!(ds.columns[0].size, 12);
    assert_eq!(ds.column("Label"), Some(&ColumnData::WStr(vec!["ab".into(), "cd".into()])));
    assert_eq!(ds.column("Code"), Some(&ColumnData::AStr(vec!["x".into(), "yz".into()])));
    assert_eq!(ds.column("Value"), Some(&ColumnData::F32(vec![1.5, 2.5])));
    Ok(())
}

#[test]
fn test_cel_array_type_found_in_parent_header() -> Result<()> {
    let dir = FixtureDir::new()?;
    let values = [1.5, 2.5, 3.5, 4.5];
    let acquisition = header(
        "affymetrix-calvin-scan-acquisition",
        vec![NameValueTriplet::text(ARRAY_TYPE, "Test3")],
        Vec::new(),
    );
    let bytes = CalvinWriter::new(CALVIN_CEL_TYPE)
        .param(NameValueTriplet::int(CEL_ROWS, 2, 4))
        .param(NameValueTriplet::int(CEL_COLS, 2, 4))
        .parent(acquisition)
        .group(
            "Default Group",
            vec![
                DataSetBuilder::new("Pixel").column("Pixel", ColumnData::I16(vec![16; 4])),
                // Not named "Intensity": the first floating-point data set is used.
                DataSetBuilder::new("Signal").column("Signal", ColumnData::F32(vec![1.5, 2.5, 3.5, 4.5])),
            ],
        )
        .to_bytes()?;
    let path = dir.join("parent.CEL");
    write_fixture(&path, &bytes)?;

    let (header, decoded) = read_cel_intensities(&path, &IngestConfig::default())?;
    assert_eq!(header.chip_type, "Test3");
    assert_intensities_equal(&decoded, &values);
    Ok(())
}

/// A one-probe-set Calvin CDF whose single block uses the given base columns.
fn cdf_with_bases(pbase: ColumnData, tbase: ColumnData, unit_type: Option<i32>) -> CalvinWriter {
    let mut block = DataSetBuilder::new("block1")
        .column("X", ColumnData::I32(vec![0, 1]))
        .column("Y", ColumnData::I32(vec![3, 3]))
        .column("PBase", pbase)
        .column("TBase", tbase);
    if let Some(t) = unit_type {
        block = block.param(NameValueTriplet::int(UNIT_TYPE, t, 1));
    }
    CalvinWriter::new(CALVIN_CDF_TYPE)
        .param(NameValueTriplet::text(ARRAY_TYPE, "Test3"))
        .param(NameValueTriplet::int(CEL_ROWS, 4, 4))
        .param(NameValueTriplet::int(CEL_COLS, 4, 4))
        .group("probe_at", vec![block])
}

#[test]
fn test_cdf_bases_as_strings_and_cel_dimension_fallback() -> Result<()> {
    let dir = FixtureDir::new()?;
    let writer = cdf_with_bases(
        ColumnData::AStr(vec!["g".into(), "A".into()]),
        ColumnData::WStr(vec!["C".into(), "A".into()]),
        None,
    );
    let path = dir.join("strings.cdf");
    write_fixture(&path, &writer.to_bytes()?)?;

    let chip = load_chip_description(&path, &IngestConfig::default(), &NoProgress)?;
    assert_eq!(chip.geometry.rows, 4);
    let set = chip.probe_set("probe_at").expect("probe set indexed");
    assert_eq!(set.pm(), &[12]);
    assert_eq!(set.mm(), Some(&[13][..]));
    Ok(())
}

#[test]
fn test_cdf_unit_type_must_be_expression() -> Result<()> {
    let dir = FixtureDir::new()?;
    let bases = || ColumnData::U8(vec![b'T', b'A']);
    let path = dir.join("genotyping.cdf");
    write_fixture(&path, &cdf_with_bases(bases(), bases(), Some(2)).to_bytes()?)?;

    let err = load_chip_description(&path, &IngestConfig::default(), &NoProgress).unwrap_err();
    assert!(
        matches!(err, IngestError::UnsupportedUnitType { unit_type: 2, ref unit, .. } if unit == "probe_at"),
        "unexpected error: {err}"
    );

    write_fixture(&path, &cdf_with_bases(bases(), bases(), Some(1)).to_bytes()?)?;
    assert!(load_chip_description(&path, &IngestConfig::default(), &NoProgress).is_ok());
    Ok(())
}

#[test]
fn test_cdf_missing_column_is_malformed() -> Result<()> {
    let dir = FixtureDir::new()?;
    let bytes = CalvinWriter::new(CALVIN_CDF_TYPE)
        .param(NameValueTriplet::int(CDF_ROWS, 4, 4))
        .param(NameValueTriplet::int(CDF_COLS, 4, 4))
        .group(
            "probe_at",
            vec![DataSetBuilder::new("block1").column("X", ColumnData::U16(vec![0]))],
        )
        .to_bytes()?;
    let path = dir.join("Fallback.cdf");
    write_fixture(&path, &bytes)?;

    let err = load_chip_description(&path, &IngestConfig::default(), &NoProgress).unwrap_err();
    assert!(matches!(err, IngestError::Malformed { .. }), "unexpected error: {err}");
    Ok(())
}

#[test]
fn test_cdf_without_array_type_uses_file_stem() -> Result<()> {
    let dir = FixtureDir::new()?;
    let block = DataSetBuilder::new("block")
        .column("X", ColumnData::U16(vec![1]))
        .column("Y", ColumnData::U16(vec![1]))
        .column("PBase", ColumnData::U8(vec![b'C']))
        .column("TBase", ColumnData::U8(vec![b'G']));
    let bytes = CalvinWriter::new(CALVIN_CDF_TYPE)
        .param(NameValueTriplet::int(CDF_ROWS, 4, 4))
        .param(NameValueTriplet::int(CDF_COLS, 4, 4))
        .group("p_at", vec![block])
        .to_bytes()?;
    let path = dir.join("Mystery-Chip.cdf");
    write_fixture(&path, &bytes)?;

    let chip = load_chip_description(&path, &IngestConfig::default(), &NoProgress)?;
    assert_eq!(chip.chip_type, "Mystery-Chip");
    assert_eq!(chip.probe_set("p_at").map(|s| s.pm().to_vec()), Some(vec![5]));
    Ok(())
}

#[test]
fn test_wrong_container_version_rejected() -> Result<()> {
    let mut bytes = CalvinWriter::new(CALVIN_CEL_TYPE).to_bytes()?;
    bytes[1] = 2;
    let err = CalvinFile::read(Cursor::new(bytes), Path::new("bad.CEL")).unwrap_err();
    assert!(
        matches!(err, IngestError::VersionMismatch { actual: 2, .. }),
        "unexpected error: {err}"
    );
    Ok(())
}
