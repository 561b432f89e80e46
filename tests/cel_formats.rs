//! Tests for intensity-file decoding across all four wire formats.

use affyingest::cel::{decode_cel, read_cel_header, read_cel_intensities, write_rme_cel};
use affyingest::testing::*;
use affyingest::{ChipGeometry, FileFormat, IngestConfig, IngestError};
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

fn config() -> IngestConfig {
    IngestConfig::default()
}

/// Write the same intensities in every format; returns the paths in
/// text, XDA, Calvin, RME order.
fn write_all_formats(dir: &FixtureDir, geometry: ChipGeometry, values: &[f64]) -> Result<Vec<PathBuf>> {
    let text = dir.join("a_text.CEL");
    let xda = dir.join("a_xda.CEL");
    let calvin = dir.join("a_calvin.CEL");
    let rme = dir.join("a_rme.cel");
    write_text_cel(&text, "Test3", geometry, values)?;
    write_xda_cel(&xda, "Test3", geometry, values)?;
    write_calvin_cel(&calvin, "Test3", geometry, values)?;
    let mut bytes = Vec::new();
    write_rme_cel(&mut bytes, "a_rme", "Test3", geometry, values)?;
    fs::write(&rme, bytes)?;
    Ok(vec![text, xda, calvin, rme])
}

#[test]
fn test_text_cell_lands_at_linear_index() -> Result<()> {
    let dir = FixtureDir::new()?;
    let geometry = ChipGeometry::new(100, 100).unwrap();
    let mut values = vec![10.5; geometry.n_cells()];
    values[1005] = 1234.5;
    let path = dir.join("scan.CEL");
    write_text_cel(&path, "Test3", geometry, &values)?;

    let body = fs::read_to_string(&path)?;
    assert!(body.contains("  5\t 10\t1234.5\t"));

    let (header, decoded) = read_cel_intensities(&path, &config())?;
    assert_eq!(header.format, FileFormat::Text);
    assert_eq!(decoded[1005], 1234.5);
    assert_eq!(decoded[geometry.cell_index(10, 5)], 10.5);
    Ok(())
}

#[test]
fn test_all_formats_decode_the_same_values() -> Result<()> {
    let dir = FixtureDir::new()?;
    let layout = sample_layout();
    let values = layout.intensities(3);
    let paths = write_all_formats(&dir, layout.geometry, &values)?;

    let formats = [
        FileFormat::Text,
        FileFormat::BinaryXda,
        FileFormat::Calvin,
        FileFormat::RmeCache,
    ];
    for (path, format) in paths.iter().zip(formats) {
        let (header, decoded) = read_cel_intensities(path, &config())?;
        assert_eq!(header.format, format, "{}", path.display());
        assert_eq!(header.chip_type, "Test3");
        assert_eq!(header.geometry, layout.geometry);
        assert_intensities_equal(&decoded, &values);
    }
    Ok(())
}

#[test]
fn test_header_read_names_array_after_file() -> Result<()> {
    let dir = FixtureDir::new()?;
    let layout = sample_layout();
    let values = layout.intensities(0);
    for path in write_all_formats(&dir, layout.geometry, &values)? {
        let header = read_cel_header(&path, &config())?;
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        assert_eq!(header.array_name, stem);
        assert_eq!(header.path, path);
    }
    Ok(())
}

#[test]
fn test_corrupt_intensity_rejected() -> Result<()> {
    let dir = FixtureDir::new()?;
    let geometry = ChipGeometry::new(4, 4).unwrap();
    let mut values = vec![100.5; geometry.n_cells()];
    values[6] = -3.0;

    let xda = dir.join("neg.CEL");
    write_xda_cel(&xda, "Test3", geometry, &values)?;
    let err = read_cel_intensities(&xda, &config()).unwrap_err();
    assert!(
        matches!(err, IngestError::CorruptIntensity { cell: 6, .. }),
        "unexpected error: {err}"
    );

    values[6] = 70000.0;
    let text = dir.join("high.CEL");
    write_text_cel(&text, "Test3", geometry, &values)?;
    let err = read_cel_intensities(&text, &config()).unwrap_err();
    assert!(matches!(err, IngestError::CorruptIntensity { cell: 6, .. }));
    Ok(())
}

#[test]
fn test_max_intensity_is_configurable() -> Result<()> {
    let dir = FixtureDir::new()?;
    let geometry = ChipGeometry::new(2, 2).unwrap();
    let path = dir.join("a.CEL");
    write_xda_cel(&path, "Test3", geometry, &[1.0, 2.0, 300.0, 4.0])?;

    assert!(read_cel_intensities(&path, &config()).is_ok());
    let strict = IngestConfig::from_json_str(r#"{ "max_intensity": 255.0 }"#)?;
    let err = read_cel_intensities(&path, &strict).unwrap_err();
    assert!(matches!(err, IngestError::CorruptIntensity { cell: 2, .. }));
    Ok(())
}

#[test]
fn test_cached_formats_skip_range_check() -> Result<()> {
    let dir = FixtureDir::new()?;
    let geometry = ChipGeometry::new(2, 2).unwrap();
    let values = [1.0, 2.0, 70000.0, 4.0];

    let calvin = dir.join("a.CEL");
    write_calvin_cel(&calvin, "Test3", geometry, &values)?;
    assert_eq!(read_cel_intensities(&calvin, &config())?.1[2], 70000.0);

    let rme = dir.join("a.rme");
    let mut bytes = Vec::new();
    write_rme_cel(&mut bytes, "a", "Test3", geometry, &values)?;
    fs::write(&rme, bytes)?;
    assert_eq!(read_cel_intensities(&rme, &config())?.1[2], 70000.0);
    Ok(())
}

#[test]
fn test_truncated_text_intensities() -> Result<()> {
    let dir = FixtureDir::new()?;
    let geometry = ChipGeometry::new(4, 4).unwrap();
    let values = vec![1.5; geometry.n_cells()];
    let body = text_cel_string("Test3", geometry, Some(&values));
    let cut = body.find("  2\t  3\t").expect("cell (2, 3) present");
    let path = dir.join("short.CEL");
    fs::write(&path, &body[..cut])?;

    let err = read_cel_intensities(&path, &config()).unwrap_err();
    assert!(
        matches!(err, IngestError::IntensityTruncated { expected: 16, actual: 14, .. }),
        "unexpected error: {err}"
    );

    // Cells cut from the middle with later sections still present.
    let tail = body.find("\n[MASKS]").expect("masks section present");
    let spliced = format!("{}{}", &body[..cut], &body[tail..]);
    fs::write(&path, spliced)?;
    let err = read_cel_intensities(&path, &config()).unwrap_err();
    assert!(matches!(err, IngestError::IntensityTruncated { actual: 14, .. }));
    Ok(())
}

#[test]
fn test_repeated_text_cell_rejected() -> Result<()> {
    let dir = FixtureDir::new()?;
    let geometry = ChipGeometry::new(2, 2).unwrap();
    let body = text_cel_string("Test3", geometry, Some(&[1.0, 2.0, 3.0, 4.0]));
    // Cell (1, 1) is replaced by a second copy of (0, 1): the count still matches.
    let body = body.replace("  1\t  1\t", "  0\t  1\t");
    let path = dir.join("repeat.CEL");
    fs::write(&path, body)?;

    let err = read_cel_intensities(&path, &config()).unwrap_err();
    assert!(
        matches!(err, IngestError::Malformed { line: Some(_), .. }),
        "unexpected error: {err}"
    );
    Ok(())
}

#[test]
fn test_truncated_binary_intensities() -> Result<()> {
    let dir = FixtureDir::new()?;
    let geometry = ChipGeometry::new(4, 4).unwrap();
    let values = vec![1.5; geometry.n_cells()];
    let bytes = xda_cel_bytes("Test3", geometry, &values, None)?;
    let path = dir.join("short.CEL");
    fs::write(&path, &bytes[..bytes.len() - 25])?;

    let err = read_cel_intensities(&path, &config()).unwrap_err();
    assert!(
        matches!(err, IngestError::IntensityTruncated { expected: 16, actual: 13, .. }),
        "unexpected error: {err}"
    );
    Ok(())
}

#[test]
fn test_xda_cell_count_must_match_geometry() -> Result<()> {
    let dir = FixtureDir::new()?;
    let geometry = ChipGeometry::new(4, 4).unwrap();
    let values = vec![1.5; 15];
    let path = dir.join("odd.CEL");
    fs::write(&path, xda_cel_bytes("Test3", geometry, &values, Some(15))?)?;

    let err = read_cel_header(&path, &config()).unwrap_err();
    assert!(
        matches!(err, IngestError::CellCountMismatch { n_cells: 15, .. }),
        "unexpected error: {err}"
    );
    Ok(())
}

#[test]
fn test_number_cells_must_match_geometry() -> Result<()> {
    let dir = FixtureDir::new()?;
    let geometry = ChipGeometry::new(2, 2).unwrap();
    let body = text_cel_string("Test3", geometry, Some(&[1.0; 4])).replace("NumberCells=4", "NumberCells=5");
    let path = dir.join("a.CEL");
    fs::write(&path, body)?;
    assert!(matches!(
        read_cel_intensities(&path, &config()).unwrap_err(),
        IngestError::Malformed { .. }
    ));
    Ok(())
}

#[test]
fn test_oversized_geometry_is_an_error() -> Result<()> {
    let dir = FixtureDir::new()?;
    let mut bytes = Vec::new();
    for field in ["RMECEL", "huge", "Test3"] {
        if field == "huge" {
            bytes.extend_from_slice(&1i32.to_le_bytes());
        }
        bytes.extend_from_slice(&(field.len() as i32).to_le_bytes());
        bytes.extend_from_slice(field.as_bytes());
    }
    bytes.extend_from_slice(&i32::MAX.to_le_bytes());
    bytes.extend_from_slice(&i32::MAX.to_le_bytes());
    let rme = dir.join("huge.cel");
    fs::write(&rme, bytes)?;

    let err = read_cel_intensities(&rme, &config()).unwrap_err();
    assert!(matches!(err, IngestError::Malformed { .. }), "unexpected error: {err}");

    let text = dir.join("huge.CEL");
    let body = text_cel_string("Test3", ChipGeometry::new(2, 2).unwrap(), Some(&[1.0; 4]))
        .replace("Rows=2", "Rows=100000")
        .replace("Cols=2", "Cols=100000");
    fs::write(&text, body)?;
    let err = read_cel_header(&text, &config()).unwrap_err();
    assert!(matches!(err, IngestError::Malformed { .. }), "unexpected error: {err}");
    Ok(())
}

#[test]
fn test_missing_chip_name() -> Result<()> {
    let dir = FixtureDir::new()?;
    let geometry = ChipGeometry::new(2, 2).unwrap();
    let body = text_cel_string("Test3", geometry, Some(&[1.0; 4])).replace("Test3.1sq", "Test3");
    let path = dir.join("a.CEL");
    fs::write(&path, body)?;
    assert!(matches!(
        read_cel_header(&path, &config()).unwrap_err(),
        IngestError::ChipNameMissing { .. }
    ));
    Ok(())
}

#[test]
fn test_expected_geometry_checked_before_cells() -> Result<()> {
    let dir = FixtureDir::new()?;
    let geometry = ChipGeometry::new(3, 3).unwrap();
    let path = dir.join("header_only.CEL");
    fs::write(&path, text_cel_string("Test3", geometry, None))?;

    let expected = ChipGeometry::new(4, 4).unwrap();
    let mut sink = vec![0.0; expected.n_cells()];
    let err = decode_cel(&path, &config(), Some(expected), &mut sink).unwrap_err();
    assert!(matches!(err, IngestError::DimensionMismatch { .. }), "unexpected error: {err}");
    Ok(())
}

#[test]
fn test_compressed_inputs() -> Result<()> {
    let dir = FixtureDir::new()?;
    let layout = sample_layout();
    let values = layout.intensities(7);

    let gz = dir.join("a.CEL.gz");
    write_text_cel(&gz, "Test3", layout.geometry, &values)?;
    let zst = dir.join("b.CEL.zst");
    write_xda_cel(&zst, "Test3", layout.geometry, &values)?;

    for path in [&gz, &zst] {
        let (header, decoded) = read_cel_intensities(path, &config())?;
        assert_intensities_equal(&decoded, &values);
        assert_eq!(header.chip_type, "Test3");
    }
    assert_eq!(read_cel_header(&gz, &config())?.array_name, "a");

    let plain = IngestConfig::from_json_str(r#"{ "decompress": false }"#)?;
    let err = read_cel_header(Path::new(&gz), &plain).unwrap_err();
    assert!(matches!(err, IngestError::UnrecognizedFormat { .. }));
    Ok(())
}

#[test]
fn test_cdf_is_not_an_intensity_file() -> Result<()> {
    let dir = FixtureDir::new()?;
    let path = dir.join("Test3.cdf");
    write_text_cdf(&path, &sample_layout())?;
    assert!(matches!(
        read_cel_header(&path, &config()).unwrap_err(),
        IngestError::UnrecognizedFormat { .. }
    ));
    Ok(())
}
