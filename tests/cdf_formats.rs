//! Tests for chip-description decoding across all four wire formats.
//!
//! Each test encodes a layout with the fixture encoders, decodes it through
//! `load_chip_description` and compares the resulting index.

use affyingest::cdf::{CellKind, classify_cell, load_chip_description, write_rme_cdf, write_rme_cdf_version};
use affyingest::progress::NoProgress;
use affyingest::testing::*;
use affyingest::{ChipDescription, FileFormat, IngestConfig, IngestError};
use anyhow::Result;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

fn load(path: &Path) -> affyingest::Result<ChipDescription> {
    load_chip_description(path, &IngestConfig::default(), &NoProgress)
}

fn write_rme(path: &Path, chip: &ChipDescription, version: i32) -> Result<()> {
    let mut bytes = Vec::new();
    write_rme_cdf_version(&mut bytes, chip, version)?;
    fs::write(path, bytes)?;
    Ok(())
}

#[test]
fn test_round_trip_text_xda_calvin() -> Result<()> {
    let dir = FixtureDir::new()?;
    let layout = sample_layout();

    let text = dir.join("Test3.cdf");
    let xda = dir.join("Test3.xda.cdf");
    let calvin = dir.join("Test3.calvin.cdf");
    write_text_cdf(&text, &layout)?;
    write_xda_cdf(&xda, &layout)?;
    write_calvin_cdf(&calvin, &layout)?;

    let from_text = load(&text)?;
    let from_xda = load(&xda)?;
    let from_calvin = load(&calvin)?;

    assert_eq!(from_text.format, FileFormat::Text);
    assert_eq!(from_xda.format, FileFormat::BinaryXda);
    assert_eq!(from_calvin.format, FileFormat::Calvin);

    for chip in [&from_text, &from_xda, &from_calvin] {
        assert_chip_matches_layout(chip, &layout);
    }
    assert_indices_equal(&from_xda.index, &from_text.index);
    assert_indices_equal(&from_calvin.index, &from_text.index);

    assert_eq!(from_text.chip_type, "Test3");
    assert_eq!(from_calvin.chip_type, "Test3");
    // XDA carries no chip name.
    assert_eq!(from_xda.chip_type, "Test3.xda");
    assert_eq!(from_text.qc_units, 1);
    assert_eq!(from_xda.qc_units, 1);
    Ok(())
}

#[test]
fn test_affx_scenario_pm_without_mm() -> Result<()> {
    let dir = FixtureDir::new()?;
    let layout = ChipLayout::new("Test3", 100, 100).probe_set("AFFX-1", &[(5, 0), (5, 10)], &[]);
    let path = dir.join("Test3.cdf");
    write_text_cdf(&path, &layout)?;

    let chip = load(&path)?;
    let set = chip.probe_set("AFFX-1").expect("AFFX-1 indexed");
    assert_eq!(set.pm(), &[5, 1005]);
    assert_eq!(set.mm(), None);
    assert_eq!(set.pm_count(), 2);
    assert_eq!(set.mm_count(), 0);
    Ok(())
}

#[test]
fn test_base_complement_table() {
    let bases = ['A', 'C', 'G', 'T'];
    let complements = [('A', 'T'), ('T', 'A'), ('C', 'G'), ('G', 'C')];
    for p in bases {
        for t in bases {
            let expected = if complements.contains(&(p, t)) {
                CellKind::PerfectMatch
            } else {
                CellKind::Mismatch
            };
            assert_eq!(classify_cell(p, t), expected, "pbase {p} tbase {t}");
            assert_eq!(
                classify_cell(p.to_ascii_lowercase(), t),
                expected,
                "pbase {p} (lower) tbase {t}"
            );
        }
    }
}

#[test]
fn test_xda_version_two_rejected() -> Result<()> {
    let dir = FixtureDir::new()?;
    let path = dir.join("Test3.cdf");
    fs::write(&path, xda_cdf_bytes(&sample_layout(), 2)?)?;

    let err = load(&path).unwrap_err();
    assert!(
        matches!(err, IngestError::VersionMismatch { actual: 2, .. }),
        "unexpected error: {err}"
    );

    // Header only: magic, version and nothing else.
    fs::write(&path, [67i32.to_le_bytes(), 2i32.to_le_bytes()].concat())?;
    let err = load(&path).unwrap_err();
    assert!(matches!(err, IngestError::VersionMismatch { .. }));
    Ok(())
}

#[test]
fn test_rme_v3_with_alias_matches_text() -> Result<()> {
    let dir = FixtureDir::new()?;
    let layout = sample_layout();
    let text = dir.join("Test3.cdf");
    write_text_cdf(&text, &layout)?;
    let mut chip = load(&text)?;
    chip.aliases.push("Test3-alt".to_string());

    let rme = dir.join("Test3.rme");
    write_rme(&rme, &chip, 3)?;
    let cached = load(&rme)?;

    assert_eq!(cached.format, FileFormat::RmeCache);
    assert_eq!(cached.chip_type, "Test3");
    assert_eq!(cached.aliases, vec!["Test3-alt".to_string()]);
    assert!(cached.descriptions.is_empty());
    assert!(cached.matches_chip_type("test3-ALT"));
    assert_eq!(cached.geometry, chip.geometry);
    assert_indices_equal(&cached.index, &chip.index);
    Ok(())
}

#[test]
fn test_rme_v3_descriptions_written_once_each() -> Result<()> {
    let dir = FixtureDir::new()?;
    let text = dir.join("Test3.cdf");
    write_text_cdf(&text, &sample_layout())?;
    let mut chip = load(&text)?;
    chip.descriptions = vec!["first".into(), "second".into(), "third".into()];

    let mut bytes = Vec::new();
    write_rme_cdf(&mut bytes, &chip)?;
    let occurrences = |needle: &str| bytes.windows(needle.len()).filter(|w| *w == needle.as_bytes()).count();
    assert_eq!(occurrences("first"), 1);
    assert_eq!(occurrences("second"), 1);
    assert_eq!(occurrences("third"), 1);

    let rme = dir.join("Test3.rme");
    fs::write(&rme, &bytes)?;
    let cached = load(&rme)?;
    assert_eq!(cached.descriptions, chip.descriptions);
    Ok(())
}

#[test]
fn test_rme_older_versions_round_trip() -> Result<()> {
    let dir = FixtureDir::new()?;
    let layout = sample_layout();
    let text = dir.join("Test3.cdf");
    write_text_cdf(&text, &layout)?;
    let chip = load(&text)?;

    for version in [1, 2] {
        let rme = dir.join(&format!("Test3.v{version}.rme"));
        write_rme(&rme, &chip, version)?;
        let cached = load(&rme)?;
        assert_eq!(cached.chip_type, "Test3");
        assert_chip_matches_layout(&cached, &layout);
    }
    Ok(())
}

#[test]
fn test_unsupported_unit_type() -> Result<()> {
    let dir = FixtureDir::new()?;
    let path = dir.join("Test3.cdf");
    let body = text_cdf_string(&sample_layout()).replacen("UnitType=3", "UnitType=2", 1);
    fs::write(&path, body)?;

    let err = load(&path).unwrap_err();
    assert!(
        matches!(err, IngestError::UnsupportedUnitType { unit_type: 2, .. }),
        "unexpected error: {err}"
    );

    let body = text_cdf_string(&sample_layout()).replacen("UnitType=3", "UnitType=0", 1);
    fs::write(&path, body)?;
    assert!(matches!(load(&path).unwrap_err(), IngestError::Malformed { .. }));
    Ok(())
}

#[test]
fn test_empty_chip_name_falls_back_to_file_stem() -> Result<()> {
    let dir = FixtureDir::new()?;
    let path = dir.join("HG-Fixture.cdf");
    let body = text_cdf_string(&sample_layout()).replacen("Name=Test3", "Name=", 1);
    fs::write(&path, body)?;
    assert_eq!(load(&path)?.chip_type, "HG-Fixture");
    Ok(())
}

#[test]
fn test_cell_outside_chip_rejected() -> Result<()> {
    let dir = FixtureDir::new()?;
    let layout = ChipLayout::new("Test3", 4, 4).probe_set("edge_at", &[(4, 0)], &[]);
    let path = dir.join("Test3.cdf");
    write_text_cdf(&path, &layout)?;
    assert!(matches!(load(&path).unwrap_err(), IngestError::Malformed { .. }));
    Ok(())
}

#[test]
fn test_truncated_block_reports_header_truncation() -> Result<()> {
    let dir = FixtureDir::new()?;
    let path = dir.join("Test3.cdf");
    let body = text_cdf_string(&sample_layout());
    let cut = body.rfind("Cell1=").expect("cells present");
    fs::write(&path, &body[..cut])?;
    assert!(matches!(load(&path).unwrap_err(), IngestError::HeaderTruncated { .. }));
    Ok(())
}

#[test]
fn test_duplicate_probe_set_rejected() -> Result<()> {
    let dir = FixtureDir::new()?;
    let layout = ChipLayout::new("Test3", 10, 10)
        .probe_set("dup_at", &[(0, 0)], &[])
        .probe_set("dup_at", &[(1, 0)], &[]);
    let path = dir.join("Test3.cdf");
    write_xda_cdf(&path, &layout)?;
    let err = load(&path).unwrap_err();
    assert!(matches!(err, IngestError::DuplicateProbeSet { ref name, .. } if name == "dup_at"));
    Ok(())
}

#[test]
fn test_compressed_cdf_decodes_like_plain() -> Result<()> {
    let dir = FixtureDir::new()?;
    let layout = sample_layout();
    let path = dir.join("Test3.cdf.gz");
    write_text_cdf(&path, &layout)?;
    let chip = load(&path)?;
    assert_eq!(chip.chip_type, "Test3");
    assert_chip_matches_layout(&chip, &layout);
    Ok(())
}

#[test]
fn test_progress_called_once_per_unit() -> Result<()> {
    let dir = FixtureDir::new()?;
    let layout = sample_layout();
    let path = dir.join("Test3.cdf");
    write_calvin_cdf(&path, &layout)?;

    let seen = Mutex::new(Vec::new());
    let sink = |index: usize, total: usize| seen.lock().unwrap().push((index, total));
    load_chip_description(&path, &IngestConfig::default(), &sink)?;

    let n = layout.probe_sets.len();
    let expected: Vec<(usize, usize)> = (0..n).map(|i| (i, n)).collect();
    assert_eq!(*seen.lock().unwrap(), expected);
    Ok(())
}

#[test]
fn test_unrecognized_cdf() -> Result<()> {
    let dir = FixtureDir::new()?;
    let path = dir.join("junk.cdf");
    fs::write(&path, b"not a chip description")?;
    let err = load(&path).unwrap_err();
    assert!(matches!(err, IngestError::UnrecognizedFormat { .. }));
    assert_eq!(err.path(), Some(path.as_path()));
    Ok(())
}
