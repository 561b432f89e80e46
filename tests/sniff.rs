//! Format detection over fixture bytes for both file kinds.

use affyingest::cdf::{load_chip_description, write_rme_cdf};
use affyingest::cel::write_rme_cel;
use affyingest::sniff::{Sniffed, open_and_sniff, sniff_cdf, sniff_cel};
use affyingest::testing::*;
use affyingest::{FileFormat, FileKind, IngestConfig, IngestError, NoProgress};
use anyhow::Result;
use std::io::{Cursor, Seek};

fn cdf_samples(dir: &FixtureDir) -> Result<Vec<(Vec<u8>, FileFormat)>> {
    let layout = sample_layout();
    let text = dir.join("Test3.cdf");
    write_text_cdf(&text, &layout)?;
    let chip = load_chip_description(&text, &IngestConfig::default(), &NoProgress)?;
    let mut rme = Vec::new();
    write_rme_cdf(&mut rme, &chip)?;
    Ok(vec![
        (text_cdf_string(&layout).into_bytes(), FileFormat::Text),
        (xda_cdf_bytes(&layout, 1)?, FileFormat::BinaryXda),
        (calvin_cdf_writer(&layout)?.to_bytes()?, FileFormat::Calvin),
        (rme, FileFormat::RmeCache),
    ])
}

fn cel_samples() -> Result<Vec<(Vec<u8>, FileFormat)>> {
    let layout = sample_layout();
    let values = layout.intensities(1);
    let mut rme = Vec::new();
    write_rme_cel(&mut rme, "a", "Test3", layout.geometry, &values)?;
    Ok(vec![
        (text_cel_string("Test3", layout.geometry, Some(&values)).into_bytes(), FileFormat::Text),
        (xda_cel_bytes("Test3", layout.geometry, &values, None)?, FileFormat::BinaryXda),
        (calvin_cel_writer("Test3", layout.geometry, &values)?.to_bytes()?, FileFormat::Calvin),
        (rme, FileFormat::RmeCache),
    ])
}

#[test]
fn test_every_cdf_format_detected() -> Result<()> {
    let dir = FixtureDir::new()?;
    for (bytes, format) in cdf_samples(&dir)? {
        let mut c = Cursor::new(bytes);
        assert_eq!(sniff_cdf(&mut c), Sniffed::Format(format));
        assert_eq!(c.stream_position()?, 0, "{format} stream not rewound");
        // A chip description is never taken for an intensity file.
        assert_eq!(sniff_cel(&mut c), Sniffed::Unrecognized, "{format} sniffed as CEL");
    }
    Ok(())
}

#[test]
fn test_every_cel_format_detected() -> Result<()> {
    for (bytes, format) in cel_samples()? {
        let mut c = Cursor::new(bytes);
        assert_eq!(sniff_cel(&mut c), Sniffed::Format(format));
        assert_eq!(c.stream_position()?, 0, "{format} stream not rewound");
        assert_eq!(sniff_cdf(&mut c), Sniffed::Unrecognized, "{format} sniffed as CDF");
    }
    Ok(())
}

#[test]
fn test_xda_classified_by_magic_alone() -> Result<()> {
    let mut c = Cursor::new(xda_cdf_bytes(&sample_layout(), 2)?);
    assert_eq!(sniff_cdf(&mut c), Sniffed::Format(FileFormat::BinaryXda));

    let mut bare = Cursor::new(67i32.to_le_bytes().to_vec());
    assert_eq!(sniff_cdf(&mut bare).format(), Some(FileFormat::BinaryXda));
    Ok(())
}

#[test]
fn test_text_tag_after_byte_order_mark() {
    let mut c = Cursor::new("\u{feff}[CEL]\nVersion=3\n".as_bytes().to_vec());
    assert_eq!(sniff_cel(&mut c), Sniffed::Format(FileFormat::Text));
}

#[test]
fn test_rme_short_tag_variants() {
    for tag in ["CEL", "RMECEL"] {
        let mut bytes = (tag.len() as i32).to_le_bytes().to_vec();
        bytes.extend_from_slice(tag.as_bytes());
        assert_eq!(sniff_cel(&mut Cursor::new(bytes)), Sniffed::Format(FileFormat::RmeCache));
    }

    // Eleven bytes is past the tag length limit even though the text matches.
    let mut long = 11i32.to_le_bytes().to_vec();
    long.extend_from_slice(b"RMECEL\0\0\0\0\0");
    assert_eq!(sniff_cel(&mut Cursor::new(long)), Sniffed::Unrecognized);
}

#[test]
fn test_calvin_requires_container_version() -> Result<()> {
    let layout = sample_layout();
    let mut bytes = calvin_cdf_writer(&layout)?.to_bytes()?;
    assert_eq!(sniff_cdf(&mut Cursor::new(bytes.clone())), Sniffed::Format(FileFormat::Calvin));
    bytes[1] = 9;
    assert_eq!(sniff_cdf(&mut Cursor::new(bytes)), Sniffed::Unrecognized);
    Ok(())
}

#[test]
fn test_junk_is_unrecognized() {
    let junk: [&[u8]; 4] = [b"", b"\0\0\0", b"hello world\n", b"[CHIP]\n"];
    for junk in junk {
        assert_eq!(sniff_cdf(&mut Cursor::new(junk.to_vec())), Sniffed::Unrecognized);
        assert_eq!(sniff_cel(&mut Cursor::new(junk.to_vec())), Sniffed::Unrecognized);
    }
}

#[test]
fn test_open_and_sniff_compressed_and_unknown() -> Result<()> {
    let dir = FixtureDir::new()?;
    let layout = sample_layout();
    let gz = dir.join("a.CEL.gz");
    write_xda_cel(&gz, "Test3", layout.geometry, &layout.intensities(2))?;
    let (format, _) = open_and_sniff(&gz, FileKind::Intensity, true)?;
    assert_eq!(format, FileFormat::BinaryXda);

    let err = open_and_sniff(&gz, FileKind::ChipDescription, true).unwrap_err();
    assert!(matches!(
        err,
        IngestError::UnrecognizedFormat { kind: FileKind::ChipDescription, .. }
    ));
    assert_eq!(err.path(), Some(gz.as_path()));

    let missing = dir.join("missing.CEL");
    let err = open_and_sniff(&missing, FileKind::Intensity, true).unwrap_err();
    assert!(matches!(err, IngestError::Io { .. }), "unexpected error: {err}");
    Ok(())
}
