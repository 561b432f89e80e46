//! Format detection from a file's leading bytes.
//!
//! Sniffing never fails: an unreadable or unknown prefix yields
//! [`Sniffed::Unrecognized`], and the caller turns that into
//! [`IngestError::UnrecognizedFormat`] naming the file.
//!
//! | Format | CDF | CEL |
//! |---|---|---|
//! | Text | first line `[CDF]` | first line `[CEL]` |
//! | XDA | LE `i32` magic 67 | LE `i32` magic 64 |
//! | Calvin | byte 59, byte 1, id `affymetrix-calvin-cdf` | byte 59, byte 1, id `affymetrix-calvin-intensity` |
//! | RME | LE-prefixed `CDF` / `RMECDF` | LE-prefixed `CEL` / `RMECEL` |
//!
//! XDA files are classified on the magic number alone so that the decoder can
//! report a version mismatch precisely instead of "unrecognized".

use crate::error::{IngestError, Result};
use crate::io::source::{Source, open_source};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{BufRead, Read, Seek, SeekFrom};
use std::path::Path;

pub const XDA_CDF_MAGIC: i32 = 67;
pub const XDA_CDF_VERSION: i32 = 1;
pub const XDA_CEL_MAGIC: i32 = 64;
pub const XDA_CEL_VERSION: i32 = 4;
pub const CALVIN_MAGIC: u8 = 59;
pub const CALVIN_VERSION: u8 = 1;
pub const CALVIN_CDF_TYPE: &str = "affymetrix-calvin-cdf";
pub const CALVIN_CEL_TYPE: &str = "affymetrix-calvin-intensity";

/// Longest type tag accepted when probing for an RME cache.
const RME_TAG_MAX: usize = 10;

/// Whether a file is expected to be a chip description or an intensity file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    ChipDescription,
    Intensity,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ChipDescription => "CDF",
            Self::Intensity => "CEL",
        })
    }
}

/// The four wire formats understood by the decoders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileFormat {
    Text,
    BinaryXda,
    Calvin,
    RmeCache,
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::BinaryXda => "XDA",
            Self::Calvin => "Calvin",
            Self::RmeCache => "RME",
        })
    }
}

/// Outcome of sniffing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sniffed {
    Format(FileFormat),
    Unrecognized,
}

impl Sniffed {
    #[must_use]
    pub fn format(self) -> Option<FileFormat> {
        match self {
            Self::Format(f) => Some(f),
            Self::Unrecognized => None,
        }
    }
}

struct Signature {
    text_tag: &'static str,
    xda_magic: i32,
    calvin_type: &'static str,
    rme_tags: [&'static str; 2],
}

const CDF_SIGNATURE: Signature = Signature {
    text_tag: "[CDF]",
    xda_magic: XDA_CDF_MAGIC,
    calvin_type: CALVIN_CDF_TYPE,
    rme_tags: ["CDF", "RMECDF"],
};

const CEL_SIGNATURE: Signature = Signature {
    text_tag: "[CEL]",
    xda_magic: XDA_CEL_MAGIC,
    calvin_type: CALVIN_CEL_TYPE,
    rme_tags: ["CEL", "RMECEL"],
};

/// Classify a chip-description stream. The stream is rewound afterwards.
pub fn sniff_cdf<R: BufRead + Seek>(reader: &mut R) -> Sniffed {
    sniff(reader, &CDF_SIGNATURE)
}

/// Classify an intensity stream. The stream is rewound afterwards.
pub fn sniff_cel<R: BufRead + Seek>(reader: &mut R) -> Sniffed {
    sniff(reader, &CEL_SIGNATURE)
}

fn signature(kind: FileKind) -> &'static Signature {
    match kind {
        FileKind::ChipDescription => &CDF_SIGNATURE,
        FileKind::Intensity => &CEL_SIGNATURE,
    }
}

fn sniff<R: BufRead + Seek>(reader: &mut R, sig: &Signature) -> Sniffed {
    let probes: [fn(&mut R, &Signature) -> bool; 4] = [is_text, is_xda, is_calvin, is_rme];
    let formats = [
        FileFormat::Text,
        FileFormat::BinaryXda,
        FileFormat::Calvin,
        FileFormat::RmeCache,
    ];
    let mut found = Sniffed::Unrecognized;
    for (probe, format) in probes.iter().zip(formats) {
        if reader.seek(SeekFrom::Start(0)).is_err() {
            return Sniffed::Unrecognized;
        }
        if probe(reader, sig) {
            found = Sniffed::Format(format);
            break;
        }
    }
    if reader.seek(SeekFrom::Start(0)).is_err() {
        return Sniffed::Unrecognized;
    }
    found
}

fn is_text<R: BufRead>(reader: &mut R, sig: &Signature) -> bool {
    let mut first = Vec::new();
    if reader.take(256).read_until(b'\n', &mut first).is_err() {
        return false;
    }
    let first = String::from_utf8_lossy(&first);
    first
        .trim_start_matches('\u{feff}')
        .trim_start()
        .starts_with(sig.text_tag)
}

fn is_xda<R: Read>(reader: &mut R, sig: &Signature) -> bool {
    reader
        .read_i32::<LittleEndian>()
        .is_ok_and(|magic| magic == sig.xda_magic)
}

fn is_calvin<R: Read>(reader: &mut R, sig: &Signature) -> bool {
    let mut head = [0u8; 10];
    if reader.read_exact(&mut head).is_err() {
        return false;
    }
    if head[0] != CALVIN_MAGIC || head[1] != CALVIN_VERSION {
        return false;
    }
    let Ok(len) = reader.read_i32::<BigEndian>() else {
        return false;
    };
    if len <= 0 || len as usize > 256 {
        return false;
    }
    let mut id = vec![0u8; len as usize];
    reader.read_exact(&mut id).is_ok() && id == sig.calvin_type.as_bytes()
}

fn is_rme<R: Read>(reader: &mut R, sig: &Signature) -> bool {
    let Ok(len) = reader.read_i32::<LittleEndian>() else {
        return false;
    };
    if len <= 0 || len as usize > RME_TAG_MAX {
        return false;
    }
    let mut tag = vec![0u8; len as usize];
    if reader.read_exact(&mut tag).is_err() {
        return false;
    }
    sig.rme_tags.iter().any(|t| t.as_bytes() == tag.as_slice())
}

/// Open `path`, sniff it as `kind`, and return the format with a rewound source.
///
/// # Errors
///
/// [`IngestError::Io`] if the file cannot be opened, and
/// [`IngestError::UnrecognizedFormat`] if no format matches.
pub fn open_and_sniff(path: &Path, kind: FileKind, decompress: bool) -> Result<(FileFormat, Source)> {
    let mut source = open_source(path, decompress)?;
    match sniff(&mut source, signature(kind)) {
        Sniffed::Format(format) => Ok((format, source)),
        Sniffed::Unrecognized => Err(IngestError::UnrecognizedFormat {
            path: path.to_path_buf(),
            kind,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_text_tags() {
        let mut c = Cursor::new(b"[CDF]\r\nVersion=GC3.0\r\n".to_vec());
        assert_eq!(sniff_cdf(&mut c), Sniffed::Format(FileFormat::Text));
        assert_eq!(sniff_cel(&mut c), Sniffed::Unrecognized);
        assert_eq!(c.position(), 0);
    }

    #[test]
    fn test_rme_tag_length_guard() {
        let mut bytes = 4000i32.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"CEL");
        let mut c = Cursor::new(bytes);
        assert_eq!(sniff_cel(&mut c), Sniffed::Unrecognized);
    }

    #[test]
    fn test_empty_input_is_unrecognized() {
        let mut c = Cursor::new(Vec::new());
        assert_eq!(sniff_cdf(&mut c), Sniffed::Unrecognized);
    }
}
