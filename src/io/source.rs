//! Seekable input for the decoders.
//!
//! [`open_source`] returns a [`Source`] that is either a buffered file or, for
//! compressed inputs, an in-memory cursor over the inflated bytes. Decoders only
//! see `BufRead + Seek`.

use crate::error::{IngestError, Result};
use crate::io::compression::{detect_codec, inflate_to_vec};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

/// A decodable input stream.
#[derive(Debug)]
pub enum Source {
    File(BufReader<File>),
    Memory(Cursor<Vec<u8>>),
}

impl Source {
    /// Wrap bytes that are already in memory.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::Memory(Cursor::new(bytes))
    }
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::File(r) => r.read(buf),
            Self::Memory(r) => r.read(buf),
        }
    }
}

impl BufRead for Source {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            Self::File(r) => r.fill_buf(),
            Self::Memory(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            Self::File(r) => r.consume(amt),
            Self::Memory(r) => r.consume(amt),
        }
    }
}

impl Seek for Source {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Self::File(r) => r.seek(pos),
            Self::Memory(r) => r.seek(pos),
        }
    }
}

/// File name with a compression suffix and then the format extension removed
/// (`GSM1.CEL.gz` becomes `GSM1`).
#[must_use]
pub fn stem_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let without_codec = [".gz", ".gzip", ".zst", ".zstd"]
        .iter()
        .find_map(|ext| {
            name.len()
                .checked_sub(ext.len())
                .filter(|&cut| name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(ext))
                .map(|cut| &name[..cut])
        })
        .unwrap_or(&name);
    match without_codec.rfind('.') {
        Some(dot) if dot > 0 => without_codec[..dot].to_string(),
        _ => without_codec.to_string(),
    }
}

/// Open a CDF or CEL file for decoding.
///
/// With `decompress` set, gzip/zstd content (by extension or magic bytes) is
/// inflated into memory first.
///
/// # Errors
///
/// Returns [`IngestError::Io`] if the file cannot be opened or inflated.
pub fn open_source(path: &Path, decompress: bool) -> Result<Source> {
    let io_err = |source: io::Error| IngestError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let mut reader = BufReader::with_capacity(64 * 1024, file);
    if !decompress {
        return Ok(Source::File(reader));
    }

    let codec = {
        let head = reader.fill_buf().map_err(io_err)?;
        detect_codec(path, head)
    };
    match codec {
        Some(codec) => {
            let bytes = inflate_to_vec(reader, codec.as_ref()).map_err(io_err)?;
            debug!(
                path = %path.display(),
                codec = codec.name(),
                inflated = bytes.len(),
                "inflated compressed input"
            );
            Ok(Source::from_bytes(bytes))
        }
        None => Ok(Source::File(reader)),
    }
}
