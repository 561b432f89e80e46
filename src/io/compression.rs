//! Compressed CDF/CEL inputs.
//!
//! Intensity files are routinely archived as `.CEL.gz`. The binary decoders
//! seek, so a compressed file is inflated into memory once and decoded from a
//! cursor. Codecs are looked up by file suffix first and then by magic bytes,
//! because scanner software also writes gzip data under a bare `.CEL` name.
//!
//! Built-in codecs, each behind a feature flag:
//! - gzip (`.gz`, `.gzip`) via `flate2`, feature `compression-gzip`
//! - zstd (`.zst`, `.zstd`) via `zstd`, feature `compression-zstd`
//!
//! Further codecs can be added at runtime with [`register_codec`]:
//!
//! ```
//! use affyingest::io::compression::{Codec, register_codec};
//! use std::io::{self, Read, Write};
//! use std::sync::Arc;
//!
//! struct Identity;
//!
//! impl Codec for Identity {
//!     fn name(&self) -> &str { "identity" }
//!     fn suffixes(&self) -> &[&str] { &[".raw"] }
//!     fn magic(&self) -> Option<&[u8]> { None }
//!     fn inflate(&self, r: Box<dyn Read>) -> io::Result<Box<dyn Read>> { Ok(r) }
//!     fn deflate(&self, w: Box<dyn Write>) -> io::Result<Box<dyn Write>> { Ok(w) }
//! }
//!
//! register_codec(Arc::new(Identity));
//! ```

use anyhow::{Context, Result};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

type CodecList = Vec<Arc<dyn Codec>>;

static CODECS: LazyLock<RwLock<CodecList>> = LazyLock::new(|| RwLock::new(builtin_codecs()));

fn builtin_codecs() -> CodecList {
    vec![
        #[cfg(feature = "compression-gzip")]
        Arc::new(Gzip),
        #[cfg(feature = "compression-zstd")]
        Arc::new(Zstd),
    ]
}

fn codecs() -> CodecList {
    CODECS.read().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Add a codec after the built-in ones.
pub fn register_codec(codec: Arc<dyn Codec>) {
    CODECS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .push(codec);
}

/// A stream compression format. Shared between decode workers.
pub trait Codec: Send + Sync {
    fn name(&self) -> &str;

    /// Lowercase file-name suffixes, leading dot included.
    fn suffixes(&self) -> &[&str];

    /// Leading bytes of a compressed stream, when the format has them.
    fn magic(&self) -> Option<&[u8]>;

    fn inflate(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>>;

    fn deflate(&self, writer: Box<dyn Write>) -> io::Result<Box<dyn Write>>;
}

fn codec_for_name(path: &Path) -> Option<Arc<dyn Codec>> {
    let name = path.to_string_lossy().to_lowercase();
    codecs()
        .into_iter()
        .find(|c| c.suffixes().iter().any(|s| name.ends_with(s)))
}

fn codec_for_magic(head: &[u8]) -> Option<Arc<dyn Codec>> {
    codecs()
        .into_iter()
        .find(|c| c.magic().is_some_and(|m| head.starts_with(m)))
}

/// Codec for a file, from its name and then its first bytes.
#[must_use]
pub fn detect_codec(path: &Path, head: &[u8]) -> Option<Arc<dyn Codec>> {
    codec_for_name(path).or_else(|| codec_for_magic(head))
}

/// Inflate a whole stream into memory.
///
/// # Errors
///
/// Fails if the stream is corrupt or truncated.
pub fn inflate_to_vec<R: Read + 'static>(reader: R, codec: &dyn Codec) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    codec.inflate(Box::new(reader))?.read_to_end(&mut out)?;
    Ok(out)
}

/// Writer that compresses according to the suffix of `path`, or a plain
/// buffered writer when no codec claims it. Used to write compressed fixtures.
///
/// # Errors
///
/// Fails if the codec cannot start a stream.
pub fn auto_detect_writer<W: Write + 'static>(writer: W, path: impl AsRef<Path>) -> Result<Box<dyn Write>> {
    match codec_for_name(path.as_ref()) {
        Some(codec) => codec
            .deflate(Box::new(writer))
            .with_context(|| format!("start {} stream for {}", codec.name(), path.as_ref().display())),
        None => Ok(Box::new(BufWriter::new(writer))),
    }
}

#[cfg(feature = "compression-gzip")]
struct Gzip;

#[cfg(feature = "compression-gzip")]
impl Codec for Gzip {
    fn name(&self) -> &str {
        "gzip"
    }

    fn suffixes(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn inflate(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>> {
        // Concatenated archives (`cat a.gz b.gz`) are multi-member streams.
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }

    fn deflate(&self, writer: Box<dyn Write>) -> io::Result<Box<dyn Write>> {
        Ok(Box::new(flate2::write::GzEncoder::new(
            writer,
            flate2::Compression::default(),
        )))
    }
}

#[cfg(feature = "compression-zstd")]
struct Zstd;

#[cfg(feature = "compression-zstd")]
impl Codec for Zstd {
    fn name(&self) -> &str {
        "zstd"
    }

    fn suffixes(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn inflate(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>> {
        Ok(Box::new(zstd::stream::read::Decoder::new(reader)?))
    }

    fn deflate(&self, writer: Box<dyn Write>) -> io::Result<Box<dyn Write>> {
        Ok(Box::new(zstd::stream::write::Encoder::new(writer, 3)?.auto_finish()))
    }
}
