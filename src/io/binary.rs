//! Field-level binary reading with path-aware errors.
//!
//! XDA and RME files are little-endian; Calvin containers are big-endian.
//! [`BinReader`] wraps any reader and turns a short read into
//! [`IngestError::HeaderTruncated`] naming the field that was being read.

use crate::error::{IngestError, Result};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Reader that attaches the file path and field name to every failure.
pub struct BinReader<R> {
    inner: R,
    path: PathBuf,
}

macro_rules! read_num {
    ($(#[$doc:meta])* $name:ident, $ty:ty, $method:ident, $order:ty) => {
        $(#[$doc])*
        pub fn $name(&mut self, field: &str) -> Result<$ty> {
            self.inner
                .$method::<$order>()
                .map_err(|e| IngestError::from_io(&self.path, field, e))
        }
    };
}

impl<R: Read> BinReader<R> {
    pub fn new(inner: R, path: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            path: path.into(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read one byte.
    pub fn u8(&mut self, field: &str) -> Result<u8> {
        self.inner
            .read_u8()
            .map_err(|e| IngestError::from_io(&self.path, field, e))
    }

    /// Read one signed byte.
    pub fn i8(&mut self, field: &str) -> Result<i8> {
        self.inner
            .read_i8()
            .map_err(|e| IngestError::from_io(&self.path, field, e))
    }

    read_num!(i16_le, i16, read_i16, LittleEndian);
    read_num!(u16_le, u16, read_u16, LittleEndian);
    read_num!(i32_le, i32, read_i32, LittleEndian);
    read_num!(u32_le, u32, read_u32, LittleEndian);

    read_num!(i16_be, i16, read_i16, BigEndian);
    read_num!(u16_be, u16, read_u16, BigEndian);
    read_num!(i32_be, i32, read_i32, BigEndian);
    read_num!(u32_be, u32, read_u32, BigEndian);
    read_num!(f32_be, f32, read_f32, BigEndian);
    read_num!(f64_be, f64, read_f64, BigEndian);

    /// Read exactly `n` raw bytes.
    pub fn bytes(&mut self, n: usize, field: &str) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| IngestError::from_io(&self.path, field, e))?;
        Ok(buf)
    }

    /// Fixed-width NUL-padded ASCII field (XDA names are 64 bytes).
    pub fn fixed_str(&mut self, width: usize, field: &str) -> Result<String> {
        let raw = self.bytes(width, field)?;
        Ok(bytes_to_string(&raw))
    }

    /// Little-endian `i32` length followed by that many 8-bit characters.
    ///
    /// `max_len` guards against treating arbitrary binary data as a length.
    pub fn prefixed_str_le(&mut self, field: &str, max_len: Option<usize>) -> Result<String> {
        let len = self.i32_le(field)?;
        let len = self.checked_len(len, field, max_len)?;
        let raw = self.bytes(len, field)?;
        Ok(bytes_to_string(&raw))
    }

    /// Big-endian `i32` length followed by that many 8-bit characters.
    pub fn prefixed_str_be(&mut self, field: &str) -> Result<String> {
        let raw = self.prefixed_bytes_be(field)?;
        Ok(bytes_to_string(&raw))
    }

    /// Big-endian `i32` length followed by that many raw bytes.
    pub fn prefixed_bytes_be(&mut self, field: &str) -> Result<Vec<u8>> {
        let len = self.i32_be(field)?;
        let len = self.checked_len(len, field, None)?;
        self.bytes(len, field)
    }

    /// Big-endian `i32` character count followed by UTF-16BE code units.
    pub fn wide_str_be(&mut self, field: &str) -> Result<String> {
        let raw = self.wide_bytes_be(field)?;
        Ok(utf16be_to_string(&raw))
    }

    /// The raw code-unit bytes of a [`Self::wide_str_be`] field.
    pub fn wide_bytes_be(&mut self, field: &str) -> Result<Vec<u8>> {
        let len = self.i32_be(field)?;
        let len = self.checked_len(len, field, Some(MAX_FIELD_LEN / 2))?;
        self.bytes(len * 2, field)
    }

    /// Discard `n` bytes.
    pub fn skip(&mut self, n: u64, field: &str) -> Result<()> {
        let copied = io::copy(&mut (&mut self.inner).take(n), &mut io::sink())
            .map_err(|e| IngestError::from_io(&self.path, field, e))?;
        if copied < n {
            return Err(IngestError::truncated(&self.path, field));
        }
        Ok(())
    }

    fn checked_len(&self, len: i32, field: &str, max_len: Option<usize>) -> Result<usize> {
        let len = usize::try_from(len).map_err(|_| {
            IngestError::malformed(&self.path, None, format!("negative length {len} for {field}"))
        })?;
        if let Some(max) = max_len
            && len > max
        {
            return Err(IngestError::malformed(
                &self.path,
                None,
                format!("length {len} for {field} exceeds {max}"),
            ));
        }
        // Bounded so a corrupt length cannot allocate gigabytes before the short read.
        if len > MAX_FIELD_LEN {
            return Err(IngestError::malformed(
                &self.path,
                None,
                format!("implausible length {len} for {field}"),
            ));
        }
        Ok(len)
    }
}

impl<R: Read + Seek> BinReader<R> {
    /// Seek to an absolute offset.
    pub fn seek_to(&mut self, offset: u64, field: &str) -> Result<()> {
        self.inner
            .seek(SeekFrom::Start(offset))
            .map(|_| ())
            .map_err(|e| IngestError::from_io(&self.path, field, e))
    }
}

/// Largest string or blob field accepted from any binary format.
pub const MAX_FIELD_LEN: usize = 64 * 1024 * 1024;

/// Decode NUL-padded 8-bit text; bytes that are not UTF-8 are taken as Latin-1.
#[must_use]
pub fn bytes_to_string(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let raw = &raw[..end];
    match std::str::from_utf8(raw) {
        Ok(s) => s.to_string(),
        Err(_) => raw.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Decode UTF-16BE, dropping trailing NUL code units.
#[must_use]
pub fn utf16be_to_string(raw: &[u8]) -> String {
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    String::from_utf16_lossy(&units[..end])
}

/// Encode a string as UTF-16BE bytes.
#[must_use]
pub fn string_to_utf16be(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_be_bytes).collect()
}

/// Write an `i32` little-endian length followed by the string bytes.
///
/// # Errors
///
/// Propagates write failures; strings longer than `i32::MAX` are rejected.
pub fn write_prefixed_str_le<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    let len = i32::try_from(s.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "string too long"))?;
    w.write_i32::<LittleEndian>(len)?;
    w.write_all(s.as_bytes())
}

/// Write a string into a fixed-width NUL-padded field, truncating if needed.
///
/// # Errors
///
/// Propagates write failures.
pub fn write_fixed_str<W: Write>(w: &mut W, s: &str, width: usize) -> io::Result<()> {
    let mut buf = vec![0u8; width];
    let n = s.len().min(width);
    buf[..n].copy_from_slice(&s.as_bytes()[..n]);
    w.write_all(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_truncated_field_is_named() {
        let mut r = BinReader::new(Cursor::new(vec![1u8, 0]), "x.cdf");
        let err = r.i32_le("magic").unwrap_err();
        match err {
            IngestError::HeaderTruncated { field, .. } => assert_eq!(field, "magic"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_fixed_str_strips_padding() {
        let mut buf = Vec::new();
        write_fixed_str(&mut buf, "AFFX-BioB-5_at", 64).unwrap();
        assert_eq!(buf.len(), 64);
        let mut r = BinReader::new(Cursor::new(buf), "x");
        assert_eq!(r.fixed_str(64, "name").unwrap(), "AFFX-BioB-5_at");
    }

    #[test]
    fn test_prefixed_str_respects_max_len() {
        let mut buf = Vec::new();
        write_prefixed_str_le(&mut buf, "a much longer string").unwrap();
        let mut r = BinReader::new(Cursor::new(buf), "x");
        assert!(r.prefixed_str_le("type", Some(10)).is_err());
    }

    #[test]
    fn test_utf16_round_trip() {
        let bytes = string_to_utf16be("HG-U133A");
        assert_eq!(utf16be_to_string(&bytes), "HG-U133A");
        let mut padded = bytes.clone();
        padded.extend_from_slice(&[0, 0, 0, 0]);
        assert_eq!(utf16be_to_string(&padded), "HG-U133A");
    }
}
