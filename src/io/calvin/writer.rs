//! Encoder for Calvin containers.
//!
//! The layout is written front to back into memory; group, data-set and row
//! offsets are emitted as placeholders and patched once their targets are known.
//!
//! ```
//! use affyingest::io::calvin::writer::{CalvinWriter, DataSetBuilder};
//! use affyingest::io::calvin::{ColumnData, NameValueTriplet};
//!
//! let bytes = CalvinWriter::new("affymetrix-calvin-intensity")
//!     .param(NameValueTriplet::text("affymetrix-array-type", "Test3"))
//!     .group(
//!         "Default Group",
//!         vec![DataSetBuilder::new("Intensity").column("Intensity", ColumnData::F32(vec![1.0, 2.0]))],
//!     )
//!     .to_bytes()?;
//! assert_eq!(bytes[0], 59);
//! # Ok::<(), std::io::Error>(())
//! ```

use super::{
    ColumnData, ColumnType, DataHeader, MIME_ASCII, MIME_FLOAT, MIME_INT8, MIME_INT16, MIME_INT32,
    MIME_TEXT, MIME_UINT8, MIME_UINT16, MIME_UINT32, NameValueTriplet,
};
use crate::io::binary::string_to_utf16be;
use crate::sniff::{CALVIN_MAGIC, CALVIN_VERSION};
use byteorder::{BigEndian, WriteBytesExt};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

impl NameValueTriplet {
    /// UTF-16 text value.
    pub fn text(name: impl Into<String>, value: &str) -> Self {
        Self::raw(name, string_to_utf16be(value), MIME_TEXT)
    }

    /// 8-bit text value.
    pub fn ascii(name: impl Into<String>, value: &str) -> Self {
        Self::raw(name, value.as_bytes().to_vec(), MIME_ASCII)
    }

    /// Signed integer, stored widened to four bytes as vendor files do.
    pub fn int(name: impl Into<String>, value: i32, width: u8) -> Self {
        let mime = match width {
            1 => MIME_INT8,
            2 => MIME_INT16,
            _ => MIME_INT32,
        };
        Self::raw(name, value.to_be_bytes().to_vec(), mime)
    }

    /// Unsigned integer, stored widened to four bytes.
    pub fn uint(name: impl Into<String>, value: u32, width: u8) -> Self {
        let mime = match width {
            1 => MIME_UINT8,
            2 => MIME_UINT16,
            _ => MIME_UINT32,
        };
        Self::raw(name, value.to_be_bytes().to_vec(), mime)
    }

    pub fn float(name: impl Into<String>, value: f32) -> Self {
        Self::raw(name, value.to_be_bytes().to_vec(), MIME_FLOAT)
    }

    pub fn raw(name: impl Into<String>, value: Vec<u8>, mime_type: &str) -> Self {
        Self {
            name: name.into(),
            value,
            mime_type: mime_type.to_string(),
        }
    }
}

/// One data set to be written: named typed columns of equal length.
#[derive(Clone, Debug)]
pub struct DataSetBuilder {
    name: String,
    params: Vec<NameValueTriplet>,
    columns: Vec<(String, ColumnData)>,
}

impl DataSetBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            columns: Vec::new(),
        }
    }

    #[must_use]
    pub fn param(mut self, nvt: NameValueTriplet) -> Self {
        self.params.push(nvt);
        self
    }

    #[must_use]
    pub fn column(mut self, name: impl Into<String>, data: ColumnData) -> Self {
        self.columns.push((name.into(), data));
        self
    }

    fn n_rows(&self) -> usize {
        self.columns.iter().map(|(_, c)| c.len()).min().unwrap_or(0)
    }
}

/// Builder for a complete Calvin file.
#[derive(Clone, Debug)]
pub struct CalvinWriter {
    header: DataHeader,
    groups: Vec<(String, Vec<DataSetBuilder>)>,
}

impl CalvinWriter {
    pub fn new(data_type_id: impl Into<String>) -> Self {
        Self {
            header: DataHeader {
                data_type_id: data_type_id.into(),
                file_id: String::new(),
                creation_time: String::new(),
                locale: "en-US".to_string(),
                params: Vec::new(),
                parents: Vec::new(),
            },
            groups: Vec::new(),
        }
    }

    #[must_use]
    pub fn file_id(mut self, id: impl Into<String>) -> Self {
        self.header.file_id = id.into();
        self
    }

    #[must_use]
    pub fn param(mut self, nvt: NameValueTriplet) -> Self {
        self.header.params.push(nvt);
        self
    }

    /// Attach a parent (provenance) header.
    #[must_use]
    pub fn parent(mut self, parent: DataHeader) -> Self {
        self.header.parents.push(parent);
        self
    }

    #[must_use]
    pub fn group(mut self, name: impl Into<String>, datasets: Vec<DataSetBuilder>) -> Self {
        self.groups.push((name.into(), datasets));
        self
    }

    /// Encode the file.
    ///
    /// # Errors
    ///
    /// Fails when a length or offset does not fit its on-disk field.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut out: Vec<u8> = Vec::new();
        out.write_u8(CALVIN_MAGIC)?;
        out.write_u8(CALVIN_VERSION)?;
        out.write_i32::<BigEndian>(to_i32(self.groups.len())?)?;
        let first_group_slot = out.len();
        out.write_u32::<BigEndian>(0)?;
        write_data_header(&mut out, &self.header)?;

        let mut prev_group_slot = first_group_slot;
        for (name, datasets) in &self.groups {
            patch(&mut out, prev_group_slot)?;
            prev_group_slot = out.len();
            out.write_u32::<BigEndian>(0)?;
            let first_dataset_slot = out.len();
            out.write_u32::<BigEndian>(0)?;
            out.write_i32::<BigEndian>(to_i32(datasets.len())?)?;
            write_wstr(&mut out, name)?;

            let mut prev_dataset_slot = first_dataset_slot;
            for ds in datasets {
                patch(&mut out, prev_dataset_slot)?;
                prev_dataset_slot = write_dataset(&mut out, ds)?;
            }
        }
        Ok(out)
    }

    /// Encode and write to `path`.
    ///
    /// # Errors
    ///
    /// Propagates encoding and file-system failures.
    pub fn write_to_path(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.to_bytes()?)
    }
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg.to_string())
}

fn to_i32(n: usize) -> io::Result<i32> {
    i32::try_from(n).map_err(|_| invalid("count exceeds i32"))
}

/// Point the u32 slot at `slot` to the current end of `out`.
fn patch(out: &mut [u8], slot: usize) -> io::Result<()> {
    let here = u32::try_from(out.len()).map_err(|_| invalid("offset exceeds u32"))?;
    out[slot..slot + 4].copy_from_slice(&here.to_be_bytes());
    Ok(())
}

fn write_wstr<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    let encoded = string_to_utf16be(s);
    w.write_i32::<BigEndian>(to_i32(encoded.len() / 2)?)?;
    w.write_all(&encoded)
}

fn write_blob<W: Write>(w: &mut W, raw: &[u8]) -> io::Result<()> {
    w.write_i32::<BigEndian>(to_i32(raw.len())?)?;
    w.write_all(raw)
}

fn write_triplets<W: Write>(w: &mut W, params: &[NameValueTriplet]) -> io::Result<()> {
    w.write_i32::<BigEndian>(to_i32(params.len())?)?;
    for p in params {
        write_wstr(w, &p.name)?;
        write_blob(w, &p.value)?;
        write_wstr(w, &p.mime_type)?;
    }
    Ok(())
}

fn write_data_header<W: Write>(w: &mut W, h: &DataHeader) -> io::Result<()> {
    write_blob(w, h.data_type_id.as_bytes())?;
    write_blob(w, h.file_id.as_bytes())?;
    write_wstr(w, &h.creation_time)?;
    write_wstr(w, &h.locale)?;
    write_triplets(w, &h.params)?;
    w.write_i32::<BigEndian>(to_i32(h.parents.len())?)?;
    for parent in &h.parents {
        write_data_header(w, parent)?;
    }
    Ok(())
}

/// Declared cell size; strings are sized to their longest value.
fn column_size(data: &ColumnData) -> usize {
    match data {
        ColumnData::AStr(v) => 4 + v.iter().map(String::len).max().unwrap_or(0),
        ColumnData::WStr(v) => {
            4 + 2 * v.iter().map(|s| s.encode_utf16().count()).max().unwrap_or(0)
        }
        other => other.kind().fixed_size().unwrap_or(0),
    }
}

/// Writes one data set and returns the slot of its next-data-set offset.
fn write_dataset(out: &mut Vec<u8>, ds: &DataSetBuilder) -> io::Result<usize> {
    let first_element_slot = out.len();
    out.write_u32::<BigEndian>(0)?;
    let next_slot = out.len();
    out.write_u32::<BigEndian>(0)?;
    write_wstr(out, &ds.name)?;
    write_triplets(out, &ds.params)?;

    let sizes: Vec<usize> = ds.columns.iter().map(|(_, c)| column_size(c)).collect();
    out.write_u32::<BigEndian>(u32::try_from(ds.columns.len()).map_err(|_| invalid("too many columns"))?)?;
    for ((name, data), size) in ds.columns.iter().zip(&sizes) {
        write_wstr(out, name)?;
        out.write_u8(data.kind().code())?;
        out.write_i32::<BigEndian>(to_i32(*size)?)?;
    }
    let n_rows = ds.n_rows();
    out.write_u32::<BigEndian>(u32::try_from(n_rows).map_err(|_| invalid("too many rows"))?)?;

    patch(out, first_element_slot)?;
    for row in 0..n_rows {
        for ((_, data), &size) in ds.columns.iter().zip(&sizes) {
            write_cell(out, data, row, size)?;
        }
    }
    Ok(next_slot)
}

fn write_cell(out: &mut Vec<u8>, data: &ColumnData, row: usize, size: usize) -> io::Result<()> {
    let start = out.len();
    match data {
        ColumnData::I8(v) => out.write_i8(v[row]),
        ColumnData::U8(v) => out.write_u8(v[row]),
        ColumnData::I16(v) => out.write_i16::<BigEndian>(v[row]),
        ColumnData::U16(v) => out.write_u16::<BigEndian>(v[row]),
        ColumnData::I32(v) => out.write_i32::<BigEndian>(v[row]),
        ColumnData::U32(v) => out.write_u32::<BigEndian>(v[row]),
        ColumnData::F32(v) => out.write_f32::<BigEndian>(v[row]),
        ColumnData::F64(v) => out.write_f64::<BigEndian>(v[row]),
        ColumnData::AStr(v) => write_blob(out, v[row].as_bytes()),
        ColumnData::WStr(v) => write_wstr(out, &v[row]),
    }?;
    // String cells shorter than the column width are NUL-padded.
    if out.len() < start + size {
        out.resize(start + size, 0);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::calvin::{CalvinFile, ColumnValue};
    use std::io::Cursor;
    use std::path::PathBuf;

    #[test]
    fn test_groups_and_strings_round_trip() {
        let bytes = CalvinWriter::new("affymetrix-calvin-cdf")
            .param(NameValueTriplet::int("affymetrix-cdf-rows", 8, 4))
            .group(
                "probe-a",
                vec![
                    DataSetBuilder::new("block")
                        .column("X", ColumnData::U16(vec![1, 2, 3]))
                        .column("Label", ColumnData::WStr(vec!["a".into(), "bcd".into(), String::new()])),
                ],
            )
            .group("probe-b", vec![DataSetBuilder::new("empty")])
            .to_bytes()
            .unwrap();

        let file = CalvinFile::read(Cursor::new(bytes), &PathBuf::from("t.cdf")).unwrap();
        assert_eq!(file.groups.len(), 2);
        let ds = &file.groups[0].datasets[0];
        assert_eq!(ds.n_rows, 3);
        assert_eq!(ds.columns[1].kind, ColumnType::WStr);
        assert_eq!(ds.data[1].get(1), Some(ColumnValue::WStr("bcd".into())));
        assert_eq!(ds.data[0].get(2), Some(ColumnValue::U16(3)));
        assert_eq!(file.groups[1].name, "probe-b");
        assert_eq!(
            file.find_nvt("affymetrix-cdf-rows").and_then(NameValueTriplet::as_i64),
            Some(8)
        );
    }
}
