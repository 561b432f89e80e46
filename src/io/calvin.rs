//! Reader for the Calvin "generic" container format.
//!
//! A Calvin file is a self-describing, big-endian container:
//!
//! ```text
//! FileHeader  magic u8 (59), version u8 (1), n_groups i32, first_group u32
//! DataHeader  data_type_id, file_id          (i32 len + bytes)
//!             creation_time, locale          (i32 len + UTF-16BE)
//!             n_params i32, NameValueTriplet*
//!             n_parents i32, DataHeader*     (recursive)
//! DataGroup   next_group u32, first_dataset u32, n_datasets i32, name
//! DataSet     first_element u32, next_dataset u32, name,
//!             n_params i32, NameValueTriplet*,
//!             n_columns u32, (name, type u8, size i32)*,
//!             n_rows u32, row-major cell data
//! ```
//!
//! Groups and data sets are reached by seeking to the offsets they declare.
//! Named values are resolved with [`find_nvt`], which searches a header's own
//! triplets before walking its parents.

pub mod writer;

use crate::error::{IngestError, Result};
use crate::io::binary::{BinReader, bytes_to_string, utf16be_to_string};
use crate::sniff::{CALVIN_MAGIC, CALVIN_VERSION};
use std::io::{Read, Seek};
use std::path::Path;

/// Parent headers nest; real files go two or three deep.
const MAX_PARENT_DEPTH: usize = 64;

pub const MIME_TEXT: &str = "text/plain";
pub const MIME_ASCII: &str = "text/ascii";
pub const MIME_INT8: &str = "text/x-calvin-integer-8";
pub const MIME_UINT8: &str = "text/x-calvin-unsigned-integer-8";
pub const MIME_INT16: &str = "text/x-calvin-integer-16";
pub const MIME_UINT16: &str = "text/x-calvin-unsigned-integer-16";
pub const MIME_INT32: &str = "text/x-calvin-integer-32";
pub const MIME_UINT32: &str = "text/x-calvin-unsigned-integer-32";
pub const MIME_FLOAT: &str = "text/x-calvin-float";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileHeader {
    pub magic: u8,
    pub version: u8,
    pub n_groups: i32,
    pub first_group_offset: u32,
}

/// A named, MIME-typed raw value.
#[derive(Clone, Debug, PartialEq)]
pub struct NameValueTriplet {
    pub name: String,
    pub value: Vec<u8>,
    pub mime_type: String,
}

/// Typed view of a [`NameValueTriplet`] value.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Text(String),
    Ascii(String),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    F32(f32),
    Other(Vec<u8>),
}

impl ParamValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Ascii(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::I8(v) => Some(i64::from(v)),
            Self::U8(v) => Some(i64::from(v)),
            Self::I16(v) => Some(i64::from(v)),
            Self::U16(v) => Some(i64::from(v)),
            Self::I32(v) => Some(i64::from(v)),
            Self::U32(v) => Some(i64::from(v)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::F32(v) => Some(f64::from(*v)),
            other => other.as_i64().map(|v| v as f64),
        }
    }
}

/// Big-endian integer stored either at its natural width or widened to 4 bytes.
fn be_int(raw: &[u8], width: usize) -> Option<i64> {
    if raw.len() >= 4 && width < 4 {
        let v = i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
        return Some(i64::from(v));
    }
    let bytes = raw.get(..width)?;
    Some(bytes.iter().fold(0i64, |acc, &b| (acc << 8) | i64::from(b)))
}

impl NameValueTriplet {
    /// Decode the raw value according to its MIME type.
    #[must_use]
    pub fn typed(&self) -> ParamValue {
        let raw = self.value.as_slice();
        let decoded = match self.mime_type.as_str() {
            MIME_TEXT => Some(ParamValue::Text(utf16be_to_string(raw))),
            MIME_ASCII => Some(ParamValue::Ascii(bytes_to_string(raw))),
            MIME_INT8 => be_int(raw, 1).map(|v| ParamValue::I8(v as i8)),
            MIME_UINT8 => be_int(raw, 1).map(|v| ParamValue::U8(v as u8)),
            MIME_INT16 => be_int(raw, 2).map(|v| ParamValue::I16(v as i16)),
            MIME_UINT16 => be_int(raw, 2).map(|v| ParamValue::U16(v as u16)),
            MIME_INT32 => be_int(raw, 4).map(|v| ParamValue::I32(v as i32)),
            MIME_UINT32 => be_int(raw, 4).map(|v| ParamValue::U32(v as u32)),
            MIME_FLOAT => raw
                .get(..4)
                .map(|b| ParamValue::F32(f32::from_be_bytes([b[0], b[1], b[2], b[3]]))),
            _ => None,
        };
        decoded.unwrap_or_else(|| ParamValue::Other(self.value.clone()))
    }

    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self.typed() {
            ParamValue::Text(s) | ParamValue::Ascii(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        self.typed().as_i64()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DataHeader {
    pub data_type_id: String,
    pub file_id: String,
    pub creation_time: String,
    pub locale: String,
    pub params: Vec<NameValueTriplet>,
    pub parents: Vec<DataHeader>,
}

impl DataHeader {
    /// See [`find_nvt`].
    #[must_use]
    pub fn find_nvt(&self, name: &str) -> Option<&NameValueTriplet> {
        find_nvt(self, name)
    }
}

/// Look up a named value: own triplets first, then each parent in order
/// (depth-first). A miss is `None`; callers decide whether it is fatal.
#[must_use]
pub fn find_nvt<'a>(header: &'a DataHeader, name: &str) -> Option<&'a NameValueTriplet> {
    header
        .params
        .iter()
        .find(|p| p.name == name)
        .or_else(|| header.parents.iter().find_map(|parent| find_nvt(parent, name)))
}

/// Column type codes 0-9.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
    AStr,
    WStr,
}

impl ColumnType {
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::I8,
            1 => Self::U8,
            2 => Self::I16,
            3 => Self::U16,
            4 => Self::I32,
            5 => Self::U32,
            6 => Self::F32,
            7 => Self::F64,
            8 => Self::AStr,
            9 => Self::WStr,
            _ => return None,
        })
    }

    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::I8 => 0,
            Self::U8 => 1,
            Self::I16 => 2,
            Self::U16 => 3,
            Self::I32 => 4,
            Self::U32 => 5,
            Self::F32 => 6,
            Self::F64 => 7,
            Self::AStr => 8,
            Self::WStr => 9,
        }
    }

    /// Fixed byte width, or `None` for string columns (sized per column).
    #[must_use]
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            Self::I8 | Self::U8 => Some(1),
            Self::I16 | Self::U16 => Some(2),
            Self::I32 | Self::U32 | Self::F32 => Some(4),
            Self::F64 => Some(8),
            Self::AStr | Self::WStr => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnType,
    /// Declared byte size of one cell, including a string's length prefix.
    pub size: i32,
}

/// One decoded cell.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnValue {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    F32(f32),
    F64(f64),
    AStr(String),
    WStr(String),
}

impl ColumnValue {
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::I8(v) => Some(f64::from(v)),
            Self::U8(v) => Some(f64::from(v)),
            Self::I16(v) => Some(f64::from(v)),
            Self::U16(v) => Some(f64::from(v)),
            Self::I32(v) => Some(f64::from(v)),
            Self::U32(v) => Some(f64::from(v)),
            Self::F32(v) => Some(f64::from(v)),
            Self::F64(v) => Some(v),
            Self::AStr(_) | Self::WStr(_) => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::I8(v) => Some(i64::from(v)),
            Self::U8(v) => Some(i64::from(v)),
            Self::I16(v) => Some(i64::from(v)),
            Self::U16(v) => Some(i64::from(v)),
            Self::I32(v) => Some(i64::from(v)),
            Self::U32(v) => Some(i64::from(v)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::AStr(s) | Self::WStr(s) => Some(s),
            _ => None,
        }
    }
}

/// A whole column of typed cells.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnData {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    AStr(Vec<String>),
    WStr(Vec<String>),
}

impl ColumnData {
    fn with_capacity(kind: ColumnType, n: usize) -> Self {
        match kind {
            ColumnType::I8 => Self::I8(Vec::with_capacity(n)),
            ColumnType::U8 => Self::U8(Vec::with_capacity(n)),
            ColumnType::I16 => Self::I16(Vec::with_capacity(n)),
            ColumnType::U16 => Self::U16(Vec::with_capacity(n)),
            ColumnType::I32 => Self::I32(Vec::with_capacity(n)),
            ColumnType::U32 => Self::U32(Vec::with_capacity(n)),
            ColumnType::F32 => Self::F32(Vec::with_capacity(n)),
            ColumnType::F64 => Self::F64(Vec::with_capacity(n)),
            ColumnType::AStr => Self::AStr(Vec::with_capacity(n)),
            ColumnType::WStr => Self::WStr(Vec::with_capacity(n)),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ColumnType {
        match self {
            Self::I8(_) => ColumnType::I8,
            Self::U8(_) => ColumnType::U8,
            Self::I16(_) => ColumnType::I16,
            Self::U16(_) => ColumnType::U16,
            Self::I32(_) => ColumnType::I32,
            Self::U32(_) => ColumnType::U32,
            Self::F32(_) => ColumnType::F32,
            Self::F64(_) => ColumnType::F64,
            Self::AStr(_) => ColumnType::AStr,
            Self::WStr(_) => ColumnType::WStr,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::I8(v) => v.len(),
            Self::U8(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::AStr(v) | Self::WStr(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell at `row`, if in range.
    #[must_use]
    pub fn get(&self, row: usize) -> Option<ColumnValue> {
        Some(match self {
            Self::I8(v) => ColumnValue::I8(*v.get(row)?),
            Self::U8(v) => ColumnValue::U8(*v.get(row)?),
            Self::I16(v) => ColumnValue::I16(*v.get(row)?),
            Self::U16(v) => ColumnValue::U16(*v.get(row)?),
            Self::I32(v) => ColumnValue::I32(*v.get(row)?),
            Self::U32(v) => ColumnValue::U32(*v.get(row)?),
            Self::F32(v) => ColumnValue::F32(*v.get(row)?),
            Self::F64(v) => ColumnValue::F64(*v.get(row)?),
            Self::AStr(v) => ColumnValue::AStr(v.get(row)?.clone()),
            Self::WStr(v) => ColumnValue::WStr(v.get(row)?.clone()),
        })
    }

    /// Numeric cells widened to `f64`; `None` for string columns.
    #[must_use]
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        Some(match self {
            Self::I8(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::U8(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::I16(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::U16(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::I32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::U32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::F32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::F64(v) => v.clone(),
            Self::AStr(_) | Self::WStr(_) => return None,
        })
    }

    fn push<R: Read>(&mut self, r: &mut BinReader<R>, spec: &ColumnSpec) -> Result<()> {
        let field = spec.name.as_str();
        match self {
            Self::I8(v) => v.push(r.i8(field)?),
            Self::U8(v) => v.push(r.u8(field)?),
            Self::I16(v) => v.push(r.i16_be(field)?),
            Self::U16(v) => v.push(r.u16_be(field)?),
            Self::I32(v) => v.push(r.i32_be(field)?),
            Self::U32(v) => v.push(r.u32_be(field)?),
            Self::F32(v) => v.push(r.f32_be(field)?),
            Self::F64(v) => v.push(r.f64_be(field)?),
            // Lengths may count NUL padding; skip by raw bytes read.
            Self::AStr(v) => {
                let raw = r.prefixed_bytes_be(field)?;
                skip_padding(r, spec, 4 + raw.len())?;
                v.push(bytes_to_string(&raw));
            }
            Self::WStr(v) => {
                let raw = r.wide_bytes_be(field)?;
                skip_padding(r, spec, 4 + raw.len())?;
                v.push(utf16be_to_string(&raw));
            }
        }
        Ok(())
    }
}

/// Skip the rest of a fixed-width cell after `used` bytes.
fn skip_padding<R: Read>(r: &mut BinReader<R>, spec: &ColumnSpec, used: usize) -> Result<()> {
    let declared = usize::try_from(spec.size).unwrap_or(0);
    if declared > used {
        r.skip((declared - used) as u64, &spec.name)?;
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq)]
pub struct DataSet {
    pub first_element_offset: u32,
    pub next_dataset_offset: u32,
    pub name: String,
    pub params: Vec<NameValueTriplet>,
    pub columns: Vec<ColumnSpec>,
    pub n_rows: u32,
    /// Decoded cells, one entry per column in declaration order.
    pub data: Vec<ColumnData>,
}

impl DataSet {
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.column_index(name).and_then(|i| self.data.get(i))
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&NameValueTriplet> {
        self.params.iter().find(|p| p.name == name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DataGroup {
    pub next_group_offset: u32,
    pub first_dataset_offset: u32,
    pub name: String,
    pub datasets: Vec<DataSet>,
}

/// A fully parsed Calvin file.
#[derive(Clone, Debug, PartialEq)]
pub struct CalvinFile {
    pub file_header: FileHeader,
    pub data_header: DataHeader,
    pub groups: Vec<DataGroup>,
}

impl CalvinFile {
    /// Parse the whole container, including every data set's cells.
    ///
    /// # Errors
    ///
    /// Fails on a wrong magic/version, an unknown column type, or truncation.
    pub fn read<R: Read + Seek>(reader: R, path: &Path) -> Result<Self> {
        let mut r = BinReader::new(reader, path);
        let (file_header, data_header) = read_headers(&mut r)?;
        let mut groups = Vec::with_capacity(file_header.n_groups.max(0) as usize);
        let mut offset = u64::from(file_header.first_group_offset);
        for _ in 0..file_header.n_groups.max(0) {
            r.seek_to(offset, "data group")?;
            let group = read_group(&mut r)?;
            offset = u64::from(group.next_group_offset);
            groups.push(group);
        }
        Ok(Self {
            file_header,
            data_header,
            groups,
        })
    }

    #[must_use]
    pub fn group(&self, name: &str) -> Option<&DataGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// See [`find_nvt`].
    #[must_use]
    pub fn find_nvt(&self, name: &str) -> Option<&NameValueTriplet> {
        find_nvt(&self.data_header, name)
    }
}

/// Read the file header and the (recursive) data header, leaving the reader
/// just past them. Used for header-only validation.
///
/// # Errors
///
/// Fails on a wrong magic/version or truncation.
pub fn read_headers<R: Read>(r: &mut BinReader<R>) -> Result<(FileHeader, DataHeader)> {
    let file_header = read_file_header(r)?;
    let data_header = read_data_header(r, 0)?;
    Ok((file_header, data_header))
}

fn read_file_header<R: Read>(r: &mut BinReader<R>) -> Result<FileHeader> {
    let magic = r.u8("Calvin magic")?;
    if magic != CALVIN_MAGIC {
        return Err(IngestError::malformed(
            r.path(),
            None,
            format!("Calvin magic {magic}, expected {CALVIN_MAGIC}"),
        ));
    }
    let version = r.u8("Calvin version")?;
    if version != CALVIN_VERSION {
        return Err(IngestError::VersionMismatch {
            path: r.path().to_path_buf(),
            format: "Calvin",
            expected: CALVIN_VERSION.to_string(),
            actual: i64::from(version),
        });
    }
    let n_groups = r.i32_be("data group count")?;
    let first_group_offset = r.u32_be("first data group offset")?;
    Ok(FileHeader {
        magic,
        version,
        n_groups,
        first_group_offset,
    })
}

fn read_data_header<R: Read>(r: &mut BinReader<R>, depth: usize) -> Result<DataHeader> {
    if depth > MAX_PARENT_DEPTH {
        return Err(IngestError::malformed(
            r.path(),
            None,
            "data header parents nested too deeply",
        ));
    }
    let data_type_id = r.prefixed_str_be("data type id")?;
    let file_id = r.prefixed_str_be("file id")?;
    let creation_time = r.wide_str_be("creation time")?;
    let locale = r.wide_str_be("locale")?;
    let params = read_triplets(r)?;
    let n_parents = r.i32_be("parent header count")?;
    let mut parents = Vec::new();
    for _ in 0..n_parents.max(0) {
        parents.push(read_data_header(r, depth + 1)?);
    }
    Ok(DataHeader {
        data_type_id,
        file_id,
        creation_time,
        locale,
        params,
        parents,
    })
}

fn read_triplets<R: Read>(r: &mut BinReader<R>) -> Result<Vec<NameValueTriplet>> {
    let n = r.i32_be("parameter count")?;
    let mut params = Vec::new();
    for _ in 0..n.max(0) {
        let name = r.wide_str_be("parameter name")?;
        let value = r.prefixed_bytes_be("parameter value")?;
        let mime_type = r.wide_str_be("parameter type")?;
        params.push(NameValueTriplet {
            name,
            value,
            mime_type,
        });
    }
    Ok(params)
}

fn read_group<R: Read + Seek>(r: &mut BinReader<R>) -> Result<DataGroup> {
    let next_group_offset = r.u32_be("next data group offset")?;
    let first_dataset_offset = r.u32_be("first data set offset")?;
    let n_datasets = r.i32_be("data set count")?;
    let name = r.wide_str_be("data group name")?;
    let mut datasets = Vec::new();
    let mut offset = u64::from(first_dataset_offset);
    for _ in 0..n_datasets.max(0) {
        r.seek_to(offset, "data set")?;
        let ds = read_dataset(r)?;
        offset = u64::from(ds.next_dataset_offset);
        datasets.push(ds);
    }
    Ok(DataGroup {
        next_group_offset,
        first_dataset_offset,
        name,
        datasets,
    })
}

fn read_dataset<R: Read + Seek>(r: &mut BinReader<R>) -> Result<DataSet> {
    let first_element_offset = r.u32_be("first element offset")?;
    let next_dataset_offset = r.u32_be("next data set offset")?;
    let name = r.wide_str_be("data set name")?;
    let params = read_triplets(r)?;
    let n_columns = r.u32_be("column count")?;
    let mut columns = Vec::new();
    for _ in 0..n_columns {
        let col_name = r.wide_str_be("column name")?;
        let code = r.u8("column type")?;
        let size = r.i32_be("column size")?;
        let kind = ColumnType::from_code(code).ok_or_else(|| {
            IngestError::malformed(
                r.path(),
                None,
                format!("column {col_name:?} has unknown type code {code}"),
            )
        })?;
        columns.push(ColumnSpec {
            name: col_name,
            kind,
            size,
        });
    }
    let n_rows = r.u32_be("row count")?;

    r.seek_to(u64::from(first_element_offset), "data set rows")?;
    let mut data: Vec<ColumnData> = columns
        .iter()
        .map(|c| ColumnData::with_capacity(c.kind, (n_rows as usize).min(1 << 20)))
        .collect();
    for _ in 0..n_rows {
        for (col, spec) in data.iter_mut().zip(&columns) {
            col.push(r, spec)?;
        }
    }
    Ok(DataSet {
        first_element_offset,
        next_dataset_offset,
        name,
        params,
        columns,
        n_rows,
        data,
    })
}
