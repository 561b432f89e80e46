//! Line scanning shared by the text CDF and text CEL decoders.

use crate::error::{IngestError, Result};
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Line reader that tracks line numbers and scans forward for keys.
pub struct LineCursor<R> {
    reader: R,
    path: PathBuf,
    raw: Vec<u8>,
    line: String,
    line_no: usize,
    replay: bool,
}

impl<R: BufRead> LineCursor<R> {
    pub fn new(reader: R, path: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            path: path.into(),
            raw: Vec::new(),
            line: String::new(),
            line_no: 0,
            replay: false,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 1-based number of the line most recently returned.
    #[must_use]
    pub fn line_no(&self) -> usize {
        self.line_no
    }

    /// Next line with trailing `\r`/`\n` removed, or `None` at end of file.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; vendor headers contain
    /// stray control bytes.
    pub fn next_line(&mut self) -> Result<Option<&str>> {
        if self.replay {
            self.replay = false;
            return Ok(Some(&self.line));
        }
        self.line.clear();
        self.raw.clear();
        let n = self
            .reader
            .read_until(b'\n', &mut self.raw)
            .map_err(|e| IngestError::from_io(&self.path, "line", e))?;
        if n == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        self.line.push_str(&String::from_utf8_lossy(&self.raw));
        let trimmed_len = self.line.trim_end_matches(['\r', '\n']).len();
        self.line.truncate(trimmed_len);
        Ok(Some(&self.line))
    }

    /// Return the current line again from the next [`Self::next_line`] call.
    pub fn unread(&mut self) {
        self.replay = true;
    }

    /// Advance to the next `[...]` header accepted by `accept`; returns the
    /// name between the brackets.
    ///
    /// # Errors
    ///
    /// [`IngestError::HeaderTruncated`] naming `what` if the file ends first.
    pub fn seek_section(&mut self, what: &str, accept: impl Fn(&str) -> bool) -> Result<String> {
        while let Some(line) = self.next_line()? {
            if let Some(name) = section_name(line)
                && accept(name)
            {
                return Ok(name.to_string());
            }
        }
        Err(IngestError::truncated(&self.path, what))
    }

    /// Collect the `key=value` lines of the current section.
    ///
    /// Stops before the next `[...]` header, at end of file, or right after the
    /// line whose key is `stop_key`.
    pub fn read_section(&mut self, name: &str, stop_key: Option<&str>) -> Result<Section> {
        let mut section = Section {
            name: name.to_string(),
            path: self.path.clone(),
            line_no: self.line_no,
            entries: Vec::new(),
        };
        while let Some(line) = self.next_line()? {
            if section_name(line).is_some() {
                self.unread();
                break;
            }
            let Some((key, value)) = split_key_value(line) else {
                continue;
            };
            let stop = stop_key == Some(key);
            section.entries.push((key.to_string(), value.to_string()));
            if stop {
                break;
            }
        }
        Ok(section)
    }

    /// Build a [`IngestError::Malformed`] pointing at the current line.
    pub fn error(&self, msg: impl Into<String>) -> IngestError {
        IngestError::malformed(&self.path, Some(self.line_no), msg)
    }
}

/// `key=value` pairs of one `[name]` section of an INI-like file.
#[derive(Clone, Debug)]
pub struct Section {
    name: String,
    path: PathBuf,
    line_no: usize,
    entries: Vec<(String, String)>,
}

impl Section {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value for `key`, required.
    ///
    /// # Errors
    ///
    /// [`IngestError::HeaderTruncated`] naming `[section] key` if absent.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| IngestError::truncated(&self.path, format!("[{}] {key}", self.name)))
    }

    /// Required value parsed as `T`.
    ///
    /// # Errors
    ///
    /// Missing keys are [`IngestError::HeaderTruncated`]; unparseable values are
    /// [`IngestError::Malformed`].
    pub fn parsed<T: std::str::FromStr>(&self, key: &str) -> Result<T> {
        let raw = self.require(key)?;
        raw.parse().map_err(|_| {
            IngestError::malformed(
                &self.path,
                Some(self.line_no),
                format!("[{}] {key}= has unparseable value {raw:?}", self.name),
            )
        })
    }
}

/// Name inside a `[...]` header line.
#[must_use]
pub fn section_name(line: &str) -> Option<&str> {
    line.trim().strip_prefix('[')?.strip_suffix(']')
}

/// Split a `key=value` line; whitespace around both halves is trimmed.
#[must_use]
pub fn split_key_value(line: &str) -> Option<(&str, &str)> {
    let (k, v) = line.split_once('=')?;
    Some((k.trim(), v.trim()))
}
