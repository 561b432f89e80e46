//! Numeric column store contract.
//!
//! The assembler writes one column per intensity file and one row per chip
//! cell. A store only has to accept `set_row_count`, `append_column` and
//! `write`; [`DenseColumnStore`] is the in-memory implementation used by tests
//! and the command-line tool.

use crate::cel::CellSink;
use serde::Serialize;

/// Opaque handle to a column returned by [`ColumnStore::append_column`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ColumnHandle(usize);

impl ColumnHandle {
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position of the column in append order.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Receiver of decoded intensities.
pub trait ColumnStore {
    /// Fix the number of rows (chip cells) every column holds.
    fn set_row_count(&mut self, rows: usize);
    /// Add an empty column and return its handle.
    fn append_column(&mut self) -> ColumnHandle;
    /// Store one value.
    fn write(&mut self, column: ColumnHandle, row: usize, value: f64);
}

/// Column-major in-memory store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DenseColumnStore {
    n_rows: usize,
    columns: Vec<Vec<f64>>,
}

impl DenseColumnStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[must_use]
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Value at `(row, col)`, if both are in range.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.columns.get(col)?.get(row).copied()
    }

    #[must_use]
    pub fn column(&self, handle: ColumnHandle) -> Option<&[f64]> {
        self.columns.get(handle.index()).map(Vec::as_slice)
    }

    pub fn columns(&self) -> impl Iterator<Item = &[f64]> {
        self.columns.iter().map(Vec::as_slice)
    }
}

impl ColumnStore for DenseColumnStore {
    fn set_row_count(&mut self, rows: usize) {
        self.n_rows = rows;
        for col in &mut self.columns {
            col.resize(rows, 0.0);
        }
    }

    fn append_column(&mut self) -> ColumnHandle {
        self.columns.push(vec![0.0; self.n_rows]);
        ColumnHandle(self.columns.len() - 1)
    }

    fn write(&mut self, column: ColumnHandle, row: usize, value: f64) {
        if let Some(slot) = self
            .columns
            .get_mut(column.index())
            .and_then(|c| c.get_mut(row))
        {
            *slot = value;
        }
    }
}

/// Adapts one column of a store to the decoders' [`CellSink`].
pub struct ColumnWriter<'a, S: ColumnStore + ?Sized> {
    store: &'a mut S,
    column: ColumnHandle,
}

impl<'a, S: ColumnStore + ?Sized> ColumnWriter<'a, S> {
    pub fn new(store: &'a mut S, column: ColumnHandle) -> Self {
        Self { store, column }
    }
}

impl<S: ColumnStore + ?Sized> CellSink for ColumnWriter<'_, S> {
    fn set(&mut self, index: usize, value: f64) {
        self.store.write(self.column, index, value);
    }
}
