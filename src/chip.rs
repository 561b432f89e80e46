//! Chip geometry and the decoded chip description.

use crate::index::{ProbeCellSet, ProbeLocationIndex};
use crate::sniff::FileFormat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest chip accepted, in cells. Current arrays have under ten million.
pub const MAX_CELLS: usize = 1 << 26;

/// Physical chip dimensions shared by a chip description and every array in a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChipGeometry {
    pub rows: usize,
    pub cols: usize,
}

impl ChipGeometry {
    /// Build a geometry, rejecting empty dimensions and chips of more than
    /// [`MAX_CELLS`] cells.
    #[must_use]
    pub fn new(rows: usize, cols: usize) -> Option<Self> {
        let cells = rows.checked_mul(cols)?;
        (cells > 0 && cells <= MAX_CELLS).then_some(Self { rows, cols })
    }

    /// Number of cells on the chip (`rows * cols`).
    #[must_use]
    pub const fn n_cells(&self) -> usize {
        self.rows * self.cols
    }

    /// Linear cell index for the cell at `(x, y)`: `x + rows * y`.
    #[must_use]
    pub const fn cell_index(&self, x: usize, y: usize) -> usize {
        x + self.rows * y
    }

    /// Linear index of `(x, y)` if the cell lies on the chip and the index is
    /// below [`Self::n_cells`]. Non-square chips can fail the second test.
    #[must_use]
    pub const fn checked_cell_index(&self, x: usize, y: usize) -> Option<usize> {
        if !self.contains(x, y) {
            return None;
        }
        let idx = self.cell_index(x, y);
        if idx < self.n_cells() { Some(idx) } else { None }
    }

    /// True when `(x, y)` lies on the chip.
    #[must_use]
    pub const fn contains(&self, x: usize, y: usize) -> bool {
        x < self.cols && y < self.rows
    }
}

impl fmt::Display for ChipGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rows x {} cols", self.rows, self.cols)
    }
}

/// Everything a chip-description decoder produces.
///
/// A `ChipDescription` only exists once a decode has completed; decoders build
/// the index privately and hand it over whole.
#[derive(Debug)]
pub struct ChipDescription {
    /// Primary chip type name (e.g. `HG-U133A`).
    pub chip_type: String,
    /// Additional accepted chip type names (RME version 3 caches list several).
    pub aliases: Vec<String>,
    /// Free-text description strings carried by RME version 3 caches.
    pub descriptions: Vec<String>,
    pub geometry: ChipGeometry,
    pub index: ProbeLocationIndex,
    /// Wire format the description was decoded from.
    pub format: FileFormat,
    /// Number of QC units declared by the file (not indexed).
    pub qc_units: usize,
}

impl ChipDescription {
    /// Case-insensitive match against the primary name and every alias.
    #[must_use]
    pub fn matches_chip_type(&self, name: &str) -> bool {
        std::iter::once(&self.chip_type)
            .chain(self.aliases.iter())
            .any(|known| known.eq_ignore_ascii_case(name))
    }

    /// Look up a probe set by exact name.
    #[must_use]
    pub fn probe_set(&self, name: &str) -> Option<&ProbeCellSet> {
        self.index.find(name)
    }

    /// Number of indexed probe sets.
    #[must_use]
    pub fn n_probe_sets(&self) -> usize {
        self.index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_index_uses_row_stride() {
        let g = ChipGeometry::new(100, 100).unwrap();
        assert_eq!(g.cell_index(5, 10), 1005);
        assert_eq!(g.n_cells(), 10_000);
        assert!(g.contains(99, 99));
        assert!(!g.contains(100, 0));
        assert_eq!(g.checked_cell_index(5, 10), Some(1005));
        assert_eq!(g.checked_cell_index(100, 0), None);
    }

    #[test]
    fn test_checked_index_on_tall_chip() {
        let g = ChipGeometry::new(3, 1).unwrap();
        assert_eq!(g.checked_cell_index(0, 0), Some(0));
        assert_eq!(g.checked_cell_index(0, 2), None);
    }

    #[test]
    fn test_empty_geometry_rejected() {
        assert!(ChipGeometry::new(0, 10).is_none());
        assert!(ChipGeometry::new(10, 0).is_none());
    }

    #[test]
    fn test_oversized_geometry_rejected() {
        assert!(ChipGeometry::new(8192, 8192).is_some());
        assert!(ChipGeometry::new(8192, 8193).is_none());
        assert!(ChipGeometry::new(usize::MAX, 2).is_none());
        assert!(ChipGeometry::new(i32::MAX as usize, i32::MAX as usize).is_none());
    }
}
