//! Pre-built chip layouts and scratch directories for tests.

use crate::chip::ChipGeometry;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Expected contents of a decoded index: name to `(pm, mm)` linear indices.
pub type IndexContents = BTreeMap<String, (Vec<usize>, Option<Vec<usize>>)>;

/// One probe set of a [`ChipLayout`], as `(x, y)` coordinates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeSetLayout {
    pub name: String,
    pub pm: Vec<(usize, usize)>,
    pub mm: Vec<(usize, usize)>,
}

/// A chip description in coordinate form, encodable into every CDF format.
///
/// # Example
///
/// ```
/// use affyingest::testing::ChipLayout;
///
/// let layout = ChipLayout::new("Test3", 100, 100)
///     .probe_set("AFFX-1", &[(5, 0), (5, 10)], &[(6, 0), (6, 10)]);
/// let expected = layout.expected_index();
/// assert_eq!(expected["AFFX-1"].0, vec![5, 1005]);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChipLayout {
    pub chip_type: String,
    pub geometry: ChipGeometry,
    pub probe_sets: Vec<ProbeSetLayout>,
}

impl ChipLayout {
    /// Empty layout.
    ///
    /// # Panics
    ///
    /// Panics if either dimension is zero.
    #[must_use]
    pub fn new(chip_type: &str, rows: usize, cols: usize) -> Self {
        Self {
            chip_type: chip_type.to_string(),
            geometry: ChipGeometry::new(rows, cols).expect("fixture dimensions must be non-zero"),
            probe_sets: Vec::new(),
        }
    }

    /// Append a probe set. PM cells are encoded with complementary bases and
    /// MM cells with equal bases.
    #[must_use]
    pub fn probe_set(mut self, name: &str, pm: &[(usize, usize)], mm: &[(usize, usize)]) -> Self {
        self.probe_sets.push(ProbeSetLayout {
            name: name.to_string(),
            pm: pm.to_vec(),
            mm: mm.to_vec(),
        });
        self
    }

    /// The index a correct decoder produces for this layout.
    #[must_use]
    pub fn expected_index(&self) -> IndexContents {
        let g = self.geometry;
        let linear = |cells: &[(usize, usize)]| -> Vec<usize> {
            cells.iter().map(|&(x, y)| g.cell_index(x, y)).collect()
        };
        self.probe_sets
            .iter()
            .map(|set| {
                let mm = (!set.mm.is_empty()).then(|| linear(&set.mm));
                (set.name.clone(), (linear(&set.pm), mm))
            })
            .collect()
    }

    /// Deterministic intensities for one array, indexed by linear cell index.
    ///
    /// Every value is a multiple of 0.5 below 4096, so it survives a round
    /// trip through `f32` and through text formatting.
    #[must_use]
    pub fn intensities(&self, seed: usize) -> Vec<f64> {
        (0..self.geometry.n_cells())
            .map(|i| ((i * 37 + seed * 101) % 4096) as f64 + 0.5)
            .collect()
    }
}

/// A small square chip with five probe sets.
///
/// Covers multi-cell PM/MM pairs, a PM-only set, an asymmetric set and cells
/// in the last row and column.
#[must_use]
pub fn sample_layout() -> ChipLayout {
    ChipLayout::new("Test3", 20, 20)
        .probe_set(
            "AFFX-BioB-5_at",
            &[(0, 0), (1, 0), (2, 0)],
            &[(0, 1), (1, 1), (2, 1)],
        )
        .probe_set("1007_s_at", &[(3, 2), (4, 2)], &[(3, 3), (4, 3)])
        .probe_set("1053_at", &[(5, 4), (6, 4), (7, 4)], &[])
        .probe_set("117_at", &[(8, 5)], &[(9, 6), (10, 6)])
        .probe_set("121_at", &[(19, 19)], &[(18, 19)])
}

/// A temporary directory that is removed on drop.
#[derive(Debug)]
pub struct FixtureDir {
    dir: TempDir,
}

impl FixtureDir {
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new().context("create fixture directory")?,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of `name` inside the directory.
    #[must_use]
    pub fn join(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}
