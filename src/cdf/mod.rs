//! Chip-description (CDF) decoding.
//!
//! [`load_chip_description`] sniffs a file and dispatches to one of four
//! decoders. Each decoder builds a private [`ProbeLocationIndex`] and hands
//! back a finished [`ChipDescription`]; a failure anywhere discards the partial
//! index.
//!
//! Cells are split into perfect-match and mismatch lists by
//! [`classify_cell`]. Coordinates are converted to linear indices with
//! [`ChipGeometry::checked_cell_index`] and must lie on the chip.

pub mod calvin;
pub mod rme;
pub mod text;
pub mod xda;

use crate::chip::{ChipDescription, ChipGeometry, MAX_CELLS};
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::index::ProbeLocationIndex;
use crate::progress::ProgressSink;
use crate::sniff::{FileFormat, FileKind, open_and_sniff};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

pub use rme::{write_rme_cdf, write_rme_cdf_version};

/// Whether a probe cell measures the target or its mismatch control.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CellKind {
    PerfectMatch,
    Mismatch,
}

/// Classify a cell from its probe base and target base.
///
/// A cell is [`CellKind::PerfectMatch`] only when the bases are a Watson-Crick
/// pair (A/T or C/G, either order, any case). Equal bases and anything else are
/// [`CellKind::Mismatch`].
#[must_use]
pub fn classify_cell(pbase: char, tbase: char) -> CellKind {
    let pair = (pbase.to_ascii_uppercase(), tbase.to_ascii_uppercase());
    match pair {
        ('A', 'T') | ('T', 'A') | ('C', 'G') | ('G', 'C') => CellKind::PerfectMatch,
        _ => CellKind::Mismatch,
    }
}

/// Collects one probe set's cells as they are decoded.
#[derive(Debug)]
pub(crate) struct ProbeSetBuilder {
    name: String,
    pm: Vec<usize>,
    mm: Vec<usize>,
}

impl ProbeSetBuilder {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pm: Vec::new(),
            mm: Vec::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Bounds-check `(x, y)` and file the cell under PM or MM.
    pub(crate) fn push_cell(
        &mut self,
        geometry: ChipGeometry,
        x: usize,
        y: usize,
        pbase: char,
        tbase: char,
        path: &Path,
    ) -> Result<()> {
        let Some(idx) = geometry.checked_cell_index(x, y) else {
            return Err(IngestError::malformed(
                path,
                None,
                format!(
                    "probe set {}: cell ({x}, {y}) lies outside the {geometry} chip",
                    self.name
                ),
            ));
        };
        match classify_cell(pbase, tbase) {
            CellKind::PerfectMatch => self.pm.push(idx),
            CellKind::Mismatch => self.mm.push(idx),
        }
        Ok(())
    }
}

/// Owns the index while a decoder runs; [`Self::finish`] publishes it.
pub(crate) struct IndexBuilder {
    path: PathBuf,
    index: ProbeLocationIndex,
}

impl IndexBuilder {
    pub(crate) fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            index: ProbeLocationIndex::new(),
        }
    }

    pub(crate) fn add(&mut self, set: ProbeSetBuilder) -> Result<()> {
        let mm = (!set.mm.is_empty()).then_some(set.mm);
        self.add_indices(set.name, set.pm, mm)
    }

    /// Insert pre-computed linear indices; each must be below `n_cells`.
    pub(crate) fn add_indices(
        &mut self,
        name: String,
        pm: Vec<usize>,
        mm: Option<Vec<usize>>,
    ) -> Result<()> {
        self.index
            .insert(name, pm, mm)
            .map_err(|dup| IngestError::DuplicateProbeSet {
                path: self.path.clone(),
                name: dup.0,
            })
    }

    pub(crate) fn finish(
        self,
        chip_type: String,
        geometry: ChipGeometry,
        format: FileFormat,
    ) -> ChipDescription {
        ChipDescription {
            chip_type,
            aliases: Vec::new(),
            descriptions: Vec::new(),
            geometry,
            index: self.index,
            format,
            qc_units: 0,
        }
    }
}

/// Validate declared dimensions: both positive, at most [`MAX_CELLS`] cells.
pub(crate) fn geometry_from(path: &Path, rows: i64, cols: i64) -> Result<ChipGeometry> {
    let to_dim = |v: i64| usize::try_from(v).ok();
    to_dim(rows)
        .zip(to_dim(cols))
        .and_then(|(r, c)| ChipGeometry::new(r, c))
        .ok_or_else(|| {
            IngestError::malformed(
                path,
                None,
                format!("invalid chip dimensions {rows} x {cols} (limit {MAX_CELLS} cells)"),
            )
        })
}

/// Sniff and decode a chip description.
///
/// # Errors
///
/// Any sniffing, I/O or decoding failure; no partial description is returned.
pub fn load_chip_description(
    path: &Path,
    config: &IngestConfig,
    progress: &dyn ProgressSink,
) -> Result<ChipDescription> {
    let started = Instant::now();
    let (format, source) = open_and_sniff(path, FileKind::ChipDescription, config.decompress)?;
    let chip = match format {
        FileFormat::Text => text::decode(source, path, progress)?,
        FileFormat::BinaryXda => xda::decode(source, path, progress)?,
        FileFormat::Calvin => calvin::decode(source, path, progress)?,
        FileFormat::RmeCache => rme::decode(source, path, progress)?,
    };
    info!(
        path = %path.display(),
        %format,
        chip_type = %chip.chip_type,
        probe_sets = chip.n_probe_sets(),
        geometry = %chip.geometry,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "loaded chip description"
    );
    Ok(chip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complement_pairs_are_perfect_match() {
        assert_eq!(classify_cell('a', 'T'), CellKind::PerfectMatch);
        assert_eq!(classify_cell('G', 'c'), CellKind::PerfectMatch);
        assert_eq!(classify_cell('A', 'A'), CellKind::Mismatch);
        assert_eq!(classify_cell('N', 'A'), CellKind::Mismatch);
    }

    #[test]
    fn test_out_of_bounds_cell_rejected() {
        let g = ChipGeometry::new(10, 10).unwrap();
        let mut b = ProbeSetBuilder::new("p");
        assert!(b.push_cell(g, 9, 9, 'T', 'A', Path::new("x")).is_ok());
        assert!(b.push_cell(g, 10, 0, 'T', 'A', Path::new("x")).is_err());
    }

    #[test]
    fn test_declared_dimensions_bounded() {
        let p = Path::new("x.cdf");
        assert!(geometry_from(p, 712, 712).is_ok());
        assert!(geometry_from(p, -1, 712).is_err());
        assert!(geometry_from(p, i64::from(i32::MAX), i64::from(i32::MAX)).is_err());
        assert!(matches!(
            geometry_from(p, 1 << 20, 1 << 20),
            Err(IngestError::Malformed { .. })
        ));
    }
}
