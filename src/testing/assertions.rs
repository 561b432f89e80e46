//! Assertion functions for decoded chip descriptions and intensity columns.

use super::fixtures::{ChipLayout, IndexContents};
use crate::chip::ChipDescription;
use crate::index::ProbeLocationIndex;

/// Flatten an index into comparable form.
#[must_use]
pub fn index_contents(index: &ProbeLocationIndex) -> IndexContents {
    index
        .iter()
        .map(|set| {
            (
                set.name().to_string(),
                (set.pm().to_vec(), set.mm().map(<[usize]>::to_vec)),
            )
        })
        .collect()
}

/// Assert that two indices hold the same probe sets with the same cells.
///
/// # Panics
///
/// Panics naming the first probe set that is missing, extra or different.
pub fn assert_indices_equal(actual: &ProbeLocationIndex, expected: &ProbeLocationIndex) {
    assert_contents_equal(&index_contents(actual), &index_contents(expected));
}

/// Assert that a decoded description matches the layout it was encoded from.
///
/// The chip type is not compared because some formats derive it from the
/// file name.
///
/// # Panics
///
/// Panics if geometry or any probe set differs.
pub fn assert_chip_matches_layout(chip: &ChipDescription, layout: &ChipLayout) {
    assert_eq!(
        chip.geometry, layout.geometry,
        "Geometry mismatch:\n  Expected: {}\n  Actual: {}",
        layout.geometry, chip.geometry
    );
    assert!(chip.index.is_balanced(), "decoded index is not balanced");
    assert_contents_equal(&index_contents(&chip.index), &layout.expected_index());
}

fn assert_contents_equal(actual: &IndexContents, expected: &IndexContents) {
    for (name, cells) in expected {
        match actual.get(name) {
            None => panic!("Probe set {name:?} missing from index"),
            Some(found) => assert_eq!(
                found, cells,
                "Probe set {name:?} differs:\n  Expected (pm, mm): {cells:?}\n  Actual (pm, mm): {found:?}"
            ),
        }
    }
    if let Some(extra) = actual.keys().find(|k| !expected.contains_key(*k)) {
        panic!("Unexpected probe set {extra:?} in index");
    }
}

/// Assert two intensity vectors are equal value for value.
///
/// # Panics
///
/// Panics at the first differing cell.
pub fn assert_intensities_equal(actual: &[f64], expected: &[f64]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "Intensity length mismatch:\n  Expected: {}\n  Actual: {}",
        expected.len(),
        actual.len()
    );
    if let Some(i) = (0..actual.len()).find(|&i| actual[i].to_bits() != expected[i].to_bits()) {
        panic!(
            "Intensity mismatch at cell {i}:\n  Expected: {}\n  Actual: {}",
            expected[i], actual[i]
        );
    }
}
