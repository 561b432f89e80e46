//! Progress reporting for long chip-description loads.
//!
//! Decoders call [`ProgressSink::on_unit_processed`] once per unit. Any
//! `Fn(usize, usize)` closure is a sink:
//!
//! ```
//! use affyingest::progress::ProgressSink;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let seen = AtomicUsize::new(0);
//! let sink = |_index: usize, _total: usize| {
//!     seen.fetch_add(1, Ordering::Relaxed);
//! };
//! sink.on_unit_processed(0, 10);
//! assert_eq!(seen.load(Ordering::Relaxed), 1);
//! ```

/// Receives one call per decoded unit; `index` is 0-based.
pub trait ProgressSink: Send + Sync {
    fn on_unit_processed(&self, index: usize, total: usize);
}

/// Sink that ignores all progress.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_unit_processed(&self, _index: usize, _total: usize) {}
}

impl<F> ProgressSink for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn on_unit_processed(&self, index: usize, total: usize) {
        self(index, total);
    }
}
