//! Evaluation metrics.
//!
//! Small counters for observing how much work the memoised reads and the
//! cascading resets do. They are cumulative over the form's lifetime and are
//! printed by the CLI report.

use std::cell::Cell;

/// Snapshot of the evaluation counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EvalMetrics {
    /// Derived reads answered from the memo.
    pub memo_hits: u64,
    /// Derived reads that had to be computed.
    pub memo_misses: u64,
    /// Raw value writes, including the ones made by cascades.
    pub writes: u64,
    /// Settings reset to their computed default by a cascade.
    pub cascade_resets: u64,
    /// Re-entrant evaluations cut short (a setting whose condition reaches
    /// back to itself).
    pub cycles_broken: u64,
}

/// Interior-mutable counter cell, bumped from `&self` reads.
#[derive(Debug, Default)]
pub(crate) struct Counters(Cell<EvalMetrics>);

impl Counters {
    pub(crate) fn snapshot(&self) -> EvalMetrics {
        self.0.get()
    }

    fn bump(&self, f: impl FnOnce(&mut EvalMetrics)) {
        let mut m = self.0.get();
        f(&mut m);
        self.0.set(m);
    }

    pub(crate) fn hit(&self) {
        self.bump(|m| m.memo_hits += 1);
    }

    pub(crate) fn miss(&self) {
        self.bump(|m| m.memo_misses += 1);
    }

    pub(crate) fn write(&self) {
        self.bump(|m| m.writes += 1);
    }

    pub(crate) fn cascade_reset(&self) {
        self.bump(|m| m.cascade_resets += 1);
    }

    pub(crate) fn cycle(&self) {
        self.bump(|m| m.cycles_broken += 1);
    }
}
