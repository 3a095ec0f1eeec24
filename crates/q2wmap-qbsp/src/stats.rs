// stats.rs — winding allocation counters
//
// Shared by every winding derived from a tracked one, across worker threads.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct WindingStats {
    active: AtomicUsize,
    peak: AtomicUsize,
    allocs: AtomicUsize,
    removed_points: AtomicUsize,
}

impl WindingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn alloc(&self) {
        let now = self.active.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak.fetch_max(now, Ordering::Relaxed);
        self.allocs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn free(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn removed(&self, count: usize) {
        self.removed_points.fetch_add(count, Ordering::Relaxed);
    }

    /// Windings currently alive.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Most windings alive at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    pub fn allocs(&self) -> usize {
        self.allocs.load(Ordering::Relaxed)
    }

    /// Points dropped by colinear removal.
    pub fn removed_points(&self) -> usize {
        self.removed_points.load(Ordering::Relaxed)
    }

    pub fn report(&self) {
        tracing::info!(
            active = self.active(),
            peak = self.peak(),
            allocs = self.allocs(),
            removed_points = self.removed_points(),
            "winding stats"
        );
    }
}
