//! Per-worker collection point for existence answers.
//!
//! Each swap in a batch knows in advance, via placeholder counting, exactly
//! how many existence messages it will receive. The tracker lays the
//! per-swap entry ranges out in one flat arena (prefix sums over the
//! expected counts), accepts multiplicity notifications from any worker
//! thread, and lets the owning swap block until its message count settles
//! before querying.

use std::{
    cell::UnsafeCell,
    sync::atomic::{AtomicU32, Ordering},
};

use crate::graph::Edge;

/// Counted existence answers for the swaps of one worker's batch window.
#[derive(Debug, Default)]
pub(super) struct ExistenceTracker {
    offsets: Vec<usize>,
    outstanding: Vec<AtomicU32>,
    written: Vec<AtomicU32>,
    entries: Vec<UnsafeCell<(Edge, u64)>>,
    expected: Vec<u32>,
}

// SAFETY: entry cells are written at most once each, at an index reserved by
// an atomic fetch_add, and only read after the owning position's outstanding
// counter (released by every writer) has been observed to reach zero.
unsafe impl Sync for ExistenceTracker {}

impl ExistenceTracker {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Starts collecting expected counts for a new batch window.
    pub(super) fn begin(&mut self, positions: usize) {
        self.expected.clear();
        self.expected.reserve(positions);
    }

    /// Declares how many answers the next position will receive.
    pub(super) fn expect(&mut self, count: u32) {
        self.expected.push(count);
    }

    /// Finalises the layout; the tracker may now receive answers.
    pub(super) fn finish_init(&mut self) {
        let positions = self.expected.len();
        self.offsets.clear();
        self.offsets.reserve(positions);
        let mut total = 0usize;
        for &count in &self.expected {
            self.offsets.push(total);
            total += count as usize;
        }
        self.outstanding = self.expected.iter().map(|&c| AtomicU32::new(c)).collect();
        self.written = (0..positions).map(|_| AtomicU32::new(0)).collect();
        self.entries = (0..total)
            .map(|_| UnsafeCell::new((Edge::INVALID, 0)))
            .collect();
    }

    /// Records that `edge` is present with `count` copies for the swap at
    /// `pos`. Callable from any worker thread.
    pub(super) fn push_exists(&self, pos: usize, edge: Edge, count: u64) {
        debug_assert!(count > 0);
        let index = self.offsets[pos] + self.written[pos].fetch_add(1, Ordering::AcqRel) as usize;
        debug_assert!(index - self.offsets[pos] < self.expected[pos] as usize);
        // SAFETY: the fetch_add reserved `index` exclusively; the release
        // decrement below publishes the write to the settled reader.
        unsafe {
            *self.entries[index].get() = (edge, count);
        }
        let before = self.outstanding[pos].fetch_sub(1, Ordering::Release);
        debug_assert!(before > 0);
    }

    /// Records a counted "does not exist" outcome for the swap at `pos`.
    pub(super) fn push_missing(&self, pos: usize) {
        let before = self.outstanding[pos].fetch_sub(1, Ordering::Release);
        debug_assert!(before > 0);
    }

    /// Blocks (yielding) until every expected answer for `pos` has arrived.
    pub(super) fn wait_settled(&self, pos: usize) {
        while self.outstanding[pos].load(Ordering::Acquire) != 0 {
            std::thread::yield_now();
        }
    }

    /// Returns the reported multiplicity of `edge` for the swap at `pos`,
    /// zero when nothing was reported.
    ///
    /// Valid after [`ExistenceTracker::wait_settled`] returned for `pos`.
    pub(super) fn count(&self, pos: usize, edge: Edge) -> u64 {
        let stored = self.written[pos].load(Ordering::Acquire) as usize;
        let start = self.offsets[pos];
        // SAFETY: all writes below `stored` happened before the settled
        // counter was observed; the cells are no longer mutated.
        (start..start + stored)
            .map(|i| unsafe { *self.entries[i].get() })
            .find(|(e, _)| *e == edge)
            .map_or(0, |(_, count)| count)
    }

    /// Returns whether any copy of `edge` was reported for the swap at `pos`.
    pub(super) fn exists(&self, pos: usize, edge: Edge) -> bool {
        self.count(pos, edge) > 0
    }
}
