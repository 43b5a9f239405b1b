//! Per-swap hand-off slots for the batched parallel regions.
//!
//! Within a batch, a swap side's state is produced exactly once (by the
//! single-threaded hydrator before the parallel region, or by the unique
//! predecessor swap during it) and consumed only by the owning swap after
//! the per-side ready flag is observed. Publication is a release store of
//! the flag after the payload is written; consumption is an acquire spin
//! with a scheduler yield, mirroring the dependency structure in which a
//! predecessor always carries a smaller swap id and therefore finishes.

use std::{
    cell::UnsafeCell,
    sync::atomic::{AtomicBool, Ordering},
};

use crate::graph::Edge;

fn spin_until(flag: &AtomicBool) {
    while !flag.load(Ordering::Acquire) {
        std::thread::yield_now();
    }
}

/// A swap side's full configuration set: one primary edge plus any forwarded
/// alternatives, both published together.
#[derive(Debug)]
pub(super) struct StateSlot {
    ready: [AtomicBool; 2],
    primary: [UnsafeCell<Edge>; 2],
    extras: [UnsafeCell<Vec<Edge>>; 2],
}

// SAFETY: each (slot, side) has exactly one writer per batch, and readers
// only dereference the cells after observing the release-stored ready flag.
unsafe impl Sync for StateSlot {}

impl StateSlot {
    pub(super) fn new() -> Self {
        Self {
            ready: [AtomicBool::new(false), AtomicBool::new(false)],
            primary: [
                UnsafeCell::new(Edge::INVALID),
                UnsafeCell::new(Edge::INVALID),
            ],
            extras: [UnsafeCell::new(Vec::new()), UnsafeCell::new(Vec::new())],
        }
    }

    /// Clears both sides. Requires exclusive access (between batches).
    pub(super) fn reset(&mut self) {
        for side in 0..2 {
            *self.ready[side].get_mut() = false;
            *self.primary[side].get_mut() = Edge::INVALID;
            self.extras[side].get_mut().clear();
        }
    }

    /// Hydrator-side write of the primary configuration. Exclusive access.
    pub(super) fn set_primary(&mut self, side: usize, edge: Edge) {
        *self.primary[side].get_mut() = edge;
    }

    /// Hydrator-side append of an alternative configuration. Exclusive access.
    pub(super) fn push_extra(&mut self, side: usize, edge: Edge) {
        self.extras[side].get_mut().push(edge);
    }

    /// Hydrator-side publication. Exclusive access; the hand-off to the
    /// parallel region synchronises the payload.
    pub(super) fn mark_ready(&mut self, side: usize) {
        *self.ready[side].get_mut() = true;
    }

    /// Publishes a forwarded configuration set from a predecessor swap.
    ///
    /// `edges` must be sorted, duplicate-free and non-empty; the first entry
    /// becomes the primary configuration.
    pub(super) fn publish(&self, side: usize, edges: &[Edge]) {
        debug_assert!(!edges.is_empty());
        debug_assert!(edges.windows(2).all(|w| w[0] < w[1]));
        debug_assert!(!self.ready[side].load(Ordering::Relaxed));
        // SAFETY: this thread is the side's unique writer for the batch and
        // no reader dereferences before the release store below.
        unsafe {
            *self.primary[side].get() = edges[0];
            let extras = &mut *self.extras[side].get();
            extras.clear();
            extras.extend_from_slice(&edges[1..]);
        }
        self.ready[side].store(true, Ordering::Release);
    }

    /// Blocks (yielding) until the side's configuration is published.
    pub(super) fn wait_ready(&self, side: usize) {
        spin_until(&self.ready[side]);
    }

    /// Appends the side's configurations to `out` in ascending order.
    ///
    /// Callers must have observed [`StateSlot::wait_ready`] for the side.
    pub(super) fn collect(&self, side: usize, out: &mut Vec<Edge>) {
        debug_assert!(self.ready[side].load(Ordering::Relaxed));
        // SAFETY: the acquire load in wait_ready ordered these cells before
        // us, and no writer touches them again within the batch.
        unsafe {
            out.push(*self.primary[side].get());
            out.extend_from_slice(&*self.extras[side].get());
        }
    }
}

/// A swap's two final source edges for the execution phase, published
/// independently per side.
#[derive(Debug)]
pub(super) struct SourceSlot {
    ready: [AtomicBool; 2],
    edge: [UnsafeCell<Edge>; 2],
}

// SAFETY: same single-writer / flag-gated-reader protocol as `StateSlot`.
unsafe impl Sync for SourceSlot {}

impl SourceSlot {
    pub(super) fn new() -> Self {
        Self {
            ready: [AtomicBool::new(false), AtomicBool::new(false)],
            edge: [
                UnsafeCell::new(Edge::INVALID),
                UnsafeCell::new(Edge::INVALID),
            ],
        }
    }

    /// Clears both sides. Requires exclusive access (between batches).
    pub(super) fn reset(&mut self) {
        for side in 0..2 {
            *self.ready[side].get_mut() = false;
            *self.edge[side].get_mut() = Edge::INVALID;
        }
    }

    /// Hydrator-side write. Exclusive access.
    pub(super) fn set(&mut self, side: usize, edge: Edge) {
        *self.edge[side].get_mut() = edge;
        *self.ready[side].get_mut() = true;
    }

    /// Publishes the side's final source edge from a predecessor swap.
    pub(super) fn publish(&self, side: usize, edge: Edge) {
        debug_assert!(!self.ready[side].load(Ordering::Relaxed));
        // SAFETY: unique writer for this (slot, side) within the batch;
        // readers gate on the release store below.
        unsafe {
            *self.edge[side].get() = edge;
        }
        self.ready[side].store(true, Ordering::Release);
    }

    /// Blocks (yielding) until the side is published, then returns the edge.
    pub(super) fn wait(&self, side: usize) -> Edge {
        spin_until(&self.ready[side]);
        // SAFETY: ordered by the acquire load in spin_until.
        unsafe { *self.edge[side].get() }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::graph::Edge;

    use super::{SourceSlot, StateSlot};

    #[test]
    fn state_slot_round_trips_hydrated_configuration() {
        let mut slot = StateSlot::new();
        slot.set_primary(0, Edge::new(1, 2));
        slot.push_extra(0, Edge::new(3, 4));
        slot.mark_ready(0);
        slot.wait_ready(0);
        let mut edges = Vec::new();
        slot.collect(0, &mut edges);
        assert_eq!(edges, vec![Edge::new(1, 2), Edge::new(3, 4)]);

        slot.reset();
        slot.publish(1, &[Edge::new(5, 6)]);
        let mut edges = Vec::new();
        slot.wait_ready(1);
        slot.collect(1, &mut edges);
        assert_eq!(edges, vec![Edge::new(5, 6)]);
    }

    #[test]
    fn source_slot_hands_edge_across_threads() {
        let slot = SourceSlot::new();
        let started = AtomicBool::new(false);
        std::thread::scope(|scope| {
            scope.spawn(|| {
                while !started.load(Ordering::Acquire) {
                    std::thread::yield_now();
                }
                slot.publish(1, Edge::new(8, 9));
            });
            started.store(true, Ordering::Release);
            assert_eq!(slot.wait(1), Edge::new(8, 9));
        });
    }
}
