//! Merged view over a sorted run and a cross-batch message queue.
//!
//! Engine phases deliver most messages through a sorter filled before the
//! batched loop starts; messages created *during* the loop always target a
//! later batch and travel through a priority queue instead. This merger
//! presents both as one stream that is globally ordered up to the current
//! batch bound. Worker threads stage queue pushes in per-worker buffers so
//! the parallel region never contends on the heap; `end_batch` folds the
//! buffers in before the next window opens.

use std::sync::Mutex;

use crate::em::{EmError, MessageQueue, Record, Sorter};

/// A sorter and a message queue merged into one bounded, in-order stream.
pub struct PqSorterMerger<T: Record + Ord> {
    sorter: Sorter<T>,
    queue: MessageQueue<T>,
    staged: Vec<Mutex<Vec<T>>>,
    bound: Option<T>,
}

impl<T: Record + Ord + Copy> PqSorterMerger<T> {
    /// Creates a merger with per-worker staging for `num_workers` threads.
    ///
    /// # Errors
    /// Fails when the sorter budget cannot hold one record.
    pub fn new(num_workers: usize, sorter_mem: usize, queue_mem: usize) -> Result<Self, EmError> {
        Ok(Self {
            sorter: Sorter::new(sorter_mem)?,
            queue: MessageQueue::new(queue_mem),
            staged: (0..num_workers).map(|_| Mutex::new(Vec::new())).collect(),
            bound: None,
        })
    }

    /// Adds a message to the sorted bulk input. Only valid before
    /// [`PqSorterMerger::finish_sorter_input`].
    ///
    /// # Errors
    /// Propagates spill failures.
    pub fn push_sorter(&mut self, message: T) -> Result<(), EmError> {
        self.sorter.push(message)
    }

    /// Seals and sorts the bulk input.
    ///
    /// # Errors
    /// Propagates spill failures.
    pub fn finish_sorter_input(&mut self) -> Result<(), EmError> {
        self.sorter.sort()
    }

    /// Opens a batch window: `peek`/`advance` now deliver messages strictly
    /// below `bound`.
    pub fn start_batch(&mut self, bound: T) {
        self.bound = Some(bound);
    }

    /// Returns the smallest undelivered message inside the window.
    #[must_use]
    pub fn peek(&self) -> Option<T> {
        let front = match (self.sorter.peek(), self.queue.peek()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }?;
        match self.bound {
            Some(bound) if front >= bound => None,
            _ => Some(front),
        }
    }

    /// Consumes the message returned by [`PqSorterMerger::peek`].
    ///
    /// # Errors
    /// Propagates read failures from spilled runs.
    pub fn advance(&mut self) -> Result<(), EmError> {
        match (self.sorter.peek(), self.queue.peek()) {
            (Some(a), Some(b)) if b < a => {
                self.queue.pop();
            }
            (Some(_), _) => self.sorter.advance()?,
            (None, Some(_)) => {
                self.queue.pop();
            }
            (None, None) => {}
        }
        Ok(())
    }

    /// Stages a message for a later batch on worker `tid`'s buffer.
    ///
    /// The message key must be at or beyond the current window bound, so the
    /// already-delivered prefix stays sorted.
    pub fn push_pq(&self, tid: usize, message: T) {
        debug_assert!(
            self.bound.as_ref().is_none_or(|b| message >= *b),
            "cross-batch message must target a later window"
        );
        self.staged[tid]
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(message);
    }

    /// Closes the window and folds all staged messages into the queue.
    pub fn end_batch(&mut self) {
        self.bound = None;
        for slot in &self.staged {
            let mut staged = slot
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            for message in staged.drain(..) {
                self.queue.push(message);
            }
        }
    }

    /// Restarts the sorted bulk input from its first record, keeping queued
    /// cross-batch messages.
    ///
    /// # Errors
    /// Propagates seek failures from spilled runs.
    pub fn rewind_sorter(&mut self) -> Result<(), EmError> {
        self.sorter.rewind()
    }

    /// Drops all state and returns the bulk input to its push phase.
    pub fn clear(&mut self) {
        self.sorter.clear();
        self.queue.clear();
        for slot in &self.staged {
            slot.lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clear();
        }
        self.bound = None;
    }
}

#[cfg(test)]
mod tests {
    use super::PqSorterMerger;

    fn drain(merger: &mut PqSorterMerger<u64>) -> Vec<u64> {
        let mut out = Vec::new();
        while let Some(x) = merger.peek() {
            out.push(x);
            merger.advance().expect("advance");
        }
        out
    }

    #[test]
    fn window_bounds_delivery_and_carries_pushes_forward() {
        let mut merger = PqSorterMerger::<u64>::new(1, 4096, 4096).expect("new");
        for x in [2u64, 8, 5] {
            merger.push_sorter(x).expect("push");
        }
        merger.finish_sorter_input().expect("sort");

        merger.start_batch(6);
        assert_eq!(drain(&mut merger), vec![2, 5]);
        merger.push_pq(0, 7);
        merger.end_batch();

        merger.start_batch(u64::MAX);
        assert_eq!(drain(&mut merger), vec![7, 8]);
        merger.end_batch();
    }

    #[test]
    fn rewound_sorter_replays_with_new_queue_content() {
        let mut merger = PqSorterMerger::<u64>::new(2, 4096, 4096).expect("new");
        merger.push_sorter(3).expect("push");
        merger.push_sorter(1).expect("push");
        merger.finish_sorter_input().expect("sort");

        merger.start_batch(u64::MAX);
        assert_eq!(drain(&mut merger), vec![1, 3]);
        merger.end_batch();

        merger.rewind_sorter().expect("rewind");
        merger.start_batch(u64::MAX);
        merger.end_batch();
        merger.start_batch(u64::MAX);
        assert_eq!(drain(&mut merger), vec![1, 3]);
    }
}
