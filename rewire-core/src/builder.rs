//! Builder utilities for configuring the swap engine.
//!
//! Exposes the memory budgets, worker count and batching knobs, and
//! validates them before constructing [`SwapEngine`] instances.

use crate::{
    EngineError, Result,
    engine::{EngineConfig, SwapEngine},
    graph::EdgeSequence,
};

/// Default sorter budget: 64 MiB per sorter.
pub const DEFAULT_SORTER_MEM: usize = 64 << 20;

/// Default priority-queue budget: 32 MiB.
pub const DEFAULT_PQ_MEM: usize = 32 << 20;

/// Default priority-queue pool budget: 16 MiB.
pub const DEFAULT_PQ_POOL_MEM: usize = 16 << 20;

/// Default inner batch window per worker.
pub const DEFAULT_BATCH_SIZE_PER_THREAD: usize = 1 << 20;

/// Widest record any engine sorter stores; budgets must hold at least one.
const MAX_RECORD_BYTES: usize = 32;

/// Configures and constructs [`SwapEngine`] instances.
///
/// # Examples
/// ```
/// use rewire_core::{Edge, EdgeSequence, MemEdgeSequence, SwapEngineBuilder};
///
/// let edges = MemEdgeSequence::from_edges(vec![Edge::new(1, 2), Edge::new(3, 4)]);
/// let engine = SwapEngineBuilder::new()
///     .with_num_threads(2)
///     .with_record_outcomes(true)
///     .build(edges)
///     .expect("builder configuration is valid");
/// assert_eq!(engine.edges().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct SwapEngineBuilder {
    num_threads: usize,
    swaps_per_iteration: u64,
    sorter_mem: usize,
    pq_mem: usize,
    pq_pool_mem: usize,
    batch_size_per_thread: usize,
    record_outcomes: bool,
}

impl Default for SwapEngineBuilder {
    fn default() -> Self {
        Self {
            num_threads: 1,
            swaps_per_iteration: 0,
            sorter_mem: DEFAULT_SORTER_MEM,
            pq_mem: DEFAULT_PQ_MEM,
            pq_pool_mem: DEFAULT_PQ_POOL_MEM,
            batch_size_per_thread: DEFAULT_BATCH_SIZE_PER_THREAD,
            record_outcomes: false,
        }
    }
}

impl SwapEngineBuilder {
    /// Creates a builder populated with default parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of worker threads (at least 1).
    #[must_use]
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Returns the configured worker count.
    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Sets how many swaps are gathered before a run starts; `0` gathers
    /// everything into a single run.
    #[must_use]
    pub fn with_swaps_per_iteration(mut self, swaps: u64) -> Self {
        self.swaps_per_iteration = swaps;
        self
    }

    /// Returns the configured iteration size.
    #[must_use]
    pub fn swaps_per_iteration(&self) -> u64 {
        self.swaps_per_iteration
    }

    /// Sets the byte budget of each sorter.
    #[must_use]
    pub fn with_sorter_mem(mut self, bytes: usize) -> Self {
        self.sorter_mem = bytes;
        self
    }

    /// Returns the sorter budget.
    #[must_use]
    pub fn sorter_mem(&self) -> usize {
        self.sorter_mem
    }

    /// Sets the byte budget of each cross-batch priority queue.
    #[must_use]
    pub fn with_pq_mem(mut self, bytes: usize) -> Self {
        self.pq_mem = bytes;
        self
    }

    /// Returns the priority-queue budget.
    #[must_use]
    pub fn pq_mem(&self) -> usize {
        self.pq_mem
    }

    /// Sets the byte budget of the priority-queue block pool.
    #[must_use]
    pub fn with_pq_pool_mem(mut self, bytes: usize) -> Self {
        self.pq_pool_mem = bytes;
        self
    }

    /// Returns the priority-queue pool budget.
    #[must_use]
    pub fn pq_pool_mem(&self) -> usize {
        self.pq_pool_mem
    }

    /// Sets the inner batch window per worker.
    ///
    /// Smaller windows exercise the cross-batch channels; larger windows
    /// amortise hydration. The default suits production workloads.
    #[must_use]
    pub fn with_batch_size_per_thread(mut self, swaps: usize) -> Self {
        self.batch_size_per_thread = swaps;
        self
    }

    /// Returns the batch window per worker.
    #[must_use]
    pub fn batch_size_per_thread(&self) -> usize {
        self.batch_size_per_thread
    }

    /// Enables or disables per-swap outcome recording.
    #[must_use]
    pub fn with_record_outcomes(mut self, record: bool) -> Self {
        self.record_outcomes = record;
        self
    }

    /// Returns whether outcome recording is enabled.
    #[must_use]
    pub fn record_outcomes(&self) -> bool {
        self.record_outcomes
    }

    /// Validates the configuration and constructs an engine over `edges`.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidNumThreads`] for a zero worker count,
    /// [`EngineError::InvalidBatchSize`] for a zero batch window and
    /// [`EngineError::SorterMemTooSmall`] when a sorter budget cannot hold a
    /// single record.
    pub fn build<E: EdgeSequence + Send>(self, edges: E) -> Result<SwapEngine<E>> {
        if self.num_threads == 0 {
            return Err(EngineError::InvalidNumThreads);
        }
        if self.batch_size_per_thread == 0 {
            return Err(EngineError::InvalidBatchSize);
        }
        if self.sorter_mem < MAX_RECORD_BYTES {
            return Err(EngineError::SorterMemTooSmall {
                mem_bytes: self.sorter_mem,
                record_bytes: MAX_RECORD_BYTES,
            });
        }
        SwapEngine::with_config(
            edges,
            EngineConfig {
                num_threads: self.num_threads,
                swaps_per_iteration: self.swaps_per_iteration,
                sorter_mem: self.sorter_mem,
                pq_mem: self.pq_mem,
                pq_pool_mem: self.pq_pool_mem,
                batch_size_per_thread: self.batch_size_per_thread,
                record_outcomes: self.record_outcomes,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::{EngineError, MemEdgeSequence};

    use super::SwapEngineBuilder;

    #[test]
    fn defaults_are_single_threaded_single_run() {
        let builder = SwapEngineBuilder::new();
        assert_eq!(builder.num_threads(), 1);
        assert_eq!(builder.swaps_per_iteration(), 0);
        assert!(!builder.record_outcomes());
    }

    #[test]
    fn rejects_zero_batch_size() {
        let err = SwapEngineBuilder::new()
            .with_batch_size_per_thread(0)
            .build(MemEdgeSequence::from_edges(Vec::new()))
            .expect_err("zero batch windows are rejected");
        assert!(matches!(err, EngineError::InvalidBatchSize));
    }

    #[test]
    fn rejects_sorter_budget_below_one_record() {
        let err = SwapEngineBuilder::new()
            .with_sorter_mem(8)
            .build(MemEdgeSequence::from_edges(Vec::new()))
            .expect_err("tiny sorter budgets are rejected");
        assert!(matches!(err, EngineError::SorterMemTooSmall { .. }));
    }

    #[test]
    fn rejects_zero_threads() {
        let err = SwapEngineBuilder::new()
            .with_num_threads(0)
            .build(MemEdgeSequence::from_edges(Vec::new()))
            .expect_err("a zero worker count is rejected");
        assert!(matches!(err, EngineError::InvalidNumThreads));
    }
}
