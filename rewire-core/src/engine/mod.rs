//! The batched time-forward edge-swap engine.
//!
//! A run turns the scripted swap sequence into a message dataflow over the
//! evaluation order: one pass over the edge sequence wires up dependency
//! chains and initial states, the conflict phase crosses candidate
//! configurations and raises existence questions, one merge-join against the
//! sequence answers them, and the execution phase settles every swap and
//! leaves a sorted update stream behind for the rewrite pass of the next
//! run. The two inner phases parallelise across a fixed worker pool while
//! preserving the serial semantics of the swap script.

mod conflicts;
mod direction;
mod existence;
mod load;
mod merger;
mod msg;
mod perform;
mod requests;
mod slots;

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{
    EngineError, Result,
    em::{RunsMerger, Sorter},
    graph::{Edge, EdgeSequence, Swap, SwapId, SwapOutcome},
};

use self::{
    direction::BitStream,
    merger::PqSorterMerger,
    msg::{EdgeLoadRequest, EdgeStateMsg, ExistenceInfoMsg, ExistenceSuccessorMsg, SideKey,
        SuccessorMsg},
};

pub use crate::builder::SwapEngineBuilder;

/// Resolved engine configuration; see [`SwapEngineBuilder`] for semantics.
#[derive(Clone, Copy, Debug)]
pub(crate) struct EngineConfig {
    pub(crate) num_threads: usize,
    pub(crate) swaps_per_iteration: u64,
    pub(crate) sorter_mem: usize,
    pub(crate) pq_mem: usize,
    pub(crate) pq_pool_mem: usize,
    pub(crate) batch_size_per_thread: usize,
    pub(crate) record_outcomes: bool,
}

/// Shared parameters of the two batched parallel phases.
pub(crate) struct BatchParams<'a> {
    pub(crate) pool: &'a rayon::ThreadPool,
    pub(crate) num_threads: usize,
    pub(crate) batch_size_per_thread: usize,
    pub(crate) sorter_mem: usize,
    pub(crate) swaps_in_run: u64,
}

impl BatchParams<'_> {
    /// Swaps covered by one batch across all workers.
    fn stride(&self) -> u64 {
        self.batch_size_per_thread as u64 * self.num_threads as u64
    }

    /// The run length rounded up to a whole number of worker strides, so
    /// every worker walks the same loop shape.
    fn padded_limit(&self) -> u64 {
        let t = self.num_threads as u64;
        let remainder = self.swaps_in_run % t;
        if remainder == 0 {
            self.swaps_in_run
        } else {
            self.swaps_in_run + (t - remainder)
        }
    }

    /// Slots a worker can actually touch in one batch: the window size,
    /// unless the whole run is smaller.
    fn positions_per_worker(&self) -> usize {
        let per_worker = self.swaps_in_run.div_ceil(self.num_threads as u64);
        (self.batch_size_per_thread as u64).min(per_worker) as usize
    }
}

/// Locks a mutex, mapping poisoning to an engine error.
pub(crate) fn lock<'a, T>(
    mutex: &'a Mutex<T>,
    resource: &'static str,
) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_: PoisonError<_>| EngineError::LockPoisoned { resource })
}

/// External-memory edge-swap engine over an [`EdgeSequence`].
///
/// Swaps are pushed (or fed wholesale through [`SwapEngine::run`]) and
/// executed in script order; the edge sequence is rewritten in place between
/// runs. See [`SwapEngineBuilder`] for configuration.
pub struct SwapEngine<E: EdgeSequence> {
    edges: E,
    config: EngineConfig,
    pool: rayon::ThreadPool,
    load_requests: Sorter<EdgeLoadRequest>,
    directions: Vec<Mutex<BitStream>>,
    edge_state: PqSorterMerger<EdgeStateMsg>,
    existence_info: PqSorterMerger<ExistenceInfoMsg>,
    pending_updates: Option<RunsMerger<Edge>>,
    valid_edges: BitStream,
    needs_writeback: bool,
    swaps_in_run: u64,
    outcomes: Vec<SwapOutcome>,
}

impl<E: EdgeSequence> std::fmt::Debug for SwapEngine<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapEngine").finish_non_exhaustive()
    }
}

impl<E: EdgeSequence + Send> SwapEngine<E> {
    pub(crate) fn with_config(edges: E, config: EngineConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .thread_name(|i| format!("rewire-worker-{i}"))
            .build()
            .map_err(|e| EngineError::ThreadPoolUnavailable {
                reason: e.to_string(),
            })?;
        let queue_mem = config.pq_mem + config.pq_pool_mem;
        Ok(Self {
            edges,
            pool,
            load_requests: Sorter::new(config.sorter_mem)?,
            directions: (0..config.num_threads)
                .map(|_| Mutex::new(BitStream::new()))
                .collect(),
            edge_state: PqSorterMerger::new(config.num_threads, config.sorter_mem, queue_mem)?,
            existence_info: PqSorterMerger::new(config.num_threads, config.sorter_mem, queue_mem)?,
            pending_updates: None,
            valid_edges: BitStream::new(),
            needs_writeback: false,
            swaps_in_run: 0,
            outcomes: Vec::new(),
            config,
        })
    }

    /// Queues one swap, starting a run when the configured iteration size is
    /// reached.
    ///
    /// # Errors
    /// Rejects out-of-range or self-paired edge ids; propagates run errors.
    pub fn push(&mut self, swap: Swap) -> Result<()> {
        let len = self.edges.len();
        for side in 0..2 {
            let edge_id = swap.edge(side).get();
            if edge_id >= len {
                return Err(EngineError::EdgeIdOutOfRange { edge_id, len });
            }
        }
        if swap.edge(0) == swap.edge(1) {
            return Err(EngineError::IdenticalEdgeIds {
                edge_id: swap.edge(0).get(),
            });
        }

        let sid = SwapId::new(self.swaps_in_run);
        for side in 0..2 {
            self.load_requests.push(EdgeLoadRequest {
                edge_id: swap.edge(side),
                key: SideKey::new(sid, side),
            })?;
        }
        lock(
            &self.directions[sid.worker(self.config.num_threads)],
            "direction stream",
        )?
        .push(swap.direction());
        self.swaps_in_run += 1;

        if self.config.swaps_per_iteration > 0
            && self.swaps_in_run >= self.config.swaps_per_iteration
        {
            self.process_swaps()?;
        }
        Ok(())
    }

    /// Executes all queued swaps as one run, applying the previous run's
    /// updates to the edge sequence on the way.
    ///
    /// A call with nothing queued and no pending updates is a no-op; a call
    /// with only pending updates performs just the rewrite.
    ///
    /// # Errors
    /// Propagates input validation, storage and container failures.
    pub fn process_swaps(&mut self) -> Result<()> {
        if self.swaps_in_run == 0 && !self.needs_writeback {
            return Ok(());
        }
        let _span = tracing::info_span!(
            "engine.process_swaps",
            swaps = self.swaps_in_run,
            writeback = self.needs_writeback,
        )
        .entered();

        let t = self.config.num_threads;
        let swaps = self.swaps_in_run;

        let dep_sorters = self.per_worker_sorters::<SuccessorMsg>(swaps)?;
        let succ_sorters = self.per_worker_sorters::<ExistenceSuccessorMsg>(swaps)?;
        let placeholder_sorters = self.per_worker_sorters::<SwapId>(swaps)?;

        if swaps > 0 {
            self.edge_state.clear();
            self.existence_info.clear();
        }

        load::load_and_update_edges(
            &mut self.edges,
            &mut self.load_requests,
            &mut self.edge_state,
            &dep_sorters,
            &mut self.valid_edges,
            &mut self.pending_updates,
            &mut self.needs_writeback,
            t,
        )?;

        if swaps > 0 {
            for direction in &self.directions {
                lock(direction, "direction stream")?.consume();
            }

            let params = BatchParams {
                pool: &self.pool,
                num_threads: t,
                batch_size_per_thread: self.config.batch_size_per_thread,
                sorter_mem: self.config.sorter_mem,
                swaps_in_run: swaps,
            };

            let requests = conflicts::compute_conflicts(
                &params,
                &mut self.edge_state,
                &self.directions,
                &dep_sorters,
            )?;

            requests::process_existence_requests(
                &mut self.edges,
                requests,
                &mut self.existence_info,
                &succ_sorters,
                &placeholder_sorters,
                t,
            )?;

            let updates = perform::perform_swaps(
                &params,
                &mut self.edge_state,
                &mut self.existence_info,
                &self.directions,
                &dep_sorters,
                &succ_sorters,
                &placeholder_sorters,
                self.config.record_outcomes.then_some(&mut self.outcomes),
            )?;
            self.pending_updates = Some(updates);

            for direction in &self.directions {
                lock(direction, "direction stream")?.clear();
            }
        }

        self.swaps_in_run = 0;
        Ok(())
    }

    /// Pushes every swap and completes all runs, including the final
    /// rewrite of the edge sequence.
    ///
    /// # Errors
    /// Propagates the first failure; the edge sequence is not guaranteed
    /// consistent afterwards.
    pub fn run<I>(&mut self, swaps: I) -> Result<()>
    where
        I: IntoIterator<Item = Swap>,
    {
        for swap in swaps {
            self.push(swap)?;
        }
        self.process_swaps()?;
        self.process_swaps()?;
        Ok(())
    }

    /// Per-swap outcome records across all runs, in script order. Populated
    /// only when outcome recording is enabled.
    #[must_use]
    pub fn outcomes(&self) -> &[SwapOutcome] {
        &self.outcomes
    }

    /// Shared view of the edge sequence.
    #[must_use]
    pub fn edges(&self) -> &E {
        &self.edges
    }

    /// Consumes the engine and returns the edge sequence.
    #[must_use]
    pub fn into_edges(self) -> E {
        self.edges
    }

    fn per_worker_sorters<T: crate::em::Record + Ord>(
        &self,
        swaps: u64,
    ) -> Result<Vec<Mutex<Sorter<T>>>> {
        if swaps == 0 {
            return Ok(Vec::new());
        }
        (0..self.config.num_threads)
            .map(|_| Ok(Mutex::new(Sorter::new(self.config.sorter_mem)?)))
            .collect()
    }
}
