//! Edge loading: one joint pass over the edge sequence and the sorted load
//! requests.
//!
//! The pass does three jobs at once. It injects each edge's current state
//! into the edge-state channel for the *first* swap side that reads it; it
//! links every further reader of the same position to its predecessor,
//! forming the dependency chains along which configurations flow; and it
//! records a validity bit per position so the next pass knows which
//! positions will be replaced by updates. When the previous run left updates
//! behind, the same pass merges them in and rewrites the sequence.

use std::sync::Mutex;

use crate::{
    EngineError, Result,
    em::{AsyncStream, Record, RunsMerger, Sorter},
    graph::{Edge, EdgeSequence, SequenceError, SwapId},
};

use super::{
    direction::BitStream,
    lock,
    merger::PqSorterMerger,
    msg::{EdgeLoadRequest, EdgeStateMsg, SideKey, SuccessorMsg},
};

/// Ring buffers used when prefetching the edge sequence.
pub(super) const STREAM_BUFFERS: usize = 3;

/// Records per prefetch buffer.
pub(super) const STREAM_BUFFER_LEN: usize = (1 << 20) / Edge::BYTES;

/// Builds the producer closure that feeds an [`AsyncStream`] from `edges`.
pub(super) fn sequence_filler<E: EdgeSequence>(
    edges: &mut E,
) -> impl FnMut(&mut Vec<Edge>) -> std::result::Result<bool, SequenceError> + Send + '_
where
    E: Send,
{
    move |buf| {
        while buf.len() < buf.capacity() {
            match edges.peek() {
                Some(edge) => {
                    buf.push(edge);
                    edges.advance()?;
                }
                None => return Ok(false),
            }
        }
        Ok(edges.peek().is_some())
    }
}

struct RequestMatcher<'a> {
    load_requests: &'a mut Sorter<EdgeLoadRequest>,
    edge_state: &'a mut PqSorterMerger<EdgeStateMsg>,
    dep_sorters: &'a [Mutex<Sorter<SuccessorMsg>>],
    next_valid: &'a mut BitStream,
    num_threads: usize,
    previous: Edge,
}

impl RequestMatcher<'_> {
    fn pop_request(&mut self, id: u64) -> Result<Option<SideKey>> {
        match self.load_requests.peek() {
            Some(request) if request.edge_id.get() == id => {
                self.load_requests.advance()?;
                Ok(Some(request.key))
            }
            _ => Ok(None),
        }
    }

    /// Matches the edge at position `id` against the pending requests.
    fn use_edge(&mut self, edge: Edge, id: u64) -> Result<()> {
        if !edge.is_canonical() {
            return Err(EngineError::NotCanonicalised { position: id });
        }
        if edge < self.previous {
            return Err(EngineError::UnsortedSequence { position: id });
        }
        self.previous = edge;
        match self.pop_request(id)? {
            None => self.next_valid.push(true),
            Some(first) => {
                self.next_valid.push(false);
                self.edge_state
                    .push_sorter(EdgeStateMsg { key: first, edge })?;

                // Later readers of this position form a chain: each learns
                // who comes next from its predecessor's worker.
                let mut last = first;
                while let Some(key) = self.pop_request(id)? {
                    let worker = last.swap_id().worker(self.num_threads);
                    lock(&self.dep_sorters[worker], "dependency sorter")?.push(SuccessorMsg {
                        key: last,
                        successor: key,
                    })?;
                    last = key;
                }
            }
        }
        Ok(())
    }
}

/// Streams the edge sequence once, wiring up dependency chains and, when the
/// previous run left updates behind, rewriting the sequence on the fly.
#[allow(clippy::too_many_arguments)]
pub(super) fn load_and_update_edges<E: EdgeSequence + Send>(
    edges: &mut E,
    load_requests: &mut Sorter<EdgeLoadRequest>,
    edge_state: &mut PqSorterMerger<EdgeStateMsg>,
    dep_sorters: &[Mutex<Sorter<SuccessorMsg>>],
    valid_edges: &mut BitStream,
    pending_updates: &mut Option<RunsMerger<Edge>>,
    needs_writeback: &mut bool,
    num_threads: usize,
) -> Result<()> {
    load_requests.sort()?;
    let have_swaps = !load_requests.is_empty();
    let total = edges.len();
    let _span = tracing::debug_span!(
        "engine.load_edges",
        edges = total,
        requests = load_requests.len(),
        writeback = *needs_writeback,
    )
    .entered();

    let mut next_valid = BitStream::new();
    let mut matcher = RequestMatcher {
        load_requests,
        edge_state,
        dep_sorters,
        next_valid: &mut next_valid,
        num_threads,
        previous: Edge::INVALID,
    };

    if let Some(mut updates) = pending_updates.take() {
        // Rewrite pass: the surviving edges are an ascending subsequence of
        // the sorted sequence and the updates are sorted, so merging by
        // value keeps the rewritten sequence sorted for the next run's
        // merge joins.
        valid_edges.rewind();
        let mut fresh = edges.fresh()?;
        std::thread::scope(|scope| -> Result<()> {
            let mut old = AsyncStream::spawn(
                scope,
                sequence_filler(edges),
                STREAM_BUFFERS,
                STREAM_BUFFER_LEN,
            )?;
            let mut kept = next_surviving(&mut old, valid_edges)?;
            let mut id = 0u64;
            loop {
                let edge = match (kept, updates.peek()) {
                    (Some(survivor), Some(update)) if update < survivor => {
                        updates.advance()?;
                        update
                    }
                    (Some(survivor), _) => {
                        kept = next_surviving(&mut old, valid_edges)?;
                        survivor
                    }
                    (None, Some(update)) => {
                        updates.advance()?;
                        update
                    }
                    (None, None) => break,
                };
                matcher.use_edge(edge, id)?;
                fresh.push(edge)?;
                id += 1;
            }
            debug_assert_eq!(id, total, "updates replace invalidated edges one for one");
            Ok(())
        })?;
        fresh.consume()?;
        *edges = fresh;
    } else {
        std::thread::scope(|scope| -> Result<()> {
            let mut stream = AsyncStream::spawn(
                scope,
                sequence_filler(edges),
                STREAM_BUFFERS,
                STREAM_BUFFER_LEN,
            )?;
            let mut id = 0u64;
            while let Some(edge) = stream.peek() {
                stream.advance()?;
                matcher.use_edge(edge, id)?;
                id += 1;
            }
            Ok(())
        })?;
        edges.rewind()?;
    }

    debug_assert!(
        matcher.load_requests.peek().is_none(),
        "edge ids were validated on push"
    );

    *needs_writeback = have_swaps;
    std::mem::swap(valid_edges, &mut next_valid);
    valid_edges.consume();

    if have_swaps {
        edge_state.finish_sorter_input()?;
        for sorter in dep_sorters {
            lock(sorter, "dependency sorter")?.sort()?;
        }
    }
    load_requests.clear();
    Ok(())
}

/// Yields the next edge whose position survived the previous run, skipping
/// positions claimed by updates.
fn next_surviving(
    old: &mut AsyncStream<Edge, SequenceError>,
    valid_edges: &mut BitStream,
) -> std::result::Result<Option<Edge>, SequenceError> {
    while let Some(edge) = old.peek() {
        old.advance()?;
        if valid_edges.next() {
            return Ok(Some(edge));
        }
    }
    Ok(None)
}

/// Marker for the first swap side of swap `limit`; messages strictly below
/// it belong to the current batch window.
pub(super) fn state_bound(limit: u64) -> EdgeStateMsg {
    EdgeStateMsg {
        key: SideKey::new(SwapId::new(limit), 0),
        edge: Edge::INVALID,
    }
}
