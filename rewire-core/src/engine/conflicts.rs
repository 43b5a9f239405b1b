//! Conflict computation: candidate states and existence requests.
//!
//! Swaps are processed in batches in strict evaluation order. A
//! single-threaded hydration step moves each side's known configurations
//! from the edge-state channel into shared slots; the parallel region then
//! evaluates every swap of the window. Each swap crosses its two sides'
//! configuration sets, deduplicates the candidates per side, asks the
//! existence processor about every distinct edge it may produce or keep, and
//! forwards the union of candidates and sources to the next reader of the
//! same edge position (directly into the successor's slot inside the window,
//! through the priority queue beyond it).

use std::sync::Mutex;

use crate::{
    EngineError, Result,
    em::{Record, RunsBuffer, RunsCreator, RunsMerger, Sorter},
    graph::{Edge, SwapId},
};

use super::{
    BatchParams, lock,
    direction::BitStream,
    load::state_bound,
    merger::PqSorterMerger,
    msg::{EdgeStateMsg, ExistenceRequest, SideKey, SuccessorMsg},
    slots::StateSlot,
};

/// Runs the conflict phase over the whole run and returns the merged
/// existence-request stream.
pub(super) fn compute_conflicts(
    params: &BatchParams<'_>,
    edge_state: &mut PqSorterMerger<EdgeStateMsg>,
    directions: &[Mutex<BitStream>],
    dep_sorters: &[Mutex<Sorter<SuccessorMsg>>],
) -> Result<RunsMerger<ExistenceRequest>> {
    let t = params.num_threads;
    let _span =
        tracing::debug_span!("engine.compute_conflicts", swaps = params.swaps_in_run).entered();

    let creator = RunsCreator::<ExistenceRequest>::new()?;
    let request_buffer_len = (params.sorter_mem / ExistenceRequest::BYTES / 2).max(1024);
    let request_buffers: Vec<Mutex<RunsBuffer<ExistenceRequest>>> = (0..t)
        .map(|_| Mutex::new(creator.buffer(request_buffer_len)))
        .collect();

    let positions = params.positions_per_worker();
    let mut slots: Vec<Vec<StateSlot>> = (0..t)
        .map(|_| (0..positions).map(|_| StateSlot::new()).collect())
        .collect();

    let worker_error: Mutex<Option<EngineError>> = Mutex::new(None);
    let mut base = 0u64;
    while base < params.padded_limit() {
        let limit = params.swaps_in_run.min(base + params.stride());
        tracing::trace!(base, limit, "conflict batch");

        hydrate_state(edge_state, &mut slots, base, limit, t)?;

        {
            let slots = &slots;
            let shared_state: &PqSorterMerger<EdgeStateMsg> = edge_state;
            params.pool.broadcast(|ctx| {
                let tid = ctx.index();
                let outcome = conflict_worker(
                    tid,
                    base,
                    limit,
                    params,
                    slots,
                    shared_state,
                    directions,
                    dep_sorters,
                    &request_buffers,
                );
                if let Err(error) = outcome {
                    if let Ok(mut slot) = worker_error.lock() {
                        slot.get_or_insert(error);
                    }
                }
            });
        }
        if let Some(error) = lock(&worker_error, "worker error slot")?.take() {
            return Err(error);
        }

        edge_state.end_batch();
        base += params.stride();
    }

    for tid in 0..t {
        let mut dirs = lock(&directions[tid], "direction stream")?;
        debug_assert!(dirs.is_exhausted());
        dirs.rewind();
        lock(&dep_sorters[tid], "dependency sorter")?.rewind()?;
        lock(&request_buffers[tid], "existence request buffer")?.submit()?;
    }
    edge_state.rewind_sorter()?;

    // All buffer handles must be gone before the background writer can
    // observe the end of input.
    drop(request_buffers);
    Ok(creator.finish()?)
}

/// Drains the edge-state window into the per-worker slots.
fn hydrate_state(
    edge_state: &mut PqSorterMerger<EdgeStateMsg>,
    slots: &mut [Vec<StateSlot>],
    base: u64,
    limit: u64,
    num_threads: usize,
) -> Result<()> {
    edge_state.start_batch(state_bound(limit));

    let mut sid = base;
    let mut pos = 0usize;
    while sid < limit {
        for tid in 0..num_threads {
            if sid >= limit {
                break;
            }
            let slot = &mut slots[tid][pos];
            slot.reset();
            for side in 0..2 {
                let key = SideKey::new(SwapId::new(sid), side);
                let mut have_primary = false;
                if let Some(msg) = edge_state.peek() {
                    debug_assert!(msg.key >= key, "no message may be skipped");
                    if msg.key == key {
                        slot.set_primary(side, msg.edge);
                        edge_state.advance()?;
                        have_primary = true;
                    }
                }
                if have_primary {
                    while let Some(msg) = edge_state.peek() {
                        if msg.key != key {
                            break;
                        }
                        slot.push_extra(side, msg.edge);
                        edge_state.advance()?;
                    }
                    slot.mark_ready(side);
                }
            }
            sid += 1;
        }
        pos += 1;
    }
    debug_assert!(edge_state.peek().is_none(), "window is fully drained");
    Ok(())
}

/// One worker's share of a conflict batch: swaps with `sid mod T == tid`.
#[allow(clippy::too_many_arguments)]
fn conflict_worker(
    tid: usize,
    base: u64,
    limit: u64,
    params: &BatchParams<'_>,
    slots: &[Vec<StateSlot>],
    edge_state: &PqSorterMerger<EdgeStateMsg>,
    directions: &[Mutex<BitStream>],
    dep_sorters: &[Mutex<Sorter<SuccessorMsg>>],
    request_buffers: &[Mutex<RunsBuffer<ExistenceRequest>>],
) -> Result<()> {
    let t = params.num_threads;
    let mut dirs = lock(&directions[tid], "direction stream")?;
    let mut dep = lock(&dep_sorters[tid], "dependency sorter")?;
    let mut requests = lock(&request_buffers[tid], "existence request buffer")?;

    let mut sources: [Vec<Edge>; 2] = [Vec::new(), Vec::new()];
    let mut candidates: [Vec<Edge>; 2] = [Vec::new(), Vec::new()];
    let mut forwarded: Vec<Edge> = Vec::new();

    let mut sid = base + tid as u64;
    let mut i = 0usize;
    while i < params.batch_size_per_thread && sid < params.padded_limit() {
        if sid >= params.swaps_in_run {
            i += 1;
            sid += t as u64;
            continue;
        }

        let direction = dirs.next();
        let slot = &slots[tid][i];

        let mut successor: [Option<SideKey>; 2] = [None, None];
        for side in 0..2 {
            let key = SideKey::new(SwapId::new(sid), side);
            if let Some(msg) = dep.peek() {
                debug_assert!(msg.key >= key);
                if msg.key == key {
                    debug_assert!(msg.successor.swap_id().get() > sid);
                    successor[side] = Some(msg.successor);
                    dep.advance()?;
                }
            }
            // The predecessor always has a smaller swap id, so it finishes.
            slot.wait_ready(side);
        }

        for side in 0..2 {
            sources[side].clear();
            slot.collect(side, &mut sources[side]);
            debug_assert!(sources[side].windows(2).all(|w| w[0] < w[1]));
        }

        // Every combination of the two sides' configurations is a possible
        // outcome; collect both produced edges per combination.
        candidates[0].clear();
        candidates[1].clear();
        for &e1 in &sources[0] {
            for &e2 in &sources[1] {
                let (n0, n1) = e1.swap_with(e2, direction);
                candidates[0].push(n0);
                candidates[1].push(n1);
            }
        }

        let swap = SwapId::new(sid);
        for side in 0..2 {
            let cand = &mut candidates[side];
            cand.sort_unstable();

            let mut cross_batch: Option<SideKey> = None;
            let mut in_batch: Option<(&StateSlot, usize)> = None;
            if let Some(key) = successor[side] {
                if key.swap_id().get() < limit {
                    let successor_tid = key.swap_id().worker(t);
                    let successor_pos = ((key.swap_id().get() - base) / t as u64) as usize;
                    in_batch = Some((&slots[successor_tid][successor_pos], key.side()));
                } else {
                    cross_batch = Some(key);
                }
            }

            forwarded.clear();
            let mut ci = 0usize;
            {
                let forwarded = &mut forwarded;
                let requests = &mut *requests;
                let mut forward = |edge: Edge, source_edge: bool| -> Result<()> {
                    requests.push(ExistenceRequest {
                        edge,
                        swap,
                        source_edge,
                    })?;
                    if let Some(key) = cross_batch {
                        edge_state.push_pq(tid, EdgeStateMsg { key, edge });
                    }
                    if in_batch.is_some() {
                        forwarded.push(edge);
                    }
                    Ok(())
                };

                // Merge the sorted candidate set with the sorted source set:
                // candidates are queried as genuine existence questions, a
                // source edge only as state forwarding, and a source that
                // coincides with a candidate must not be forwarded twice.
                for &source in &sources[side] {
                    let mut last = Edge::INVALID;
                    while ci < cand.len() && cand[ci] <= source {
                        forward(cand[ci], false)?;
                        last = cand[ci];
                        while ci < cand.len() && cand[ci] == last {
                            ci += 1;
                        }
                    }
                    if source != last {
                        forward(source, true)?;
                    }
                }
                while ci < cand.len() {
                    forward(cand[ci], false)?;
                    let last = cand[ci];
                    while ci < cand.len() && cand[ci] == last {
                        ci += 1;
                    }
                }
            }

            if let Some((target, target_side)) = in_batch {
                target.publish(target_side, &forwarded);
            }
        }

        i += 1;
        sid += t as u64;
    }
    Ok(())
}
