//! Swap execution: final source edges, conflict verdicts and updates.
//!
//! Batched like the conflict phase. Hydration seeds each swap's source-edge
//! slots from the rewound edge-state channel and its existence tracker from
//! the info channel; the parallel region then executes every swap of the
//! window in evaluation order, forwarding final edge states along the
//! dependency chains, answering queued existence questions out of its own
//! outcome, and emitting an update for every edge whose chain ends here.

use std::sync::Mutex;

use crate::{
    EngineError, Result,
    em::{Record, RunsBuffer, RunsCreator, RunsMerger, Sorter},
    graph::{Edge, SwapId, SwapOutcome},
};

use super::{
    BatchParams, lock,
    direction::BitStream,
    existence::ExistenceTracker,
    load::state_bound,
    merger::PqSorterMerger,
    msg::{EdgeStateMsg, ExistenceInfoMsg, ExistenceSuccessorMsg, SideKey, SuccessorMsg},
    slots::SourceSlot,
};

/// Runs the execution phase over the whole run and returns the merged
/// edge-update stream for the next rewrite pass.
#[allow(clippy::too_many_arguments)]
pub(super) fn perform_swaps(
    params: &BatchParams<'_>,
    edge_state: &mut PqSorterMerger<EdgeStateMsg>,
    existence_info: &mut PqSorterMerger<ExistenceInfoMsg>,
    directions: &[Mutex<BitStream>],
    dep_sorters: &[Mutex<Sorter<SuccessorMsg>>],
    succ_sorters: &[Mutex<Sorter<ExistenceSuccessorMsg>>],
    placeholder_sorters: &[Mutex<Sorter<SwapId>>],
    mut outcomes: Option<&mut Vec<SwapOutcome>>,
) -> Result<RunsMerger<Edge>> {
    let t = params.num_threads;
    let batch = params.batch_size_per_thread;
    let _span = tracing::debug_span!("engine.perform_swaps", swaps = params.swaps_in_run).entered();

    let creator = RunsCreator::<Edge>::new()?;
    let update_buffer_len = (params.sorter_mem / Edge::BYTES / 2).max(1024);
    let update_buffers: Vec<Mutex<RunsBuffer<Edge>>> = (0..t)
        .map(|_| Mutex::new(creator.buffer(update_buffer_len)))
        .collect();

    let positions = params.positions_per_worker();
    let mut slots: Vec<Vec<SourceSlot>> = (0..t)
        .map(|_| (0..positions).map(|_| SourceSlot::new()).collect())
        .collect();
    let mut trackers: Vec<ExistenceTracker> = (0..t).map(|_| ExistenceTracker::new()).collect();
    let outcome_buffers: Vec<Mutex<Vec<SwapOutcome>>> =
        (0..t).map(|_| Mutex::new(Vec::new())).collect();

    let worker_error: Mutex<Option<EngineError>> = Mutex::new(None);
    let record = outcomes.is_some();
    let mut base = 0u64;
    while base < params.padded_limit() {
        let limit = params.swaps_in_run.min(base + params.stride());
        tracing::trace!(base, limit, "perform batch");

        init_trackers(&mut trackers, placeholder_sorters, params, base)?;
        hydrate_sources(
            edge_state,
            existence_info,
            &mut slots,
            &trackers,
            base,
            limit,
            t,
        )?;

        {
            let slots = &slots;
            let trackers = &trackers;
            let shared_state: &PqSorterMerger<EdgeStateMsg> = edge_state;
            let shared_info: &PqSorterMerger<ExistenceInfoMsg> = existence_info;
            params.pool.broadcast(|ctx| {
                let tid = ctx.index();
                let outcome = perform_worker(
                    tid,
                    base,
                    limit,
                    params,
                    slots,
                    trackers,
                    shared_state,
                    shared_info,
                    directions,
                    dep_sorters,
                    succ_sorters,
                    &update_buffers,
                    &outcome_buffers,
                    record,
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

        if let Some(out) = outcomes.as_mut() {
            interleave_outcomes(out, &outcome_buffers, base, limit, batch, t)?;
        }

        edge_state.end_batch();
        existence_info.end_batch();
        base += params.stride();
    }

    for tid in 0..t {
        lock(&update_buffers[tid], "edge update buffer")?.submit()?;
        debug_assert!(lock(&directions[tid], "direction stream")?.is_exhausted());
        debug_assert!(lock(&dep_sorters[tid], "dependency sorter")?.peek().is_none());
        debug_assert!(
            lock(&succ_sorters[tid], "existence successor sorter")?
                .peek()
                .is_none()
        );
    }

    // All buffer handles must be gone before the background writer can
    // observe the end of input.
    drop(update_buffers);
    Ok(creator.finish()?)
}

/// Sizes each tracker position from the placeholder counts of its swap.
fn init_trackers(
    trackers: &mut [ExistenceTracker],
    placeholder_sorters: &[Mutex<Sorter<SwapId>>],
    params: &BatchParams<'_>,
    base: u64,
) -> Result<()> {
    let t = params.num_threads;
    for (tid, tracker) in trackers.iter_mut().enumerate() {
        tracker.begin(params.positions_per_worker());
        let mut placeholders = lock(&placeholder_sorters[tid], "placeholder sorter")?;
        let mut sid = base + tid as u64;
        let mut i = 0usize;
        while i < params.batch_size_per_thread && sid < params.swaps_in_run {
            let mut count = 0u32;
            while let Some(swap) = placeholders.peek() {
                if swap.get() != sid {
                    debug_assert!(swap.get() > sid);
                    break;
                }
                count += 1;
                placeholders.advance()?;
            }
            tracker.expect(count);
            i += 1;
            sid += t as u64;
        }
        tracker.finish_init();
    }
    Ok(())
}

/// Seeds source-edge slots and existence trackers from the two channels.
#[allow(clippy::too_many_arguments)]
fn hydrate_sources(
    edge_state: &mut PqSorterMerger<EdgeStateMsg>,
    existence_info: &mut PqSorterMerger<ExistenceInfoMsg>,
    slots: &mut [Vec<SourceSlot>],
    trackers: &[ExistenceTracker],
    base: u64,
    limit: u64,
    num_threads: usize,
) -> Result<()> {
    edge_state.start_batch(state_bound(limit));
    existence_info.start_batch(ExistenceInfoMsg {
        swap: SwapId::new(limit),
        edge: Edge::INVALID,
        count: 0,
    });

    let mut sid = base;
    let mut pos = 0usize;
    while sid < limit {
        for tid in 0..num_threads {
            if sid >= limit {
                break;
            }
            let slot = &mut slots[tid][pos];
            slot.reset();

            while let Some(info) = existence_info.peek() {
                if info.swap.get() != sid {
                    debug_assert!(info.swap.get() > sid);
                    break;
                }
                if info.count == 0 {
                    trackers[tid].push_missing(pos);
                } else {
                    trackers[tid].push_exists(pos, info.edge, info.count);
                }
                existence_info.advance()?;
            }

            for side in 0..2 {
                let key = SideKey::new(SwapId::new(sid), side);
                if let Some(msg) = edge_state.peek() {
                    debug_assert!(msg.key >= key, "no message may be skipped");
                    if msg.key == key {
                        slot.set(side, msg.edge);
                        edge_state.advance()?;
                    }
                }
            }
            sid += 1;
        }
        pos += 1;
    }
    debug_assert!(edge_state.peek().is_none(), "window is fully drained");
    debug_assert!(existence_info.peek().is_none(), "window is fully drained");
    Ok(())
}

/// One worker's share of an execution batch.
#[allow(clippy::too_many_arguments)]
fn perform_worker(
    tid: usize,
    base: u64,
    limit: u64,
    params: &BatchParams<'_>,
    slots: &[Vec<SourceSlot>],
    trackers: &[ExistenceTracker],
    edge_state: &PqSorterMerger<EdgeStateMsg>,
    existence_info: &PqSorterMerger<ExistenceInfoMsg>,
    directions: &[Mutex<BitStream>],
    dep_sorters: &[Mutex<Sorter<SuccessorMsg>>],
    succ_sorters: &[Mutex<Sorter<ExistenceSuccessorMsg>>],
    update_buffers: &[Mutex<RunsBuffer<Edge>>],
    outcome_buffers: &[Mutex<Vec<SwapOutcome>>],
    record: bool,
) -> Result<()> {
    let t = params.num_threads;
    let mut dirs = lock(&directions[tid], "direction stream")?;
    let mut dep = lock(&dep_sorters[tid], "dependency sorter")?;
    let mut succ = lock(&succ_sorters[tid], "existence successor sorter")?;
    let mut updates = lock(&update_buffers[tid], "edge update buffer")?;
    let mut recorded = if record {
        Some(lock(&outcome_buffers[tid], "outcome buffer")?)
    } else {
        None
    };

    let tracker = &trackers[tid];
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
        let cur = [slot.wait(0), slot.wait(1)];
        let (n0, n1) = cur[0].swap_with(cur[1], direction);

        tracker.wait_settled(i);
        let conflict = [tracker.exists(i, n0), tracker.exists(i, n1)];
        let loop_detected = n0.is_loop() || n1.is_loop();
        let performed = !(conflict[0] || conflict[1] || loop_detected);

        if let Some(buffer) = recorded.as_mut() {
            buffer.push(
                SwapOutcome {
                    performed,
                    loop_detected,
                    conflict,
                    edges: [n0, n1],
                }
                .normalised(),
            );
        }

        let new_edges = if performed { [n0, n1] } else { cur };

        // Forward the final state along the dependency chains; an edge whose
        // chain ends here becomes an update for the rewrite pass.
        let mut successor_found = [false, false];
        while let Some(msg) = dep.peek() {
            if msg.key.swap_id().get() != sid {
                debug_assert!(msg.key.swap_id().get() > sid);
                break;
            }
            let side = msg.key.side();
            successor_found[side] = true;
            let target = msg.successor;
            if target.swap_id().get() < limit {
                let target_tid = target.swap_id().worker(t);
                let target_pos = ((target.swap_id().get() - base) / t as u64) as usize;
                slots[target_tid][target_pos].publish(target.side(), new_edges[side]);
            } else {
                edge_state.push_pq(
                    tid,
                    EdgeStateMsg {
                        key: target,
                        edge: new_edges[side],
                    },
                );
            }
            dep.advance()?;
        }
        for side in 0..2 {
            if !successor_found[side] {
                updates.push(new_edges[side])?;
            }
        }

        // Answer queued existence questions with the multiplicity after this
        // swap's outcome: the count that reached it, plus copies it produced,
        // minus copies it consumed. A rejected swap leaves the count as is,
        // because its produced and consumed edges then coincide.
        while let Some(question) = succ.peek() {
            if question.swap.get() != sid {
                debug_assert!(question.swap.get() > sid);
                break;
            }
            let mut count = tracker.count(i, question.edge) as i64;
            for side in 0..2 {
                if question.edge == new_edges[side] {
                    count += 1;
                }
                if question.edge == cur[side] {
                    count -= 1;
                }
            }
            debug_assert!(count >= 0, "a consumed edge was present beforehand");
            let count = count.max(0) as u64;
            let target = question.successor;
            if target.get() < limit {
                let target_tid = target.worker(t);
                let target_pos = ((target.get() - base) / t as u64) as usize;
                if count > 0 {
                    trackers[target_tid].push_exists(target_pos, question.edge, count);
                } else {
                    trackers[target_tid].push_missing(target_pos);
                }
            } else {
                existence_info.push_pq(
                    tid,
                    ExistenceInfoMsg {
                        swap: target,
                        edge: question.edge,
                        count,
                    },
                );
            }
            succ.advance()?;
        }

        i += 1;
        sid += t as u64;
    }
    Ok(())
}

/// Appends the batch's outcome records in swap order.
fn interleave_outcomes(
    out: &mut Vec<SwapOutcome>,
    outcome_buffers: &[Mutex<Vec<SwapOutcome>>],
    base: u64,
    limit: u64,
    batch: usize,
    num_threads: usize,
) -> Result<()> {
    let mut guards = Vec::with_capacity(num_threads);
    for buffer in outcome_buffers {
        guards.push(lock(buffer, "outcome buffer")?);
    }
    'all: for i in 0..batch {
        for (tid, guard) in guards.iter().enumerate() {
            let sid = base + (i * num_threads + tid) as u64;
            if sid >= limit {
                break 'all;
            }
            out.push(guard[i]);
        }
    }
    for mut guard in guards {
        guard.clear();
    }
    Ok(())
}
