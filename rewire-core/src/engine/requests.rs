//! Existence-request resolution against the edge sequence.
//!
//! The merged request stream and the edge sequence are both sorted by edge,
//! so one joint pass answers every distinct query. Requests for one edge
//! arrive latest-swap-first; the walk threads a notification chain backwards
//! through the swaps so that each one learns which later swap to inform once
//! it has decided the edge's fate, and the earliest genuine query receives
//! the verdict from the graph itself. Placeholders count every future
//! delivery so receivers can wait for a fixed number of messages.

use std::sync::Mutex;

use crate::{
    Result,
    em::{AsyncStream, RunsMerger, Sorter},
    graph::{EdgeSequence, SwapId},
};

use super::{
    lock,
    load::{STREAM_BUFFERS, STREAM_BUFFER_LEN, sequence_filler},
    merger::PqSorterMerger,
    msg::{ExistenceInfoMsg, ExistenceRequest, ExistenceSuccessorMsg},
};

/// Resolves all existence requests of the run.
pub(super) fn process_existence_requests<E: EdgeSequence + Send>(
    edges: &mut E,
    mut requests: RunsMerger<ExistenceRequest>,
    existence_info: &mut PqSorterMerger<ExistenceInfoMsg>,
    succ_sorters: &[Mutex<Sorter<ExistenceSuccessorMsg>>],
    placeholder_sorters: &[Mutex<Sorter<SwapId>>],
    num_threads: usize,
) -> Result<()> {
    let _span =
        tracing::debug_span!("engine.existence_requests", requests = requests.len()).entered();

    std::thread::scope(|scope| -> Result<()> {
        let mut graph = AsyncStream::spawn(
            scope,
            sequence_filler(edges),
            STREAM_BUFFERS,
            STREAM_BUFFER_LEN,
        )?;

        while let Some(head) = requests.peek() {
            let current = head.edge;

            // Advance the graph past smaller edges, counting how many copies
            // of the queried edge the sequence holds.
            let mut multiplicity = 0u64;
            while let Some(edge) = graph.peek() {
                if edge > current {
                    break;
                }
                if edge == current {
                    multiplicity += 1;
                }
                graph.advance()?;
            }

            let mut last_swap = head.swap;
            let mut found_target = false;
            while let Some(request) = requests.peek() {
                if request.edge != current {
                    break;
                }
                let swap = request.swap;
                if last_swap != swap && found_target {
                    debug_assert!(last_swap > swap, "groups are walked latest-first");
                    lock(&succ_sorters[swap.worker(num_threads)], "existence successor sorter")?
                        .push(ExistenceSuccessorMsg {
                            swap,
                            edge: current,
                            successor: last_swap,
                        })?;
                    lock(
                        &placeholder_sorters[last_swap.worker(num_threads)],
                        "placeholder sorter",
                    )?
                    .push(last_swap)?;
                }
                last_swap = swap;
                found_target |= !request.source_edge;
                requests.advance()?;
            }

            // The earliest swap in the group hears from the graph directly,
            // and only when a genuine query asked and the edge is present.
            if found_target && multiplicity > 0 {
                existence_info.push_sorter(ExistenceInfoMsg {
                    swap: last_swap,
                    edge: current,
                    count: multiplicity,
                })?;
                lock(
                    &placeholder_sorters[last_swap.worker(num_threads)],
                    "placeholder sorter",
                )?
                .push(last_swap)?;
            }
        }
        Ok(())
    })?;

    existence_info.finish_sorter_input()?;
    edges.rewind()?;

    for sorter in succ_sorters {
        lock(sorter, "existence successor sorter")?.sort()?;
    }
    for sorter in placeholder_sorters {
        lock(sorter, "placeholder sorter")?.sort()?;
    }
    Ok(())
}
