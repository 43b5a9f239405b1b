//! End-to-end tests for the swap engine against the serial reference
//! implementation.

use rewire_core::{
    Edge, EdgeSequence, EngineError, FileEdgeSequence, MemEdgeSequence, Swap, SwapEngineBuilder,
    SwapOutcome,
};
use rewire_test_support::{degree_census, random_sorted_multigraph, random_swaps, simulate};
use rstest::rstest;

fn edges(pairs: &[(i64, i64)]) -> Vec<Edge> {
    pairs.iter().map(|&(u, v)| Edge::new(u, v)).collect()
}

struct EngineRun {
    edges: Vec<Edge>,
    outcomes: Vec<SwapOutcome>,
}

fn run_engine(
    initial: Vec<Edge>,
    swaps: &[Swap],
    threads: usize,
    batch: usize,
    sorter_mem: usize,
) -> EngineRun {
    let mut engine = SwapEngineBuilder::new()
        .with_num_threads(threads)
        .with_batch_size_per_thread(batch)
        .with_sorter_mem(sorter_mem)
        .with_record_outcomes(true)
        .build(MemEdgeSequence::from_edges(initial))
        .expect("configuration is valid");
    engine.run(swaps.iter().copied()).expect("run succeeds");
    let outcomes = engine.outcomes().to_vec();
    let mut sequence = engine.into_edges();
    EngineRun {
        edges: sequence.drain_to_vec().expect("drain"),
        outcomes,
    }
}

fn assert_matches_simulator(initial: &[Edge], swaps: &[Swap], threads: usize, batch: usize) {
    let (expected_edges, expected_outcomes) = simulate(initial, swaps);
    let run = run_engine(initial.to_vec(), swaps, threads, batch, 1 << 16);
    assert_eq!(run.edges, expected_edges, "edge lists diverge");
    assert_eq!(run.outcomes, expected_outcomes, "outcome records diverge");
}

#[rstest]
#[case::single_thread(1, 1 << 20)]
#[case::two_threads(2, 1 << 20)]
#[case::four_threads(4, 1 << 20)]
#[case::tiny_batches(3, 1)]
fn no_conflict_scenario(#[case] threads: usize, #[case] batch: usize) {
    let initial = edges(&[(1, 3), (2, 4), (2, 4), (3, 3), (3, 6), (5, 6)]);
    let swaps = [
        Swap::new(0, 1, true),
        Swap::new(1, 2, false),
        Swap::new(3, 5, true),
    ];
    let run = run_engine(initial.clone(), &swaps, threads, batch, 1 << 16);
    assert_eq!(
        run.edges,
        edges(&[(1, 4), (2, 3), (2, 4), (3, 3), (3, 6), (5, 6)])
    );
    assert_matches_simulator(&initial, &swaps, threads, batch);
}

#[rstest]
#[case::single_thread(1, 1 << 20)]
#[case::four_threads(4, 1 << 20)]
#[case::tiny_batches(2, 1)]
fn chain_scenario(#[case] threads: usize, #[case] batch: usize) {
    let initial = edges(&[
        (1, 2),
        (1, 2),
        (1, 2),
        (1, 9),
        (2, 10),
        (3, 4),
        (5, 6),
        (7, 8),
    ]);
    let swaps = [
        Swap::new(0, 5, false),
        Swap::new(1, 6, false),
        Swap::new(2, 7, false),
        Swap::new(3, 4, false),
    ];
    let run = run_engine(initial.clone(), &swaps, threads, batch, 1 << 16);
    assert_eq!(
        run.edges,
        edges(&[
            (1, 2),
            (1, 3),
            (1, 5),
            (1, 7),
            (2, 4),
            (2, 6),
            (2, 8),
            (9, 10),
        ])
    );
    assert_matches_simulator(&initial, &swaps, threads, batch);
}

#[rstest]
#[case::single_thread(1, 1 << 20)]
#[case::four_threads(4, 1 << 20)]
#[case::tiny_batches(2, 1)]
fn conflict_detected_scenario(#[case] threads: usize, #[case] batch: usize) {
    let initial = edges(&[(1, 2), (1, 2), (1, 2), (1, 3), (2, 4), (5, 6)]);
    let swaps = [Swap::new(0, 5, true), Swap::new(3, 4, false)];
    let run = run_engine(initial.clone(), &swaps, threads, batch, 1 << 16);
    assert_eq!(
        run.edges,
        edges(&[(1, 2), (1, 2), (1, 3), (1, 6), (2, 4), (2, 5)])
    );
    assert!(run.outcomes[0].performed);
    assert!(
        !run.outcomes[1].performed && run.outcomes[1].conflict.contains(&true),
        "recreating (1,2) must conflict with the remaining parallel copies"
    );
    assert_matches_simulator(&initial, &swaps, threads, batch);
}

#[rstest]
#[case::single_thread(1)]
#[case::two_threads(2)]
fn loop_detection_rejects_the_swap(#[case] threads: usize) {
    let initial = edges(&[(1, 2), (2, 3)]);
    // Crossing the shared endpoint pairs (2, 2).
    let swaps = [Swap::new(0, 1, true)];
    let run = run_engine(initial.clone(), &swaps, threads, 1 << 20, 1 << 16);
    assert_eq!(run.edges, initial);
    let outcome = run.outcomes[0];
    assert!(outcome.loop_detected);
    assert!(!outcome.performed);
    assert_eq!(outcome.edges, [Edge::new(1, 3), Edge::new(2, 2)]);
    assert_matches_simulator(&initial, &swaps, threads, 1 << 20);
}

#[test]
fn outcome_records_follow_script_order() {
    let initial = edges(&[(1, 3), (2, 4), (2, 4), (3, 3), (3, 6), (5, 6)]);
    let swaps = [
        Swap::new(0, 1, true),
        Swap::new(1, 2, false),
        Swap::new(3, 5, true),
    ];
    let run = run_engine(initial, &swaps, 2, 1 << 20, 1 << 16);

    assert!(run.outcomes[0].performed);
    assert_eq!(run.outcomes[0].edges, [Edge::new(1, 4), Edge::new(2, 3)]);

    assert!(run.outcomes[1].loop_detected);
    assert_eq!(run.outcomes[1].edges, [Edge::new(2, 2), Edge::new(3, 4)]);

    let third = run.outcomes[2];
    assert!(!third.performed && !third.loop_detected);
    assert_eq!(third.edges, [Edge::new(3, 5), Edge::new(3, 6)]);
    assert_eq!(third.conflict, [false, true], "(3,6) is the conflicting side");
}

#[test]
fn deterministic_across_thread_counts() {
    let initial = random_sorted_multigraph(42, 30, 120);
    let swaps = random_swaps(43, 120, 100);
    let single = run_engine(initial.clone(), &swaps, 1, 1 << 20, 1 << 16);
    let quad = run_engine(initial.clone(), &swaps, 4, 1 << 20, 1 << 16);
    assert_eq!(single.edges, quad.edges);
    assert_eq!(single.outcomes, quad.outcomes);

    let (expected_edges, expected_outcomes) = simulate(&initial, &swaps);
    assert_eq!(single.edges, expected_edges);
    assert_eq!(single.outcomes, expected_outcomes);
}

#[test]
fn tiny_sorter_budget_forces_spills_without_changing_results() {
    let initial = random_sorted_multigraph(7, 25, 200);
    let swaps = random_swaps(8, 200, 150);
    let spilling = run_engine(initial.clone(), &swaps, 2, 4, 64);
    let (expected_edges, expected_outcomes) = simulate(&initial, &swaps);
    assert_eq!(spilling.edges, expected_edges);
    assert_eq!(spilling.outcomes, expected_outcomes);
}

#[test]
fn iterations_split_the_script_into_runs() {
    let initial = random_sorted_multigraph(11, 12, 40);
    let swaps = random_swaps(12, 40, 9);

    // Reference: simulate chunk by chunk, each chunk indexing the edge list
    // the previous chunk left behind.
    let mut expected_edges = initial.clone();
    let mut expected_outcomes = Vec::new();
    for chunk in swaps.chunks(4) {
        let (next, outcomes) = simulate(&expected_edges, chunk);
        expected_edges = next;
        expected_outcomes.extend(outcomes);
    }

    let mut engine = SwapEngineBuilder::new()
        .with_num_threads(2)
        .with_swaps_per_iteration(4)
        .with_record_outcomes(true)
        .build(MemEdgeSequence::from_edges(initial))
        .expect("configuration is valid");
    engine.run(swaps.iter().copied()).expect("run succeeds");
    assert_eq!(engine.outcomes(), expected_outcomes.as_slice());
    let mut sequence = engine.into_edges();
    assert_eq!(sequence.drain_to_vec().expect("drain"), expected_edges);
}

#[test]
fn engine_can_be_reused_for_consecutive_scripts() {
    let initial = random_sorted_multigraph(21, 15, 60);
    let first = random_swaps(22, 60, 30);
    let second = random_swaps(23, 60, 30);

    let (mid, first_outcomes) = simulate(&initial, &first);
    let (expected, second_outcomes) = simulate(&mid, &second);

    let mut engine = SwapEngineBuilder::new()
        .with_num_threads(3)
        .with_record_outcomes(true)
        .build(MemEdgeSequence::from_edges(initial))
        .expect("configuration is valid");
    engine.run(first.iter().copied()).expect("first script");
    engine.run(second.iter().copied()).expect("second script");

    let mut all = first_outcomes;
    all.extend(second_outcomes);
    assert_eq!(engine.outcomes(), all.as_slice());
    let mut sequence = engine.into_edges();
    assert_eq!(sequence.drain_to_vec().expect("drain"), expected);
}

#[test]
fn file_backed_sequences_match_memory_backed_ones() {
    let initial = edges(&[(1, 2), (1, 2), (1, 2), (1, 3), (2, 4), (5, 6)]);
    let swaps = [Swap::new(0, 5, true), Swap::new(3, 4, false)];

    let mut engine = SwapEngineBuilder::new()
        .with_num_threads(2)
        .with_record_outcomes(true)
        .build(FileEdgeSequence::from_edges(initial.iter().copied()).expect("file sequence"))
        .expect("configuration is valid");
    engine.run(swaps.iter().copied()).expect("run succeeds");
    let file_outcomes = engine.outcomes().to_vec();
    let mut sequence = engine.into_edges();
    let file_edges = sequence.drain_to_vec().expect("drain");

    let reference = run_engine(initial, &swaps, 2, 1 << 20, 1 << 16);
    assert_eq!(file_edges, reference.edges);
    assert_eq!(file_outcomes, reference.outcomes);
}

#[test]
fn randomised_equivalence_with_serial_simulator() {
    for seed in 0..150u64 {
        let nodes = 3 + (seed % 17) as i64;
        let num_edges = 2 + ((seed * 7) % 60) as usize;
        let num_swaps = ((seed * 13) % 80) as usize;
        let threads = 1 + (seed % 4) as usize;
        let batch = [1usize, 3, 1 << 20][(seed % 3) as usize];

        let initial = random_sorted_multigraph(seed, nodes, num_edges);
        let swaps = random_swaps(seed.wrapping_mul(0x9e37), num_edges as u64, num_swaps);

        let (expected_edges, expected_outcomes) = simulate(&initial, &swaps);
        let run = run_engine(initial.clone(), &swaps, threads, batch, 1 << 14);

        assert_eq!(run.edges, expected_edges, "seed {seed} diverged");
        assert_eq!(run.outcomes, expected_outcomes, "seed {seed} outcomes diverged");
        assert_eq!(run.edges.len(), initial.len(), "edge count must be preserved");
        assert_eq!(
            degree_census(&run.edges),
            degree_census(&initial),
            "degrees must be preserved"
        );
        assert!(run.edges.iter().all(Edge::is_canonical));
    }
}

#[test]
fn rejects_out_of_range_edge_ids() {
    let mut engine = SwapEngineBuilder::new()
        .build(MemEdgeSequence::from_edges(edges(&[(1, 2), (3, 4)])))
        .expect("configuration is valid");
    let err = engine
        .push(Swap::new(0, 5, true))
        .expect_err("edge id 5 is out of range");
    assert!(matches!(
        err,
        EngineError::EdgeIdOutOfRange { edge_id: 5, len: 2 }
    ));
}

#[test]
fn rejects_self_paired_swaps() {
    let mut engine = SwapEngineBuilder::new()
        .build(MemEdgeSequence::from_edges(edges(&[(1, 2), (3, 4)])))
        .expect("configuration is valid");
    let err = engine
        .push(Swap::new(1, 1, false))
        .expect_err("a swap must reference two distinct positions");
    assert!(matches!(err, EngineError::IdenticalEdgeIds { edge_id: 1 }));
}

#[test]
fn rejects_non_canonical_input_edges() {
    let broken = vec![Edge::from_raw(3, 1), Edge::new(4, 5)];
    let mut engine = SwapEngineBuilder::new()
        .build(MemEdgeSequence::from_edges(broken))
        .expect("configuration is valid");
    let err = engine
        .run([Swap::new(0, 1, false)])
        .expect_err("non-canonical edges are rejected during the load pass");
    assert!(matches!(err, EngineError::NotCanonicalised { position: 0 }));
}

#[test]
fn rejects_unsorted_input_sequences() {
    let unsorted = edges(&[(2, 3), (1, 2)]);
    let mut engine = SwapEngineBuilder::new()
        .build(MemEdgeSequence::from_edges(unsorted))
        .expect("configuration is valid");
    let err = engine
        .run([Swap::new(0, 1, false)])
        .expect_err("out-of-order sequences are rejected during the load pass");
    assert!(matches!(err, EngineError::UnsortedSequence { position: 1 }));
}

#[test]
fn empty_script_leaves_the_sequence_untouched() {
    let initial = edges(&[(1, 2), (3, 4)]);
    let mut engine = SwapEngineBuilder::new()
        .with_record_outcomes(true)
        .build(MemEdgeSequence::from_edges(initial.clone()))
        .expect("configuration is valid");
    engine.run(std::iter::empty()).expect("empty run succeeds");
    assert!(engine.outcomes().is_empty());
    let mut sequence = engine.into_edges();
    assert_eq!(sequence.drain_to_vec().expect("drain"), initial);
}
