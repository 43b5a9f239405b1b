//! Deterministic workload generators for tests and benches.

use rand::{Rng, SeedableRng, rngs::SmallRng};
use rewire_core::{Edge, Swap};

/// Generates `num_edges` random canonical edges over `num_nodes` nodes, in
/// ascending order. Self-loops and parallel edges are allowed, mirroring
/// configuration-model output.
#[must_use]
pub fn random_sorted_multigraph(seed: u64, num_nodes: i64, num_edges: usize) -> Vec<Edge> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut edges: Vec<Edge> = (0..num_edges)
        .map(|_| {
            let u = rng.gen_range(0..num_nodes);
            let v = rng.gen_range(0..num_nodes);
            Edge::new(u, v)
        })
        .collect();
    edges.sort_unstable();
    edges
}

/// Generates `num_swaps` random swap requests over `num_edges` edge
/// positions, never pairing a position with itself.
#[must_use]
pub fn random_swaps(seed: u64, num_edges: u64, num_swaps: usize) -> Vec<Swap> {
    assert!(num_edges >= 2, "swaps need two distinct edge positions");
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..num_swaps)
        .map(|_| {
            let a = rng.gen_range(0..num_edges);
            let mut b = rng.gen_range(0..num_edges - 1);
            if b >= a {
                b += 1;
            }
            Swap::new(a, b, rng.gen_bool(0.5))
        })
        .collect()
}
