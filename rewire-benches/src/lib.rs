//! Shared parameters and helpers for the rewire benchmarks.

use rewire_core::{Edge, Swap};
use rewire_test_support::{random_sorted_multigraph, random_swaps};

/// A generated benchmark workload: a sorted multigraph plus a swap script.
pub struct Workload {
    /// Initial edge list, ascending.
    pub edges: Vec<Edge>,
    /// Swap script over the edge positions.
    pub swaps: Vec<Swap>,
}

/// Builds a reproducible workload sized for throughput measurements.
#[must_use]
pub fn workload(seed: u64, num_edges: usize, num_swaps: usize) -> Workload {
    let nodes = (num_edges / 4).max(4) as i64;
    Workload {
        edges: random_sorted_multigraph(seed, nodes, num_edges),
        swaps: random_swaps(seed.wrapping_add(1), num_edges as u64, num_swaps),
    }
}
