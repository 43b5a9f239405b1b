//! Fully-internal serial reference implementation of edge switching.
//!
//! Keeps the whole multigraph in RAM and applies the swap script one swap at
//! a time, which makes it the ground truth for the engine's per-swap
//! semantics: a swap is performed unless it would create a self-loop or an
//! edge that is already present (counting multiplicities, including the
//! swap's own source edges).

use std::collections::HashMap;

use rewire_core::{Edge, Node, Swap, SwapOutcome};

/// Applies `swaps` serially to `edges` and returns the resulting edge list
/// in ascending order together with the per-swap outcome records.
///
/// Edge ids index the input list; positions keep their identity across the
/// script even though the returned list is sorted, matching the engine's
/// output order.
#[must_use]
pub fn simulate(edges: &[Edge], swaps: &[Swap]) -> (Vec<Edge>, Vec<SwapOutcome>) {
    let mut list = edges.to_vec();
    let mut multiset: HashMap<Edge, u64> = HashMap::new();
    for &edge in &list {
        *multiset.entry(edge).or_insert(0) += 1;
    }

    let mut outcomes = Vec::with_capacity(swaps.len());
    for swap in swaps {
        let a = swap.edge(0).get() as usize;
        let b = swap.edge(1).get() as usize;
        let sources = [list[a], list[b]];
        let (first, second) = sources[0].swap_with(sources[1], swap.direction());
        let produced = [first, second];

        let loop_detected = produced[0].is_loop() || produced[1].is_loop();
        let conflict = [
            multiset.get(&produced[0]).copied().unwrap_or(0) > 0,
            multiset.get(&produced[1]).copied().unwrap_or(0) > 0,
        ];
        let performed = !(loop_detected || conflict[0] || conflict[1]);

        outcomes.push(
            SwapOutcome {
                performed,
                loop_detected,
                conflict,
                edges: produced,
            }
            .normalised(),
        );

        if performed {
            for source in sources {
                let count = multiset
                    .get_mut(&source)
                    .expect("a source edge is present in the multiset");
                *count -= 1;
                if *count == 0 {
                    multiset.remove(&source);
                }
            }
            for edge in produced {
                *multiset.entry(edge).or_insert(0) += 1;
            }
            list[a] = produced[0];
            list[b] = produced[1];
        }
    }

    list.sort_unstable();
    (list, outcomes)
}

/// Counts every endpoint occurrence per node; a self-loop contributes two.
#[must_use]
pub fn degree_census(edges: &[Edge]) -> HashMap<Node, u64> {
    let mut census = HashMap::new();
    for edge in edges {
        *census.entry(edge.u()).or_insert(0) += 1;
        *census.entry(edge.v()).or_insert(0) += 1;
    }
    census
}

#[cfg(test)]
mod tests {
    use rewire_core::{Edge, Swap};

    use super::{degree_census, simulate};

    #[test]
    fn performs_independent_swaps() {
        let edges = vec![Edge::new(1, 3), Edge::new(2, 4)];
        let (after, outcomes) = simulate(&edges, &[Swap::new(0, 1, true)]);
        assert_eq!(after, vec![Edge::new(1, 4), Edge::new(2, 3)]);
        assert!(outcomes[0].performed);
        assert!(!outcomes[0].loop_detected);
    }

    #[test]
    fn rejects_loop_producing_swaps() {
        let edges = vec![Edge::new(1, 2), Edge::new(2, 3)];
        // Pairing the shared endpoint produces (2, 2).
        let (after, outcomes) = simulate(&edges, &[Swap::new(0, 1, true)]);
        assert_eq!(after, edges);
        assert!(outcomes[0].loop_detected);
        assert!(!outcomes[0].performed);
    }

    #[test]
    fn counts_parallel_edges_when_checking_conflicts() {
        // Consuming one copy of the doubled (1, 2) must still leave the
        // other copy visible to the second swap's conflict check.
        let edges = vec![
            Edge::new(1, 2),
            Edge::new(1, 2),
            Edge::new(3, 4),
            Edge::new(5, 6),
        ];
        let swaps = vec![Swap::new(0, 2, false), Swap::new(1, 3, false)];
        let (_, outcomes) = simulate(&edges, &swaps);
        assert!(outcomes[0].performed);
        assert!(
            outcomes[1].performed,
            "second swap pairs (1,5),(2,6), which is conflict free"
        );

        let swaps = vec![Swap::new(2, 3, false)];
        let edges = vec![
            Edge::new(1, 2),
            Edge::new(1, 2),
            Edge::new(1, 3),
            Edge::new(2, 4),
        ];
        let (_, outcomes) = simulate(&edges, &swaps);
        assert!(
            !outcomes[0].performed && outcomes[0].conflict[0],
            "recreating (1,2) conflicts with the remaining copies"
        );
    }

    #[test]
    fn census_counts_loops_twice() {
        let census = degree_census(&[Edge::new(1, 1), Edge::new(1, 2)]);
        assert_eq!(census[&1], 3);
        assert_eq!(census[&2], 1);
    }
}
