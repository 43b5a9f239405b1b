//! Throughput of the edge-swap engine on generated multigraphs.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rewire_benches::workload;
use rewire_core::{MemEdgeSequence, SwapEngineBuilder};

fn engine_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("edge_swaps");
    for &(num_edges, num_swaps) in &[(10_000usize, 5_000usize), (50_000, 25_000)] {
        let load = workload(99, num_edges, num_swaps);
        group.throughput(Throughput::Elements(num_swaps as u64));
        for threads in [1usize, 4] {
            group.bench_with_input(
                BenchmarkId::new(format!("t{threads}"), num_swaps),
                &load,
                |b, load| {
                    b.iter(|| {
                        let mut engine = SwapEngineBuilder::new()
                            .with_num_threads(threads)
                            .build(MemEdgeSequence::from_edges(load.edges.clone()))
                            .expect("configuration is valid");
                        engine
                            .run(load.swaps.iter().copied())
                            .expect("run succeeds");
                        engine.into_edges()
                    });
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, engine_throughput);
criterion_main!(benches);
