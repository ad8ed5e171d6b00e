//! 一致性哈希环性能基准测试

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use resilink::core::HashRing;

fn bench_node_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring/node_for");
    for node_count in [3usize, 10, 50] {
        let nodes: Vec<String> = (0..node_count).map(|i| format!("shard-{}", i)).collect();
        let ring = HashRing::with_nodes(10, &nodes);
        let counter = std::sync::atomic::AtomicU64::new(0);
        group.bench_with_input(
            BenchmarkId::from_parameter(node_count),
            &ring,
            |b, ring| {
                b.iter(|| {
                    let i = counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    ring.node_for(&format!("url:key_{}", i)).unwrap()
                });
            },
        );
    }
    group.finish();
}

fn bench_ring_rebuild(c: &mut Criterion) {
    let nodes: Vec<String> = (0..10).map(|i| format!("shard-{}", i)).collect();

    c.bench_function("ring/add_remove_node", |b| {
        let ring = HashRing::with_nodes(10, &nodes);
        b.iter(|| {
            ring.add_node("shard-extra");
            ring.remove_node("shard-extra");
        });
    });
}

criterion_group!(benches, bench_node_lookup, bench_ring_rebuild);
criterion_main!(benches);
