//! BW-tree benchmarks
//!
//! Measures the index operations that dominate executor performance:
//! point inserts (CAS + delta prepend, amortized consolidation), point
//! searches (chain walk), and full range scans (leaf assembly).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use vulcandb::{BwTree, ScanBounds};

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("bwtree_insert");

    for count in [1_000u64, 10_000] {
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(
            BenchmarkId::new("sequential", count),
            &count,
            |b, &count| {
                b.iter(|| {
                    let tree: BwTree<u64, u64> = BwTree::ordered(false);
                    for key in 0..count {
                        tree.insert(&key, &(key * 2)).unwrap();
                    }
                    tree
                });
            },
        );

        group.bench_with_input(BenchmarkId::new("reversed", count), &count, |b, &count| {
            b.iter(|| {
                let tree: BwTree<u64, u64> = BwTree::ordered(false);
                for key in (0..count).rev() {
                    tree.insert(&key, &(key * 2)).unwrap();
                }
                tree
            });
        });
    }
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("bwtree_search");

    for count in [1_000u64, 100_000] {
        let tree: BwTree<u64, u64> = BwTree::ordered(false);
        for key in 0..count {
            tree.insert(&key, &key).unwrap();
        }
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("point", count), &count, |b, &count| {
            let mut key = 0u64;
            b.iter(|| {
                key = (key + 7919) % count;
                black_box(tree.search(&key).unwrap())
            });
        });
    }
    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("bwtree_scan");

    let count = 100_000u64;
    let tree: BwTree<u64, u64> = BwTree::ordered(false);
    for key in 0..count {
        tree.insert(&key, &key).unwrap();
    }
    group.throughput(Throughput::Elements(count));
    group.bench_function("full", |b| {
        b.iter(|| {
            let scanned = tree
                .range_scan(ScanBounds::all())
                .unwrap()
                .map(|item| item.unwrap())
                .count();
            black_box(scanned)
        });
    });
    group.finish();
}

criterion_group!(benches, bench_insert, bench_search, bench_scan);
criterion_main!(benches);
