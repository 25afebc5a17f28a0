//! Heap benchmarks.

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use umalloc::{BoundedSegment, Heap};

fn bench_allocate_free(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate_free");

    for size in [8, 64, 512, 4096] {
        let mut heap = Heap::init(BoundedSegment::default()).unwrap();

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let p = heap.allocate(black_box(size)).unwrap();
                heap.free(p);
            });
        });
    }

    group.finish();
}

/// First fit walks every block in front of the fit, so cost grows with the
/// number of live allocations ahead of the free space.
fn bench_fragmented_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("fragmented_search");

    for live in [16, 128, 1024] {
        let mut heap = Heap::init(BoundedSegment::default()).unwrap();
        let blocks: Vec<_> = (0..live).map(|_| heap.allocate(24).unwrap()).collect();
        for p in blocks.iter().step_by(2) {
            heap.free(*p);
        }

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(live), &live, |b, _| {
            b.iter(|| {
                let p = heap.allocate(black_box(256)).unwrap();
                heap.free(p);
            });
        });
    }

    group.finish();
}

fn bench_resize_growth(c: &mut Criterion) {
    c.bench_function("resize_doubling_to_64k", |b| {
        b.iter_batched(
            || Heap::init(BoundedSegment::default()).unwrap(),
            |mut heap| {
                let mut p = heap.allocate(16).unwrap();
                let mut size = 16;
                while size < 64 * 1024 {
                    size *= 2;
                    p = heap.resize(Some(p), size).unwrap();
                }
                black_box(p)
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_allocate_free,
    bench_fragmented_search,
    bench_resize_growth
);
criterion_main!(benches);
