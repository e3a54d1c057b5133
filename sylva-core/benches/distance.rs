//! Benchmarks for distance metric implementations.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use sylva_core::distance::{dot_product, euclidean_distance_squared, margin};
use sylva_core::DistanceMetric;

fn generate_random_vector(dim: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn bench_metric(c: &mut Criterion, name: &str, metric: DistanceMetric) {
    let mut group = c.benchmark_group(name);

    for dim in [128, 384, 768, 1536].iter() {
        let a = generate_random_vector(*dim);
        let b = generate_random_vector(*dim);

        group.throughput(Throughput::Elements(*dim as u64));
        group.bench_with_input(BenchmarkId::from_parameter(dim), dim, |bench, _| {
            bench.iter(|| metric.raw_distance(black_box(&a), black_box(&b)))
        });
    }

    group.finish();
}

fn bench_angular(c: &mut Criterion) {
    bench_metric(c, "angular_distance", DistanceMetric::Angular);
}

fn bench_euclidean(c: &mut Criterion) {
    bench_metric(c, "euclidean_distance", DistanceMetric::Euclidean);
}

fn bench_kernels(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernels");

    for dim in [128, 768].iter() {
        let a = generate_random_vector(*dim);
        let b = generate_random_vector(*dim);

        group.bench_with_input(BenchmarkId::new("dot_product", dim), dim, |bench, _| {
            bench.iter(|| dot_product(black_box(&a), black_box(&b)))
        });
        group.bench_with_input(BenchmarkId::new("euclidean_squared", dim), dim, |bench, _| {
            bench.iter(|| euclidean_distance_squared(black_box(&a), black_box(&b)))
        });
        group.bench_with_input(BenchmarkId::new("margin", dim), dim, |bench, _| {
            bench.iter(|| margin(black_box(&a), black_box(0.5), black_box(&b)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_angular, bench_euclidean, bench_kernels);
criterion_main!(benches);
