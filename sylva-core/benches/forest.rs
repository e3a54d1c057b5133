//! Benchmarks for forest construction and queries.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sylva_core::{AnnIndex, DistanceMetric, IndexConfig, PointId};

const DIM: usize = 64;

fn filled(n: usize, metric: DistanceMetric) -> AnnIndex {
    let mut rng = StdRng::seed_from_u64(42);
    let mut index = AnnIndex::with_config(IndexConfig::new(DIM).with_metric(metric)).unwrap();
    for i in 0..n {
        let v: Vec<f32> = (0..DIM).map(|_| rng.gen_range(-1.0..1.0)).collect();
        index.add_item(i as PointId, &v).unwrap();
    }
    index
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("forest_build");
    group.sample_size(10);

    for num_vectors in [1000, 10000].iter() {
        let index = filled(*num_vectors, DistanceMetric::Angular);
        let vectors: Vec<Vec<f32>> = (0..*num_vectors as PointId)
            .map(|i| index.get_item(i).unwrap())
            .collect();

        group.throughput(Throughput::Elements(*num_vectors as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_vectors),
            num_vectors,
            |bench, _| {
                bench.iter(|| {
                    let mut index = AnnIndex::new(DIM).unwrap();
                    for (i, v) in vectors.iter().enumerate() {
                        index.add_item(i as PointId, v).unwrap();
                    }
                    index.build(10, 0).unwrap();
                    black_box(index.get_n_trees())
                })
            },
        );
    }

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut index = filled(50000, DistanceMetric::Euclidean);
    index.build(20, 0).unwrap();
    let query: Vec<f32> = (0..DIM).map(|d| (d as f32 * 0.37).sin()).collect();

    let mut group = c.benchmark_group("forest_query");

    for search_k in [100, 1000, 10000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(search_k),
            search_k,
            |bench, &search_k| {
                bench.iter(|| index.get_nns_by_vector(black_box(&query), 10, Some(search_k)))
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_build, bench_query);
criterion_main!(benches);
