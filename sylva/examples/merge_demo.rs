//! Merging two indexes.
//!
//! Two shards are built separately, saved, and merged into a third image.
//! Shard A keeps its IDs and shard B's IDs are shifted past them, so a
//! filter over A's range restricts results to points that came from A.
//!
//! Run with: RUST_LOG=info cargo run --example merge_demo

use sylva::prelude::*;
use sylva::{merge_files, Source};
use tracing_subscriber::EnvFilter;

const DIM: usize = 16;

fn shard(offset: usize, n: usize) -> Result<AnnIndex> {
    let mut index = AnnIndex::with_config(
        IndexConfig::new(DIM)
            .with_metric(DistanceMetric::Euclidean)
            .with_verbose(true),
    )?;
    for i in 0..n {
        let v: Vec<f32> = (0..DIM)
            .map(|j| (((offset + i) * DIM + j) as f32 * 0.013).cos())
            .collect();
        index.add_item(i as PointId, &v)?;
    }
    index.build(8, 0)?;
    Ok(index)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let dir = std::env::temp_dir();
    let path_a = dir.join("sylva_merge_demo_a.idx");
    let path_b = dir.join("sylva_merge_demo_b.idx");
    let path_ab = dir.join("sylva_merge_demo_ab.idx");

    println!("🌲 sylva Merge Demo\n");

    let mut a = shard(0, 3000)?;
    let mut b = shard(10_000, 2000)?;
    a.save(&path_a, false)?;
    b.save(&path_b, false)?;
    println!("📥 Saved shard A (3000 items) and shard B (2000 items)");

    let outcome = merge_files(&path_a, &path_b, &path_ab, &MergeOptions::new().with_threads(0))?;
    println!(
        "🔀 Merged: {} items, {} trees, strategy {:?}\n",
        outcome.n_items, outcome.n_trees, outcome.strategy
    );

    let merged = AnnIndex::open(&path_ab, false)?;
    let query = b.get_item(7)?;

    println!("🔍 Nearest to B#7 in the merged index:");
    let nearest = merged.get_nns_by_vector(&query, 5, None)?;
    for (id, distance) in nearest.ids.iter().zip(&nearest.distances) {
        let origin = match outcome.remap.origin(*id) {
            Some((Source::A, old)) => format!("A#{}", old),
            Some((Source::B, old)) => format!("B#{}", old),
            None => "?".to_string(),
        };
        println!("  [ID: {}] from {} (distance: {:.4})", id, origin, distance);
    }

    println!("\n🔍 Same query, only points from A:");
    let allow = Filter::id_range(outcome.remap.a_range()).resolve(&TagIndex::new(), outcome.n_items);
    let params = SearchParams::new(5).with_filter(&allow).with_search_k(2000);
    for r in merged.search(&query, &params)? {
        println!("  [ID: {}] (distance: {:.4})", r.id, r.distance);
    }

    for path in [&path_a, &path_b, &path_ab] {
        let _ = std::fs::remove_file(path);
    }
    println!("\n✨ Done!");
    Ok(())
}
