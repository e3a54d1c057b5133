//! Persistence demonstration for sylva.
//!
//! This example shows how to:
//! 1. Build an index and save it as an image
//! 2. Reopen the image (simulating another process)
//! 3. Verify vectors and neighbors survive the round trip
//! 4. Build straight into an image with `on_disk_build`
//!
//! Run with: RUST_LOG=info cargo run --example persistence_demo

use std::time::Instant;

use sylva::prelude::*;
use tracing_subscriber::EnvFilter;

const DIM: usize = 32;

fn embedding(i: usize) -> Vec<f32> {
    (0..DIM).map(|j| ((i * DIM + j) as f32 * 0.01).sin()).collect()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let dir = std::env::temp_dir();
    let image_path = dir.join("sylva_persistence_demo.idx");
    let on_disk_path = dir.join("sylva_on_disk_demo.idx");

    println!("🌲 sylva Persistence Demo\n");

    // Phase 1: build in memory, then save
    println!("📥 Phase 1: Building and saving...");
    let before = {
        let mut index = AnnIndex::with_config(IndexConfig::new(DIM).with_verbose(true))?;
        for i in 0..5000 {
            index.add_item(i as PointId, &embedding(i))?;
        }
        let start = Instant::now();
        index.build(0, 0)?;
        println!(
            "   Built {} trees in {:?}",
            index.get_n_trees(),
            start.elapsed()
        );

        let before = index.get_nns_by_item(42, 5, None)?;
        index.save(&image_path, false)?;
        println!("   Saved to {}", image_path.display());
        before
    };

    // Phase 2: reopen from the image alone
    println!("\n🔄 Phase 2: Reopening...");
    let reopened = AnnIndex::open(&image_path, true)?;
    if let Some(info) = reopened.image_info() {
        println!(
            "   dimension={} metric={:?} items={} trees={} nodes={} bytes={}",
            info.dimension, info.metric, info.n_items, info.n_trees, info.n_nodes, info.file_len
        );
    }

    // Phase 3: verify
    println!("\n🔍 Phase 3: Verifying...");
    assert_eq!(reopened.get_n_items(), 5000);
    assert_eq!(reopened.get_item(42)?, embedding(42));
    let after = reopened.get_nns_by_item(42, 5, None)?;
    assert_eq!(before.ids, after.ids);
    println!("   Neighbors of #42: {:?}", after.ids);

    // Phase 4: build straight into the image
    println!("\n💾 Phase 4: Building on disk...");
    let mut index = AnnIndex::new(DIM)?;
    index.on_disk_build(&on_disk_path)?;
    for i in 0..5000 {
        index.add_item(i as PointId, &embedding(i))?;
    }
    index.build(10, 0)?;
    println!(
        "   Mapped: {}, trees: {}",
        index.is_mapped(),
        index.get_n_trees()
    );

    let _ = std::fs::remove_file(&image_path);
    let _ = std::fs::remove_file(&on_disk_path);
    println!("\n✨ Persistence verified!");
    Ok(())
}
