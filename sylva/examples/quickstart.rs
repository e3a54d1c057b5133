//! Quick start example for sylva.
//!
//! Builds a small forest over toy "document embeddings" and queries it.
//!
//! Run with: RUST_LOG=sylva_core=debug cargo run --example quickstart

use sylva::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("🌲 sylva Quick Start Example\n");

    // Small dimension for demonstration; real embeddings are 384-1536 dim
    let config = IndexConfig::new(8).with_verbose(true);
    let mut index = AnnIndex::with_config(config)?;

    let documents: [(&str, [f32; 8]); 5] = [
        (
            "Introduction to Rust programming",
            [0.9, 0.8, 0.1, 0.0, 0.1, 0.0, 0.2, 0.1],
        ),
        (
            "Advanced Rust patterns and idioms",
            [0.85, 0.9, 0.15, 0.05, 0.1, 0.0, 0.25, 0.15],
        ),
        (
            "Python for data science",
            [0.1, 0.2, 0.9, 0.85, 0.0, 0.1, 0.0, 0.2],
        ),
        (
            "Machine learning fundamentals",
            [0.2, 0.1, 0.7, 0.8, 0.6, 0.7, 0.1, 0.3],
        ),
        (
            "Systems programming with Rust",
            [0.8, 0.7, 0.2, 0.1, 0.15, 0.05, 0.3, 0.2],
        ),
    ];

    println!("📥 Adding {} documents...", documents.len());
    for (id, (_, embedding)) in documents.iter().enumerate() {
        index.add_item(id as PointId, embedding)?;
    }

    index.build(10, 0)?;
    println!(
        "✅ Built {} trees over {} items\n",
        index.get_n_trees(),
        index.get_n_items()
    );

    let query: [f32; 8] = [0.88, 0.85, 0.12, 0.03, 0.12, 0.02, 0.22, 0.12];
    println!("🔍 Searching for documents similar to 'Rust programming'...\n");
    let nearest = index.get_nns_by_vector(&query, 3, None)?;

    println!("📊 Top 3 Results:");
    println!("{:-<60}", "");
    for (rank, (id, distance)) in nearest.ids.iter().zip(&nearest.distances).enumerate() {
        println!(
            "  {}. [ID: {}] {} (distance: {:.4})",
            rank + 1,
            id,
            documents[*id as usize].0,
            distance
        );
    }
    println!("{:-<60}\n", "");

    println!("🔍 Documents closest to #0 (itself excluded)...\n");
    let similar = index.get_nns_by_item(0, 2, None)?;
    for (id, distance) in similar.ids.iter().zip(&similar.distances) {
        println!(
            "  [ID: {}] {} (distance: {:.4})",
            id, documents[*id as usize].0, distance
        );
    }

    println!("\n✨ Done!");
    Ok(())
}
