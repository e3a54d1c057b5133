//! Async API demo using AsyncIndex.
//!
//! Run with: cargo run --example async_demo --features async

#[cfg(feature = "async")]
use sylva::prelude::*;
#[cfg(feature = "async")]
use sylva::AsyncIndex;

#[cfg(feature = "async")]
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("Async sylva Demo\n");

    let index = AsyncIndex::new(128)?;

    // IDs are dense, so items go in order
    println!("⏳ Adding 1000 vectors...");
    let start = std::time::Instant::now();
    for i in 0..1000u32 {
        let vector: Vec<f32> = (0..128).map(|j| ((i * 128 + j) as f32).sin()).collect();
        index.add_item(i, vector).await?;
    }
    index.build(10, 0).await?;
    println!("   [OK] Built in {:?}", start.elapsed());
    println!("   Total vectors: {}\n", index.get_n_items());

    // Queries run concurrently on the blocking pool
    println!("Searching concurrently...");
    let mut handles = vec![];
    for q in 0..8u32 {
        let index = index.clone();
        handles.push(tokio::spawn(async move {
            let query: Vec<f32> = (0..128).map(|j| ((q * 31 + j) as f32 * 0.1).cos()).collect();
            index.get_nns_by_vector(query, 3, None).await
        }));
    }
    for (q, handle) in handles.into_iter().enumerate() {
        let nearest = handle
            .await
            .map_err(|e| Error::TaskFailed(e.to_string()))??;
        println!("   query {}: {:?}", q, nearest.ids);
    }

    let path = std::env::temp_dir().join("sylva_async_demo.idx");
    index.save(path.clone(), false).await?;
    let reopened = AsyncIndex::open(path.clone(), true).await?;
    println!("\n   Reopened with {} items", reopened.get_n_items());
    let _ = std::fs::remove_file(&path);

    println!("\nAsync demo complete!");
    Ok(())
}

#[cfg(not(feature = "async"))]
fn main() {
    println!("Run with: cargo run --example async_demo --features async");
}
