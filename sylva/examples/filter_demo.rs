//! Filtered search with a tag index.
//!
//! Points are tagged with a category and a year. Filters combine tags and
//! ID ranges into a roaring bitmap allow-list that the search applies to
//! its candidates before ranking.
//!
//! Run with: cargo run --example filter_demo

use std::time::Instant;

use sylva::prelude::*;
use tracing_subscriber::EnvFilter;

const DIM: usize = 64;
const N: usize = 20_000;
const CATEGORIES: [&str; 4] = ["news", "blog", "paper", "forum"];

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("🌲 sylva Filter Demo\n");

    let mut index = AnnIndex::new(DIM)?;
    let mut tags = TagIndex::new();
    for i in 0..N {
        let v: Vec<f32> = (0..DIM).map(|j| ((i * 7 + j * 13) as f32).sin()).collect();
        let id = index.add(&v)?;
        tags.insert(id, CATEGORIES[i % CATEGORIES.len()]);
        tags.insert(id, 2015 + (i % 10) as i64);
    }
    index.build(20, 0)?;
    println!(
        "📥 Indexed {} items, {} tagged with {} distinct values\n",
        index.get_n_items(),
        tags.len(),
        tags.values().count()
    );

    let query: Vec<f32> = (0..DIM).map(|j| (j as f32 * 0.5).cos()).collect();

    let filters = [
        ("papers", Filter::tag("paper")),
        (
            "papers or blogs since 2022",
            Filter::any_of(vec!["paper", "blog"])
                .and(Filter::any_of(vec![2022i64, 2023, 2024])),
        ),
        ("everything but forum posts", Filter::tag("forum").negate()),
        ("first thousand ids", Filter::id_range(0..1000)),
    ];

    for (label, filter) in &filters {
        let start = Instant::now();
        let allow = filter.resolve(&tags, index.get_n_items());
        let params = SearchParams::new(5).with_filter(&allow).with_search_k(5000);
        let results = index.search(&query, &params)?;
        println!(
            "🔍 {} ({} allowed, {:?}):",
            label,
            allow.len(),
            start.elapsed()
        );
        for r in &results {
            let labels: Vec<String> = tags.tags_of(r.id).iter().map(|t| t.to_string()).collect();
            println!(
                "     [ID: {}] {} (distance: {:.4})",
                r.id,
                labels.join(", "),
                r.distance
            );
        }
    }

    println!("\n✨ Done!");
    Ok(())
}
