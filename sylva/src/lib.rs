//! # Sylva
//!
//! **Approximate nearest-neighbor search over memory-mapped random-projection forests.**
//!
//! Sylva indexes fixed-dimension `f32` vectors in a forest of binary trees.
//! Each tree splits space with hyperplanes chosen by a two-means step, and a
//! query walks all trees best-first until it has gathered `search_k`
//! candidates, which are then ranked exactly.
//!
//! - **Build once, map many** - A built index is saved as a single image that
//!   later processes memory-map instead of parsing
//! - **Deterministic** - A fixed seed reproduces the same forest, whatever the
//!   thread count
//! - **Mergeable** - Two indexes combine into a new image with stable IDs
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | **Distance Metrics** | Angular, Euclidean |
//! | **Tunable Recall** | Trade query time for accuracy with `search_k` |
//! | **Filtered Search** | Restrict results to a roaring bitmap allow-list |
//! | **Persistence** | Self-describing, checksummed, atomically published images |
//! | **On-disk Build** | Build straight into the image for indexes larger than RAM |
//! | **Async API** | Tokio-compatible async operations (feature flag) |
//!
//! ## Quick Start
//!
//! ```rust
//! use sylva::prelude::*;
//!
//! // 8-dimensional index with the default angular metric
//! let mut index = AnnIndex::new(8).unwrap();
//!
//! let mut a = vec![0.0; 8];
//! a[0] = 1.0;
//! let mut b = vec![0.0; 8];
//! b[1] = 1.0;
//! let mut c = vec![0.0; 8];
//! c[0] = 0.9;
//! c[1] = 0.1;
//!
//! index.add_item(0, &a).unwrap();
//! index.add_item(1, &b).unwrap();
//! index.add_item(2, &c).unwrap();
//!
//! // 5 trees, one thread
//! index.build(5, 1).unwrap();
//!
//! let nearest = index.get_nns_by_vector(&a, 2, None).unwrap();
//! assert_eq!(nearest.ids, vec![0, 2]);
//! ```
//!
//! ### Saving and Loading
//!
//! ```no_run
//! use sylva::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let mut index = AnnIndex::with_config(
//!         IndexConfig::new(128).with_metric(DistanceMetric::Euclidean),
//!     )?;
//!     for i in 0..1000 {
//!         let v: Vec<f32> = (0..128).map(|j| ((i * 128 + j) as f32).sin()).collect();
//!         index.add_item(i, &v)?;
//!     }
//!     index.build(10, 0)?;
//!
//!     // Published atomically, then memory-mapped read-only
//!     index.save("vectors.sylva", false)?;
//!
//!     // Another process only needs the file
//!     let reopened = AnnIndex::open("vectors.sylva", true)?;
//!     let nearest = reopened.get_nns_by_item(0, 10, None)?;
//!     println!("{:?}", nearest.ids);
//!     Ok(())
//! }
//! ```
//!
//! ### Filtered Search
//!
//! Tag points in a [`TagIndex`], resolve a [`Filter`] into an allow-list and
//! pass it with the query:
//!
//! ```rust
//! use sylva::prelude::*;
//!
//! let mut index = AnnIndex::new(3).unwrap();
//! index.add_item(0, &[1.0, 0.0, 0.0]).unwrap();
//! index.add_item(1, &[0.9, 0.1, 0.0]).unwrap();
//! index.add_item(2, &[0.8, 0.2, 0.0]).unwrap();
//! index.build(2, 1).unwrap();
//!
//! let mut tags = TagIndex::new();
//! tags.insert(0, "A");
//! tags.insert(1, "B");
//! tags.insert(2, "A");
//!
//! let allow = Filter::tag("A").resolve(&tags, index.get_n_items());
//! let params = SearchParams::new(10).with_filter(&allow);
//! let results = index.search(&[1.0, 0.0, 0.0], &params).unwrap();
//!
//! assert_eq!(results.len(), 2); // Only category A results
//! ```
//!
//! ### Merging
//!
//! [`merge()`] writes a new image holding both inputs. Points of the first
//! index keep their IDs; points of the second are shifted past them.
//!
//! ```no_run
//! use sylva::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let a = AnnIndex::open("a.sylva", false)?;
//!     let b = AnnIndex::open("b.sylva", false)?;
//!     let outcome = sylva::merge(&a, &b, "ab.sylva", &MergeOptions::new())?;
//!     println!("{} items, {:?}", outcome.n_items, outcome.strategy);
//!     Ok(())
//! }
//! ```
//!
//! ## Crate Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `async` | Enables `AsyncIndex` for tokio compatibility |
//!
//! Enable features in `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! sylva = { version = "0.1", features = ["async"] }
//! ```
//!
//! ## Architecture
//!
//! Sylva is organized into two crates:
//!
//! - **`sylva-core`** - Core library with no async runtime dependency
//! - **`sylva`** - Main crate that re-exports everything
//!
//! ### Core Components
//!
//! - [`AnnIndex`] - The index and its build/save/load lifecycle
//! - [`SharedIndex`] - Many readers, one writer
//! - [`DiskImage`] - A memory-mapped image
//! - [`TagIndex`] / [`Filter`] - Allow-lists for filtered search
//! - [`merge()`] - Combine two indexes
//!
//! ## Logging
//!
//! Sylva emits [`tracing`](https://docs.rs/tracing) events for build, save,
//! load and merge progress. Install any subscriber to see them; set
//! `IndexConfig::with_verbose(true)` to raise them from `debug` to `info`.
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`](crate::Result), which uses
//! the [`Error`] enum for error types.
//!
//! ## Thread Safety
//!
//! - A built or mapped [`AnnIndex`] is `Sync`; queries only need `&self`
//! - [`SharedIndex`] uses an internal `RwLock` for mixed reads and writes
//! - `AsyncIndex` is `Clone` and safe to share across tasks

// Re-export everything from core
pub use sylva_core::*;
