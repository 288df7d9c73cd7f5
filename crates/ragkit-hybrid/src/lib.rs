//! ragkit-hybrid
//!
//! Joins the dense and sparse candidate sources into one ranked answer:
//! bundle loading, candidate fusion, materialization and the query path.

pub mod bundle;
pub mod fusion;
pub mod handle;
pub mod materialize;
pub mod retriever;

pub use bundle::{embed_corpus, write_bundle, ArtifactBundle, BundlePaths};
pub use fusion::{fuse, FusionPolicy};
pub use handle::BundleHandle;
pub use materialize::materialize;
pub use retriever::{FetchCounts, Retriever};
