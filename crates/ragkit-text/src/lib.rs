//! ragkit-text
//!
//! Sparse candidate source: a TF-IDF term-weight index with tantivy analysis.
//! `index` fits and persists the model, `search` scores queries against it.

pub mod tantivy_utils;
pub mod index;
pub mod search;

pub use index::{TfidfIndex, TfidfModel};
pub use search::top_k_by_score;
