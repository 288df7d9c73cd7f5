//! ragkit-vector
//!
//! Dense candidate source. Vectors live in a Lance table
//! (`position`, `vector`) and are searched with lancedb's exact L2
//! `vector_search`, so scores equal `clip(1 - d²/2, -1, 1)` for every position.

pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

pub use search::{similarity_from_sq_l2, LanceDenseIndex};
pub use table::open_db;
pub use writer::write_dense_index;
