//! ragkit-embed
//!
//! Query encoders behind `ragkit_core::traits::Embedder`: a candle BERT model
//! for real bundles and a hashing embedder for tests and offline work.

pub mod device;
pub mod fake;
pub mod model;
pub mod pool;
pub mod tokenize;

use anyhow::Result;
use tracing::info;

use ragkit_core::config::{expand_path, EmbeddingSettings};
use ragkit_core::traits::Embedder;

pub use fake::HashingEmbedder;
pub use model::BertEmbedder;
pub use pool::masked_mean_l2;

/// Pick the embedder described by the settings.
pub fn get_embedder(settings: &EmbeddingSettings) -> Result<Box<dyn Embedder>> {
    if settings.use_fake {
        info!(dim = settings.fake_dim, "using hashing embedder");
        return Ok(Box::new(HashingEmbedder::new(settings.fake_dim)));
    }
    let dir = expand_path(&settings.model_dir);
    Ok(Box::new(BertEmbedder::load(&dir, settings.max_len)?))
}
