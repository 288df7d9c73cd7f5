use anyhow::Result;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use ragkit_core::traits::Embedder;

/// Deterministic bag-of-tokens hashing embedder for tests and offline development.
///
/// Texts sharing tokens land close together, which is enough to exercise the
/// dense path without a model on disk.
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            v[idx] += 0.5 + ((h >> 40) as f32) / ((1u64 << 24) as f32);
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        } else {
            // every input maps onto the sphere, including empty text
            v[0] = 1.0;
        }
        v
    }
}

impl Embedder for HashingEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        usize::MAX
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
