use crate::error::Result;
use crate::types::CandidateList;

/// Black-box text encoder. Implementations return L2-normalized vectors of
/// `dim()` floats.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Nearest-neighbour lookup over unit vectors aligned with the corpus.
pub trait DenseSource: Send + Sync {
    fn dim(&self) -> usize;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Up to `fetch_count` positions by similarity, best first.
    fn search(&self, query_embedding: &[f32], fetch_count: usize) -> Result<CandidateList>;
}

/// Term-weighted lookup aligned with the corpus.
pub trait SparseSource: Send + Sync {
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Up to `fetch_count` positions by lexical score, best first.
    fn search(&self, query: &str, fetch_count: usize) -> Result<CandidateList>;
}
