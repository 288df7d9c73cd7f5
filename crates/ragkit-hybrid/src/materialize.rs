use tracing::error;

use ragkit_core::corpus::Corpus;
use ragkit_core::error::{Error, Result};
use ragkit_core::types::{FusedResult, RetrievedRecord};

/// Turn fused positions into caller-owned records, keeping fusion order.
///
/// A position outside the corpus means the indices and the document table
/// were built from different data; that fails the whole query.
pub fn materialize(corpus: &Corpus, fused: &[FusedResult]) -> Result<Vec<RetrievedRecord>> {
    fused
        .iter()
        .map(|f| {
            let record = corpus.get(f.position).ok_or_else(|| {
                error!(position = f.position, len = corpus.len(), "index/corpus desync");
                Error::PositionOutOfBounds { position: f.position, len: corpus.len() }
            })?;
            Ok(RetrievedRecord { record: record.clone(), score: f.score, retrieval: f.source })
        })
        .collect()
}
