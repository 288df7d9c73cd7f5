use std::panic;
use std::sync::Arc;
use std::thread;
use tracing::debug;

use ragkit_core::config::RetrievalSettings;
use ragkit_core::error::{Error, Result};
use ragkit_core::traits::Embedder;
use ragkit_core::types::RetrievedRecord;

use crate::fusion::{fuse, FusionPolicy};
use crate::handle::BundleHandle;
use crate::materialize::materialize;

/// How many candidates each source is asked for before fusion.
/// Both are raised to `top_k` when a caller asks for more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchCounts {
    pub dense: usize,
    pub sparse: usize,
}

impl Default for FetchCounts {
    fn default() -> Self {
        Self { dense: 50, sparse: 200 }
    }
}

impl From<&RetrievalSettings> for FetchCounts {
    fn from(s: &RetrievalSettings) -> Self {
        Self { dense: s.dense_fetch, sparse: s.sparse_fetch }
    }
}

/// Query side of the engine: embed, fetch from both sources, fuse, materialize.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    bundle: Arc<BundleHandle>,
    fetch: FetchCounts,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, bundle: Arc<BundleHandle>, fetch: FetchCounts) -> Result<Self> {
        if fetch.dense == 0 || fetch.sparse == 0 {
            return Err(Error::InvalidParameter(format!(
                "fetch counts must be > 0 (dense {}, sparse {})",
                fetch.dense, fetch.sparse
            )));
        }
        let index_dim = bundle.snapshot().dense().dim();
        if embedder.dim() != index_dim {
            return Err(Error::DimensionMismatch { expected: index_dim, got: embedder.dim() });
        }
        Ok(Self { embedder, bundle, fetch })
    }

    pub fn bundle(&self) -> &BundleHandle {
        &self.bundle
    }

    /// Top `top_k` records for `query`, best first, each tagged with the
    /// fusion path that produced it.
    pub fn retrieve(&self, query: &str, top_k: usize, policy: &FusionPolicy) -> Result<Vec<RetrievedRecord>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let bundle = self.bundle.snapshot();
        if bundle.is_empty() {
            debug!("empty corpus, nothing to retrieve");
            return Ok(Vec::new());
        }

        let dense_fetch = self.fetch.dense.max(top_k);
        let sparse_fetch = self.fetch.sparse.max(top_k);
        let (dense, sparse) = thread::scope(|s| {
            let dense_job = s.spawn(|| {
                let embedding = self.embed_query(query)?;
                bundle.dense().search(&embedding, dense_fetch)
            });
            let sparse = bundle.sparse().search(query, sparse_fetch);
            let dense = dense_job.join().unwrap_or_else(|payload| panic::resume_unwind(payload));
            (dense, sparse)
        });
        let (dense, sparse) = (dense?, sparse?);

        let fused = fuse(&dense, &sparse, top_k, policy);
        debug!(
            policy = policy.name(),
            dense = dense.len(),
            sparse = sparse.len(),
            fused = fused.len(),
            "candidates fused"
        );
        materialize(bundle.corpus(), &fused)
    }

    fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embedder
            .embed_batch(&[query.to_string()])
            .map_err(|e| Error::Embedding(format!("{e:#}")))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("embedder returned no vector for the query".into()))
    }
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("embedder_dim", &self.embedder.dim())
            .field("bundle", &self.bundle)
            .field("fetch", &self.fetch)
            .finish()
    }
}
