//! The three aligned artifacts a retriever serves from, loaded as one unit.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use ragkit_core::corpus::Corpus;
use ragkit_core::error::{Error, Result};
use ragkit_core::traits::{DenseSource, Embedder, SparseSource};
use ragkit_text::TfidfIndex;
use ragkit_vector::{open_db, write_dense_index, LanceDenseIndex};

/// File layout of a bundle for one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundlePaths {
    pub info: PathBuf,
    pub lance_dir: PathBuf,
    pub dense_table: String,
    pub sparse: PathBuf,
}

impl BundlePaths {
    pub fn new(dir: &Path, prefix: &str) -> Self {
        Self {
            info: dir.join(format!("{prefix}_info.json")),
            lance_dir: dir.join(format!("{prefix}_lance")),
            dense_table: format!("{prefix}_dense"),
            sparse: dir.join(format!("{prefix}_sparse.json")),
        }
    }

    fn lance_uri(&self) -> String {
        self.lance_dir.to_string_lossy().into_owned()
    }
}

/// Corpus plus the dense and sparse sources built over it. Immutable once built.
pub struct ArtifactBundle {
    corpus: Corpus,
    dense: Arc<dyn DenseSource>,
    sparse: Arc<dyn SparseSource>,
}

impl ArtifactBundle {
    /// Assemble in-memory parts. All three must cover the same positions.
    pub fn new(corpus: Corpus, dense: Arc<dyn DenseSource>, sparse: Arc<dyn SparseSource>) -> Result<Self> {
        if dense.len() != corpus.len() || sparse.len() != corpus.len() {
            return Err(Error::IndexUnavailable(format!(
                "bundle parts disagree: corpus has {} records, dense {} and sparse {}",
                corpus.len(),
                dense.len(),
                sparse.len()
            )));
        }
        Ok(Self { corpus, dense, sparse })
    }

    /// Load `<prefix>_info.json`, `<prefix>_sparse.json` and the Lance dense table.
    ///
    /// Either every part loads or the call fails.
    pub async fn load(dir: &Path, prefix: &str) -> Result<Self> {
        let paths = BundlePaths::new(dir, prefix);
        let corpus = Corpus::load(&paths.info)?;
        let sparse = TfidfIndex::load(&paths.sparse)?;
        if !paths.lance_dir.is_dir() {
            return Err(Error::IndexUnavailable(format!("{} does not exist", paths.lance_dir.display())));
        }
        let dense = LanceDenseIndex::open(&paths.lance_uri(), &paths.dense_table).await?;

        let bundle = Self::new(corpus, Arc::new(dense), Arc::new(sparse))?;
        info!(
            records = bundle.len(),
            dim = bundle.dense.dim(),
            fingerprint = %bundle.fingerprint(),
            "bundle '{}' loaded from {}",
            prefix,
            dir.display()
        );
        Ok(bundle)
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn dense(&self) -> &dyn DenseSource {
        self.dense.as_ref()
    }

    pub fn sparse(&self) -> &dyn SparseSource {
        self.sparse.as_ref()
    }

    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }

    pub fn fingerprint(&self) -> &str {
        self.corpus.fingerprint()
    }
}

impl std::fmt::Debug for ArtifactBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactBundle")
            .field("records", &self.len())
            .field("dim", &self.dense.dim())
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Encode every chunk in position order, `batch_size` texts per call.
pub fn embed_corpus(embedder: &dyn Embedder, corpus: &Corpus, batch_size: usize) -> Result<Vec<Vec<f32>>> {
    if batch_size == 0 {
        return Err(Error::InvalidParameter("batch_size must be > 0".into()));
    }
    let mut vectors = Vec::with_capacity(corpus.len());
    for batch in corpus.records().chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|r| r.chunk.clone()).collect();
        let embedded = embedder.embed_batch(&texts).map_err(|e| Error::Embedding(format!("{e:#}")))?;
        if embedded.len() != texts.len() {
            return Err(Error::Embedding(format!("asked for {} vectors, got {}", texts.len(), embedded.len())));
        }
        vectors.extend(embedded);
        debug!(done = vectors.len(), total = corpus.len(), "embedded chunks");
    }
    Ok(vectors)
}

/// Write a complete bundle for already chunked records and their unit vectors.
///
/// Refuses to overwrite an existing dense table.
pub async fn write_bundle(dir: &Path, prefix: &str, corpus: &Corpus, dim: usize, vectors: &[Vec<f32>]) -> Result<BundlePaths> {
    if vectors.len() != corpus.len() {
        return Err(Error::InvalidParameter(format!(
            "{} vectors for {} records",
            vectors.len(),
            corpus.len()
        )));
    }
    fs::create_dir_all(dir).map_err(|e| Error::artifact(dir, e))?;
    let paths = BundlePaths::new(dir, prefix);

    let conn = open_db(&paths.lance_uri()).await?;
    write_dense_index(&conn, &paths.dense_table, dim, vectors).await?;

    let chunks: Vec<&str> = corpus.records().iter().map(|r| r.chunk.as_str()).collect();
    let sparse = TfidfIndex::fit(&chunks);
    sparse.save(&paths.sparse)?;
    corpus.save(&paths.info)?;

    info!(records = corpus.len(), dim, terms = sparse.vocabulary_size(), "bundle '{}' written to {}", prefix, dir.display());
    Ok(paths)
}
