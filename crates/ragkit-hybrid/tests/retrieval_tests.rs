use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use ragkit_core::corpus::Corpus;
use ragkit_core::error::{Error, Result};
use ragkit_core::traits::{DenseSource, Embedder};
use ragkit_core::types::{Candidate, CandidateList, CorpusRecord, Meta, SourceTag};
use ragkit_embed::HashingEmbedder;
use ragkit_hybrid::{embed_corpus, write_bundle, ArtifactBundle, BundleHandle, FetchCounts, FusionPolicy, Retriever};
use ragkit_text::TfidfIndex;

const DIM: usize = 1024;

fn tickets() -> Corpus {
    let rows = [
        ("T-100", "Login", "Topic: Login\nDetails: reset password email not received"),
        ("T-101", "Billing", "Topic: Billing\nDetails: invoice shows a duplicate charge"),
        ("T-102", "Shipping", "Topic: Shipping\nDetails: parcel stuck at the warehouse"),
        ("T-103", "Login", "Topic: Login\nDetails: two factor code rejected on mobile"),
        ("T-104", "Billing", "Topic: Billing\nDetails: refund requested for annual plan"),
    ];
    let records = rows
        .iter()
        .enumerate()
        .map(|(i, (id, category, chunk))| CorpusRecord {
            position: i,
            chunk: chunk.to_string(),
            chunk_idx: 0,
            metadata: Meta::from([
                ("ticket_id".to_string(), id.to_string()),
                ("category".to_string(), category.to_string()),
            ]),
        })
        .collect();
    Corpus::new(records).unwrap()
}

async fn write_tickets(dir: &Path, prefix: &str, corpus: &Corpus) -> anyhow::Result<()> {
    let embedder = HashingEmbedder::new(DIM);
    let vectors = embed_corpus(&embedder, corpus, 2)?;
    write_bundle(dir, prefix, corpus, DIM, &vectors).await?;
    Ok(())
}

async fn retriever_over(dir: &Path, prefix: &str) -> anyhow::Result<Retriever> {
    let bundle = ArtifactBundle::load(dir, prefix).await?;
    let handle = Arc::new(BundleHandle::new(bundle));
    Ok(Retriever::new(Arc::new(HashingEmbedder::new(DIM)), handle, FetchCounts::default())?)
}

#[tokio::test]
async fn bundle_round_trip_and_query() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_tickets(tmp.path(), "knowledge", &tickets()).await?;
    let retriever = retriever_over(tmp.path(), "knowledge").await?;

    let hits = retriever.retrieve("reset password", 3, &FusionPolicy::Equal)?;
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].record.metadata["ticket_id"], "T-100");
    assert_eq!(hits[0].retrieval, SourceTag::Dense);
    assert_eq!(hits[0].record.chunk_idx, 0);
    let distinct: HashSet<_> = hits.iter().map(|h| h.record.position).collect();
    assert_eq!(distinct.len(), 3);
    Ok(())
}

#[tokio::test]
async fn every_policy_tags_its_results() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_tickets(tmp.path(), "knowledge", &tickets()).await?;
    let retriever = retriever_over(tmp.path(), "knowledge").await?;

    let weighted = retriever.retrieve("refund annual plan", 2, &FusionPolicy::weighted(0.6)?)?;
    assert_eq!(weighted[0].record.metadata["ticket_id"], "T-104");
    assert!(weighted.iter().all(|h| h.retrieval == SourceTag::Weighted));

    let rrf = retriever.retrieve("refund annual plan", 2, &FusionPolicy::rrf(60))?;
    assert_eq!(rrf[0].record.metadata["ticket_id"], "T-104");
    assert!(rrf.iter().all(|h| h.retrieval == SourceTag::Rrf));
    // found by both sources at rank 1
    assert!((rrf[0].score - 2.0 / 61.0).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn boundaries_return_what_exists() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_tickets(tmp.path(), "knowledge", &tickets()).await?;
    let retriever = retriever_over(tmp.path(), "knowledge").await?;

    assert!(retriever.retrieve("password", 0, &FusionPolicy::Equal)?.is_empty());
    // sparse returns every position, so the union covers the corpus
    assert_eq!(retriever.retrieve("password", 50, &FusionPolicy::Equal)?.len(), 5);
    assert_eq!(retriever.retrieve("zzzz qqqq", 3, &FusionPolicy::rrf(60))?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn reload_reports_changes() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let corpus = tickets();
    write_tickets(tmp.path(), "v1", &corpus).await?;
    let smaller = Corpus::new(corpus.records()[..3].to_vec())?;
    write_tickets(tmp.path(), "v2", &smaller).await?;

    let retriever = retriever_over(tmp.path(), "v1").await?;
    let before = retriever.bundle().snapshot();
    assert!(!retriever.bundle().reload(tmp.path(), "v1").await?);
    // same document table: flagged unchanged, yet the fresh load is published
    assert!(!Arc::ptr_eq(&before, &retriever.bundle().snapshot()));
    assert!(retriever.bundle().reload(tmp.path(), "v2").await?);
    assert_eq!(before.len(), 5, "old snapshot is untouched");
    assert_eq!(retriever.retrieve("billing", 10, &FusionPolicy::Equal)?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn empty_corpus_bundle_returns_nothing() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let empty = Corpus::new(Vec::new())?;
    write_bundle(tmp.path(), "empty", &empty, DIM, &[]).await?;
    assert_eq!(std::fs::read_to_string(tmp.path().join("empty_info.json"))?.trim(), "{}");

    let bundle = ArtifactBundle::load(tmp.path(), "empty").await?;
    assert!(bundle.is_empty());
    assert_eq!(bundle.dense().dim(), DIM);
    assert!(bundle.sparse().is_empty());

    let retriever = Retriever::new(Arc::new(HashingEmbedder::new(DIM)), Arc::new(BundleHandle::new(bundle)), FetchCounts::default())?;
    for policy in [FusionPolicy::Equal, FusionPolicy::weighted(0.6)?, FusionPolicy::rrf(60)] {
        assert!(retriever.retrieve("reset password", 5, &policy)?.is_empty());
    }
    Ok(())
}

#[tokio::test]
async fn missing_parts_fail_the_load() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let err = ArtifactBundle::load(tmp.path(), "knowledge").await.unwrap_err();
    assert!(matches!(err, Error::ArtifactLoad { .. }));

    write_tickets(tmp.path(), "knowledge", &tickets()).await?;
    std::fs::remove_dir_all(tmp.path().join("knowledge_lance"))?;
    let err = ArtifactBundle::load(tmp.path(), "knowledge").await.unwrap_err();
    assert!(matches!(err, Error::IndexUnavailable(_)));
    Ok(())
}

#[tokio::test]
async fn writer_refuses_to_overwrite() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_tickets(tmp.path(), "knowledge", &tickets()).await?;
    assert!(write_tickets(tmp.path(), "knowledge", &tickets()).await.is_err());
    Ok(())
}

struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn dim(&self) -> usize {
        DIM
    }
    fn max_len(&self) -> usize {
        512
    }
    fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("model offline")
    }
}

/// Claims to cover the corpus but hands back a position past its end.
struct DesyncedDense {
    len: usize,
}

impl DenseSource for DesyncedDense {
    fn dim(&self) -> usize {
        DIM
    }
    fn len(&self) -> usize {
        self.len
    }
    fn search(&self, _query: &[f32], _fetch_count: usize) -> Result<CandidateList> {
        Ok(vec![Candidate::new(self.len + 2, 0.9)])
    }
}

fn in_memory(dense: Arc<dyn DenseSource>) -> Arc<BundleHandle> {
    let corpus = tickets();
    let chunks: Vec<&str> = corpus.records().iter().map(|r| r.chunk.as_str()).collect();
    let sparse = TfidfIndex::fit(&chunks);
    Arc::new(BundleHandle::new(ArtifactBundle::new(corpus, dense, Arc::new(sparse)).unwrap()))
}

#[test]
fn embedding_failure_propagates() {
    let handle = in_memory(Arc::new(DesyncedDense { len: 5 }));
    let retriever = Retriever::new(Arc::new(FailingEmbedder), handle, FetchCounts::default()).unwrap();
    let err = retriever.retrieve("anything", 3, &FusionPolicy::Equal).unwrap_err();
    assert!(matches!(err, Error::Embedding(msg) if msg.contains("model offline")));
}

#[test]
fn desync_is_an_error_not_a_skip() {
    let handle = in_memory(Arc::new(DesyncedDense { len: 5 }));
    let retriever = Retriever::new(Arc::new(HashingEmbedder::new(DIM)), handle, FetchCounts::default()).unwrap();
    let err = retriever.retrieve("password", 3, &FusionPolicy::Equal).unwrap_err();
    assert!(matches!(err, Error::PositionOutOfBounds { position: 7, len: 5 }));
}

#[test]
fn construction_checks_dimension_and_fetch_counts() {
    let handle = in_memory(Arc::new(DesyncedDense { len: 5 }));
    let err = Retriever::new(Arc::new(HashingEmbedder::new(8)), handle.clone(), FetchCounts::default()).unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: DIM, got: 8 }));
    let err = Retriever::new(Arc::new(HashingEmbedder::new(DIM)), handle, FetchCounts { dense: 0, sparse: 10 }).unwrap_err();
    assert!(matches!(err, Error::InvalidParameter(_)));
}

#[test]
fn unknown_policy_name_is_rejected() {
    assert!(matches!(FusionPolicy::from_name("hybrid", 0.6, 60), Err(Error::InvalidPolicy(name)) if name == "hybrid"));
}
