//! Domain types shared by the candidate sources, the fusion engine and the
//! materializer.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Stable 0-based index of a record, shared by the corpus and both indices.
pub type Position = usize;
pub type Meta = BTreeMap<String, String>;

/// One row of the document table.
///
/// - `position`: slot in the corpus, identical in the dense and sparse indices
/// - `chunk`: the text both indices were built from (never empty)
/// - `chunk_idx`: index of the chunk within its source row
/// - `metadata`: every other source column, verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusRecord {
    pub position: Position,
    pub chunk: String,
    pub chunk_idx: usize,
    #[serde(flatten)]
    pub metadata: Meta,
}

/// A single (position, score) entry produced by one candidate source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub position: Position,
    pub score: f64,
}

impl Candidate {
    pub fn new(position: Position, score: f64) -> Self {
        Self { position, score }
    }
}

/// Candidates from one source, best first.
pub type CandidateList = Vec<Candidate>;

/// Which fusion path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Dense,
    Sparse,
    Weighted,
    Rrf,
}

impl SourceTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dense => "dense",
            Self::Sparse => "sparse",
            Self::Weighted => "weighted",
            Self::Rrf => "rrf",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the fusion engine before materialization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub position: Position,
    pub score: f64,
    pub source: SourceTag,
}

/// A corpus record copied out for a caller, with the fusion outcome attached.
///
/// Serializes flat: `{metadata..., position, chunk, chunk_idx, score, retrieval}`.
/// The record's own fields win over metadata columns of the same name.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedRecord {
    pub record: CorpusRecord,
    pub score: f64,
    pub retrieval: SourceTag,
}

const RECORD_FIELDS: [&str; 5] = ["position", "chunk", "chunk_idx", "score", "retrieval"];

impl Serialize for RetrievedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let metadata: Vec<(&String, &String)> = self
            .record
            .metadata
            .iter()
            .filter(|(k, _)| !RECORD_FIELDS.contains(&k.as_str()))
            .collect();
        let mut map = serializer.serialize_map(Some(metadata.len() + RECORD_FIELDS.len()))?;
        for (k, v) in metadata {
            map.serialize_entry(k, v)?;
        }
        map.serialize_entry("position", &self.record.position)?;
        map.serialize_entry("chunk", &self.record.chunk)?;
        map.serialize_entry("chunk_idx", &self.record.chunk_idx)?;
        map.serialize_entry("score", &self.score)?;
        map.serialize_entry("retrieval", &self.retrieval)?;
        map.end()
    }
}
