//! Position-ordered, immutable document table.
//!
//! On disk this is `<prefix>_info.json`: an object keyed by the stringified
//! position, each value holding the source columns plus `chunk` and
//! `chunk_idx`. Keys must cover `0..N` exactly, because both indices were
//! built in that order.

use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{CorpusRecord, Meta, Position};

const RESERVED: [&str; 3] = ["chunk", "chunk_idx", "position"];

#[derive(Debug, Clone)]
pub struct Corpus {
    records: Vec<CorpusRecord>,
    fingerprint: String,
}

impl Corpus {
    /// Build from records already in position order.
    pub fn new(records: Vec<CorpusRecord>) -> Result<Self> {
        for (i, r) in records.iter().enumerate() {
            if r.position != i {
                return Err(Error::InvalidParameter(format!(
                    "record at slot {i} carries position {}",
                    r.position
                )));
            }
            if r.chunk.trim().is_empty() {
                return Err(Error::InvalidParameter(format!("record {i} has an empty chunk")));
            }
        }
        let fingerprint = fingerprint_of(&records);
        Ok(Self { records, fingerprint })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| Error::artifact(path, e))?;
        let root: Map<String, Value> =
            serde_json::from_slice(&bytes).map_err(|e| Error::artifact(path, e))?;

        let mut keyed: Vec<(Position, Map<String, Value>)> = Vec::with_capacity(root.len());
        for (key, value) in root {
            let position: Position = key
                .parse()
                .map_err(|_| Error::artifact(path, format!("key '{key}' is not a position")))?;
            let Value::Object(fields) = value else {
                return Err(Error::artifact(path, format!("record {key} is not an object")));
            };
            keyed.push((position, fields));
        }
        keyed.sort_by_key(|(p, _)| *p);

        let mut records = Vec::with_capacity(keyed.len());
        for (slot, (position, fields)) in keyed.into_iter().enumerate() {
            if position != slot {
                return Err(Error::artifact(
                    path,
                    format!("positions are not contiguous: expected {slot}, found {position}"),
                ));
            }
            records.push(parse_record(position, fields).map_err(|reason| Error::artifact(path, reason))?);
        }

        let corpus = Self::new(records).map_err(|e| Error::artifact(path, e))?;
        info!(records = corpus.len(), fingerprint = %corpus.fingerprint, "corpus loaded from {}", path.display());
        Ok(corpus)
    }

    /// Write in the same layout `load` reads.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.to_info_value()).map_err(|e| Error::artifact(path, e))?;
        fs::write(path, json).map_err(|e| Error::artifact(path, e))?;
        debug!(records = self.len(), "corpus written to {}", path.display());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, position: Position) -> Option<&CorpusRecord> {
        self.records.get(position)
    }

    pub fn records(&self) -> &[CorpusRecord] {
        &self.records
    }

    /// blake3 over the canonical JSON form; identifies the bundle contents.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn to_info_value(&self) -> Value {
        info_value(&self.records)
    }
}

fn info_value(records: &[CorpusRecord]) -> Value {
    let mut root = Map::new();
    for r in records {
        let mut obj = Map::new();
        for (k, v) in &r.metadata {
            obj.insert(k.clone(), Value::String(v.clone()));
        }
        obj.insert("chunk".into(), Value::String(r.chunk.clone()));
        obj.insert("chunk_idx".into(), Value::from(r.chunk_idx));
        obj.insert("position".into(), Value::from(r.position));
        root.insert(r.position.to_string(), Value::Object(obj));
    }
    Value::Object(root)
}

fn fingerprint_of(records: &[CorpusRecord]) -> String {
    let canonical = info_value(records).to_string();
    blake3::hash(canonical.as_bytes()).to_hex().to_string()
}

fn parse_record(position: Position, fields: Map<String, Value>) -> std::result::Result<CorpusRecord, String> {
    let chunk = match fields.get("chunk") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(_) => return Err(format!("record {position} has an empty or non-text chunk")),
        None => return Err(format!("record {position} is missing 'chunk'")),
    };
    let chunk_idx = match fields.get("chunk_idx") {
        Some(v) => as_index(v).ok_or_else(|| format!("record {position} has a malformed chunk_idx"))?,
        None => return Err(format!("record {position} is missing 'chunk_idx'")),
    };
    if let Some(v) = fields.get("position") {
        if as_index(v) != Some(position) {
            return Err(format!("record {position} declares a different position: {v}"));
        }
    }

    let metadata: Meta = fields
        .into_iter()
        .filter(|(k, _)| !RESERVED.contains(&k.as_str()))
        .map(|(k, v)| (k, stringify(v)))
        .collect();
    Ok(CorpusRecord { position, chunk, chunk_idx, metadata })
}

fn as_index(v: &Value) -> Option<usize> {
    match v {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn stringify(v: Value) -> String {
    match v {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
