//! Fusion of the dense and sparse candidate lists.
//!
//! Three policies:
//! - `Equal`: quota fill, `ceil(k/2)` dense then `floor(k/2)` sparse, topped up
//!   from the dense overflow and then the sparse overflow
//! - `Weighted`: per-modality min-max over the union, blended with `alpha`
//! - `Rrf`: reciprocal rank fusion, `Σ 1/(k + rank)`
//!
//! Every policy returns at most `top_k` results with distinct positions.
//! Within one candidate list the first occurrence of a position is the one
//! that counts.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use ragkit_core::error::{Error, Result};
use ragkit_core::types::{Candidate, FusedResult, Position, SourceTag};

/// Below this spread a modality carries no ranking signal and normalizes to 0.
pub const MIN_SCORE_SPREAD: f64 = 1e-12;

pub const DEFAULT_ALPHA: f64 = 0.6;
pub const DEFAULT_RRF_K: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum FusionPolicy {
    #[default]
    Equal,
    /// `alpha` weights the dense side, `1 - alpha` the sparse side.
    Weighted { alpha: f64 },
    /// `k` damps how much rank 1 dominates lower ranks.
    Rrf { k: u32 },
}

impl FusionPolicy {
    pub fn weighted(alpha: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(Error::InvalidParameter(format!("alpha must be within [0, 1], got {alpha}")));
        }
        Ok(Self::Weighted { alpha })
    }

    pub fn rrf(k: u32) -> Self {
        Self::Rrf { k }
    }

    /// Resolve a policy name, taking the parameters the named policy needs.
    pub fn from_name(name: &str, alpha: f64, rrf_k: u32) -> Result<Self> {
        match name {
            "equal" => Ok(Self::Equal),
            "weighted" => Self::weighted(alpha),
            "rrf" => Ok(Self::rrf(rrf_k)),
            other => Err(Error::InvalidPolicy(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::Weighted { .. } => "weighted",
            Self::Rrf { .. } => "rrf",
        }
    }
}

impl FromStr for FusionPolicy {
    type Err = Error;

    /// Name only; parameters take their defaults.
    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s, DEFAULT_ALPHA, DEFAULT_RRF_K)
    }
}

impl fmt::Display for FusionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => f.write_str("equal"),
            Self::Weighted { alpha } => write!(f, "weighted(alpha={alpha})"),
            Self::Rrf { k } => write!(f, "rrf(k={k})"),
        }
    }
}

/// Combine two ranked candidate lists into at most `top_k` distinct results.
///
/// Pure and deterministic: equal inputs give equal outputs.
pub fn fuse(dense: &[Candidate], sparse: &[Candidate], top_k: usize, policy: &FusionPolicy) -> Vec<FusedResult> {
    if top_k == 0 {
        return Vec::new();
    }
    match *policy {
        FusionPolicy::Equal => fuse_equal(dense, sparse, top_k),
        FusionPolicy::Weighted { alpha } => fuse_weighted(dense, sparse, top_k, alpha),
        FusionPolicy::Rrf { k } => fuse_rrf(dense, sparse, top_k, k),
    }
}

fn fuse_equal(dense: &[Candidate], sparse: &[Candidate], top_k: usize) -> Vec<FusedResult> {
    let (dense_head, dense_tail) = dense.split_at(top_k.div_ceil(2).min(dense.len()));
    let (sparse_head, sparse_tail) = sparse.split_at((top_k / 2).min(sparse.len()));

    // block order is part of the contract: primaries first, dense overflow before sparse overflow
    let blocks = [
        (dense_head, SourceTag::Dense),
        (sparse_head, SourceTag::Sparse),
        (dense_tail, SourceTag::Dense),
        (sparse_tail, SourceTag::Sparse),
    ];

    let mut seen = HashSet::with_capacity(top_k);
    let mut out = Vec::with_capacity(top_k);
    for (block, source) in blocks {
        for c in block {
            if out.len() >= top_k {
                return out;
            }
            if seen.insert(c.position) {
                out.push(FusedResult { position: c.position, score: c.score, source });
            }
        }
    }
    out
}

fn fuse_weighted(dense: &[Candidate], sparse: &[Candidate], top_k: usize, alpha: f64) -> Vec<FusedResult> {
    let dense_scores = first_scores(dense);
    let sparse_scores = first_scores(sparse);

    let mut union: Vec<Position> = dense_scores.keys().chain(sparse_scores.keys()).copied().collect();
    union.sort_unstable();
    union.dedup();

    let raw = |scores: &HashMap<Position, f64>| -> Vec<f64> {
        union.iter().map(|p| scores.get(p).copied().unwrap_or(0.0)).collect()
    };
    let dense_norm = min_max(&raw(&dense_scores));
    let sparse_norm = min_max(&raw(&sparse_scores));

    let mut fused: Vec<(Position, f64)> = union
        .iter()
        .zip(dense_norm.iter().zip(&sparse_norm))
        .map(|(&p, (d, s))| (p, alpha * d + (1.0 - alpha) * s))
        .collect();
    rank_and_truncate(&mut fused, top_k);
    tagged(fused, SourceTag::Weighted)
}

fn fuse_rrf(dense: &[Candidate], sparse: &[Candidate], top_k: usize, k: u32) -> Vec<FusedResult> {
    let mut scores: HashMap<Position, f64> = HashMap::with_capacity(dense.len() + sparse.len());
    for list in [dense, sparse] {
        for (position, rank) in first_ranks(list) {
            *scores.entry(position).or_insert(0.0) += 1.0 / (f64::from(k) + rank as f64);
        }
    }
    let mut fused: Vec<(Position, f64)> = scores.into_iter().collect();
    rank_and_truncate(&mut fused, top_k);
    tagged(fused, SourceTag::Rrf)
}

fn first_scores(list: &[Candidate]) -> HashMap<Position, f64> {
    let mut scores = HashMap::with_capacity(list.len());
    for c in list {
        scores.entry(c.position).or_insert(c.score);
    }
    scores
}

/// 1-based rank of each position's first occurrence.
fn first_ranks(list: &[Candidate]) -> HashMap<Position, usize> {
    let mut ranks = HashMap::with_capacity(list.len());
    for (i, c) in list.iter().enumerate() {
        ranks.entry(c.position).or_insert(i + 1);
    }
    ranks
}

/// `(x - min) / (max - min)`, or all zeros when the spread is below [`MIN_SCORE_SPREAD`].
pub fn min_max(values: &[f64]) -> Vec<f64> {
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if values.is_empty() || hi - lo < MIN_SCORE_SPREAD {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - lo) / (hi - lo)).collect()
}

fn by_score_then_position(a: &(Position, f64), b: &(Position, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

fn rank_and_truncate(fused: &mut Vec<(Position, f64)>, top_k: usize) {
    fused.sort_unstable_by(by_score_then_position);
    fused.truncate(top_k);
}

fn tagged(fused: Vec<(Position, f64)>, source: SourceTag) -> Vec<FusedResult> {
    fused.into_iter().map(|(position, score)| FusedResult { position, score, source }).collect()
}
