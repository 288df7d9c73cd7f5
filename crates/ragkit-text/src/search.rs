use tracing::debug;

use ragkit_core::error::{Error, Result};
use ragkit_core::traits::SparseSource;
use ragkit_core::types::{Candidate, CandidateList};

use crate::index::TfidfIndex;

impl TfidfIndex {
	/// Dot product of the query vector with every document row.
	pub fn score_all(&self, query: &str) -> Vec<f32> {
		let mut scores = vec![0f32; self.model.num_docs];
		for (col, qw) in self.query_vector(query) {
			for &(doc, dw) in &self.model.postings[col] {
				scores[doc] += qw * dw;
			}
		}
		scores
	}
}

impl SparseSource for TfidfIndex {
	fn len(&self) -> usize {
		self.model.num_docs
	}

	fn search(&self, query: &str, fetch_count: usize) -> Result<CandidateList> {
		if fetch_count == 0 {
			return Err(Error::InvalidParameter("sparse fetch_count must be > 0".into()));
		}
		let scores = self.score_all(query);
		let hits = top_k_by_score(&scores, fetch_count);
		debug!(fetch_count, returned = hits.len(), "sparse candidates");
		Ok(hits)
	}
}

/// Highest `k` scores, descending, ties by ascending position.
///
/// Uses partial selection so only the survivors are sorted.
pub fn top_k_by_score(scores: &[f32], k: usize) -> CandidateList {
	let cmp = |a: &usize, b: &usize| scores[*b].total_cmp(&scores[*a]).then_with(|| a.cmp(b));
	let mut idx: Vec<usize> = (0..scores.len()).collect();
	if k == 0 {
		return Vec::new();
	}
	if k < idx.len() {
		idx.select_nth_unstable_by(k - 1, cmp);
		idx.truncate(k);
	}
	idx.sort_unstable_by(cmp);
	idx.into_iter().map(|i| Candidate::new(i, f64::from(scores[i]))).collect()
}
