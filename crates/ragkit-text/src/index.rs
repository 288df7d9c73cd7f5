use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tantivy::tokenizer::TextAnalyzer;
use tracing::{debug, info};

use ragkit_core::error::{Error, Result};

use crate::tantivy_utils::{analyze, build_analyzer};

/// Persisted TF-IDF state: vocabulary, smoothed idf and per-term postings of
/// L2-normalized document weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfModel {
	pub num_docs: usize,
	pub vocabulary: BTreeMap<String, usize>,
	pub idf: Vec<f32>,
	/// `postings[term]` lists `(position, weight)` in ascending position.
	pub postings: Vec<Vec<(usize, f32)>>,
}

impl TfidfModel {
	fn validate(&self) -> std::result::Result<(), String> {
		if self.idf.len() != self.vocabulary.len() || self.postings.len() != self.vocabulary.len() {
			return Err(format!(
				"vocabulary has {} terms but idf has {} and postings {}",
				self.vocabulary.len(),
				self.idf.len(),
				self.postings.len()
			));
		}
		if let Some((term, col)) = self.vocabulary.iter().find(|(_, &c)| c >= self.idf.len()) {
			return Err(format!("term '{term}' maps to column {col} outside the vocabulary"));
		}
		for list in &self.postings {
			if let Some((doc, _)) = list.iter().find(|(d, _)| *d >= self.num_docs) {
				return Err(format!("posting references position {doc} but only {} documents exist", self.num_docs));
			}
		}
		Ok(())
	}
}

/// Sparse lexical index over the corpus, rows aligned with corpus positions.
pub struct TfidfIndex {
	pub(crate) model: TfidfModel,
	pub(crate) analyzer: TextAnalyzer,
}

impl TfidfIndex {
	/// Fit on chunk texts given in position order.
	pub fn fit<S: AsRef<str>>(docs: &[S]) -> Self {
		let analyzer = build_analyzer();
		let counts: Vec<HashMap<String, u32>> = docs
			.iter()
			.map(|d| {
				let mut tf = HashMap::new();
				for term in analyze(&analyzer, d.as_ref()) {
					*tf.entry(term).or_insert(0u32) += 1;
				}
				tf
			})
			.collect();

		let mut df: BTreeMap<String, usize> = BTreeMap::new();
		for tf in &counts {
			for term in tf.keys() {
				*df.entry(term.clone()).or_insert(0) += 1;
			}
		}

		let n = docs.len() as f64;
		let mut vocabulary = BTreeMap::new();
		let mut idf = Vec::with_capacity(df.len());
		for (col, (term, freq)) in df.into_iter().enumerate() {
			idf.push((((1.0 + n) / (1.0 + freq as f64)).ln() + 1.0) as f32);
			vocabulary.insert(term, col);
		}

		let mut postings: Vec<Vec<(usize, f32)>> = vec![Vec::new(); idf.len()];
		for (position, tf) in counts.iter().enumerate() {
			let mut row: Vec<(usize, f32)> = tf
				.iter()
				.map(|(term, &c)| {
					let col = vocabulary[term];
					(col, c as f32 * idf[col])
				})
				.collect();
			l2_normalize(&mut row);
			for (col, w) in row {
				postings[col].push((position, w));
			}
		}

		let model = TfidfModel { num_docs: docs.len(), vocabulary, idf, postings };
		debug!(docs = model.num_docs, terms = model.vocabulary.len(), "tf-idf model fitted");
		Self { model, analyzer }
	}

	pub fn from_model(model: TfidfModel) -> Result<Self> {
		model.validate().map_err(Error::InvalidParameter)?;
		Ok(Self { model, analyzer: build_analyzer() })
	}

	pub fn load(path: &Path) -> Result<Self> {
		let bytes = fs::read(path).map_err(|e| Error::artifact(path, e))?;
		let model: TfidfModel = serde_json::from_slice(&bytes).map_err(|e| Error::artifact(path, e))?;
		model.validate().map_err(|reason| Error::artifact(path, reason))?;
		info!(docs = model.num_docs, terms = model.vocabulary.len(), "sparse index loaded from {}", path.display());
		Ok(Self { model, analyzer: build_analyzer() })
	}

	pub fn save(&self, path: &Path) -> Result<()> {
		let json = serde_json::to_vec(&self.model).map_err(|e| Error::artifact(path, e))?;
		fs::write(path, json).map_err(|e| Error::artifact(path, e))?;
		Ok(())
	}

	pub fn model(&self) -> &TfidfModel {
		&self.model
	}

	pub fn vocabulary_size(&self) -> usize {
		self.model.vocabulary.len()
	}

	/// Query term weights as `(column, weight)`, L2-normalized. Unknown terms are dropped.
	pub(crate) fn query_vector(&self, query: &str) -> Vec<(usize, f32)> {
		let mut tf: HashMap<usize, u32> = HashMap::new();
		for term in analyze(&self.analyzer, query) {
			if let Some(&col) = self.model.vocabulary.get(&term) {
				*tf.entry(col).or_insert(0) += 1;
			}
		}
		let mut row: Vec<(usize, f32)> = tf.into_iter().map(|(col, c)| (col, c as f32 * self.model.idf[col])).collect();
		row.sort_unstable_by_key(|(col, _)| *col);
		l2_normalize(&mut row);
		row
	}
}

fn l2_normalize(row: &mut [(usize, f32)]) {
	let norm = row.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
	if norm > 0.0 {
		for (_, w) in row.iter_mut() {
			*w /= norm;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn idf_is_smoothed() {
		let index = TfidfIndex::fit(&["apple banana", "apple cherry"]);
		let m = index.model();
		let apple = m.idf[m.vocabulary["apple"]];
		let banana = m.idf[m.vocabulary["banana"]];
		// ln(3/3) + 1 and ln(3/2) + 1
		assert!((apple - 1.0).abs() < 1e-6);
		assert!((banana - (1.5f32.ln() + 1.0)).abs() < 1e-6);
	}

	#[test]
	fn document_rows_are_unit_length() {
		let index = TfidfIndex::fit(&["reset password email", "password password"]);
		let mut norms = vec![0f32; 2];
		for list in &index.model().postings {
			for &(doc, w) in list {
				norms[doc] += w * w;
			}
		}
		for n in norms {
			assert!((n - 1.0).abs() < 1e-5);
		}
	}

	#[test]
	fn unknown_query_terms_are_ignored() {
		let index = TfidfIndex::fit(&["alpha beta"]);
		assert!(index.query_vector("gamma delta").is_empty());
		assert_eq!(index.query_vector("alpha gamma").len(), 1);
	}

	#[test]
	fn from_model_rejects_dangling_postings() {
		let mut model = TfidfIndex::fit(&["alpha"]).model().clone();
		model.postings[0].push((9, 0.5));
		assert!(TfidfIndex::from_model(model).is_err());
	}
}
