use arrow_array::{Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch};
use arrow_schema::DataType;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{DistanceType, Table};
use std::future::Future;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

use ragkit_core::error::{Error, Result};
use ragkit_core::traits::DenseSource;
use ragkit_core::types::{Candidate, CandidateList};

use crate::schema::{POSITION_COLUMN, VECTOR_COLUMN};
use crate::table::{open_db, table_exists};

const DISTANCE_COLUMN: &str = "_distance";

/// Exact L2 search over the Lance dense table, row `position` is corpus position.
///
/// No ANN index is built on the table, so `vector_search` scans every row and
/// `_distance` is the squared L2 distance.
pub struct LanceDenseIndex {
	table: Table,
	dim: usize,
	len: usize,
	runtime: QueryRuntime,
}

/// Runtime the table was opened on. The sync `DenseSource` API runs its
/// queries here, so callers may sit inside or outside another runtime.
struct QueryRuntime(Option<Runtime>);

impl QueryRuntime {
	fn new() -> Result<Self> {
		let rt = Builder::new_multi_thread()
			.worker_threads(2)
			.thread_name("ragkit-dense")
			.enable_all()
			.build()
			.map_err(|e| Error::IndexUnavailable(format!("cannot start dense query runtime: {e}")))?;
		Ok(Self(Some(rt)))
	}

	async fn run<F, T>(&self, fut: F) -> Result<T>
	where
		F: Future<Output = Result<T>> + Send + 'static,
		T: Send + 'static,
	{
		let rt = self.0.as_ref().ok_or_else(|| Error::IndexUnavailable("dense query runtime is shut down".into()))?;
		rt.spawn(fut)
			.await
			.map_err(|e| Error::IndexUnavailable(format!("dense query task failed: {e}")))?
	}

	fn run_blocking<F, T>(&self, fut: F) -> Result<T>
	where
		F: Future<Output = Result<T>> + Send + 'static,
		T: Send + 'static,
	{
		futures::executor::block_on(self.run(fut))
	}
}

impl Drop for QueryRuntime {
	fn drop(&mut self) {
		// a bundle may be dropped from async code, where a blocking shutdown panics
		if let Some(rt) = self.0.take() {
			rt.shutdown_background();
		}
	}
}

/// `clip(1 - d²/2, -1, 1)`: cosine for unit vectors, from squared L2 distance.
pub fn similarity_from_sq_l2(distance_sq: f32) -> f64 {
	(1.0 - f64::from(distance_sq) / 2.0).clamp(-1.0, 1.0)
}

impl LanceDenseIndex {
	/// Open `table` in the Lance database at `uri` and check that its rows
	/// cover positions `0..rows` exactly once. An empty table is valid.
	pub async fn open(uri: &str, table: &str) -> Result<Self> {
		let runtime = QueryRuntime::new()?;
		let (uri, name) = (uri.to_string(), table.to_string());
		let (table, dim, len) = runtime.run(async move { open_checked(&uri, &name).await }).await?;
		info!(rows = len, dim, "dense index '{}' opened", table.name());
		Ok(Self { table, dim, len, runtime })
	}
}

async fn open_checked(uri: &str, name: &str) -> Result<(Table, usize, usize)> {
	let unavailable = |e: lancedb::Error| Error::IndexUnavailable(format!("dense table '{name}': {e}"));
	let conn = open_db(uri).await?;
	if !table_exists(&conn, name).await? {
		return Err(Error::IndexUnavailable(format!("dense table '{name}' not found")));
	}
	let table = conn.open_table(name).execute().await.map_err(unavailable)?;
	let schema = table.schema().await.map_err(unavailable)?;
	let dim = match schema.field_with_name(VECTOR_COLUMN).map(|f| f.data_type()) {
		Ok(DataType::FixedSizeList(_, width)) => usize::try_from(*width).unwrap_or(0),
		_ => return Err(Error::IndexUnavailable(format!("dense table '{name}' lacks a fixed-size vector column"))),
	};
	if dim == 0 {
		return Err(Error::IndexUnavailable(format!("dense table '{name}' has a zero-width vector column")));
	}

	let mut stream = table
		.query()
		.select(Select::columns(&[POSITION_COLUMN, VECTOR_COLUMN]))
		.execute()
		.await
		.map_err(unavailable)?;
	let mut seen: Vec<bool> = Vec::new();
	let mut rows = 0usize;
	while let Some(batch) = stream.try_next().await.map_err(unavailable)? {
		let pos_col = position_column(&batch, name)?;
		let vec_col = batch
			.column_by_name(VECTOR_COLUMN)
			.and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
			.ok_or_else(|| Error::IndexUnavailable(format!("dense table '{name}' lacks a vector column")))?;
		for i in 0..batch.num_rows() {
			if pos_col.is_null(i) || vec_col.is_null(i) {
				return Err(Error::IndexUnavailable(format!("dense table '{name}' has a null row")));
			}
			let position = usize::try_from(pos_col.value(i))
				.map_err(|_| Error::IndexUnavailable(format!("negative position {}", pos_col.value(i))))?;
			if position >= seen.len() {
				seen.resize(position + 1, false);
			}
			if std::mem::replace(&mut seen[position], true) {
				return Err(Error::IndexUnavailable(format!("position {position} appears twice")));
			}
			rows += 1;
		}
	}
	if seen.len() != rows {
		return Err(Error::IndexUnavailable(format!(
			"dense table '{name}' positions are not contiguous: {rows} rows, highest position {}",
			seen.len().saturating_sub(1)
		)));
	}
	Ok((table, dim, rows))
}

fn position_column<'a>(batch: &'a RecordBatch, table: &str) -> Result<&'a Int32Array> {
	batch
		.column_by_name(POSITION_COLUMN)
		.and_then(|c| c.as_any().downcast_ref::<Int32Array>())
		.ok_or_else(|| Error::IndexUnavailable(format!("dense table '{table}' lacks an Int32 position column")))
}

async fn nearest(table: Table, query: Vec<f32>, limit: usize) -> Result<Vec<(usize, f32)>> {
	let name = table.name().to_string();
	let unavailable = |e: lancedb::Error| Error::IndexUnavailable(format!("dense search on '{name}': {e}"));
	let mut stream = table
		.vector_search(query)
		.map_err(unavailable)?
		.column(VECTOR_COLUMN)
		.distance_type(DistanceType::L2)
		.bypass_vector_index()
		.select(Select::columns(&[POSITION_COLUMN]))
		.limit(limit)
		.execute()
		.await
		.map_err(unavailable)?;

	let mut hits = Vec::with_capacity(limit);
	while let Some(batch) = stream.try_next().await.map_err(unavailable)? {
		let pos_col = position_column(&batch, &name)?;
		let dist_col = batch
			.column_by_name(DISTANCE_COLUMN)
			.and_then(|c| c.as_any().downcast_ref::<Float32Array>())
			.ok_or_else(|| Error::IndexUnavailable(format!("dense search on '{name}' returned no distances")))?;
		for i in 0..batch.num_rows() {
			let position = usize::try_from(pos_col.value(i))
				.map_err(|_| Error::IndexUnavailable(format!("negative position {}", pos_col.value(i))))?;
			hits.push((position, dist_col.value(i)));
		}
	}
	Ok(hits)
}

impl DenseSource for LanceDenseIndex {
	fn dim(&self) -> usize {
		self.dim
	}

	fn len(&self) -> usize {
		self.len
	}

	fn search(&self, query_embedding: &[f32], fetch_count: usize) -> Result<CandidateList> {
		if query_embedding.len() != self.dim {
			return Err(Error::DimensionMismatch { expected: self.dim, got: query_embedding.len() });
		}
		if fetch_count == 0 {
			return Err(Error::InvalidParameter("dense fetch_count must be > 0".into()));
		}
		if self.len == 0 {
			return Ok(Vec::new());
		}
		let limit = fetch_count.min(self.len);
		let mut hits = self
			.runtime
			.run_blocking(nearest(self.table.clone(), query_embedding.to_vec(), limit))?;
		hits.sort_unstable_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
		debug!(fetch_count, returned = hits.len(), "dense candidates");
		Ok(hits.into_iter().map(|(p, d)| Candidate::new(p, similarity_from_sq_l2(d))).collect())
	}
}

impl std::fmt::Debug for LanceDenseIndex {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LanceDenseIndex")
			.field("table", &self.table.name())
			.field("dim", &self.dim)
			.field("len", &self.len)
			.finish()
	}
}
