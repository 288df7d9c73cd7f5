use arrow_array::types::Float32Type;
use arrow_array::{FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator};
use lancedb::Connection;
use std::sync::Arc;
use tracing::info;

use ragkit_core::error::{Error, Result};

use crate::schema::build_dense_schema;
use crate::table::table_exists;

/// Create `table` holding one row per corpus position, in position order.
///
/// Vectors must already be unit length; this only checks their dimension.
pub async fn write_dense_index(conn: &Connection, table: &str, dim: usize, vectors: &[Vec<f32>]) -> Result<()> {
	if table_exists(conn, table).await? {
		return Err(Error::InvalidParameter(format!("dense table '{table}' already exists")));
	}
	let dim_i32 = i32::try_from(dim).map_err(|_| Error::InvalidParameter(format!("dimension {dim} too large")))?;
	if dim == 0 {
		return Err(Error::InvalidParameter("dimension must be > 0".into()));
	}
	if let Some(v) = vectors.iter().find(|v| v.len() != dim) {
		return Err(Error::DimensionMismatch { expected: dim, got: v.len() });
	}

	let positions = (0..vectors.len())
		.map(i32::try_from)
		.collect::<std::result::Result<Vec<i32>, _>>()
		.map_err(|_| Error::InvalidParameter("too many vectors for an Int32 position".into()))?;
	let schema = build_dense_schema(dim_i32);
	if vectors.is_empty() {
		conn.create_empty_table(table, schema)
			.execute()
			.await
			.map_err(|e| Error::IndexUnavailable(format!("cannot create dense table '{table}': {e}")))?;
		info!(dim, "empty dense table '{}' written", table);
		return Ok(());
	}
	let batch = RecordBatch::try_new(
		schema.clone(),
		vec![
			Arc::new(Int32Array::from(positions)),
			Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
				vectors.iter().map(|v| Some(v.iter().copied().map(Some).collect::<Vec<_>>())),
				dim_i32,
			)),
		],
	)
	.map_err(|e| Error::IndexUnavailable(e.to_string()))?;

	let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
	conn.create_table(table, reader)
		.execute()
		.await
		.map_err(|e| Error::IndexUnavailable(format!("cannot create dense table '{table}': {e}")))?;
	info!(rows = vectors.len(), dim, "dense table '{}' written", table);
	Ok(())
}
