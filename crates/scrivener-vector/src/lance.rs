//! LanceDB-backed [`VectorIndex`].
//!
//! Rows are keyed by chunk id and upserted with `merge_insert`. The search
//! scope becomes a SQL prefilter on the vector query, so rows outside the
//! caller's user/document never reach the candidate list.
use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType};
use std::sync::Arc;

use scrivener_core::traits::VectorIndex;
use scrivener_core::types::{ChunkId, ChunkMetadata, IndexStats, SearchScope, VectorMatch, VectorQuery, VectorRecord};
use scrivener_core::{Error, Result};

use crate::schema::build_chunk_schema;
use crate::table::{ensure_table, lance_err, open_db, sql_literal};

pub struct LanceVectorIndex {
	conn: Connection,
	table_name: String,
	dim: usize,
}

fn scope_filter(scope: &SearchScope) -> String {
	match &scope.document_id {
		Some(doc) => format!("user_id = {} AND document_id = {}", sql_literal(&scope.user_id), sql_literal(doc)),
		None => format!("user_id = {}", sql_literal(&scope.user_id)),
	}
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| Error::operation(format!("lance column {} missing", name)))
}

impl LanceVectorIndex {
	pub async fn open(uri: &str, table_name: &str, dim: usize) -> Result<Self> {
		let conn = open_db(uri).await?;
		ensure_table(&conn, table_name, build_chunk_schema(dim)).await?;
		Ok(Self { conn, table_name: table_name.to_string(), dim })
	}

	async fn table(&self) -> Result<lancedb::Table> { self.conn.open_table(&self.table_name).execute().await.map_err(lance_err) }

	fn records_to_batch(&self, records: &[VectorRecord]) -> Result<RecordBatch> {
		if let Some(bad) = records.iter().find(|r| r.vector.len() != self.dim) {
			return Err(Error::operation(format!("dim mismatch for {}: got {} expected {}", bad.id, bad.vector.len(), self.dim)));
		}
		let schema = build_chunk_schema(self.dim);
		let vectors = records.iter().map(|r| Some(r.vector.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
		RecordBatch::try_new(schema, vec![
			Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.id.as_str()))),
			Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.metadata.user_id.as_str()))),
			Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.metadata.document_id.as_str()))),
			Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.metadata.document_title.as_str()))),
			Arc::new(Int32Array::from_iter_values(records.iter().map(|r| r.metadata.chunk_index as i32))),
			Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.metadata.content.as_str()))),
			Arc::new(TimestampMillisecondArray::from_iter_values(records.iter().map(|r| r.metadata.updated_at.timestamp_millis()))),
			Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, self.dim as i32)),
		])
		.map_err(lance_err)
	}

	fn batch_to_matches(batch: &RecordBatch, out: &mut Vec<VectorMatch>) -> Result<()> {
		let ids = string_col(batch, "id")?;
		let users = string_col(batch, "user_id")?;
		let docs = string_col(batch, "document_id")?;
		let titles = string_col(batch, "document_title")?;
		let contents = string_col(batch, "content")?;
		let indices = batch.column_by_name("chunk_index").and_then(|c| c.as_any().downcast_ref::<Int32Array>()).ok_or_else(|| Error::operation("lance column chunk_index missing"))?;
		let times = batch.column_by_name("updated_at").and_then(|c| c.as_any().downcast_ref::<TimestampMillisecondArray>()).ok_or_else(|| Error::operation("lance column updated_at missing"))?;
		let distances: Option<&Float32Array> = batch.column_by_name("_distance").map(|c| c.as_primitive::<Float32Type>());
		for i in 0..batch.num_rows() {
			let score = distances.map(|d| 1.0 - d.value(i)).unwrap_or(0.0);
			out.push(VectorMatch {
				id: ids.value(i).to_string(),
				score,
				metadata: ChunkMetadata {
					user_id: users.value(i).to_string(),
					document_id: docs.value(i).to_string(),
					document_title: titles.value(i).to_string(),
					chunk_index: indices.value(i).max(0) as usize,
					content: contents.value(i).to_string(),
					updated_at: DateTime::<Utc>::from_timestamp_millis(times.value(i)).unwrap_or_default(),
				},
			});
		}
		Ok(())
	}
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
	async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
		if records.is_empty() { return Ok(()); }
		let batch = self.records_to_batch(&records)?;
		let schema = batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
		let t = self.table().await?;
		let mut mi = t.merge_insert(&["id"]);
		mi.when_matched_update_all(None).when_not_matched_insert_all();
		mi.execute(reader).await.map_err(lance_err)?;
		Ok(())
	}

	async fn query(&self, vector: &[f32], query: &VectorQuery) -> Result<Vec<VectorMatch>> {
		query.filter.validate()?;
		if query.top_k == 0 { return Ok(Vec::new()); }
		let t = self.table().await?;
		let mut stream = t
			.vector_search(vector.to_vec())
			.map_err(lance_err)?
			.distance_type(DistanceType::Cosine)
			.only_if(scope_filter(&query.filter))
			.limit(query.top_k)
			.execute()
			.await
			.map_err(lance_err)?;
		let mut out = Vec::new();
		while let Some(batch) = stream.try_next().await.map_err(lance_err)? { Self::batch_to_matches(&batch, &mut out)?; }
		if let Some(threshold) = query.threshold { out.retain(|m| m.score >= threshold); }
		out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
		Ok(out)
	}

	async fn delete(&self, ids: &[ChunkId]) -> Result<()> {
		if ids.is_empty() { return Ok(()); }
		let list = ids.iter().map(|id| sql_literal(id)).collect::<Vec<_>>().join(",");
		self.table().await?.delete(&format!("id IN ({})", list)).await.map_err(lance_err)?;
		Ok(())
	}

	async fn stats(&self, filter: &SearchScope) -> Result<IndexStats> {
		filter.validate()?;
		let count = self.table().await?.count_rows(Some(scope_filter(filter))).await.map_err(lance_err)?;
		Ok(IndexStats { count })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn scope_filter_escapes_quotes() {
		assert_eq!(scope_filter(&SearchScope::user("o'neil")), "user_id = 'o''neil'");
		assert_eq!(scope_filter(&SearchScope::document("u", "d")), "user_id = 'u' AND document_id = 'd'");
	}
}
