//! LanceDB connection and housekeeping helpers.
use arrow_array::{RecordBatch, RecordBatchIterator};
use arrow_schema::{ArrowError, Schema};
use lancedb::{connect, Connection};
use std::sync::Arc;

use scrivener_core::{Error, Result};

pub(crate) fn lance_err(e: impl std::fmt::Display) -> Error { Error::operation(format!("lancedb: {}", e)) }

pub async fn open_db(uri: &str) -> Result<Connection> { connect(uri).execute().await.map_err(lance_err) }

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<Schema>) -> Result<()> {
    let names = conn.table_names().execute().await.map_err(lance_err)?;
    if names.iter().any(|n| n == name) { return Ok(()); }
    // create empty table with 0 rows
    let batches: Vec<std::result::Result<RecordBatch, ArrowError>> = Vec::new();
    let iter = RecordBatchIterator::new(batches.into_iter(), schema);
    conn.create_table(name, Box::new(iter)).execute().await.map_err(lance_err)?;
    tracing::info!(table = name, "created lance table");
    Ok(())
}

/// SQL string literal with single quotes escaped.
pub fn sql_literal(s: &str) -> String { format!("'{}'", s.replace('\'', "''")) }
