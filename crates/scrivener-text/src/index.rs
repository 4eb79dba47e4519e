use std::path::Path;
use std::sync::Mutex;

use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use scrivener_core::traits::{LexicalHit, LexicalIndex};
use scrivener_core::types::{Chunk, ChunkId, SearchScope};
use scrivener_core::{Error, Result};

use crate::tantivy_utils::{build_schema, register_tokenizer};

const WRITER_HEAP_BYTES: usize = 50_000_000;

fn tantivy_err(e: impl std::fmt::Display) -> Error { Error::operation(format!("tantivy: {}", e)) }

/// Keyword index over chunk content. Every write commits and reloads the
/// reader, so a search issued after `upsert` returns sees the new chunks.
pub struct TantivyLexicalIndex {
	index: Index,
	reader: IndexReader,
	writer: Mutex<IndexWriter>,
	chunk_id_field: Field,
	user_field: Field,
	document_field: Field,
	text_field: Field,
}

impl TantivyLexicalIndex {
	pub fn in_memory() -> Result<Self> { Self::from_index(Index::create_in_ram(build_schema())) }

	pub fn open_or_create(index_dir: &Path) -> Result<Self> {
		std::fs::create_dir_all(index_dir).map_err(tantivy_err)?;
		let dir = MmapDirectory::open(index_dir).map_err(tantivy_err)?;
		let index = Index::open_or_create(dir, build_schema()).map_err(tantivy_err)?;
		tracing::info!(dir = %index_dir.display(), "opened lexical index");
		Self::from_index(index)
	}

	fn from_index(index: Index) -> Result<Self> {
		register_tokenizer(&index);
		let schema = index.schema();
		let field = |name: &str| schema.get_field(name).map_err(tantivy_err);
		let chunk_id_field = field("chunk_id")?;
		let user_field = field("user_id")?;
		let document_field = field("document_id")?;
		let text_field = field("text")?;
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into().map_err(tantivy_err)?;
		let writer = index.writer_with_num_threads(1, WRITER_HEAP_BYTES).map_err(tantivy_err)?;
		Ok(Self { index, reader, writer: Mutex::new(writer), chunk_id_field, user_field, document_field, text_field })
	}

	pub fn num_docs(&self) -> u64 { self.reader.searcher().num_docs() }

	fn write<F>(&self, f: F) -> Result<()>
	where
		F: FnOnce(&mut IndexWriter) -> Result<()>,
	{
		let mut writer = self.writer.lock().map_err(|_| Error::operation("lexical index writer lock poisoned"))?;
		f(&mut writer)?;
		writer.commit().map_err(tantivy_err)?;
		self.reader.reload().map_err(tantivy_err)
	}
}

impl LexicalIndex for TantivyLexicalIndex {
	fn upsert(&self, chunks: &[Chunk]) -> Result<()> {
		if chunks.is_empty() { return Ok(()); }
		self.write(|w| {
			for c in chunks {
				w.delete_term(Term::from_field_text(self.chunk_id_field, &c.id));
				w.add_document(doc!(
					self.chunk_id_field => c.id.clone(),
					self.user_field => c.user_id.clone(),
					self.document_field => c.document_id.clone(),
					self.text_field => c.content.clone(),
				)).map_err(tantivy_err)?;
			}
			Ok(())
		})
	}

	fn delete(&self, ids: &[ChunkId]) -> Result<()> {
		if ids.is_empty() { return Ok(()); }
		self.write(|w| {
			for id in ids { w.delete_term(Term::from_field_text(self.chunk_id_field, id)); }
			Ok(())
		})
	}

	fn search(&self, query: &str, scope: &SearchScope, k: usize) -> Result<Vec<LexicalHit>> {
		scope.validate()?;
		if query.trim().is_empty() || k == 0 { return Ok(Vec::new()); }
		let qp = QueryParser::for_index(&self.index, vec![self.text_field]);
		let (text_query, _errors) = qp.parse_query_lenient(query);
		let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![
			(Occur::Must, text_query),
			(Occur::Must, Box::new(TermQuery::new(Term::from_field_text(self.user_field, &scope.user_id), IndexRecordOption::Basic))),
		];
		if let Some(doc_id) = &scope.document_id {
			clauses.push((Occur::Must, Box::new(TermQuery::new(Term::from_field_text(self.document_field, doc_id), IndexRecordOption::Basic))));
		}
		let searcher = self.reader.searcher();
		let top_docs = searcher.search(&BooleanQuery::new(clauses), &TopDocs::with_limit(k)).map_err(tantivy_err)?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr).map_err(tantivy_err)?;
			if let Some(id) = doc.get_first(self.chunk_id_field).and_then(|v| v.as_str()) {
				hits.push(LexicalHit { chunk_id: id.to_string(), score });
			}
		}
		Ok(hits)
	}
}
