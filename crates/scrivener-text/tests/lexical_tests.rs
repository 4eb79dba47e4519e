use chrono::Utc;
use scrivener_core::traits::LexicalIndex;
use scrivener_core::types::{chunk_id, Chunk, SearchScope};
use scrivener_text::TantivyLexicalIndex;

fn chunk(user: &str, doc: &str, idx: usize, content: &str) -> Chunk {
	Chunk {
		id: chunk_id(doc, idx),
		document_id: doc.to_string(),
		user_id: user.to_string(),
		document_title: format!("{} title", doc),
		chunk_index: idx,
		content: content.to_string(),
		content_hash: 0,
		embedding: None,
		updated_at: Utc::now(),
	}
}

fn seeded() -> TantivyLexicalIndex {
	let index = TantivyLexicalIndex::in_memory().expect("index");
	index.upsert(&[
		chunk("alice", "report", 0, "Revenue in Q3 grew by twelve percent."),
		chunk("alice", "notes", 0, "Q3 planning notes and milestones."),
		chunk("bob", "report", 0, "Bob's Q3 revenue summary."),
	]).expect("upsert");
	index
}

#[test]
fn search_is_confined_to_the_scope() {
	let index = seeded();
	let alice = index.search("q3 revenue", &SearchScope::user("alice"), 10).expect("search");
	let ids: Vec<_> = alice.iter().map(|h| h.chunk_id.as_str()).collect();
	assert_eq!(ids.len(), 2);
	assert_eq!(ids[0], "report:0", "both terms beat one term");
	assert!(alice.windows(2).all(|w| w[0].score >= w[1].score));

	let doc = index.search("q3", &SearchScope::document("alice", "notes"), 10).expect("search");
	assert_eq!(doc.len(), 1);
	assert_eq!(doc[0].chunk_id, "notes:0");

	assert!(index.search("q3", &SearchScope::user("carol"), 10).expect("search").is_empty());
}

#[test]
fn upsert_replaces_by_chunk_id_and_delete_removes() {
	let index = seeded();
	assert_eq!(index.num_docs(), 3);
	index.upsert(&[chunk("alice", "notes", 0, "Completely different text now.")]).expect("upsert");
	assert_eq!(index.num_docs(), 3);
	assert!(index.search("milestones", &SearchScope::user("alice"), 5).expect("search").is_empty());

	index.delete(&["report:0".to_string()]).expect("delete");
	let hits = index.search("revenue", &SearchScope::user("alice"), 5).expect("search");
	assert!(hits.is_empty());
}

#[test]
fn stop_word_and_malformed_queries_do_not_fail() {
	let index = seeded();
	assert!(index.search("what is the", &SearchScope::user("alice"), 5).expect("search").is_empty());
	assert!(!index.search("Revenue?", &SearchScope::user("alice"), 5).expect("punctuation").is_empty());
	assert!(index.search("q3", &SearchScope::user(""), 5).is_err());
}

#[test]
fn on_disk_index_survives_reopen() {
	let dir = tempfile::tempdir().expect("tempdir");
	{
		let index = TantivyLexicalIndex::open_or_create(dir.path()).expect("create");
		index.upsert(&[chunk("alice", "doc", 0, "persistent lexical content")]).expect("upsert");
	}
	let reopened = TantivyLexicalIndex::open_or_create(dir.path()).expect("reopen");
	let hits = reopened.search("persistent", &SearchScope::user("alice"), 5).expect("search");
	assert_eq!(hits.len(), 1);
}
