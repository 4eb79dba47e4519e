//! In-process [`DocumentStore`] used by the CLI and by tests. Production
//! deployments hand the pipeline their own store.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{Error, Result};
use crate::traits::DocumentStore;
use crate::types::DocumentRecord;

#[derive(Default)]
pub struct InMemoryDocumentStore {
    docs: RwLock<HashMap<String, DocumentRecord>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self { Self::default() }

    /// Insert or replace a document and return the stored record.
    pub fn put(&self, id: &str, user_id: &str, title: &str, content: &str) -> Result<DocumentRecord> {
        let record = DocumentRecord {
            id: id.to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            updated_at: Utc::now(),
        };
        let mut docs = self.docs.write().map_err(|_| Error::operation("document store lock poisoned"))?;
        docs.insert(id.to_string(), record.clone());
        Ok(record)
    }

    pub fn remove(&self, id: &str) -> Result<Option<DocumentRecord>> {
        let mut docs = self.docs.write().map_err(|_| Error::operation("document store lock poisoned"))?;
        Ok(docs.remove(id))
    }

    pub fn len(&self) -> usize { self.docs.read().map(|d| d.len()).unwrap_or(0) }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, document_id: &str) -> Result<Option<DocumentRecord>> {
        let docs = self.docs.read().map_err(|_| Error::operation("document store lock poisoned"))?;
        Ok(docs.get(document_id).cloned())
    }
}
