//! In-memory [`DocumentStore`] with the same read semantics as the SQL store.
//!
//! Sessions share one map, so writes made through one session are visible
//! to every later session.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use super::{DocumentFilter, DocumentStore, StoreSession};
use crate::models::Document;

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    docs: Arc<RwLock<BTreeMap<String, Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with documents, later entries replacing earlier ones.
    pub fn with_documents(docs: impl IntoIterator<Item = Document>) -> Self {
        let store = Self::new();
        {
            let mut map = store.docs.write().unwrap_or_else(|e| e.into_inner());
            for doc in docs {
                map.insert(doc.document_number.clone(), doc);
            }
        }
        store
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A point-in-time copy of one document.
    pub fn snapshot(&self, document_number: &str) -> Option<Document> {
        self.docs
            .read()
            .ok()
            .and_then(|m| m.get(document_number).cloned())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn open(&self) -> Result<Box<dyn StoreSession>> {
        Ok(Box::new(MemorySession {
            docs: Arc::clone(&self.docs),
        }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

struct MemorySession {
    docs: Arc<RwLock<BTreeMap<String, Document>>>,
}

/// ASCII case-insensitive substring test, matching SQLite `LOWER(..) LIKE`.
fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

fn matches(doc: &Document, filter: &DocumentFilter) -> bool {
    if let Some(ref q) = filter.query {
        let in_title = contains_ci(&doc.title, q);
        let in_content = doc.content.as_deref().is_some_and(|c| contains_ci(c, q));
        if !in_title && !in_content {
            return false;
        }
    }
    if let Some(ref agency) = filter.agency {
        if !contains_ci(&doc.agency, agency) {
            return false;
        }
    }
    // A missing date never satisfies a date bound, as with SQL NULL.
    if let Some(start) = filter.start_date {
        if !doc.publication_date.is_some_and(|d| d >= start) {
            return false;
        }
    }
    if let Some(end) = filter.end_date {
        if !doc.publication_date.is_some_and(|d| d <= end) {
            return false;
        }
    }
    true
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn upsert_document(&mut self, doc: &Document) -> Result<()> {
        let mut map = self
            .docs
            .write()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        map.insert(doc.document_number.clone(), doc.clone());
        Ok(())
    }

    async fn find_documents(&mut self, filter: &DocumentFilter) -> Result<Vec<Document>> {
        let map = self
            .docs
            .read()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        let mut hits: Vec<Document> = map
            .values()
            .filter(|d| matches(d, filter))
            .cloned()
            .collect();
        // Newest first; undated rows sort last, like NULLs under DESC.
        hits.sort_by(|a, b| {
            b.publication_date
                .cmp(&a.publication_date)
                .then_with(|| a.document_number.cmp(&b.document_number))
        });
        hits.truncate(filter.limit);
        Ok(hits)
    }

    async fn get_document(&mut self, document_number: &str) -> Result<Option<Document>> {
        let map = self
            .docs
            .read()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(map.get(document_number).cloned())
    }

    async fn count_documents(&mut self) -> Result<i64> {
        let map = self
            .docs
            .read()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(map.len() as i64)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
