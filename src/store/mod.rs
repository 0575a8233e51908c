//! Storage abstraction for the document corpus.
//!
//! The [`DocumentStore`] trait hands out short-lived [`StoreSession`]s: each
//! caller opens one, uses it, and drops or closes it. Both the ingestion
//! pipeline and the search tool go through these traits, so tests can swap
//! in [`MemoryStore`] or a purpose-built failing store.
//!
//! | Backend | Module | Use |
//! |---------|--------|-----|
//! | [`SqlStore`] | [`sql`] | MySQL in production, SQLite locally |
//! | [`MemoryStore`] | [`memory`] | Tests and dry runs |

pub mod memory;
pub mod sql;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::Document;

pub use memory::MemoryStore;
pub use sql::SqlStore;

/// Validated read criteria. Absent fields impose no filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFilter {
    /// Case-insensitive substring matched against title OR content.
    pub query: Option<String>,
    /// Case-insensitive substring matched against the agency display string.
    pub agency: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: usize,
}

impl DocumentFilter {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            query: None,
            agency: None,
            start_date: None,
            end_date: None,
            limit,
        }
    }
}

/// A source of store sessions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Open a fresh session. Fails when the backend is unreachable.
    async fn open(&self) -> Result<Box<dyn StoreSession>>;

    /// Human-readable backend description for logs (no credentials).
    fn describe(&self) -> String;
}

/// One acquired connection to the store.
///
/// Dropping a session releases it; [`close`](StoreSession::close) does so
/// gracefully.
#[async_trait]
pub trait StoreSession: Send {
    /// Insert the document, or replace every non-key field of the existing
    /// row with the same `document_number`.
    async fn upsert_document(&mut self, doc: &Document) -> Result<()>;

    /// Matching documents, newest publication date first, then by
    /// `document_number`, at most `filter.limit` rows.
    async fn find_documents(&mut self, filter: &DocumentFilter) -> Result<Vec<Document>>;

    async fn get_document(&mut self, document_number: &str) -> Result<Option<Document>>;

    async fn count_documents(&mut self) -> Result<i64>;

    async fn close(self: Box<Self>) -> Result<()>;
}
