//! Integration tests for the ingestion pipeline.
//!
//! Drive `run_ingestion` against a real SQLite store, in-memory doubles,
//! and a local fake of the Federal Register API.

use anyhow::Result;
use async_trait::async_trait;
use axum::{extract::Query, routing::get, Json, Router};
use fedreg_agent::config::{RegistryConfig, StoreBackend};
use fedreg_agent::error::IngestError;
use fedreg_agent::ingest::{run_ingestion, IngestOptions};
use fedreg_agent::migrate;
use fedreg_agent::models::{DateRange, Document};
use fedreg_agent::registry::{PageSource, RegistryClient, StopReason};
use fedreg_agent::store::{DocumentFilter, DocumentStore, MemoryStore, SqlStore, StoreSession};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ─── Test doubles ───────────────────────────────────────────────────

/// Serves a fixed list of pages, then empty pages.
struct StaticPages {
    pages: Vec<Value>,
    calls: AtomicUsize,
}

impl StaticPages {
    fn new(pages: Vec<Value>) -> Self {
        Self {
            pages,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PageSource for StaticPages {
    async fn fetch_page(&self, _range: &DateRange, _per_page: u32, page: u32) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .pages
            .get(page as usize - 1)
            .cloned()
            .unwrap_or_else(|| json!({ "results": [] })))
    }
}

/// A store whose upsert fails for one document number.
struct FlakyStore {
    inner: MemoryStore,
    poison: String,
    attempts: Arc<Mutex<Vec<String>>>,
}

struct FlakySession {
    inner: Box<dyn StoreSession>,
    poison: String,
    attempts: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn open(&self) -> Result<Box<dyn StoreSession>> {
        Ok(Box::new(FlakySession {
            inner: self.inner.open().await?,
            poison: self.poison.clone(),
            attempts: self.attempts.clone(),
        }))
    }

    fn describe(&self) -> String {
        "flaky".to_string()
    }
}

#[async_trait]
impl StoreSession for FlakySession {
    async fn upsert_document(&mut self, doc: &Document) -> Result<()> {
        self.attempts
            .lock()
            .unwrap()
            .push(doc.document_number.clone());
        if doc.document_number == self.poison {
            anyhow::bail!("constraint violation on {}", doc.document_number);
        }
        self.inner.upsert_document(doc).await
    }

    async fn find_documents(&mut self, filter: &DocumentFilter) -> Result<Vec<Document>> {
        self.inner.find_documents(filter).await
    }

    async fn get_document(&mut self, document_number: &str) -> Result<Option<Document>> {
        self.inner.get_document(document_number).await
    }

    async fn count_documents(&mut self) -> Result<i64> {
        self.inner.count_documents().await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.inner.close().await
    }
}

/// A store that can never be reached.
struct UnavailableStore;

#[async_trait]
impl DocumentStore for UnavailableStore {
    async fn open(&self) -> Result<Box<dyn StoreSession>> {
        anyhow::bail!("connection refused")
    }

    fn describe(&self) -> String {
        "unavailable".to_string()
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn record(number: &str, title: &str) -> Value {
    json!({
        "document_number": number,
        "title": title,
        "agencies": [{ "name": "Environmental Protection Agency" }],
        "publication_date": "2025-03-14",
        "html_url": format!("https://www.federalregister.gov/d/{}", number),
        "abstract": format!("Abstract of {}", title)
    })
}

fn march() -> DateRange {
    DateRange::parse("2025-03-01", "2025-03-31").unwrap()
}

fn opts(per_page: u32) -> IngestOptions {
    IngestOptions {
        per_page,
        max_pages: 10,
    }
}

async fn sqlite_store(tmp: &TempDir) -> SqlStore {
    let backend = StoreBackend::Sqlite(tmp.path().join("fedreg.sqlite"));
    migrate::run_migrations(&backend).await.unwrap();
    SqlStore::new(backend)
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_reingest_updates_in_place() {
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp).await;

    let first = StaticPages::new(vec![json!({ "results": [record("2025-04512", "Old title")] })]);
    let report = run_ingestion(&store, &first, &march(), &opts(1000))
        .await
        .unwrap();
    assert_eq!(report.upserted, 1);

    let second = StaticPages::new(vec![json!({ "results": [record("2025-04512", "New title")] })]);
    let report = run_ingestion(&store, &second, &march(), &opts(1000))
        .await
        .unwrap();
    assert_eq!(report.upserted, 1);

    let mut session = store.open().await.unwrap();
    assert_eq!(session.count_documents().await.unwrap(), 1);
    let doc = session.get_document("2025-04512").await.unwrap().unwrap();
    assert_eq!(doc.title, "New title");
    assert_eq!(doc.content.as_deref(), Some("Abstract of New title"));
    assert_eq!(doc.agency, "Environmental Protection Agency");
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_records_without_number_are_skipped() {
    let store = FlakyStore {
        inner: MemoryStore::new(),
        poison: String::new(),
        attempts: Arc::new(Mutex::new(Vec::new())),
    };
    let source = StaticPages::new(vec![json!({
        "results": [
            record("A-1", "first"),
            { "title": "no number" },
            { "document_number": null, "title": "null number" },
            record("A-2", "second")
        ]
    })]);

    let report = run_ingestion(&store, &source, &march(), &opts(1000))
        .await
        .unwrap();

    assert_eq!(report.fetched, 4);
    assert_eq!(report.skipped_no_id, 2);
    assert_eq!(report.upserted, 2);
    assert_eq!(*store.attempts.lock().unwrap(), vec!["A-1", "A-2"]);
}

#[tokio::test]
async fn test_one_failed_upsert_does_not_stop_batch() {
    let store = FlakyStore {
        inner: MemoryStore::new(),
        poison: "B-3".to_string(),
        attempts: Arc::new(Mutex::new(Vec::new())),
    };
    let results: Vec<Value> = (1..=5).map(|i| record(&format!("B-{}", i), "t")).collect();
    let source = StaticPages::new(vec![json!({ "results": results })]);

    let report = run_ingestion(&store, &source, &march(), &opts(1000))
        .await
        .unwrap();

    assert_eq!(report.upserted, 4);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].document_number, "B-3");
    assert!(report.failures[0].reason.contains("constraint violation"));
    assert_eq!(store.attempts.lock().unwrap().len(), 5);
    assert_eq!(store.inner.len(), 4);
}

#[tokio::test]
async fn test_unreachable_store_aborts_before_fetching() {
    let source = StaticPages::new(vec![json!({ "results": [record("C-1", "t")] })]);

    let err = run_ingestion(&UnavailableStore, &source, &march(), &opts(1000))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::StoreUnavailable(_)));
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_paginates_until_short_page() {
    let store = MemoryStore::new();
    let source = StaticPages::new(vec![
        json!({ "results": [record("D-1", "a"), record("D-2", "b")] }),
        json!({ "results": [record("D-3", "c"), record("D-4", "d")] }),
        json!({ "results": [record("D-5", "e")] }),
    ]);

    let report = run_ingestion(&store, &source, &march(), &opts(2))
        .await
        .unwrap();

    assert_eq!(report.pages_fetched, 3);
    assert_eq!(report.stop, StopReason::ShortPage);
    assert_eq!(report.upserted, 5);
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
}

// ─── Fake registry over HTTP ────────────────────────────────────────

type SeenParams = Arc<Mutex<Vec<HashMap<String, String>>>>;

async fn spawn_fake_registry(fail_page: Option<u32>) -> (String, SeenParams) {
    let seen: SeenParams = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();

    let app = Router::new().route(
        "/api/v1/documents.json",
        get(move |Query(params): Query<HashMap<String, String>>| {
            let seen = seen_clone.clone();
            async move {
                seen.lock().unwrap().push(params.clone());
                let page: u32 = params
                    .get("page")
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(1);
                if Some(page) == fail_page {
                    return Err(axum::http::StatusCode::SERVICE_UNAVAILABLE);
                }
                let body = match page {
                    1 => json!({
                        "count": 3,
                        "total_pages": 2,
                        "next_page_url": "https://www.federalregister.gov/api/v1/documents.json?page=2",
                        "results": [record("E-1", "one"), record("E-2", "two")]
                    }),
                    _ => json!({
                        "count": 3,
                        "total_pages": 2,
                        "results": [record("E-3", "three")]
                    }),
                };
                Ok(Json(body))
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    (format!("http://{}/api/v1/documents.json", addr), seen)
}

fn registry_config(base_url: String) -> RegistryConfig {
    RegistryConfig {
        base_url,
        per_page: 2,
        max_pages: 10,
        timeout_secs: 5,
    }
}

#[tokio::test]
async fn test_ingest_from_http_registry() {
    let (url, seen) = spawn_fake_registry(None).await;
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp).await;
    let client = RegistryClient::new(&registry_config(url)).unwrap();

    let report = run_ingestion(&store, &client, &march(), &opts(2))
        .await
        .unwrap();

    assert_eq!(report.fetched, 3);
    assert_eq!(report.upserted, 3);
    assert_eq!(report.pages_fetched, 2);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(
        seen[0].get("conditions[publication_date][gte]").map(String::as_str),
        Some("2025-03-01")
    );
    assert_eq!(
        seen[0].get("conditions[publication_date][lte]").map(String::as_str),
        Some("2025-03-31")
    );
    assert_eq!(seen[0].get("per_page").map(String::as_str), Some("2"));
    assert_eq!(seen[1].get("page").map(String::as_str), Some("2"));
}

#[tokio::test]
async fn test_registry_error_keeps_earlier_pages() {
    let (url, _seen) = spawn_fake_registry(Some(2)).await;
    let store = MemoryStore::new();
    let client = RegistryClient::new(&registry_config(url)).unwrap();

    let report = run_ingestion(&store, &client, &march(), &opts(2))
        .await
        .unwrap();

    assert!(report.stop.is_failure());
    assert_eq!(report.fetched, 2);
    assert_eq!(report.upserted, 2);
    assert_eq!(store.len(), 2);
}
