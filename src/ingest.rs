//! Ingestion pipeline orchestration.
//!
//! Coordinates one run: store session → registry pagination →
//! normalization → per-record upsert. A record that fails to upsert is
//! logged and counted without stopping the batch; only an unreachable store
//! at the start aborts the run.

use anyhow::Result;
use chrono::{Datelike, Local, NaiveDate};
use serde_json::Value;

use crate::config::{Config, StoreBackend};
use crate::error::IngestError;
use crate::models::{parse_date, DateRange, Document};
use crate::registry::{paginate, PageSource, RegistryClient, StopReason};
use crate::store::{DocumentStore, SqlStore};

/// Pagination bounds for one run.
#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub per_page: u32,
    pub max_pages: u32,
}

impl IngestOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            per_page: config.registry.per_page,
            max_pages: config.registry.max_pages,
        }
    }
}

/// A record that could not be upserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestFailure {
    pub document_number: String,
    pub reason: String,
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestionReport {
    /// Raw records returned by the registry.
    pub fetched: usize,
    /// Records without a usable `document_number`.
    pub skipped_no_id: usize,
    pub upserted: usize,
    pub failed: usize,
    pub failures: Vec<IngestFailure>,
    pub pages_fetched: u32,
    pub stop: StopReason,
}

/// Map a raw registry record onto the store schema.
///
/// Returns `None` when the record has no usable `document_number`.
pub fn normalize_record(record: &Value) -> Option<Document> {
    let document_number = record
        .get("document_number")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())?
        .to_string();

    Some(Document {
        document_number,
        title: string_field(record, "title"),
        agency: agency_names(record),
        publication_date: record
            .get("publication_date")
            .and_then(Value::as_str)
            .and_then(parse_date),
        document_url: string_field(record, "html_url"),
        content: record
            .get("abstract")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string),
    })
}

fn string_field(record: &Value, key: &str) -> String {
    record
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Join every publishing agency's name with `", "`.
fn agency_names(record: &Value) -> String {
    let Some(agencies) = record.get("agencies").and_then(Value::as_array) else {
        return String::new();
    };

    agencies
        .iter()
        .filter_map(|a| {
            a.get("name")
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .or_else(|| a.get("raw_name").and_then(Value::as_str))
        })
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Fetch every document published in `range` and upsert it into `store`.
pub async fn run_ingestion(
    store: &dyn DocumentStore,
    source: &dyn PageSource,
    range: &DateRange,
    opts: &IngestOptions,
) -> Result<IngestionReport, IngestError> {
    let mut session = store
        .open()
        .await
        .map_err(|e| IngestError::StoreUnavailable(format!("{:#}", e)))?;

    tracing::info!(%range, store = %store.describe(), "starting ingestion");

    let outcome = paginate(source, range, opts.per_page, opts.max_pages).await;

    let mut report = IngestionReport {
        fetched: outcome.records.len(),
        skipped_no_id: 0,
        upserted: 0,
        failed: 0,
        failures: Vec::new(),
        pages_fetched: outcome.pages_fetched,
        stop: outcome.stop,
    };

    for record in &outcome.records {
        let Some(doc) = normalize_record(record) else {
            tracing::warn!("skipping registry record without document_number");
            report.skipped_no_id += 1;
            continue;
        };

        match session.upsert_document(&doc).await {
            Ok(()) => report.upserted += 1,
            Err(e) => {
                let reason = format!("{:#}", e);
                tracing::error!(document_number = %doc.document_number, error = %reason, "upsert failed");
                report.failed += 1;
                report.failures.push(IngestFailure {
                    document_number: doc.document_number,
                    reason,
                });
            }
        }
    }

    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "error closing store session");
    }

    tracing::info!(
        fetched = report.fetched,
        upserted = report.upserted,
        skipped = report.skipped_no_id,
        failed = report.failed,
        stop = %report.stop,
        "ingestion finished"
    );

    Ok(report)
}

/// Row count for the run summary. Failures are logged, never fatal.
async fn store_total(store: &dyn DocumentStore) -> Option<i64> {
    let count = async {
        let mut session = store.open().await?;
        let total = session.count_documents().await?;
        session.close().await?;
        Ok::<_, anyhow::Error>(total)
    };
    match count.await {
        Ok(total) => Some(total),
        Err(e) => {
            tracing::warn!(error = %format!("{:#}", e), "could not count stored documents");
            None
        }
    }
}

/// January 1 of the current year through today.
pub fn default_range() -> Result<DateRange> {
    let today = Local::now().date_naive();
    let start = NaiveDate::from_ymd_opt(today.year(), 1, 1)
        .ok_or_else(|| anyhow::anyhow!("invalid start of year for {}", today))?;
    Ok(DateRange::new(start, today)?)
}

/// `fedreg ingest`: run one ingestion against the configured store and registry.
pub async fn run_ingest(config: &Config, start: Option<String>, end: Option<String>) -> Result<()> {
    let range = match (start, end) {
        (None, None) => default_range()?,
        (start, end) => {
            let defaults = default_range()?;
            let start = start.unwrap_or_else(|| defaults.start().to_string());
            let end = end.unwrap_or_else(|| defaults.end().to_string());
            DateRange::parse(&start, &end)?
        }
    };

    let store = SqlStore::new(StoreBackend::from_env()?);
    let client = RegistryClient::new(&config.registry)?;
    let report = run_ingestion(&store, &client, &range, &IngestOptions::from_config(config)).await?;

    println!("ingest {}", range);
    println!("  pages fetched: {} ({})", report.pages_fetched, report.stop);
    println!("  fetched: {}", report.fetched);
    println!("  skipped (no document_number): {}", report.skipped_no_id);
    println!("  upserted: {}", report.upserted);
    println!("  failed: {}", report.failed);
    for failure in &report.failures {
        println!("    {}: {}", failure.document_number, failure.reason);
    }

    if let Some(total) = store_total(&store).await {
        println!("  documents in store: {}", total);
    }
    println!("ok");

    Ok(())
}
