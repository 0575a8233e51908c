//! Document search over the store.
//!
//! Arguments usually come from a language model, so validation never fails:
//! a blank string or an unparsable date drops that filter, and a missing or
//! nonsensical `limit` falls back to the configured default. An unreachable
//! store yields no results rather than an error.

use anyhow::Result;
use serde_json::Value;

use crate::config::{Config, SearchConfig, StoreBackend};
use crate::models::{parse_date, DocumentSummary};
use crate::store::{DocumentFilter, DocumentStore, SqlStore};

/// Raw search criteria, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchArgs {
    pub query: Option<String>,
    pub agency: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// `None` when absent or not coercible to an integer.
    pub limit: Option<i64>,
}

impl SearchArgs {
    /// Read arguments from a JSON object, coercing loosely-typed values.
    ///
    /// Non-string text fields are ignored. `limit` accepts integers,
    /// integral floats, and numeric strings.
    pub fn from_json(args: &Value) -> Self {
        let text = |key: &str| {
            args.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Self {
            query: text("query"),
            agency: text("agency"),
            start_date: text("start_date"),
            end_date: text("end_date"),
            limit: args.get("limit").and_then(coerce_limit),
        }
    }

    /// Validate into a store filter.
    pub fn to_filter(&self, settings: &SearchConfig) -> DocumentFilter {
        let non_blank = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        DocumentFilter {
            query: non_blank(&self.query),
            agency: non_blank(&self.agency),
            start_date: lenient_date("start_date", self.start_date.as_deref()),
            end_date: lenient_date("end_date", self.end_date.as_deref()),
            limit: effective_limit(self.limit, settings),
        }
    }
}

fn coerce_limit(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

fn lenient_date(field: &str, raw: Option<&str>) -> Option<chrono::NaiveDate> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    let parsed = parse_date(raw);
    if parsed.is_none() {
        tracing::warn!(field, value = raw, "ignoring unparsable date filter");
    }
    parsed
}

/// Positive limits pass through up to `max_limit`; anything else is the default.
pub fn effective_limit(requested: Option<i64>, settings: &SearchConfig) -> usize {
    match requested {
        Some(n) if n > 0 => (n as u64).min(settings.max_limit as u64) as usize,
        _ => settings.default_limit,
    }
}

/// Run a search. Never fails: store errors are logged and yield no results.
pub async fn search_documents(
    store: &dyn DocumentStore,
    args: &SearchArgs,
    settings: &SearchConfig,
) -> Vec<DocumentSummary> {
    let filter = args.to_filter(settings);
    match find(store, &filter).await {
        Ok(docs) => docs
            .into_iter()
            .map(|d| DocumentSummary::from_document(d, settings.max_content_chars))
            .collect(),
        Err(e) => {
            tracing::warn!(
                store = %store.describe(),
                error = %format!("{:#}", e),
                "document search failed, returning no results"
            );
            Vec::new()
        }
    }
}

async fn find(
    store: &dyn DocumentStore,
    filter: &DocumentFilter,
) -> Result<Vec<crate::models::Document>> {
    let mut session = store.open().await?;
    let docs = session.find_documents(filter).await?;
    if let Err(e) = session.close().await {
        tracing::debug!(error = %e, "error closing store session");
    }
    Ok(docs)
}

/// `fedreg search`: print matching documents.
pub async fn run_search(config: &Config, args: SearchArgs) -> Result<()> {
    let store = SqlStore::new(StoreBackend::from_env()?);
    let results = search_documents(&store, &args, &config.search).await;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, doc) in results.iter().enumerate() {
        let title = if doc.title.is_empty() {
            "(untitled)"
        } else {
            doc.title.as_str()
        };
        println!("{}. {} / {}", i + 1, doc.document_number, title);
        println!(
            "    published: {}",
            doc.publication_date.as_deref().unwrap_or("(unknown)")
        );
        if !doc.agency.is_empty() {
            println!("    agency: {}", doc.agency);
        }
        if !doc.document_url.is_empty() {
            println!("    url: {}", doc.document_url);
        }
        if let Some(ref content) = doc.content {
            let excerpt: String = content.chars().take(200).collect();
            println!("    excerpt: \"{}\"", excerpt.replace('\n', " ").trim());
        }
        println!();
    }

    Ok(())
}
