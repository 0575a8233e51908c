//! Federal Register API client and pagination.
//!
//! The registry serves documents as JSON pages:
//!
//! ```text
//! GET {base_url}?conditions[publication_date][gte]=2025-03-01
//!               &conditions[publication_date][lte]=2025-03-31
//!               &per_page=1000&page=1
//!
//! { "count": 2431, "total_pages": 3, "next_page_url": "...", "results": [ ... ] }
//! ```
//!
//! [`paginate`] walks pages until one of the stop conditions in
//! [`StopReason`] holds. A failed page ends the walk but keeps every record
//! already fetched; pagination never returns an error.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::config::{RegistryConfig, REGISTRY_MAX_PER_PAGE};
use crate::models::{DateRange, DATE_FORMAT};

/// Anything that can serve one raw registry page.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch page `page` (1-based) of documents published within `range`.
    ///
    /// Returns the decoded JSON body. Transport failures, non-2xx statuses
    /// and undecodable bodies are errors.
    async fn fetch_page(&self, range: &DateRange, per_page: u32, page: u32) -> Result<Value>;
}

/// HTTP client for the Federal Register documents endpoint.
pub struct RegistryClient {
    client: reqwest::Client,
    base_url: String,
}

impl RegistryClient {
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build registry HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl PageSource for RegistryClient {
    async fn fetch_page(&self, range: &DateRange, per_page: u32, page: u32) -> Result<Value> {
        let start = range.start().format(DATE_FORMAT).to_string();
        let end = range.end().format(DATE_FORMAT).to_string();
        let per_page = per_page.to_string();
        let page_param = page.to_string();

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("conditions[publication_date][gte]", start.as_str()),
                ("conditions[publication_date][lte]", end.as_str()),
                ("per_page", per_page.as_str()),
                ("page", page_param.as_str()),
            ])
            .send()
            .await
            .with_context(|| format!("registry request for page {} failed", page))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("registry returned {} for page {}: {}", status, page, body);
        }

        response
            .json::<Value>()
            .await
            .with_context(|| format!("registry page {} is not valid JSON", page))
    }
}

/// What the registry said about the page after this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextPage {
    /// `next_page_url` was absent.
    Unknown,
    /// `next_page_url` was null or empty.
    None,
    Url(String),
}

/// One decoded registry page.
#[derive(Debug, Clone)]
pub struct RegistryPage {
    pub results: Vec<Value>,
    pub total_pages: Option<u64>,
    pub next_page: NextPage,
}

impl RegistryPage {
    pub fn from_json(body: Value) -> Result<Self> {
        let Value::Object(mut obj) = body else {
            bail!("registry page is not a JSON object");
        };

        let results = match obj.remove("results") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(other) => bail!("registry 'results' is not an array: {}", other),
        };

        let total_pages = obj.get("total_pages").and_then(Value::as_u64);

        let next_page = match obj.get("next_page_url") {
            None => NextPage::Unknown,
            Some(Value::String(url)) if !url.trim().is_empty() => NextPage::Url(url.clone()),
            Some(Value::Null) | Some(Value::String(_)) => NextPage::None,
            Some(_) => NextPage::Unknown,
        };

        Ok(Self {
            results,
            total_pages,
            next_page,
        })
    }
}

/// Why pagination stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EmptyPage,
    /// Fewer records than requested; treated as the last page.
    ShortPage,
    /// The page number reached the registry's `total_pages`.
    LastReportedPage,
    /// The registry reported no next page.
    NoNextPage,
    /// The `max_pages` ceiling was reached.
    PageLimit,
    /// A page could not be fetched or decoded.
    Failed(String),
}

impl StopReason {
    pub fn is_failure(&self) -> bool {
        matches!(self, StopReason::Failed(_))
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::EmptyPage => write!(f, "empty page"),
            StopReason::ShortPage => write!(f, "short page"),
            StopReason::LastReportedPage => write!(f, "last reported page"),
            StopReason::NoNextPage => write!(f, "no next page"),
            StopReason::PageLimit => write!(f, "page limit reached"),
            StopReason::Failed(msg) => write!(f, "fetch failed: {}", msg),
        }
    }
}

/// Raw records gathered by [`paginate`], in registry order.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub records: Vec<Value>,
    pub pages_fetched: u32,
    pub stop: StopReason,
}

/// Fetch successive pages for `range` until a stop condition holds.
///
/// `per_page` is clamped to `1..=1000`. At most `max_pages` requests are
/// made.
pub async fn paginate(
    source: &dyn PageSource,
    range: &DateRange,
    per_page: u32,
    max_pages: u32,
) -> FetchOutcome {
    let per_page = per_page.clamp(1, REGISTRY_MAX_PER_PAGE);
    let mut records = Vec::new();
    let mut pages_fetched = 0;

    for page in 1..=max_pages {
        let parsed = match source.fetch_page(range, per_page, page).await {
            Ok(body) => RegistryPage::from_json(body),
            Err(e) => Err(e),
        };
        let parsed = match parsed {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(page, error = %format!("{:#}", e), "registry fetch failed, stopping pagination");
                return FetchOutcome {
                    records,
                    pages_fetched,
                    stop: StopReason::Failed(format!("{:#}", e)),
                };
            }
        };
        pages_fetched += 1;

        let count = parsed.results.len();
        tracing::debug!(page, count, total_pages = ?parsed.total_pages, "fetched registry page");

        if count == 0 {
            return FetchOutcome {
                records,
                pages_fetched,
                stop: StopReason::EmptyPage,
            };
        }
        records.extend(parsed.results);

        let stop = if count < per_page as usize {
            Some(StopReason::ShortPage)
        } else if parsed.total_pages.is_some_and(|t| u64::from(page) >= t) {
            Some(StopReason::LastReportedPage)
        } else if parsed.next_page == NextPage::None {
            Some(StopReason::NoNextPage)
        } else {
            None
        };
        if let Some(stop) = stop {
            return FetchOutcome {
                records,
                pages_fetched,
                stop,
            };
        }
    }

    FetchOutcome {
        records,
        pages_fetched,
        stop: StopReason::PageLimit,
    }
}
