//! Core data models: stored documents, model-facing summaries, date ranges.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

use crate::error::IngestError;

/// Date format used by the registry, the store, and tool arguments.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One row of the `federal_documents` table, keyed by `document_number`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub document_number: String,
    pub title: String,
    pub agency: String,
    pub publication_date: Option<NaiveDate>,
    pub document_url: String,
    pub content: Option<String>,
}

/// A document as handed to the language model by the search tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    pub document_number: String,
    pub title: String,
    pub agency: String,
    /// ISO `YYYY-MM-DD`, or null when the registry gave no date.
    pub publication_date: Option<String>,
    pub document_url: String,
    pub content: Option<String>,
}

impl DocumentSummary {
    /// Build a summary, truncating `content` to at most `max_content_chars` characters.
    pub fn from_document(doc: Document, max_content_chars: usize) -> Self {
        Self {
            document_number: doc.document_number,
            title: doc.title,
            agency: doc.agency,
            publication_date: doc
                .publication_date
                .map(|d| d.format(DATE_FORMAT).to_string()),
            document_url: doc.document_url,
            content: doc.content.map(|c| truncate_chars(c, max_content_chars)),
        }
    }
}

fn truncate_chars(mut text: String, max_chars: usize) -> String {
    if let Some((idx, _)) = text.char_indices().nth(max_chars) {
        text.truncate(idx);
        text.push('…');
    }
    text
}

/// Parse a strict `YYYY-MM-DD` date; anything else is `None`.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

/// A closed publication-date interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, IngestError> {
        if start > end {
            return Err(IngestError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parse both ends from `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start = NaiveDate::parse_from_str(start, DATE_FORMAT)
            .with_context(|| format!("invalid start date '{}', expected YYYY-MM-DD", start))?;
        let end = NaiveDate::parse_from_str(end, DATE_FORMAT)
            .with_context(|| format!("invalid end date '{}', expected YYYY-MM-DD", end))?;
        Ok(Self::new(start, end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}
