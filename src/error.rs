//! Typed errors for the failure categories callers need to tell apart.
//!
//! Most of the crate works in `anyhow::Result`. The enums here cover the
//! cases where the *kind* of failure changes what happens next:
//!
//! | Type | Raised by | Handling |
//! |------|-----------|----------|
//! | [`ConfigError`] | [`config`](crate::config) | Fatal at startup |
//! | [`IngestError`] | [`ingest`](crate::ingest) | Fatal for the run, never partial |
//! | [`ToolError`] | [`tools`](crate::tools) | Fed back to the model as `{"error": ..}` |

use chrono::NaiveDate;
use std::time::Duration;

/// Missing or malformed configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is unset or blank.
    #[error("required environment variable {0} is not set")]
    MissingVar(&'static str),

    /// An environment variable is set but cannot be used.
    #[error("environment variable {name}='{value}' is invalid: {reason}")]
    InvalidVar {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// The settings file could not be read or parsed.
    #[error("config file error: {0}")]
    File(String),
}

/// Failures that abort an ingestion run before any upsert is attempted.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("document store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
}

/// Failures resolving or running a tool call requested by the model.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Function {0} not found.")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Error executing function {name}: {message}")]
    Execution { name: String, message: String },

    #[error("tool call timed out after {0:?}")]
    TimedOut(Duration),
}

impl ToolError {
    /// The structured payload handed back to the model for this failure.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}
