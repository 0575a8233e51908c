//! Tools the language model can call.
//!
//! Each tool implements [`Tool`]: a name, a description, an OpenAI
//! function-calling parameter schema, and `execute`. The conversation loop
//! resolves requested calls through [`ToolRegistry::call`], which turns
//! every failure (bad arguments, unknown name, execution error) into a typed
//! [`ToolError`] the loop can hand back to the model.
//!
//! ```text
//! model tool_call { name, arguments }
//!        │
//!        ▼
//! ToolRegistry::call ──► decode args ──► find(name) ──► Tool::execute
//!        │                    │               │               │
//!        └──── Ok(Value) ◄────┴─ ToolError ◄──┴───────────────┘
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::SearchConfig;
use crate::error::ToolError;
use crate::search::{search_documents, SearchArgs};
use crate::store::DocumentStore;

/// A function the model may invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Function name as declared to the model (e.g. `"search_federal_documents"`).
    fn name(&self) -> &str;

    /// One-line description the model uses to decide whether to call the tool.
    fn description(&self) -> &str;

    /// JSON Schema for the arguments object.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. `params` is always a JSON object.
    async fn execute(&self, params: Value) -> Result<Value>;
}

/// Searches the ingested Federal Register documents.
pub struct SearchDocumentsTool {
    store: Arc<dyn DocumentStore>,
    settings: SearchConfig,
}

impl SearchDocumentsTool {
    pub const NAME: &'static str = "search_federal_documents";

    pub fn new(store: Arc<dyn DocumentStore>, settings: SearchConfig) -> Self {
        Self { store, settings }
    }
}

#[async_trait]
impl Tool for SearchDocumentsTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Search federal documents based on query, agency, date range, and limit."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Keywords to match against document titles and content."
                },
                "agency": {
                    "type": "string",
                    "description": "Publishing agency name, or part of it."
                },
                "start_date": {
                    "type": "string",
                    "description": "Earliest publication date (YYYY-MM-DD)."
                },
                "end_date": {
                    "type": "string",
                    "description": "Latest publication date (YYYY-MM-DD)."
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of results to return.",
                    "default": self.settings.default_limit
                }
            },
            "required": []
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let args = SearchArgs::from_json(&params);
        let results = search_documents(self.store.as_ref(), &args, &self.settings).await;
        tracing::debug!(count = results.len(), "search tool returned");
        Ok(serde_json::to_value(results)?)
    }
}

/// The set of tools offered to the model.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// A registry holding the document search tool.
    pub fn with_search(store: Arc<dyn DocumentStore>, settings: SearchConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SearchDocumentsTool::new(store, settings)));
        registry
    }

    /// Register a tool. Lookups return the first tool registered under a name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Tool declarations in OpenAI `tools` format.
    pub fn definitions(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name(),
                        "description": t.description(),
                        "parameters": t.parameters_schema(),
                    }
                })
            })
            .collect()
    }

    /// Decode `raw_args` and run the named tool.
    ///
    /// An empty argument string is treated as `{}`.
    pub async fn call(&self, name: &str, raw_args: &str) -> Result<Value, ToolError> {
        let params = decode_arguments(raw_args)?;
        let tool = self
            .find(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        tool.execute(params)
            .await
            .map_err(|e| ToolError::Execution {
                name: name.to_string(),
                message: format!("{:#}", e),
            })
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_arguments(raw: &str) -> Result<Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(Value::Object(map)),
        Ok(other) => Err(ToolError::InvalidArguments(format!(
            "expected a JSON object, got {}",
            other
        ))),
        Err(e) => Err(ToolError::InvalidArguments(e.to_string())),
    }
}
