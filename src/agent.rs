//! The tool-augmented conversation loop.
//!
//! One call to [`ConversationLoop::run_turn`] takes a user query through at
//! most two model calls:
//!
//! ```text
//! history + user ──► model (tools offered)
//!                        │
//!          no tool calls ├──────────────────────────────► Direct
//!                        │ tool calls
//!                        ▼
//!          run each call in order, append one tool result per call id
//!                        │
//!                        ▼
//!                  model (no tools) ───────────────────► Summarized
//! ```
//!
//! The input history is never mutated; the extended history comes back in
//! the [`TurnOutcome`] for the caller to thread into the next turn. Tool
//! failures become `{"error": ..}` results the model can read. A model
//! failure ends the turn with an apology and leaves the history as it was.

use anyhow::{Context, Result};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::config::{api_key_from_env, Config, StoreBackend};
use crate::error::ToolError;
use crate::llm::{retry_budget, ChatMessage, ChatModel, OpenAiChatModel, ToolCall};
use crate::store::{DocumentStore, SqlStore};
use crate::tools::ToolRegistry;

/// Prefix of the answer returned when the model cannot be reached.
pub const FAILURE_PREFIX: &str = "An internal error occurred during the conversation";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    /// The model answered without calling tools.
    Direct,
    /// Tools ran and the model summarized their results.
    Summarized,
    /// A model call failed; the answer is an error message.
    Failed,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub answer: String,
    /// History to pass into the next turn.
    pub history: Vec<ChatMessage>,
    pub kind: TurnKind,
}

pub struct ConversationLoop {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    system_prompt: String,
    model_timeout: Duration,
    tool_timeout: Duration,
}

impl ConversationLoop {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: Arc<ToolRegistry>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            model,
            tools,
            system_prompt: system_prompt.into(),
            model_timeout: DEFAULT_TIMEOUT,
            tool_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// `model_timeout` bounds one whole [`ChatModel::complete`] call,
    /// including any retries the model client makes.
    pub fn with_timeouts(mut self, model_timeout: Duration, tool_timeout: Duration) -> Self {
        self.model_timeout = model_timeout;
        self.tool_timeout = tool_timeout;
        self
    }

    /// Build a loop from settings, using the given model and store.
    pub fn from_config(
        config: &Config,
        model: Arc<dyn ChatModel>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        let tools = ToolRegistry::with_search(store, config.search.clone());
        Self::new(model, Arc::new(tools), config.model.system_prompt.clone()).with_timeouts(
            retry_budget(&config.model),
            Duration::from_secs(config.agent.tool_timeout_secs),
        )
    }

    /// Build the production loop: OpenAI model and SQL store from the environment.
    ///
    /// Fails if `OPENAI_API_KEY` or the store settings are missing.
    pub fn from_env(config: &Config) -> Result<Self> {
        let api_key = api_key_from_env()?;
        let backend = StoreBackend::from_env()?;
        let model = OpenAiChatModel::new(&config.model, api_key)?;
        tracing::info!(model = model.model_name(), store = %backend.describe(), "conversation loop ready");
        Ok(Self::from_config(
            config,
            Arc::new(model),
            Arc::new(SqlStore::new(backend)),
        ))
    }

    /// Answer one user query. Never fails; see [`TurnKind::Failed`].
    pub async fn run_turn(&self, history: &[ChatMessage], query: &str) -> TurnOutcome {
        match self.try_turn(history, query).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %format!("{:#}", e), "conversation turn failed");
                TurnOutcome {
                    answer: format!("{}: {:#}", FAILURE_PREFIX, e),
                    history: history.to_vec(),
                    kind: TurnKind::Failed,
                }
            }
        }
    }

    async fn try_turn(&self, history: &[ChatMessage], query: &str) -> Result<TurnOutcome> {
        let mut messages = history.to_vec();
        if messages.is_empty() {
            messages.push(ChatMessage::system(self.system_prompt.clone()));
        }
        messages.push(ChatMessage::user(query));

        let definitions = self.tools.definitions();
        let offered = (!definitions.is_empty()).then_some(definitions.as_slice());

        let response = self
            .call_model(&messages, offered)
            .await
            .context("model call failed")?;

        if !response.has_tool_calls() {
            let answer = response.text().to_string();
            messages.push(ChatMessage::assistant(answer.clone()));
            return Ok(TurnOutcome {
                answer,
                history: messages,
                kind: TurnKind::Direct,
            });
        }

        let calls = response.tool_calls.clone();
        tracing::info!(count = calls.len(), "model requested tool calls");
        messages.push(response);

        for call in &calls {
            let result = self.resolve_call(call).await;
            messages.push(ChatMessage::tool_result(&call.id, &call.function.name, &result));
        }

        let summary = self
            .call_model(&messages, None)
            .await
            .context("summarization call failed")?;
        if summary.has_tool_calls() {
            tracing::warn!(
                count = summary.tool_calls.len(),
                "ignoring tool calls in summarization response"
            );
        }

        let answer = summary.text().to_string();
        messages.push(ChatMessage::assistant(answer.clone()));
        Ok(TurnOutcome {
            answer,
            history: messages,
            kind: TurnKind::Summarized,
        })
    }

    async fn call_model(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Value]>,
    ) -> Result<ChatMessage> {
        with_timeout(self.model_timeout, self.model.complete(messages, tools))
            .await
            .with_context(|| format!("timed out after {:?}", self.model_timeout))?
    }

    /// Run one tool call; every failure becomes an error payload.
    async fn resolve_call(&self, call: &ToolCall) -> Value {
        let name = call.function.name.as_str();
        tracing::info!(call_id = %call.id, tool = name, "executing tool call");

        let result = match with_timeout(
            self.tool_timeout,
            self.tools.call(name, &call.function.arguments),
        )
        .await
        {
            Some(result) => result,
            None => Err(ToolError::TimedOut(self.tool_timeout)),
        };

        match result {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(call_id = %call.id, tool = name, error = %e, "tool call failed");
                e.to_payload()
            }
        }
    }
}

async fn with_timeout<F: Future>(limit: Duration, fut: F) -> Option<F::Output> {
    tokio::time::timeout(limit, fut).await.ok()
}

/// `fedreg chat`: answer one query, or run an interactive session on stdin.
pub async fn run_chat(config: &Config, query: Option<String>) -> Result<()> {
    let agent = ConversationLoop::from_env(config)?;

    if let Some(query) = query {
        let outcome = agent.run_turn(&[], &query).await;
        println!("{}", outcome.answer);
        return Ok(());
    }

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut history = Vec::new();

    println!("Ask about federal documents. Type 'quit' to exit.");
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("quit") || query.eq_ignore_ascii_case("exit") {
            break;
        }

        let outcome = agent.run_turn(&history, query).await;
        println!("{}", outcome.answer);
        history = outcome.history;
    }

    Ok(())
}
