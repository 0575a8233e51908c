//! Chat-completion client for OpenAI-compatible providers.
//!
//! [`ChatMessage`] and [`ToolCall`] mirror the provider's wire format, so a
//! history can be sent back verbatim on the next call. The conversation
//! loop only sees the [`ChatModel`] trait; [`OpenAiChatModel`] is the
//! production implementation and tests substitute scripted models.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//!
//! Backoff doubles from 1s (1s, 2s, 4s, ...), capped at 32s.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::config::ModelConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One entry in a conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    /// Text content. `None` on assistant messages that only request tools.
    #[serde(default)]
    pub content: Option<String>,
    /// Tool calls requested by an assistant message, in model order.
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tool_calls: Vec<ToolCall>,
    /// On tool messages: the call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// On tool messages: the tool that produced the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ToolCall>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ToolCall>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ChatMessage {
    fn new(role: Role, content: Option<String>) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, Some(content.into()))
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, Some(content.into()))
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Some(content.into()))
    }

    /// The result of one tool call, JSON-encoded.
    pub fn tool_result(call_id: impl Into<String>, name: impl Into<String>, result: &Value) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            name: Some(name.into()),
            ..Self::new(Role::Tool, Some(result.to_string()))
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Content as text, empty when absent.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object, exactly as the model produced it.
    #[serde(default)]
    pub arguments: String,
}

/// A language model that completes a conversation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Return the next assistant message for `messages`.
    ///
    /// When `tools` is `Some`, the model may answer with tool calls;
    /// when `None`, no tools are offered.
    async fn complete(&self, messages: &[ChatMessage], tools: Option<&[Value]>)
        -> Result<ChatMessage>;
}

/// `POST {base_url}/chat/completions` client.
pub struct OpenAiChatModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    max_retries: u32,
}

impl OpenAiChatModel {
    pub fn new(config: &ModelConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build model HTTP client")?;

        Ok(Self {
            client,
            api_key,
            model: config.name.clone(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            max_retries: config.max_retries,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Value]>,
    ) -> Result<ChatMessage> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });
        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            body["tools"] = Value::from(tools.to_vec());
            body["tool_choice"] = Value::from("auto");
        }

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = retry_delay(attempt);
                tracing::debug!(attempt, delay_secs = delay.as_secs(), "retrying chat completion");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: Value = response
                            .json()
                            .await
                            .context("chat completion response is not valid JSON")?;
                        return parse_completion(json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        tracing::warn!(%status, attempt, "chat completion failed, will retry");
                        last_err = Some(anyhow::anyhow!(
                            "chat completion API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("chat completion API error {}: {}", status, body_text);
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "chat completion request failed");
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("chat completion failed after retries")))
    }
}

/// Backoff before retry `attempt` (1-based): 1s, 2s, 4s, ... capped at 32s.
fn retry_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(1).min(5))
}

/// Longest a single [`OpenAiChatModel::complete`] can take: every attempt
/// running to the request timeout, plus the backoff between them.
pub fn retry_budget(config: &ModelConfig) -> Duration {
    let per_request = Duration::from_secs(config.timeout_secs);
    (1..=config.max_retries).fold(per_request, |total, attempt| {
        total + retry_delay(attempt) + per_request
    })
}

/// Extract `choices[0].message` from a completion response.
fn parse_completion(json: Value) -> Result<ChatMessage> {
    let message = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("invalid chat completion response: missing choices[0].message"))?;

    serde_json::from_value(message).context("invalid chat completion message")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_tool_call_response() {
        let json = json!({
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "search_federal_documents",
                            "arguments": "{\"agency\":\"EPA\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let msg = parse_completion(json).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, None);
        assert_eq!(
            msg.tool_calls,
            vec![ToolCall::function("call_1", "search_federal_documents", "{\"agency\":\"EPA\"}")]
        );
    }

    #[test]
    fn test_retry_budget_covers_every_attempt() {
        let config = ModelConfig::default();
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.max_retries, 3);
        // 4 attempts of 30s plus 1s + 2s + 4s of backoff
        assert_eq!(retry_budget(&config), Duration::from_secs(127));

        let no_retries = ModelConfig {
            max_retries: 0,
            ..ModelConfig::default()
        };
        assert_eq!(retry_budget(&no_retries), Duration::from_secs(30));
    }

    #[test]
    fn test_retry_delay_is_capped() {
        assert_eq!(retry_delay(1), Duration::from_secs(1));
        assert_eq!(retry_delay(3), Duration::from_secs(4));
        assert_eq!(retry_delay(20), Duration::from_secs(32));
    }

    #[test]
    fn test_null_tool_calls_is_empty() {
        let json = json!({
            "choices": [{ "message": { "role": "assistant", "content": "Hi", "tool_calls": null } }]
        });
        let msg = parse_completion(json).unwrap();
        assert!(!msg.has_tool_calls());
        assert_eq!(msg.text(), "Hi");
    }

    #[test]
    fn test_missing_choices_is_error() {
        assert!(parse_completion(json!({ "choices": [] })).is_err());
        assert!(parse_completion(json!({ "error": "nope" })).is_err());
    }

    #[test]
    fn test_tool_message_wire_shape() {
        let msg = ChatMessage::tool_result("call_1", "search_federal_documents", &json!([]));
        let wire = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            wire,
            json!({
                "role": "tool",
                "content": "[]",
                "tool_call_id": "call_1",
                "name": "search_federal_documents"
            })
        );
    }

    #[test]
    fn test_user_message_omits_tool_fields() {
        let wire = serde_json::to_value(ChatMessage::user("hello")).unwrap();
        assert_eq!(wire, json!({ "role": "user", "content": "hello" }));
    }
}
