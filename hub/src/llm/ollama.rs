//! Ollama provider (`/api/chat`, newline-delimited JSON streaming)

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{check_status, decode_error, finish_turn, request_error, Provider};
use crate::agent::events::EventSink;
use crate::agent::types::{ConversationMessage, ModelReply, Role};
use crate::error::ProviderError;
use crate::mcp::namespace::ToolFormat;
use crate::streaming::{LineStream, StreamBuffer};

const NAME: &str = "ollama";

// ============================================================================
// Streaming Response Types
// ============================================================================

/// A streaming response chunk from Ollama
#[derive(Debug, Clone, Deserialize)]
struct OllamaStreamChunk {
    message: Option<StreamMessage>,
    #[serde(default)]
    done: bool,
    /// Token count for prompt (only on final chunk)
    prompt_eval_count: Option<u32>,
    /// Token count for response (only on final chunk)
    eval_count: Option<u32>,
    /// Mid-stream failure reported by the server
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct StreamMessage {
    content: Option<String>,
    /// Tool calls (usually only on the final chunk)
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Clone, Deserialize)]
struct StreamToolCall {
    id: Option<String>,
    function: StreamFunction,
}

#[derive(Debug, Clone, Deserialize)]
struct StreamFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

// ============================================================================
// Provider
// ============================================================================

/// Ollama chat client
pub struct OllamaProvider {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, model: &str) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Conversation history in Ollama's message format
    fn wire_messages(history: &[ConversationMessage]) -> Vec<Value> {
        history
            .iter()
            .map(|m| match m.role {
                Role::System => json!({"role": "system", "content": m.content}),
                Role::User => json!({"role": "user", "content": m.content}),
                Role::Assistant if !m.tool_calls.is_empty() => json!({
                    "role": "assistant",
                    "content": m.content,
                    "tool_calls": m.tool_calls.iter().map(|c| json!({
                        "function": {"name": c.name, "arguments": c.arguments}
                    })).collect::<Vec<_>>(),
                }),
                Role::Assistant => json!({"role": "assistant", "content": m.content}),
                Role::Tool => json!({
                    "role": "tool",
                    "content": m.content,
                    "tool_name": m.tool_name,
                }),
            })
            .collect()
    }

    /// Apply one NDJSON line to the turn buffer, returning text to stream
    fn handle_line(buffer: &mut StreamBuffer, line: &str) -> Result<Option<String>, ProviderError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let chunk: OllamaStreamChunk =
            serde_json::from_str(line).map_err(|e| decode_error(NAME, line, e))?;

        if let Some(message) = chunk.error {
            return Err(ProviderError::Decode {
                provider: NAME,
                message,
            });
        }

        let mut token = None;
        if let Some(msg) = chunk.message {
            if let Some(calls) = msg.tool_calls {
                for call in calls {
                    buffer.push_tool_call(call.id, call.function.name, call.function.arguments);
                }
            }
            if let Some(content) = msg.content.filter(|c| !c.is_empty()) {
                buffer.push_text(&content);
                token = Some(content);
            }
        }

        if chunk.done {
            buffer.set_done(true);
            if let (Some(prompt), Some(completion)) = (chunk.prompt_eval_count, chunk.eval_count) {
                buffer.set_usage(prompt, completion);
            }
        }

        Ok(token)
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn tool_format(&self) -> ToolFormat {
        ToolFormat::Ollama
    }

    async fn send(
        &self,
        history: &[ConversationMessage],
        tools: &[Value],
        sink: &EventSink,
    ) -> Result<ModelReply, ProviderError> {
        let mut body = json!({
            "model": self.model,
            "messages": Self::wire_messages(history),
            "stream": true,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.to_vec());
        }

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(request_error(NAME))?;
        let response = check_status(NAME, response).await?;

        let mut buffer = StreamBuffer::new();
        let mut lines = LineStream::new(Box::pin(response.bytes_stream()));
        let mut abandoned = false;

        while let Some(line) = lines.next_line().await.map_err(request_error(NAME))? {
            if let Some(token) = Self::handle_line(&mut buffer, &line)? {
                if !sink.token(&token).await {
                    tracing::debug!("Caller closed the stream; abandoning Ollama turn");
                    abandoned = true;
                    break;
                }
            }
            if buffer.is_done() {
                break;
            }
        }

        if let Some(usage) = buffer.usage() {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Ollama turn complete"
            );
        }
        finish_turn(NAME, buffer, abandoned)
    }
}

// ============================================================================
// Tests
// ============================================================================
