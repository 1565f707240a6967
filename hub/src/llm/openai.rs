//! OpenAI-compatible provider (`/v1/chat/completions`, server-sent events)
//!
//! Tool calls stream as fragments keyed by `index`: the first fragment carries
//! the id and function name, later ones append to the JSON argument string.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{check_status, decode_error, finish_turn, request_error, Provider};
use crate::agent::events::EventSink;
use crate::agent::types::{ConversationMessage, ModelReply, Role};
use crate::error::ProviderError;
use crate::mcp::namespace::ToolFormat;
use crate::streaming::{sse_data, LineStream, StreamBuffer};

const NAME: &str = "openai";

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    usage: Option<ChunkUsage>,
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    message: String,
}

/// Client for OpenAI chat completions and compatible servers
pub struct OpenAiProvider {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(base_url: impl Into<String>, model: &str, api_key: String) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn wire_messages(history: &[ConversationMessage]) -> Vec<Value> {
        history
            .iter()
            .map(|m| match m.role {
                Role::System => json!({"role": "system", "content": m.content}),
                Role::User => json!({"role": "user", "content": m.content}),
                Role::Assistant if !m.tool_calls.is_empty() => json!({
                    "role": "assistant",
                    "content": if m.content.is_empty() { Value::Null } else { json!(m.content) },
                    "tool_calls": m.tool_calls.iter().map(|c| json!({
                        "id": c.id,
                        "type": "function",
                        "function": {"name": c.name, "arguments": c.arguments.to_string()},
                    })).collect::<Vec<_>>(),
                }),
                Role::Assistant => json!({"role": "assistant", "content": m.content}),
                Role::Tool => json!({
                    "role": "tool",
                    "tool_call_id": m.tool_call_id,
                    "content": m.content,
                }),
            })
            .collect()
    }

    /// Apply one SSE line to the turn buffer, returning text to stream
    fn handle_line(buffer: &mut StreamBuffer, line: &str) -> Result<Option<String>, ProviderError> {
        let Some(data) = sse_data(line.trim_end()) else {
            return Ok(None);
        };
        if data == "[DONE]" {
            buffer.set_done(true);
            return Ok(None);
        }

        let chunk: CompletionChunk =
            serde_json::from_str(data).map_err(|e| decode_error(NAME, data, e))?;

        if let Some(error) = chunk.error {
            return Err(ProviderError::Decode {
                provider: NAME,
                message: error.message,
            });
        }
        if let Some(usage) = chunk.usage {
            buffer.set_usage(usage.prompt_tokens, usage.completion_tokens);
        }

        let mut token = String::new();
        for choice in chunk.choices {
            for delta in choice.delta.tool_calls {
                let call = buffer.tool_call_mut(delta.index);
                if let Some(id) = delta.id {
                    call.id = Some(id);
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        call.name.push_str(&name);
                    }
                    if let Some(args) = function.arguments {
                        call.arguments_json.push_str(&args);
                    }
                }
            }
            if let Some(content) = choice.delta.content {
                token.push_str(&content);
            }
        }

        if token.is_empty() {
            return Ok(None);
        }
        buffer.push_text(&token);
        Ok(Some(token))
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn tool_format(&self) -> ToolFormat {
        ToolFormat::OpenAi
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
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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
                    tracing::debug!("Caller closed the stream; abandoning OpenAI turn");
                    abandoned = true;
                    break;
                }
            }
            if buffer.is_done() {
                break;
            }
        }

        finish_turn(NAME, buffer, abandoned)
    }
}
