//! Anthropic provider (`/v1/messages`, server-sent events)

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{check_status, decode_error, finish_turn, request_error, Provider};
use crate::agent::events::EventSink;
use crate::agent::types::{ConversationMessage, ModelReply, Role};
use crate::error::ProviderError;
use crate::mcp::namespace::ToolFormat;
use crate::streaming::{sse_data, LineStream, StreamBuffer};

const NAME: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart {
        message: MessageStart,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    MessageDelta {
        usage: Option<OutputUsage>,
    },
    MessageStop,
    Error {
        error: ApiError,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageStart {
    usage: Option<InputUsage>,
}

#[derive(Debug, Deserialize)]
struct InputUsage {
    #[serde(default)]
    input_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OutputUsage {
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    ToolUse { id: String, name: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Client for the Anthropic messages API
pub struct AnthropicProvider {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(base_url: impl Into<String>, model: &str, api_key: String) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// Split history into the top-level system prompt and API messages.
    ///
    /// Tool results travel as `tool_result` blocks inside user messages;
    /// consecutive results share one message.
    fn wire_messages(history: &[ConversationMessage]) -> (String, Vec<Value>) {
        let mut system = Vec::new();
        let mut messages: Vec<Value> = Vec::new();

        for m in history {
            match m.role {
                Role::System => system.push(m.content.as_str()),
                Role::User => messages.push(json!({"role": "user", "content": m.content})),
                Role::Assistant if !m.tool_calls.is_empty() => {
                    let mut blocks = Vec::new();
                    if !m.content.is_empty() {
                        blocks.push(json!({"type": "text", "text": m.content}));
                    }
                    for call in &m.tool_calls {
                        let input = if call.arguments.is_object() {
                            call.arguments.clone()
                        } else {
                            json!({})
                        };
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": input,
                        }));
                    }
                    messages.push(json!({"role": "assistant", "content": blocks}));
                }
                Role::Assistant => {
                    messages.push(json!({"role": "assistant", "content": m.content}))
                }
                Role::Tool => {
                    let block = json!({
                        "type": "tool_result",
                        "tool_use_id": m.tool_call_id,
                        "content": m.content,
                        "is_error": m.is_error,
                    });
                    let open = messages.last_mut().and_then(|last| {
                        let is_results = last["role"] == "user"
                            && last["content"][0]["type"] == "tool_result";
                        if is_results {
                            last["content"].as_array_mut()
                        } else {
                            None
                        }
                    });
                    match open {
                        Some(blocks) => blocks.push(block),
                        None => messages.push(json!({"role": "user", "content": [block]})),
                    }
                }
            }
        }

        (system.join("\n\n"), messages)
    }

    /// Apply one SSE line to the turn buffer, returning text to stream
    fn handle_line(buffer: &mut StreamBuffer, line: &str) -> Result<Option<String>, ProviderError> {
        let Some(data) = sse_data(line.trim_end()) else {
            return Ok(None);
        };

        let event: StreamEvent =
            serde_json::from_str(data).map_err(|e| decode_error(NAME, data, e))?;

        match event {
            StreamEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    buffer.set_usage(usage.input_tokens, 0);
                }
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlock::ToolUse { id, name },
            } => {
                let call = buffer.tool_call_mut(index);
                call.id = Some(id);
                call.name = name;
            }
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } if !text.is_empty() => {
                    buffer.push_text(&text);
                    return Ok(Some(text));
                }
                BlockDelta::InputJsonDelta { partial_json } => {
                    buffer.tool_call_mut(index).arguments_json.push_str(&partial_json);
                }
                _ => {}
            },
            StreamEvent::MessageDelta { usage: Some(usage) } => {
                let prompt = buffer.usage().map(|u| u.prompt_tokens).unwrap_or(0);
                buffer.set_usage(prompt, usage.output_tokens);
            }
            StreamEvent::MessageStop => buffer.set_done(true),
            StreamEvent::Error { error } => {
                return Err(ProviderError::Decode {
                    provider: NAME,
                    message: error.message,
                })
            }
            _ => {}
        }

        Ok(None)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn tool_format(&self) -> ToolFormat {
        ToolFormat::Anthropic
    }

    async fn send(
        &self,
        history: &[ConversationMessage],
        tools: &[Value],
        sink: &EventSink,
    ) -> Result<ModelReply, ProviderError> {
        let (system, messages) = Self::wire_messages(history);
        let mut body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": messages,
            "stream": true,
        });
        if !system.is_empty() {
            body["system"] = Value::String(system);
        }
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.to_vec());
        }

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
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
                    tracing::debug!("Caller closed the stream; abandoning Anthropic turn");
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
