//! Stream buffer for accumulating one model turn
//!
//! Text tokens are streamed out as they arrive and also collected here. Tool
//! calls arrive either whole (Ollama) or as fragments keyed by a block index
//! (OpenAI, Anthropic); both end up as [`PartialToolCall`]s that are only
//! parsed once the turn is complete.

use serde_json::Value;

use crate::agent::types::{ModelReply, ToolCallRequest};

// ============================================================================
// Partial Tool Call
// ============================================================================

/// A tool call being assembled from stream fragments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialToolCall {
    /// Provider-assigned id, if any
    pub id: Option<String>,
    /// Namespaced tool name
    pub name: String,
    /// Raw JSON argument fragments, concatenated
    pub arguments_json: String,
    /// Arguments delivered already parsed
    pub arguments: Option<Value>,
}

impl PartialToolCall {
    fn finish(self) -> ToolCallRequest {
        let arguments = match self.arguments {
            Some(args) => args,
            None if self.arguments_json.trim().is_empty() => Value::Object(Default::default()),
            // Malformed JSON is passed through as a string; argument validation
            // then reports it back to the model.
            None => serde_json::from_str(&self.arguments_json)
                .unwrap_or(Value::String(self.arguments_json)),
        };

        ToolCallRequest {
            id: self
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
            name: self.name,
            arguments,
        }
    }
}

// ============================================================================
// Stream Buffer
// ============================================================================

/// Token usage statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Buffer for accumulating a streamed turn
#[derive(Debug, Default)]
pub struct StreamBuffer {
    /// Accumulated text content
    content: String,
    /// Tool calls, indexed by stream block
    tool_calls: Vec<PartialToolCall>,
    /// Whether the provider signalled the end of the turn
    done: bool,
    usage: Option<StreamUsage>,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&mut self, text: &str) {
        self.content.push_str(text);
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Add a complete tool call
    pub fn push_tool_call(&mut self, id: Option<String>, name: String, arguments: Value) {
        self.tool_calls.push(PartialToolCall {
            id,
            name,
            arguments_json: String::new(),
            arguments: Some(arguments),
        });
    }

    /// Tool call at a stream index, created on first sight
    pub fn tool_call_mut(&mut self, index: usize) -> &mut PartialToolCall {
        if index >= self.tool_calls.len() {
            self.tool_calls.resize_with(index + 1, PartialToolCall::default);
        }
        &mut self.tool_calls[index]
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.iter().any(|c| !c.name.is_empty())
    }

    pub fn set_done(&mut self, done: bool) {
        self.done = done;
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn set_usage(&mut self, prompt_tokens: u32, completion_tokens: u32) {
        self.usage = Some(StreamUsage {
            prompt_tokens,
            completion_tokens,
        });
    }

    pub fn usage(&self) -> Option<StreamUsage> {
        self.usage
    }

    /// Convert the buffered turn into a reply.
    ///
    /// Index slots that never received a name (gaps in sparse indices) are
    /// dropped.
    pub fn into_reply(self) -> ModelReply {
        let calls: Vec<ToolCallRequest> = self
            .tool_calls
            .into_iter()
            .filter(|c| !c.name.is_empty())
            .map(PartialToolCall::finish)
            .collect();

        if calls.is_empty() {
            ModelReply::Text(self.content)
        } else {
            ModelReply::ToolUse {
                text: self.content,
                calls,
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
