//! Conversation types shared by the chat loop and provider clients

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Author of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlation id (provider-assigned or generated)
    pub id: String,
    /// Namespaced tool id, `{server}__{tool}`
    pub name: String,
    /// Arguments as sent by the model
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Success,
    Error,
}

/// Result of one tool invocation, correlated by `id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub id: String,
    pub name: String,
    pub status: ToolCallStatus,
    pub payload: String,
}

impl ToolCallResult {
    /// Placeholder for a call that was never dispatched because the caller went away
    pub fn cancelled(call: &ToolCallRequest) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            status: ToolCallStatus::Error,
            payload: "cancelled: the conversation ended before this tool ran".to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ToolCallStatus::Error
    }
}

/// A message in the conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    /// Calls requested by an assistant message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// Call answered by a tool message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Namespaced tool answered by a tool message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub is_error: bool,
}

impl ConversationMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
            is_error: false,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Assistant turn that requested tool calls
    pub fn assistant_tool_use(content: impl Into<String>, calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::new(Role::Assistant, content)
        }
    }

    /// Tool message carrying a call's result
    pub fn tool_result(result: &ToolCallResult) -> Self {
        Self {
            tool_call_id: Some(result.id.clone()),
            tool_name: Some(result.name.clone()),
            is_error: result.is_error(),
            ..Self::new(Role::Tool, result.payload.clone())
        }
    }
}

/// What a provider turn produced
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// Final answer; its chunks were already streamed
    Text(String),
    /// The model wants tools run before it continues
    ToolUse {
        text: String,
        calls: Vec<ToolCallRequest>,
    },
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        ModelReply::Text(text.into())
    }

    pub fn tool_use(calls: Vec<ToolCallRequest>) -> Self {
        ModelReply::ToolUse {
            text: String::new(),
            calls,
        }
    }
}
