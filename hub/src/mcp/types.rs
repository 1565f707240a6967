//! MCP type definitions
//!
//! Shared types used by the transport adapter, the session manager and the
//! tool schema translator.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool captured from an MCP server at connect time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Server this tool belongs to
    pub server_name: String,
    /// Tool name as reported by the server
    pub name: String,
    /// Tool description
    #[serde(default)]
    pub description: Option<String>,
    /// Input schema (JSON Schema object)
    #[serde(default)]
    pub input_schema: Option<Value>,
}

/// How to spawn a tool server process
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl ServerSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Lifecycle status of a session in the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Connected,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Connected => write!(f, "connected"),
        }
    }
}

/// Response to a successful `connect`
#[derive(Debug, Clone, Serialize)]
pub struct ConnectResponse {
    pub status: SessionStatus,
    pub tools: Vec<ToolDescriptor>,
    pub count: usize,
}

/// Outcome of a `disconnect`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectStatus {
    Disconnected,
    NotConnected,
}

/// Row of `list_connected`
#[derive(Debug, Clone, Serialize)]
pub struct ConnectedServer {
    pub name: String,
    pub tool_count: usize,
    pub connected_at: DateTime<Utc>,
    pub status: SessionStatus,
}

/// Successful result of a tool call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolOutput {
    /// Text content blocks joined with newlines
    pub content: String,
    /// Structured content, if the server returned any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured: Option<Value>,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            structured: None,
        }
    }
}
