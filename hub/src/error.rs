//! Error taxonomy for sessions, providers and the chat loop

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the session manager and transport adapters
#[derive(Debug, Error)]
pub enum SessionError {
    /// No live session under this name
    #[error("server '{0}' is not connected")]
    NotConnected(String),

    /// Name cannot be namespaced unambiguously
    #[error("invalid server name '{name}': {reason}")]
    InvalidServerName { name: String, reason: String },

    /// Spawn or handshake failure
    #[error("failed to connect to '{server}': {message}")]
    Connection { server: String, message: String },

    /// The session died or was disconnected while a request was pending
    #[error("transport for '{0}' is closed")]
    TransportClosed(String),

    /// Handshake or tool call exceeded its bound
    #[error("{operation} on '{server}' timed out after {timeout:?}")]
    Timeout {
        server: String,
        operation: String,
        timeout: Duration,
    },

    /// The tool ran but reported an application error
    #[error("tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// Arguments did not match the tool's declared input schema
    #[error("invalid arguments for '{tool}': {message}")]
    SchemaValidation { tool: String, message: String },

    /// Unexpected protocol-level failure
    #[error("protocol error on '{server}': {message}")]
    Protocol { server: String, message: String },
}

impl SessionError {
    /// Stable machine-readable kind, used in JSON responses
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::NotConnected(_) => "not_connected",
            SessionError::InvalidServerName { .. } => "invalid_server_name",
            SessionError::Connection { .. } => "connection_error",
            SessionError::TransportClosed(_) => "transport_closed",
            SessionError::Timeout { .. } => "timeout",
            SessionError::ToolExecution { .. } => "tool_execution_error",
            SessionError::SchemaValidation { .. } => "schema_validation_error",
            SessionError::Protocol { .. } => "protocol_error",
        }
    }
}

/// Errors raised by LLM provider clients
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} API error {status}: {body}")]
    Http {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} request failed: {source}")]
    Request {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} sent an undecodable response: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },

    /// The response stream stopped before the provider's end-of-turn marker
    #[error("{provider} stream ended unexpectedly")]
    Truncated { provider: &'static str },

    #[error("{0} requires an API key")]
    MissingCredentials(&'static str),

    #[error("unknown provider '{0}' (expected ollama, openai or anthropic)")]
    UnknownProvider(String),
}

/// Errors that end a chat loop
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("agent reached maximum iterations ({limit}) without completing")]
    IterationLimit { limit: usize },
}
