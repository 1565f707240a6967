//! MCP error constructors

use rmcp::ErrorData as McpError;

pub type McpResult<T> = Result<T, McpError>;

/// Internal error carrying `message`
pub fn internal_error(message: impl Into<String>) -> McpError {
    McpError::internal_error(message.into(), None)
}

/// The caller sent parameters the tool cannot act on
pub fn invalid_params(message: impl Into<String>) -> McpError {
    McpError::invalid_params(message.into(), None)
}
