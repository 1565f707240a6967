//! Session manager and tool-calling agent loop for MCP tool servers

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod mcp;
pub mod streaming;

#[cfg(feature = "web")]
pub mod web;

#[cfg(test)]
pub(crate) mod testing;
