//! Transport adapter over a tool-server subprocess
//!
//! One [`StdioTransport`] owns one child process speaking MCP over stdio.
//! Spawning happens in [`TransportFactory::spawn`]; the MCP handshake is a
//! separate [`ToolTransport::initialize`] step so callers can bound it with
//! their own timeout.

use std::sync::Arc;

use async_trait::async_trait;
use rmcp::{
    model::{CallToolRequestParam, CallToolResult, ErrorCode, JsonObject, RawContent},
    service::{Peer, RunningService, ServiceError},
    transport::TokioChildProcess,
    RoleClient, ServiceExt,
};
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::{Mutex, RwLock};

use super::types::{ServerSpec, ToolDescriptor, ToolOutput};
use crate::error::SessionError;

/// A request/response channel to one tool server
#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// Run the protocol handshake
    async fn initialize(&self) -> Result<(), SessionError>;

    /// Fetch the server's tool catalog
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, SessionError>;

    /// Invoke one tool
    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<ToolOutput, SessionError>;

    /// Shut the channel down. Calling it again is a no-op.
    async fn close(&self) -> Result<(), SessionError>;
}

/// Spawns transports for the session manager
pub trait TransportFactory: Send + Sync {
    fn spawn(
        &self,
        server_name: &str,
        spec: &ServerSpec,
    ) -> Result<Arc<dyn ToolTransport>, SessionError>;
}

/// Factory for [`StdioTransport`]
#[derive(Debug, Default, Clone, Copy)]
pub struct StdioTransportFactory;

impl TransportFactory for StdioTransportFactory {
    fn spawn(
        &self,
        server_name: &str,
        spec: &ServerSpec,
    ) -> Result<Arc<dyn ToolTransport>, SessionError> {
        Ok(Arc::new(StdioTransport::spawn(server_name, spec)?))
    }
}

enum TransportState {
    /// Process running, handshake not done yet
    Spawned(TokioChildProcess),
    Running(RunningService<RoleClient, ()>),
    Closed,
}

/// MCP client over a child process's stdin/stdout
pub struct StdioTransport {
    server: String,
    state: Mutex<TransportState>,
    /// Cloned out for each request so calls never hold the state lock
    peer: RwLock<Option<Peer<RoleClient>>>,
}

impl StdioTransport {
    /// Spawn the server process. The handshake runs in [`ToolTransport::initialize`].
    pub fn spawn(server_name: &str, spec: &ServerSpec) -> Result<Self, SessionError> {
        tracing::debug!("Spawning MCP server '{}': {} {:?}", server_name, spec.command, spec.args);

        let mut cmd = Command::new(&spec.command);
        if !spec.args.is_empty() {
            cmd.args(&spec.args);
        }
        for (key, value) in &spec.env {
            let expanded = shellexpand::env(value).unwrap_or_else(|_| value.clone().into());
            cmd.env(key, expanded.as_ref());
        }

        let process = TokioChildProcess::new(cmd).map_err(|e| SessionError::Connection {
            server: server_name.to_string(),
            message: format!("failed to spawn '{}': {}", spec.command, e),
        })?;

        Ok(Self {
            server: server_name.to_string(),
            state: Mutex::new(TransportState::Spawned(process)),
            peer: RwLock::new(None),
        })
    }

    async fn peer(&self) -> Result<Peer<RoleClient>, SessionError> {
        self.peer
            .read()
            .await
            .clone()
            .ok_or_else(|| SessionError::TransportClosed(self.server.clone()))
    }

    fn map_service_error(&self, tool: Option<&str>, err: ServiceError) -> SessionError {
        match err {
            ServiceError::McpError(data) if data.code == ErrorCode::INVALID_PARAMS => {
                SessionError::SchemaValidation {
                    tool: tool.unwrap_or_default().to_string(),
                    message: data.message.to_string(),
                }
            }
            ServiceError::McpError(data) => match tool {
                Some(tool) => SessionError::ToolExecution {
                    tool: tool.to_string(),
                    message: data.message.to_string(),
                },
                None => SessionError::Protocol {
                    server: self.server.clone(),
                    message: data.message.to_string(),
                },
            },
            ServiceError::TransportClosed | ServiceError::TransportSend(_) => {
                SessionError::TransportClosed(self.server.clone())
            }
            other => SessionError::Protocol {
                server: self.server.clone(),
                message: other.to_string(),
            },
        }
    }
}

/// Join the text blocks of a tool result; non-text blocks are rendered as JSON
pub fn collect_text(result: &CallToolResult) -> String {
    let mut output = String::new();
    for content in &result.content {
        if !output.is_empty() {
            output.push('\n');
        }
        match &content.raw {
            RawContent::Text(text) => output.push_str(&text.text),
            other => output.push_str(
                &serde_json::to_string(other).unwrap_or_else(|_| "<unrenderable content>".into()),
            ),
        }
    }
    output
}

#[async_trait]
impl ToolTransport for StdioTransport {
    async fn initialize(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        // Left as Closed if the handshake fails or its future is dropped;
        // dropping the process handle kills the child.
        let process = match std::mem::replace(&mut *state, TransportState::Closed) {
            TransportState::Spawned(process) => process,
            running @ TransportState::Running(_) => {
                *state = running;
                return Ok(());
            }
            TransportState::Closed => return Err(SessionError::TransportClosed(self.server.clone())),
        };

        let service = ().serve(process).await.map_err(|e| SessionError::Connection {
            server: self.server.clone(),
            message: format!("handshake failed: {}", e),
        })?;

        *self.peer.write().await = Some(service.peer().clone());
        *state = TransportState::Running(service);

        tracing::info!("MCP server '{}' initialized", self.server);
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, SessionError> {
        let peer = self.peer().await?;
        let response = peer
            .list_tools(Default::default())
            .await
            .map_err(|e| self.map_service_error(None, e))?;

        Ok(response
            .tools
            .into_iter()
            .map(|t| ToolDescriptor {
                server_name: self.server.clone(),
                name: t.name.to_string(),
                description: t.description.map(|d| d.to_string()),
                input_schema: Some(Value::Object((*t.input_schema).clone())),
            })
            .collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<ToolOutput, SessionError> {
        let peer = self.peer().await?;
        let result = peer
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments,
                task: None,
            })
            .await
            .map_err(|e| self.map_service_error(Some(name), e))?;

        let content = collect_text(&result);
        if result.is_error.unwrap_or(false) {
            return Err(SessionError::ToolExecution {
                tool: name.to_string(),
                message: content,
            });
        }

        Ok(ToolOutput {
            content,
            structured: result.structured_content,
        })
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.peer.write().await.take();
        let previous = std::mem::replace(&mut *self.state.lock().await, TransportState::Closed);

        match previous {
            TransportState::Running(service) => {
                tracing::info!("Stopping MCP server: {}", self.server);
                service
                    .cancel()
                    .await
                    .map(|_| ())
                    .map_err(|e| SessionError::Protocol {
                        server: self.server.clone(),
                        message: format!("shutdown failed: {}", e),
                    })
            }
            TransportState::Spawned(_) | TransportState::Closed => Ok(()),
        }
    }
}
