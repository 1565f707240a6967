//! REST API handlers

use std::collections::HashMap;
use std::convert::Infallible;

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::state::AppState;
use crate::agent::{ChatEvent, Orchestrator};
use crate::error::{ProviderError, SessionError};
use crate::llm::{build_provider, ProviderKind};
use crate::mcp::types::{
    ConnectResponse, ConnectedServer, DisconnectStatus, ServerSpec, ToolDescriptor, ToolOutput,
};

// ============================================================================
// Errors
// ============================================================================

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

/// Handler error carrying its HTTP status
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, kind: &'static str, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: error.into(),
                kind,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn session_status(err: &SessionError) -> StatusCode {
    match err {
        SessionError::NotConnected(_) => StatusCode::NOT_FOUND,
        SessionError::InvalidServerName { .. } | SessionError::SchemaValidation { .. } => {
            StatusCode::BAD_REQUEST
        }
        SessionError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        SessionError::ToolExecution { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        SessionError::Connection { .. }
        | SessionError::TransportClosed(_)
        | SessionError::Protocol { .. } => StatusCode::BAD_GATEWAY,
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        ApiError::new(session_status(&err), err.kind(), err.to_string())
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        let (status, kind) = match &err {
            ProviderError::UnknownProvider(_) => (StatusCode::BAD_REQUEST, "unknown_provider"),
            ProviderError::MissingCredentials(_) => {
                (StatusCode::BAD_REQUEST, "missing_credentials")
            }
            _ => (StatusCode::BAD_GATEWAY, "provider_error"),
        };
        ApiError::new(status, kind, err.to_string())
    }
}

// ============================================================================
// Health
// ============================================================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub connected: usize,
    pub provider: String,
    pub model: String,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        connected: state.sessions.list_connected().await.len(),
        provider: state.provider.kind.to_string(),
        model: state.provider.model.clone(),
    })
}

// ============================================================================
// Sessions
// ============================================================================

/// List connected servers
pub async fn list_servers(State(state): State<AppState>) -> Json<Vec<ConnectedServer>> {
    Json(state.sessions.list_connected().await)
}

/// Connect request
#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Connect (or reconnect) a server
pub async fn connect_server(
    State(state): State<AppState>,
    Json(req): Json<ConnectRequest>,
) -> Result<(StatusCode, Json<ConnectResponse>), ApiError> {
    let spec = ServerSpec {
        command: req.command,
        args: req.args,
        env: req.env,
    };
    let response = state.sessions.connect(&req.name, spec).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Disconnect response
#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub status: DisconnectStatus,
}

/// Disconnect a server
pub async fn disconnect_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Json<DisconnectResponse> {
    Json(DisconnectResponse {
        status: state.sessions.disconnect(&name).await,
    })
}

// ============================================================================
// Tools
// ============================================================================

/// Tools list response
#[derive(Debug, Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<ToolDescriptor>,
    pub count: usize,
}

/// List tools across every connected server
pub async fn list_tools(State(state): State<AppState>) -> Json<ToolsResponse> {
    let tools = state.sessions.get_all_tools().await;
    let count = tools.len();
    Json(ToolsResponse { tools, count })
}

/// Result of a direct tool execution
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecuteResponse {
    Success { result: ToolOutput },
    Error { kind: &'static str, error: String },
}

/// Execute a tool; the body is the arguments object (may be empty)
pub async fn execute_tool(
    State(state): State<AppState>,
    Path((name, tool)): Path<(String, String)>,
    body: Bytes,
) -> (StatusCode, Json<ExecuteResponse>) {
    let arguments = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ExecuteResponse::Error {
                        kind: "invalid_json",
                        error: format!("request body is not valid JSON: {}", e),
                    }),
                )
            }
        }
    };

    match state.sessions.execute_tool(&name, &tool, arguments).await {
        Ok(result) => (StatusCode::OK, Json(ExecuteResponse::Success { result })),
        Err(e) => {
            tracing::debug!("Tool '{}' on '{}' failed: {}", tool, name, e);
            (
                session_status(&e),
                Json(ExecuteResponse::Error {
                    kind: e.kind(),
                    error: e.to_string(),
                }),
            )
        }
    }
}

// ============================================================================
// Chat
// ============================================================================

/// Chat request; unset fields fall back to the server's defaults
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// Run a chat, streaming the answer as plain text.
///
/// Closing the connection drops the body stream, which cancels the chat.
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let provider = match state.pinned_provider() {
        Some(provider) => provider,
        None => {
            let mut settings = state.provider.clone();
            if let Some(kind) = &req.provider {
                let kind: ProviderKind = kind.parse()?;
                if kind != settings.kind {
                    settings.api_key = None;
                    settings.base_url = None;
                }
                settings.kind = kind;
            }
            if let Some(model) = req.model {
                settings.model = model;
            }
            if req.api_key.is_some() {
                settings.api_key = req.api_key;
            }
            if req.base_url.is_some() {
                settings.base_url = req.base_url;
            }
            if settings.api_key.is_none() {
                settings.api_key = settings
                    .kind
                    .default_api_key_env()
                    .and_then(|var| std::env::var(var).ok());
            }
            build_provider(&settings)?
        }
    };

    let orchestrator = Orchestrator::new(state.sessions.clone(), provider, state.orchestrator.clone());
    let events = orchestrator.chat(req.message);

    let text = events.filter_map(|event| async move {
        match event {
            ChatEvent::Token { content } => Some(Ok::<_, Infallible>(content)),
            ChatEvent::Error { message } => Some(Ok(format!("\n[error] {}\n", message))),
            _ => None,
        }
    });

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(text),
    )
        .into_response())
}

// ============================================================================
// Tests
// ============================================================================
