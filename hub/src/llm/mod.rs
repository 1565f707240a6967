//! LLM provider clients
//!
//! Each provider turns the conversation history plus tool declarations into
//! one streamed model turn. Text chunks go straight to the [`EventSink`]; the
//! turn's outcome comes back as a [`ModelReply`].

mod anthropic;
mod ollama;
mod openai;

pub use anthropic::AnthropicProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::events::EventSink;
use crate::agent::types::{ConversationMessage, ModelReply};
use crate::error::ProviderError;
use crate::mcp::namespace::ToolFormat;
use crate::streaming::StreamBuffer;

/// Trait for LLM backends
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short provider name used in errors and logs
    fn name(&self) -> &'static str;

    /// Declaration shape this provider expects
    fn tool_format(&self) -> ToolFormat;

    /// Run one model turn, streaming text into `sink`.
    ///
    /// Returns early with whatever text arrived if the sink closes.
    async fn send(
        &self,
        history: &[ConversationMessage],
        tools: &[Value],
        sink: &EventSink,
    ) -> Result<ModelReply, ProviderError>;
}

/// Supported provider backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub fn default_url(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "http://localhost:11434",
            ProviderKind::OpenAi => "https://api.openai.com",
            ProviderKind::Anthropic => "https://api.anthropic.com",
        }
    }

    /// Environment variable conventionally holding the API key
    pub fn default_api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Ollama => None,
            ProviderKind::OpenAi => Some("OPENAI_API_KEY"),
            ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(ProviderKind::Ollama),
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            other => Err(ProviderError::UnknownProvider(other.to_string())),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
        };
        f.write_str(name)
    }
}

/// Everything needed to build a provider client
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub model: String,
    pub api_key: Option<String>,
    /// Overrides [`ProviderKind::default_url`]
    pub base_url: Option<String>,
}

impl ProviderSettings {
    pub fn new(kind: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.into(),
            api_key: None,
            base_url: None,
        }
    }

    fn url(&self) -> String {
        self.base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(self.kind.default_url())
            .trim_end_matches('/')
            .to_string()
    }

    fn require_key(&self, provider: &'static str) -> Result<String, ProviderError> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ProviderError::MissingCredentials(provider))
    }
}

/// Build the provider client selected by `settings.kind`
pub fn build_provider(settings: &ProviderSettings) -> Result<Arc<dyn Provider>, ProviderError> {
    let url = settings.url();
    let provider: Arc<dyn Provider> = match settings.kind {
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(url, &settings.model)),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(
            url,
            &settings.model,
            settings.require_key("openai")?,
        )),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(
            url,
            &settings.model,
            settings.require_key("anthropic")?,
        )),
    };
    tracing::debug!(provider = provider.name(), model = %settings.model, "Built provider client");
    Ok(provider)
}

/// Turn a non-2xx response into [`ProviderError::Http`]
async fn check_status(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Http {
        provider,
        status: status.as_u16(),
        body,
    })
}

fn request_error(provider: &'static str) -> impl Fn(reqwest::Error) -> ProviderError {
    move |source| ProviderError::Request { provider, source }
}

fn decode_error(provider: &'static str, line: &str, err: serde_json::Error) -> ProviderError {
    ProviderError::Decode {
        provider,
        message: format!("{} in {:?}", err, line),
    }
}

/// End a streamed turn. A stream that closes without its end-of-turn marker
/// is an error unless the caller abandoned it first.
fn finish_turn(
    provider: &'static str,
    buffer: StreamBuffer,
    abandoned: bool,
) -> Result<ModelReply, ProviderError> {
    if !buffer.is_done() && !abandoned {
        return Err(ProviderError::Truncated { provider });
    }
    Ok(buffer.into_reply())
}
