//! Configuration loading

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::agent::{OrchestratorConfig, DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_TOOL_RESULT_CHARS};
use crate::llm::{ProviderKind, ProviderSettings};
use crate::mcp::session::SessionConfig;
use crate::mcp::types::ServerSpec;

/// Directory under the user's config dir holding global config files
const GLOBAL_CONFIG_DIR: &str = "mcp-hub";

/// Find a config file by walking up the directory tree, then checking global config.
///
/// Search order:
/// 1. Current directory and parent directories (walking up to root)
/// 2. Global config at ~/.config/mcp-hub/
fn find_config_file(filename: &str) -> Option<PathBuf> {
    let start = std::env::current_dir().ok()?;
    find_config_file_from(&start, filename).or_else(|| {
        let global_path = dirs::config_dir()?.join(GLOBAL_CONFIG_DIR).join(filename);
        global_path.exists().then_some(global_path)
    })
}

/// Walk up from `start` looking for `filename`
fn find_config_file_from(start: &Path, filename: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(filename))
        .find(|candidate| candidate.exists())
}

// ============================================================================
// MCP Server Configuration (.mcp.json)
// ============================================================================

/// MCP server configuration (from .mcp.json)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct McpConfig {
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: HashMap<String, ServerSpec>,
}

impl McpConfig {
    /// Load MCP config from .mcp.json
    ///
    /// Search order:
    /// 1. Walk up directory tree from cwd looking for .mcp.json
    /// 2. Check ~/.config/mcp-hub/.mcp.json (global fallback)
    pub fn load() -> Result<Option<Self>> {
        if let Some(config_path) = find_config_file(".mcp.json") {
            tracing::debug!("Loading MCP config from: {}", config_path.display());
            return Self::load_from_path(&config_path).map(Some);
        }

        tracing::debug!("No .mcp.json found");
        Ok(None)
    }

    /// Load from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid MCP config {}", path.display()))
    }

    /// Servers sorted by name
    pub fn servers(&self) -> Vec<(&str, &ServerSpec)> {
        let mut servers: Vec<_> = self
            .mcp_servers
            .iter()
            .map(|(name, spec)| (name.as_str(), spec))
            .collect();
        servers.sort_by_key(|(name, _)| *name);
        servers
    }
}

// ============================================================================
// Hub Configuration (.hub.toml)
// ============================================================================

/// Top-level hub configuration (from .hub.toml)
#[derive(Debug, Default, Deserialize)]
pub struct HubFileConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentSectionConfig,
    #[serde(default)]
    pub sessions: SessionsSectionConfig,
}

/// LLM configuration section
#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    /// Base URL; the provider's public endpoint when unset
    pub url: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
}

/// Agent configuration section
#[derive(Debug, Deserialize)]
pub struct AgentSectionConfig {
    pub system_prompt: Option<String>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_max_tool_result_chars")]
    pub max_tool_result_chars: usize,
}

/// Session timeouts section
#[derive(Debug, Deserialize)]
pub struct SessionsSectionConfig {
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

// Default value functions
fn default_model() -> String {
    "qwen3-coder:30b".to_string()
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

fn default_max_tool_result_chars() -> usize {
    DEFAULT_MAX_TOOL_RESULT_CHARS
}

fn default_handshake_timeout_secs() -> u64 {
    30
}

fn default_tool_timeout_secs() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            url: None,
            model: default_model(),
            api_key_env: None,
        }
    }
}

impl Default for AgentSectionConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_iterations: default_max_iterations(),
            max_tool_result_chars: default_max_tool_result_chars(),
        }
    }
}

impl Default for SessionsSectionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: default_handshake_timeout_secs(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

impl HubFileConfig {
    /// Load config from .hub.toml
    ///
    /// Search order:
    /// 1. Walk up directory tree from cwd looking for .hub.toml
    /// 2. Check ~/.config/mcp-hub/.hub.toml (global fallback)
    /// 3. Fall back to defaults
    pub fn load() -> Result<Self> {
        if let Some(config_path) = find_config_file(".hub.toml") {
            tracing::debug!("Loading config from: {}", config_path.display());
            return Self::load_from_path(&config_path);
        }

        tracing::debug!("No .hub.toml found, using defaults");
        Ok(Self::default())
    }

    /// Load from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid hub config {}", path.display()))
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            handshake_timeout: Duration::from_secs(self.sessions.handshake_timeout_secs.max(1)),
            tool_timeout: Duration::from_secs(self.sessions.tool_timeout_secs.max(1)),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let mut config = OrchestratorConfig {
            max_iterations: self.agent.max_iterations.max(1),
            max_tool_result_chars: self.agent.max_tool_result_chars,
            ..Default::default()
        };
        if let Some(prompt) = &self.agent.system_prompt {
            config.system_prompt = prompt.clone();
        }
        config
    }

    /// Provider settings, with the API key read from the configured
    /// environment variable (or the provider's conventional one)
    pub fn provider_settings(&self) -> ProviderSettings {
        let key_env = self
            .llm
            .api_key_env
            .as_deref()
            .or(self.llm.provider.default_api_key_env());

        ProviderSettings {
            kind: self.llm.provider,
            model: self.llm.model.clone(),
            api_key: key_env.and_then(|var| std::env::var(var).ok()),
            base_url: self.llm.url.clone(),
        }
    }
}
