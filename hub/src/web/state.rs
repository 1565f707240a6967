//! Shared application state

use std::sync::Arc;

use crate::agent::OrchestratorConfig;
use crate::llm::{Provider, ProviderSettings};
use crate::mcp::session::SessionManager;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Live tool-server sessions
    pub sessions: Arc<SessionManager>,
    /// Provider used when a chat request names none
    pub provider: ProviderSettings,
    pub orchestrator: OrchestratorConfig,
    /// Serve every chat with this client, ignoring per-request provider fields
    pinned_provider: Option<Arc<dyn Provider>>,
}

impl AppState {
    pub fn new(
        sessions: Arc<SessionManager>,
        provider: ProviderSettings,
        orchestrator: OrchestratorConfig,
    ) -> Self {
        Self {
            sessions,
            provider,
            orchestrator,
            pinned_provider: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.pinned_provider = Some(provider);
        self
    }

    pub(crate) fn pinned_provider(&self) -> Option<Arc<dyn Provider>> {
        self.pinned_provider.clone()
    }
}
