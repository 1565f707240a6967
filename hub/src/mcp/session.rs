//! Session manager
//!
//! Owns the table of live tool-server sessions. The table lock is only held
//! for lookups and structural changes, never across process I/O; a per-name
//! gate orders `connect`/`disconnect` calls that target the same server.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use super::namespace::validate_server_name;
use super::transport::{StdioTransportFactory, ToolTransport, TransportFactory};
use super::types::{
    ConnectResponse, ConnectedServer, DisconnectStatus, ServerSpec, SessionStatus, ToolDescriptor,
    ToolOutput,
};
use crate::error::SessionError;

/// Default bound on spawn + handshake + tool discovery
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on a single tool call
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeouts applied by the session manager
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub handshake_timeout: Duration,
    pub tool_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

/// A live connection to one tool server
pub struct ServerSession {
    pub name: String,
    pub tools: Vec<ToolDescriptor>,
    pub connected_at: DateTime<Utc>,
    pub status: SessionStatus,
    transport: Arc<dyn ToolTransport>,
}

impl std::fmt::Debug for ServerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSession")
            .field("name", &self.name)
            .field("tools", &self.tools.len())
            .field("connected_at", &self.connected_at)
            .field("status", &self.status)
            .finish()
    }
}

/// Table of named sessions
pub struct SessionManager {
    config: SessionConfig,
    factory: Arc<dyn TransportFactory>,
    table: Mutex<HashMap<String, Arc<ServerSession>>>,
    gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl SessionManager {
    /// Create a manager that spawns stdio tool servers
    pub fn new(config: SessionConfig) -> Self {
        Self::with_factory(config, Arc::new(StdioTransportFactory))
    }

    /// Create a manager with a custom transport factory
    pub fn with_factory(config: SessionConfig, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            config,
            factory,
            table: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    async fn gate(&self, name: &str) -> Arc<Mutex<()>> {
        self.gates
            .lock()
            .await
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Drop the gate for `name` once nobody else holds it and no session uses it
    async fn release_gate(&self, name: &str, gate: Arc<Mutex<()>>) {
        drop(gate);
        let mut gates = self.gates.lock().await;
        let idle = gates
            .get(name)
            .is_some_and(|g| Arc::strong_count(g) == 1);
        if idle && !self.table.lock().await.contains_key(name) {
            gates.remove(name);
        }
    }

    /// Connect to a tool server, replacing any existing session with the same name
    pub async fn connect(
        &self,
        name: &str,
        spec: ServerSpec,
    ) -> Result<ConnectResponse, SessionError> {
        validate_server_name(name)?;

        let gate = self.gate(name).await;
        let result = {
            let _guard = gate.lock().await;
            self.connect_gated(name, spec).await
        };
        self.release_gate(name, gate).await;
        result
    }

    async fn connect_gated(
        &self,
        name: &str,
        spec: ServerSpec,
    ) -> Result<ConnectResponse, SessionError> {
        if self.teardown(name).await == DisconnectStatus::Disconnected {
            tracing::info!("Closed previous session for '{}' before reconnecting", name);
        }

        let transport = self.factory.spawn(name, &spec)?;
        let tools = match self.handshake(name, transport.as_ref()).await {
            Ok(tools) => tools,
            Err(e) => {
                if let Err(close_err) = transport.close().await {
                    tracing::warn!("Error closing failed transport for '{}': {}", name, close_err);
                }
                tracing::warn!("Failed to connect to '{}': {}", name, e);
                return Err(e);
            }
        };

        let session = Arc::new(ServerSession {
            name: name.to_string(),
            tools: tools.clone(),
            connected_at: Utc::now(),
            status: SessionStatus::Connected,
            transport,
        });
        self.table.lock().await.insert(name.to_string(), session);

        tracing::info!("Server '{}' connected: {} tools", name, tools.len());
        Ok(ConnectResponse {
            status: SessionStatus::Connected,
            count: tools.len(),
            tools,
        })
    }

    async fn handshake(
        &self,
        name: &str,
        transport: &dyn ToolTransport,
    ) -> Result<Vec<ToolDescriptor>, SessionError> {
        let timeout = self.config.handshake_timeout;
        let timed_out = |operation: &str| SessionError::Timeout {
            server: name.to_string(),
            operation: operation.to_string(),
            timeout,
        };

        tokio::time::timeout(timeout, transport.initialize())
            .await
            .map_err(|_| timed_out("handshake"))??;

        let tools = tokio::time::timeout(timeout, transport.list_tools())
            .await
            .map_err(|_| timed_out("list_tools"))??;

        let mut seen = HashSet::new();
        Ok(tools
            .into_iter()
            .filter(|t| {
                let fresh = seen.insert(t.name.clone());
                if !fresh {
                    tracing::warn!("Server '{}' reported tool '{}' twice", name, t.name);
                }
                fresh
            })
            .map(|mut t| {
                t.server_name = name.to_string();
                t
            })
            .collect())
    }

    /// Disconnect a server. Close errors are logged, never returned.
    pub async fn disconnect(&self, name: &str) -> DisconnectStatus {
        let gate = self.gate(name).await;
        let status = {
            let _guard = gate.lock().await;
            self.teardown(name).await
        };
        self.release_gate(name, gate).await;
        status
    }

    /// Remove the entry, then close its transport outside the table lock
    async fn teardown(&self, name: &str) -> DisconnectStatus {
        let removed = self.table.lock().await.remove(name);

        match removed {
            None => DisconnectStatus::NotConnected,
            Some(session) => {
                if let Err(e) = session.transport.close().await {
                    tracing::warn!("Error closing session '{}': {}", name, e);
                }
                tracing::info!("Server '{}' disconnected", name);
                DisconnectStatus::Disconnected
            }
        }
    }

    /// Call a tool on a connected server
    pub async fn execute_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<ToolOutput, SessionError> {
        let session = self
            .table
            .lock()
            .await
            .get(server)
            .cloned()
            .ok_or_else(|| SessionError::NotConnected(server.to_string()))?;

        let arguments = match arguments {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => {
                return Err(SessionError::SchemaValidation {
                    tool: tool.to_string(),
                    message: format!("arguments must be a JSON object, got {}", other),
                })
            }
        };

        tracing::debug!("Calling '{}' on '{}'", tool, server);
        let timeout = self.config.tool_timeout;
        match tokio::time::timeout(timeout, session.transport.call_tool(tool, arguments)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Tool '{}' on '{}' timed out after {:?}", tool, server, timeout);
                Err(SessionError::Timeout {
                    server: server.to_string(),
                    operation: format!("tool '{}'", tool),
                    timeout,
                })
            }
        }
    }

    /// Connected servers, sorted by name
    pub async fn list_connected(&self) -> Vec<ConnectedServer> {
        let mut servers: Vec<_> = self
            .table
            .lock()
            .await
            .values()
            .map(|s| ConnectedServer {
                name: s.name.clone(),
                tool_count: s.tools.len(),
                connected_at: s.connected_at,
                status: s.status,
            })
            .collect();
        servers.sort_by(|a, b| a.name.cmp(&b.name));
        servers
    }

    /// Every tool snapshot across the table, grouped by server name
    pub async fn get_all_tools(&self) -> Vec<ToolDescriptor> {
        let table = self.table.lock().await;
        let mut names: Vec<_> = table.keys().collect();
        names.sort();
        names
            .into_iter()
            .flat_map(|name| table[name].tools.iter().cloned())
            .collect()
    }

    /// Tool snapshot of one server
    pub async fn tools_for(&self, server: &str) -> Option<Vec<ToolDescriptor>> {
        self.table.lock().await.get(server).map(|s| s.tools.clone())
    }

    pub async fn is_connected(&self, server: &str) -> bool {
        self.table.lock().await.contains_key(server)
    }

    /// Disconnect every session
    pub async fn shutdown(&self) {
        let names: Vec<String> = self.table.lock().await.keys().cloned().collect();
        for name in names {
            self.disconnect(&name).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fake_spec, FakeFactory};
    use serde_json::json;

    fn manager(factory: &Arc<FakeFactory>) -> SessionManager {
        SessionManager::with_factory(
            SessionConfig {
                handshake_timeout: Duration::from_millis(200),
                tool_timeout: Duration::from_millis(200),
            },
            factory.clone(),
        )
    }

    #[tokio::test]
    async fn test_connect_then_disconnect_leaves_table_empty() {
        let factory = FakeFactory::new();
        let sessions = manager(&factory);

        for name in ["fs", "git", "sys-info"] {
            let resp = sessions
                .connect(name, fake_spec(&["read_file", "list"]))
                .await
                .unwrap();
            assert_eq!(resp.status, SessionStatus::Connected);
            assert_eq!(resp.count, 2);
            assert!(resp.tools.iter().all(|t| t.server_name == name));

            assert_eq!(sessions.disconnect(name).await, DisconnectStatus::Disconnected);
            assert!(sessions.list_connected().await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_disconnect_unknown_server() {
        let factory = FakeFactory::new();
        let sessions = manager(&factory);
        assert_eq!(sessions.disconnect("nope").await, DisconnectStatus::NotConnected);
    }

    #[tokio::test]
    async fn test_reconnect_closes_old_transport_once_before_new_is_visible() {
        let factory = FakeFactory::new();
        let sessions = manager(&factory);

        sessions.connect("fs", fake_spec(&["read_file"])).await.unwrap();
        sessions.connect("fs", fake_spec(&["read_file", "list"])).await.unwrap();

        let transports = factory.transports();
        assert_eq!(transports.len(), 2);
        assert_eq!(transports[0].close_count(), 1);
        assert_eq!(transports[1].close_count(), 0);

        let events = factory.events();
        let closed_old = events.iter().position(|e| e == "close:fs#0").unwrap();
        let spawned_new = events.iter().position(|e| e == "spawn:fs#1").unwrap();
        assert!(closed_old < spawned_new, "events: {events:?}");

        let connected = sessions.list_connected().await;
        assert_eq!(connected.len(), 1);
        assert_eq!(connected[0].tool_count, 2);
    }

    #[tokio::test]
    async fn test_invalid_name_rejected_before_spawn() {
        let factory = FakeFactory::new();
        let sessions = manager(&factory);

        let err = sessions.connect("bad__name", fake_spec(&["x"])).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidServerName { .. }));
        assert!(factory.transports().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_table_unmodified() {
        let factory = FakeFactory::new();
        let sessions = manager(&factory);
        sessions.connect("git", fake_spec(&["list"])).await.unwrap();

        let err = sessions
            .connect("fs", ServerSpec::new("missing-binary"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Connection { .. }));

        let names: Vec<_> = sessions.list_connected().await.into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["git"]);
    }

    #[tokio::test]
    async fn test_failed_connects_do_not_accumulate_gates() {
        let factory = FakeFactory::new();
        let sessions = manager(&factory);

        for i in 0..100 {
            let err = sessions
                .connect(&format!("s{}", i), ServerSpec::new("missing-binary"))
                .await
                .unwrap_err();
            assert!(matches!(err, SessionError::Connection { .. }));
        }
        sessions
            .connect("fs", ServerSpec::new("fake-fail-handshake"))
            .await
            .unwrap_err();

        assert_eq!(sessions.gates.lock().await.len(), 0);
    }

    #[tokio::test]
    async fn test_gate_lives_only_as_long_as_the_session() {
        let factory = FakeFactory::new();
        let sessions = manager(&factory);

        sessions.connect("fs", fake_spec(&["read_file"])).await.unwrap();
        assert!(sessions.gates.lock().await.contains_key("fs"));

        sessions.disconnect("fs").await;
        sessions.disconnect("never-connected").await;
        assert_eq!(sessions.gates.lock().await.len(), 0);
    }

    #[tokio::test]
    async fn test_handshake_failure_closes_partial_transport() {
        let factory = FakeFactory::new();
        let sessions = manager(&factory);

        let err = sessions
            .connect("fs", ServerSpec::new("fake-fail-handshake"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Connection { .. }));
        assert_eq!(factory.transports()[0].close_count(), 1);
        assert!(sessions.list_connected().await.is_empty());
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let factory = FakeFactory::new();
        let sessions = manager(&factory);

        let err = sessions
            .connect("slow", ServerSpec::new("fake-hang"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Timeout { .. }), "got {err:?}");
        assert_eq!(factory.transports()[0].close_count(), 1);
        assert!(!sessions.is_connected("slow").await);
    }

    #[tokio::test]
    async fn test_close_failure_still_removes_entry() {
        let factory = FakeFactory::new();
        let sessions = manager(&factory);

        sessions
            .connect("flaky", ServerSpec::new("fake-fail-close").with_args(["list"]))
            .await
            .unwrap();
        assert_eq!(sessions.disconnect("flaky").await, DisconnectStatus::Disconnected);
        assert!(sessions.list_connected().await.is_empty());
    }

    #[tokio::test]
    async fn test_execute_after_disconnect_is_not_connected() {
        let factory = FakeFactory::new();
        let sessions = manager(&factory);
        sessions
            .connect(
                "fs",
                fake_spec(&["read_file"]).with_env("file:/tmp/a.txt", "hello"),
            )
            .await
            .unwrap();

        let out = sessions
            .execute_tool("fs", "read_file", json!({"path": "/tmp/a.txt"}))
            .await
            .unwrap();
        assert_eq!(out.content, "hello");

        sessions.disconnect("fs").await;
        let err = tokio::time::timeout(
            Duration::from_millis(50),
            sessions.execute_tool("fs", "read_file", json!({"path": "/tmp/a.txt"})),
        )
        .await
        .expect("must not block")
        .unwrap_err();
        assert!(matches!(err, SessionError::NotConnected(_)));
    }

    #[tokio::test]
    async fn test_tool_timeout_does_not_affect_other_servers() {
        let factory = FakeFactory::new();
        let sessions = manager(&factory);
        sessions.connect("slow", fake_spec(&["sleep"])).await.unwrap();
        sessions.connect("fast", fake_spec(&["list"])).await.unwrap();

        let (slow, fast) = tokio::join!(
            sessions.execute_tool("slow", "sleep", json!({"ms": 5_000})),
            sessions.execute_tool("fast", "list", json!({})),
        );
        assert!(matches!(slow.unwrap_err(), SessionError::Timeout { .. }));
        assert_eq!(fast.unwrap().content, "fast:list");

        // The timed-out server still answers later calls
        let again = sessions.execute_tool("slow", "sleep", json!({"ms": 1})).await.unwrap();
        assert_eq!(again.content, "slept 1ms");
    }

    #[tokio::test]
    async fn test_disconnect_racing_in_flight_call_fails_with_transport_closed() {
        let factory = FakeFactory::new();
        let sessions = Arc::new(SessionManager::with_factory(
            SessionConfig::default(),
            factory.clone(),
        ));
        sessions.connect("fs", fake_spec(&["block"])).await.unwrap();
        let transport = factory.transports()[0].clone();

        let in_flight = {
            let sessions = sessions.clone();
            tokio::spawn(async move { sessions.execute_tool("fs", "block", json!({})).await })
        };
        transport.wait_for_call().await;

        assert_eq!(sessions.disconnect("fs").await, DisconnectStatus::Disconnected);

        let err = in_flight.await.unwrap().unwrap_err();
        assert!(matches!(err, SessionError::TransportClosed(_)), "got {err:?}");
        assert!(sessions.list_connected().await.is_empty());
    }

    #[tokio::test]
    async fn test_tool_errors_are_structured() {
        let factory = FakeFactory::new();
        let sessions = manager(&factory);
        sessions.connect("fs", fake_spec(&["fail", "strict"])).await.unwrap();

        let err = sessions.execute_tool("fs", "fail", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), "tool_execution_error");

        let err = sessions.execute_tool("fs", "strict", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), "schema_validation_error");

        let err = sessions.execute_tool("fs", "fail", json!([1, 2])).await.unwrap_err();
        assert_eq!(err.kind(), "schema_validation_error");
    }

    #[tokio::test]
    async fn test_get_all_tools_is_grouped_by_server() {
        let factory = FakeFactory::new();
        let sessions = manager(&factory);
        sessions.connect("git", fake_spec(&["list"])).await.unwrap();
        sessions.connect("fs", fake_spec(&["list", "read_file", "list"])).await.unwrap();

        let tools: Vec<_> = sessions
            .get_all_tools()
            .await
            .into_iter()
            .map(|t| format!("{}/{}", t.server_name, t.name))
            .collect();
        assert_eq!(tools, vec!["fs/list", "fs/read_file", "git/list"]);
        assert_eq!(sessions.tools_for("git").await.unwrap().len(), 1);
        assert!(sessions.tools_for("nope").await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_everything() {
        let factory = FakeFactory::new();
        let sessions = manager(&factory);
        sessions.connect("a", fake_spec(&["list"])).await.unwrap();
        sessions.connect("b", fake_spec(&["list"])).await.unwrap();

        sessions.shutdown().await;
        assert!(sessions.list_connected().await.is_empty());
        assert!(factory.transports().iter().all(|t| t.close_count() == 1));
    }
}
