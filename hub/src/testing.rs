//! In-process fakes for transports and providers

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rmcp::model::JsonObject;
use serde_json::{json, Value};
use tokio::sync::{watch, Notify};

use crate::agent::events::EventSink;
use crate::agent::types::{ConversationMessage, ModelReply};
use crate::error::{ProviderError, SessionError};
use crate::llm::Provider;
use crate::mcp::namespace::ToolFormat;
use crate::mcp::transport::{ToolTransport, TransportFactory};
use crate::mcp::types::{ServerSpec, ToolDescriptor, ToolOutput};

/// Spec for a well-behaved fake server exposing the given tools
pub fn fake_spec(tools: &[&str]) -> ServerSpec {
    ServerSpec::new("fake").with_args(tools.iter().copied())
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Handshake {
    Ok,
    Fail,
    Hang,
}

/// Fake transport. Tool behaviour is chosen by tool name:
///
/// - `read_file`: returns `env["file:{path}"]`
/// - `list`: returns `{server}:list`
/// - `sleep`: sleeps `ms` milliseconds
/// - `block`: waits until the transport is closed
/// - `fail`: reports a tool error
/// - `strict`: rejects its arguments
/// - anything else: echoes its arguments
pub struct FakeTransport {
    id: usize,
    server: String,
    tools: Vec<String>,
    files: HashMap<String, String>,
    handshake: Handshake,
    fail_close: bool,
    closed: watch::Sender<bool>,
    close_count: AtomicUsize,
    call_started: Notify,
    events: Arc<Mutex<Vec<String>>>,
}

impl FakeTransport {
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    /// Resolves once a `block` call is in flight
    pub async fn wait_for_call(&self) {
        self.call_started.notified().await;
    }

    fn closed_err(&self) -> SessionError {
        SessionError::TransportClosed(self.server.clone())
    }
}

#[async_trait]
impl ToolTransport for FakeTransport {
    async fn initialize(&self) -> Result<(), SessionError> {
        match self.handshake {
            Handshake::Ok => Ok(()),
            Handshake::Fail => Err(SessionError::Connection {
                server: self.server.clone(),
                message: "handshake failed: connection closed".into(),
            }),
            Handshake::Hang => std::future::pending().await,
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, SessionError> {
        Ok(self
            .tools
            .iter()
            .map(|name| ToolDescriptor {
                server_name: self.server.clone(),
                name: name.clone(),
                description: Some(format!("{} tool", name)),
                input_schema: Some(json!({
                    "type": "object",
                    "properties": {"path": {"type": "string"}, "ms": {"type": "integer"}}
                })),
            })
            .collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<ToolOutput, SessionError> {
        if *self.closed.borrow() {
            return Err(self.closed_err());
        }
        let args = arguments.unwrap_or_default();

        match name {
            "read_file" => {
                let path = args.get("path").and_then(Value::as_str).unwrap_or_default();
                self.files
                    .get(&format!("file:{}", path))
                    .map(|c| ToolOutput::text(c.clone()))
                    .ok_or_else(|| SessionError::ToolExecution {
                        tool: name.into(),
                        message: format!("no such file: {}", path),
                    })
            }
            "list" => Ok(ToolOutput::text(format!("{}:list", self.server))),
            "sleep" => {
                let ms = args.get("ms").and_then(Value::as_u64).unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(ToolOutput::text(format!("slept {}ms", ms)))
            }
            "block" => {
                let mut rx = self.closed.subscribe();
                self.call_started.notify_one();
                let _ = rx.wait_for(|closed| *closed).await;
                Err(self.closed_err())
            }
            "fail" => Err(SessionError::ToolExecution {
                tool: name.into(),
                message: "boom".into(),
            }),
            "strict" => Err(SessionError::SchemaValidation {
                tool: name.into(),
                message: "missing field `path`".into(),
            }),
            _ => Ok(ToolOutput::text(Value::Object(args).to_string())),
        }
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .push(format!("close:{}#{}", self.server, self.id));
        self.closed.send_replace(true);
        if self.fail_close {
            return Err(self.closed_err());
        }
        Ok(())
    }
}

/// Factory producing [`FakeTransport`]s. The server command picks the mode:
/// `fake`, `fake-fail-handshake`, `fake-hang`, `fake-fail-close`; anything
/// else fails to spawn.
#[derive(Default)]
pub struct FakeFactory {
    spawned: Mutex<Vec<Arc<FakeTransport>>>,
    events: Arc<Mutex<Vec<String>>>,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn transports(&self) -> Vec<Arc<FakeTransport>> {
        self.spawned.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl TransportFactory for FakeFactory {
    fn spawn(
        &self,
        server_name: &str,
        spec: &ServerSpec,
    ) -> Result<Arc<dyn ToolTransport>, SessionError> {
        let (handshake, fail_close) = match spec.command.as_str() {
            "fake" => (Handshake::Ok, false),
            "fake-fail-handshake" => (Handshake::Fail, false),
            "fake-hang" => (Handshake::Hang, false),
            "fake-fail-close" => (Handshake::Ok, true),
            other => {
                return Err(SessionError::Connection {
                    server: server_name.to_string(),
                    message: format!("failed to spawn '{}': not found", other),
                })
            }
        };

        let mut spawned = self.spawned.lock().unwrap();
        let id = spawned
            .iter()
            .filter(|t| t.server == server_name)
            .count();
        self.events
            .lock()
            .unwrap()
            .push(format!("spawn:{}#{}", server_name, id));

        let transport = Arc::new(FakeTransport {
            id,
            server: server_name.to_string(),
            tools: spec.args.clone(),
            files: spec.env.clone(),
            handshake,
            fail_close,
            closed: watch::channel(false).0,
            close_count: AtomicUsize::new(0),
            call_started: Notify::new(),
            events: self.events.clone(),
        });
        spawned.push(transport.clone());
        Ok(transport)
    }
}

/// Provider that replays a fixed script of replies
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<ModelReply, ProviderError>>>,
    /// Reply used once the script runs out
    fallback: Option<ModelReply>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<ConversationMessage>>>,
    tool_names: Mutex<Vec<Vec<String>>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<ModelReply, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            tool_names: Mutex::new(Vec::new()),
        })
    }

    /// Provider that answers every turn with the same reply
    pub fn always(reply: ModelReply) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Some(reply),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            tool_names: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// History sent on each turn
    pub fn histories(&self) -> Vec<Vec<ConversationMessage>> {
        self.seen.lock().unwrap().clone()
    }

    /// Tool names declared on each turn
    pub fn declared_tools(&self) -> Vec<Vec<String>> {
        self.tool_names.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn tool_format(&self) -> ToolFormat {
        ToolFormat::OpenAi
    }

    async fn send(
        &self,
        history: &[ConversationMessage],
        tools: &[Value],
        sink: &EventSink,
    ) -> Result<ModelReply, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(history.to_vec());
        self.tool_names.lock().unwrap().push(
            tools
                .iter()
                .filter_map(|t| t["function"]["name"].as_str().map(String::from))
                .collect(),
        );

        let next = self.replies.lock().unwrap().pop_front();
        let reply = match next {
            Some(reply) => reply?,
            None => self.fallback.clone().unwrap_or_else(|| ModelReply::text("")),
        };

        // Stream text word by word, like a real provider would
        if let ModelReply::Text(text) = &reply {
            for (i, word) in text.split(' ').enumerate() {
                let chunk = if i == 0 { word.to_string() } else { format!(" {}", word) };
                if !sink.token(&chunk).await {
                    break;
                }
            }
        }
        Ok(reply)
    }
}
