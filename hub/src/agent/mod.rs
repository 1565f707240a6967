//! Agent module - the agentic chat loop
//!
//! This implements the tool-using loop:
//! 1. The caller sends a message
//! 2. The provider receives the history along with the namespaced tools
//! 3. The model either answers (streamed to the caller) or requests tools
//! 4. Requested tools run through the session manager and their results are
//!    appended to the history
//! 5. The loop continues until the model answers, the iteration cap is hit,
//!    the provider fails, or the caller goes away

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::error::{ChatError, SessionError};
use crate::llm::Provider;
use crate::mcp::namespace::ToolCatalog;
use crate::mcp::session::SessionManager;

pub mod events;
pub mod types;
mod validate;

pub use events::{chat_channel, ChatEvent, ChatStream, EventSink, DEFAULT_CHANNEL_CAPACITY};
pub use types::{
    ConversationMessage, ModelReply, Role, ToolCallRequest, ToolCallResult, ToolCallStatus,
};
pub use validate::validate_arguments;

/// Default maximum number of model turns per chat
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Default cap on a tool result fed back to the model, in bytes
pub const DEFAULT_MAX_TOOL_RESULT_CHARS: usize = 16 * 1024;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant with access to tools. \
Tool names have the form server__tool. Use a tool when it helps answer the request, \
then answer the user directly.";

/// Chat loop settings
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub system_prompt: String,
    pub max_iterations: usize,
    pub max_tool_result_chars: usize,
    pub channel_capacity: usize,
    /// Restrict declared tools to these servers (empty = all)
    pub servers: Vec<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_tool_result_chars: DEFAULT_MAX_TOOL_RESULT_CHARS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            servers: Vec::new(),
        }
    }
}

/// Outcome of a finished (or cancelled) chat
#[derive(Debug, Clone)]
pub struct ChatSummary {
    /// Model turns taken
    pub iterations: usize,
    /// Tool calls executed
    pub tool_calls: usize,
    pub final_text: String,
    /// True when the caller closed the stream before the answer completed
    pub cancelled: bool,
    /// Full history, so a caller can resume with another user message
    pub history: Vec<ConversationMessage>,
}

/// States of the chat loop
#[derive(Debug)]
enum LoopState {
    AwaitingModel,
    ModelText(String),
    ModelToolUse {
        text: String,
        calls: Vec<ToolCallRequest>,
    },
    ExecutingTools(Vec<ToolCallRequest>),
    Done,
    Cancelled,
    Error(ChatError),
}

/// Drives conversations between a provider and the connected tool servers
#[derive(Clone)]
pub struct Orchestrator {
    sessions: Arc<SessionManager>,
    provider: Arc<dyn Provider>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        sessions: Arc<SessionManager>,
        provider: Arc<dyn Provider>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            sessions,
            provider,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Start a chat on the runtime and return its event stream.
    ///
    /// Dropping the stream cancels the chat.
    pub fn chat(&self, message: impl Into<String>) -> ChatStream {
        let (sink, stream) = chat_channel(self.config.channel_capacity);
        let this = self.clone();
        let message = message.into();

        tokio::spawn(async move {
            if let Err(e) = this.run(&message, &sink).await {
                tracing::warn!("Chat ended with error: {}", e);
            }
        });

        stream
    }

    /// Run a chat seeded with the system prompt and `message`
    pub async fn run(&self, message: &str, sink: &EventSink) -> Result<ChatSummary, ChatError> {
        let history = vec![
            ConversationMessage::system(&self.config.system_prompt),
            ConversationMessage::user(message),
        ];
        self.run_conversation(history, sink).await
    }

    /// Run the loop over an existing history ending in a user message
    pub async fn run_conversation(
        &self,
        mut history: Vec<ConversationMessage>,
        sink: &EventSink,
    ) -> Result<ChatSummary, ChatError> {
        let started = Instant::now();

        let mut tools = self.sessions.get_all_tools().await;
        if !self.config.servers.is_empty() {
            tools.retain(|t| self.config.servers.contains(&t.server_name));
        }
        let catalog = ToolCatalog::build(&tools);
        let declarations = catalog.declarations(self.provider.tool_format());
        tracing::debug!(
            provider = self.provider.name(),
            tools = catalog.len(),
            "Starting chat loop"
        );

        let mut iterations = 0;
        let mut tool_calls = 0;
        let mut final_text = String::new();
        let mut state = LoopState::AwaitingModel;

        loop {
            if sink.is_closed() && !matches!(state, LoopState::Done | LoopState::Error(_)) {
                state = LoopState::Cancelled;
            }

            state = match state {
                LoopState::AwaitingModel => {
                    if iterations >= self.config.max_iterations {
                        tracing::warn!(
                            "Agent reached max iterations ({}), stopping",
                            self.config.max_iterations
                        );
                        LoopState::Error(ChatError::IterationLimit {
                            limit: self.config.max_iterations,
                        })
                    } else {
                        iterations += 1;
                        tracing::debug!("Agent iteration {}", iterations);
                        match self.provider.send(&history, &declarations, sink).await {
                            Ok(ModelReply::Text(text)) => LoopState::ModelText(text),
                            Ok(ModelReply::ToolUse { text, calls }) => {
                                LoopState::ModelToolUse { text, calls }
                            }
                            Err(e) => LoopState::Error(e.into()),
                        }
                    }
                }

                LoopState::ModelText(text) => {
                    history.push(ConversationMessage::assistant(&text));
                    final_text = text;
                    LoopState::Done
                }

                LoopState::ModelToolUse { text, calls } => {
                    tracing::info!("Agent making {} tool call(s)", calls.len());
                    sink.iteration(iterations, calls.len()).await;
                    history.push(ConversationMessage::assistant_tool_use(text, calls.clone()));
                    LoopState::ExecutingTools(calls)
                }

                LoopState::ExecutingTools(calls) => {
                    // Every requested call gets a result so the history stays resumable
                    for call in &calls {
                        let result = if sink.is_closed() {
                            ToolCallResult::cancelled(call)
                        } else {
                            tool_calls += 1;
                            self.execute_call(&catalog, call, sink).await
                        };
                        history.push(ConversationMessage::tool_result(&result));
                    }
                    LoopState::AwaitingModel
                }

                LoopState::Done => {
                    sink.done(iterations, started.elapsed()).await;
                    return Ok(ChatSummary {
                        iterations,
                        tool_calls,
                        final_text,
                        cancelled: false,
                        history,
                    });
                }

                LoopState::Cancelled => {
                    tracing::info!("Chat cancelled by caller after {} iteration(s)", iterations);
                    return Ok(ChatSummary {
                        iterations,
                        tool_calls,
                        final_text,
                        cancelled: true,
                        history,
                    });
                }

                LoopState::Error(e) => {
                    sink.error(&e.to_string()).await;
                    return Err(e);
                }
            };
        }
    }

    /// Resolve, validate and execute one call. Failures become error results.
    async fn execute_call(
        &self,
        catalog: &ToolCatalog,
        call: &ToolCallRequest,
        sink: &EventSink,
    ) -> ToolCallResult {
        sink.tool_start(&call.name, &call.arguments).await;
        let started = Instant::now();

        let outcome = match catalog.resolve(&call.name) {
            None => Err(format!(
                "unknown_tool: '{}' is not available. Available tools: {}",
                call.name,
                catalog.names().collect::<Vec<_>>().join(", ")
            )),
            Some(tool) => {
                let arguments = match &call.arguments {
                    Value::Null => Value::Object(Default::default()),
                    other => other.clone(),
                };
                let result = match validate_arguments(&tool.input_schema, &arguments) {
                    Ok(()) => self
                        .sessions
                        .execute_tool(&tool.server_name, &tool.tool_name, arguments)
                        .await
                        .map(|output| output.content),
                    Err(message) => Err(SessionError::SchemaValidation {
                        tool: call.name.clone(),
                        message,
                    }),
                };
                result.map_err(|e| format!("{}: {}", e.kind(), e))
            }
        };

        let (status, payload) = match outcome {
            Ok(content) => (
                ToolCallStatus::Success,
                truncate_result(content, self.config.max_tool_result_chars),
            ),
            Err(message) => (ToolCallStatus::Error, message),
        };
        let elapsed = started.elapsed();
        tracing::debug!(
            "Tool '{}' finished in {:?} ({:?})",
            call.name,
            elapsed,
            status
        );

        let result = ToolCallResult {
            id: call.id.clone(),
            name: call.name.clone(),
            status,
            payload,
        };
        sink.tool_complete(&result.name, &result.payload, elapsed, result.is_error())
            .await;
        result
    }
}

/// Cut `content` to at most `max` bytes on a char boundary
fn truncate_result(mut content: String, max: usize) -> String {
    if content.len() <= max {
        return content;
    }
    let mut cut = max;
    while !content.is_char_boundary(cut) {
        cut -= 1;
    }
    let dropped = content.len() - cut;
    content.truncate(cut);
    content.push_str(&format!("\n... [truncated {} bytes]", dropped));
    content
}
