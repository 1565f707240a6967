//! Chat events and the caller-facing stream
//!
//! The chat loop writes [`ChatEvent`]s into an [`EventSink`]; the caller reads
//! them from the paired [`ChatStream`]. The channel is bounded, so tokens are
//! handed over as they arrive instead of piling up. Dropping the stream is how
//! a caller cancels: every later send reports `false` and the loop stops.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// ============================================================================
// Chat Events
// ============================================================================

/// Events emitted while a chat runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Streamed text from the model
    Token { content: String },

    /// The model asked for tools (visibility into the loop)
    Iteration {
        /// Model turn number, starting at 1
        number: usize,
        /// Tool calls requested in this turn
        tool_calls: usize,
    },

    /// Tool execution is starting
    ToolStart {
        /// Namespaced tool id
        name: String,
        arguments: serde_json::Value,
    },

    /// Tool execution completed
    ToolComplete {
        name: String,
        /// Result payload as fed back to the model
        result: String,
        #[serde(with = "duration_millis")]
        duration: Duration,
        is_error: bool,
    },

    /// Final answer fully streamed
    Done {
        iterations: usize,
        #[serde(with = "duration_millis")]
        total_duration: Duration,
    },

    /// The loop ended with an error
    Error { message: String },
}

/// Serialize Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// ============================================================================
// Channel
// ============================================================================

/// Default capacity of the event channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Create a connected sink/stream pair
pub fn chat_channel(capacity: usize) -> (EventSink, ChatStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSink { tx }, ChatStream { rx })
}

/// Writing half, owned by the chat loop
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<ChatEvent>,
}

impl EventSink {
    /// Send an event. Returns `false` once the caller has dropped the stream.
    pub async fn send(&self, event: ChatEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// Whether the caller stopped listening
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub async fn token(&self, content: &str) -> bool {
        self.send(ChatEvent::Token {
            content: content.to_string(),
        })
        .await
    }

    pub async fn iteration(&self, number: usize, tool_calls: usize) -> bool {
        self.send(ChatEvent::Iteration { number, tool_calls }).await
    }

    pub async fn tool_start(&self, name: &str, arguments: &serde_json::Value) -> bool {
        self.send(ChatEvent::ToolStart {
            name: name.to_string(),
            arguments: arguments.clone(),
        })
        .await
    }

    pub async fn tool_complete(
        &self,
        name: &str,
        result: &str,
        duration: Duration,
        is_error: bool,
    ) -> bool {
        self.send(ChatEvent::ToolComplete {
            name: name.to_string(),
            result: result.to_string(),
            duration,
            is_error,
        })
        .await
    }

    pub async fn done(&self, iterations: usize, total_duration: Duration) -> bool {
        self.send(ChatEvent::Done {
            iterations,
            total_duration,
        })
        .await
    }

    pub async fn error(&self, message: &str) -> bool {
        self.send(ChatEvent::Error {
            message: message.to_string(),
        })
        .await
    }
}

/// Reading half, handed to the caller
pub struct ChatStream {
    rx: mpsc::Receiver<ChatEvent>,
}

impl ChatStream {
    /// Next event, or `None` once the loop has finished
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        self.rx.recv().await
    }

    /// Drain the stream, returning the streamed text or the loop's error
    pub async fn collect_text(mut self) -> Result<String, String> {
        let mut text = String::new();
        while let Some(event) = self.next_event().await {
            match event {
                ChatEvent::Token { content } => text.push_str(&content),
                ChatEvent::Error { message } => return Err(message),
                _ => {}
            }
        }
        Ok(text)
    }
}

impl Stream for ChatStream {
    type Item = ChatEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ============================================================================
// Tests
// ============================================================================
