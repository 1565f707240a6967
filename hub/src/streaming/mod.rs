//! Streaming support for provider responses
//!
//! Providers stream either newline-delimited JSON (Ollama) or server-sent
//! events (OpenAI, Anthropic). Both are line oriented, so a single
//! [`LineStream`] frames the HTTP body and each provider interprets lines.

mod buffer;

pub use buffer::{PartialToolCall, StreamBuffer, StreamUsage};

use futures_util::{Stream, StreamExt};

// ============================================================================
// Line Framing
// ============================================================================

/// Splits a byte stream into lines.
///
/// Bytes are buffered until a newline arrives, so multi-byte characters split
/// across chunks decode correctly.
pub struct LineStream<S> {
    inner: S,
    pending: Vec<u8>,
    finished: bool,
}

impl<S, B, E> LineStream<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            finished: false,
        }
    }

    /// Next line without its terminator, or `None` at end of stream.
    ///
    /// A trailing line without a newline is still returned.
    pub async fn next_line(&mut self) -> Result<Option<String>, E> {
        loop {
            if let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
                let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }

            if self.finished {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                let rest = std::mem::take(&mut self.pending);
                return Ok(Some(String::from_utf8_lossy(&rest).into_owned()));
            }

            match self.inner.next().await {
                Some(chunk) => self.pending.extend_from_slice(chunk?.as_ref()),
                None => self.finished = true,
            }
        }
    }
}

/// Payload of an SSE `data:` line. Other fields (`event:`, `id:`, comments)
/// yield `None`.
pub fn sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?;
    Some(data.strip_prefix(' ').unwrap_or(data))
}

// ============================================================================
// Tests
// ============================================================================
