//! Mock transport for testing.
//!
//! Produces the same raw body chunks the real backend would send, so tests at
//! every layer exercise the real frame decoder and classifier instead of
//! skipping past them.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use bc_protocol::ConversationEvent;
use bytes::Bytes;
use reqwest::StatusCode;
use tokio::time::sleep;

use crate::error::BackendError;
use crate::frame::{DATA_PREFIX, DONE_MARKER};
use crate::transport::{ByteStream, ChatTransport};

/// One scripted step of a mock response body.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Emit raw bytes as one chunk.
    Chunk { bytes: Bytes },
    /// Emit one complete `data:` line carrying the event.
    Event { event: ConversationEvent },
    /// Emit the end marker.
    Done,
    /// Fail the body mid-read.
    Fail { message: String },
    /// Delay before next step (for timing tests).
    Delay { ms: u64 },
}

impl MockResponse {
    pub fn chunk(text: impl Into<String>) -> Self {
        Self::Chunk {
            bytes: Bytes::from(text.into()),
        }
    }

    pub fn event(event: ConversationEvent) -> Self {
        Self::Event { event }
    }
}

/// Script for one mock request.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Sequence of body steps.
    pub responses: Vec<MockResponse>,
    /// Reject the request with this status and body before any chunk.
    pub refuse: Option<(u16, String)>,
}

impl MockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(mut self, responses: Vec<MockResponse>) -> Self {
        self.responses = responses;
        self
    }

    pub fn refuse_with_status(mut self, status: u16, body: impl Into<String>) -> Self {
        self.refuse = Some((status, body.into()));
        self
    }
}

/// Render a response script into the bytes it would produce, ignoring
/// delays and failures.
pub fn render_body(responses: &[MockResponse]) -> Vec<u8> {
    let mut body = Vec::new();
    for response in responses {
        match response {
            MockResponse::Chunk { bytes } => body.extend_from_slice(bytes),
            MockResponse::Event { event } => body.extend_from_slice(&event_line(event)),
            MockResponse::Done => body.extend_from_slice(&done_line()),
            MockResponse::Fail { .. } | MockResponse::Delay { .. } => {}
        }
    }
    body
}

fn event_line(event: &ConversationEvent) -> Bytes {
    // Serializing a ConversationEvent cannot fail: every field is a String or a Value.
    let json = serde_json::to_string(event).unwrap_or_default();
    Bytes::from(format!("{DATA_PREFIX}{json}\n\n"))
}

fn done_line() -> Bytes {
    Bytes::from(format!("{DATA_PREFIX}{DONE_MARKER}\n\n"))
}

/// Create a response body stream from a mock config.
pub fn mock_body(config: MockConfig) -> ByteStream {
    Box::pin(stream! {
        for response in config.responses {
            match response {
                MockResponse::Chunk { bytes } => {
                    yield Ok(bytes);
                }
                MockResponse::Event { event } => {
                    yield Ok(event_line(&event));
                }
                MockResponse::Done => {
                    yield Ok(done_line());
                }
                MockResponse::Fail { message } => {
                    yield Err(BackendError::Stream(message));
                    return;
                }
                MockResponse::Delay { ms } => {
                    sleep(Duration::from_millis(ms)).await;
                }
            }
        }
    })
}

/// Transport that replays one [`MockConfig`] per request and records every
/// message it was asked to send.
#[derive(Debug, Default)]
pub struct MockTransport {
    scripts: Mutex<VecDeque<MockConfig>>,
    requests: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new(scripts: impl IntoIterator<Item = MockConfig>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Messages sent so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn open_chat(&self, message: &str) -> Result<ByteStream, BackendError> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message.to_string());

        // An exhausted script answers with an empty body.
        let config = self
            .scripts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .unwrap_or_default();

        if let Some((status, body)) = config.refuse {
            return Err(BackendError::Status {
                status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                body,
            });
        }

        Ok(mock_body(config))
    }
}

/// Built-in test fixtures for common scenarios.
pub mod fixtures {
    use super::*;
    use serde_json::json;

    pub fn tool_call(tool: &str, arguments: serde_json::Value) -> MockResponse {
        MockResponse::event(ConversationEvent::ToolCall {
            tool_name: tool.to_string(),
            arguments,
        })
    }

    pub fn tool_result(tool: &str, result: serde_json::Value) -> MockResponse {
        MockResponse::event(ConversationEvent::ToolResult {
            tool_name: tool.to_string(),
            result,
        })
    }

    pub fn message(content: &str) -> MockResponse {
        MockResponse::event(ConversationEvent::AssistantMessage {
            content: content.to_string(),
        })
    }

    /// Calculator round trip: tool call, tool result, answer, end marker.
    pub fn calculator_exchange() -> MockConfig {
        MockConfig::new().with_responses(vec![
            tool_call("calculator", json!({"expr": "2+2"})),
            tool_result("calculator", json!(4)),
            message("The answer is 4."),
            MockResponse::Done,
        ])
    }

    /// A plain text answer.
    pub fn text_reply(content: &str) -> MockConfig {
        MockConfig::new().with_responses(vec![message(content), MockResponse::Done])
    }

    /// The same body as `config`, re-cut into chunks of `size` bytes.
    pub fn rechunked(config: &MockConfig, size: usize) -> MockConfig {
        let body = render_body(&config.responses);
        let responses = body
            .chunks(size.max(1))
            .map(|c| MockResponse::Chunk {
                bytes: Bytes::copy_from_slice(c),
            })
            .collect();
        MockConfig::new().with_responses(responses)
    }

    /// Body that fails before any frame arrives.
    pub fn fails_immediately(message: &str) -> MockConfig {
        MockConfig::new().with_responses(vec![MockResponse::Fail {
            message: message.to_string(),
        }])
    }

    /// A reply that stalls for `ms` before answering.
    pub fn slow_reply(ms: u64, content: &str) -> MockConfig {
        MockConfig::new().with_responses(vec![
            MockResponse::Delay { ms },
            message(content),
            MockResponse::Done,
        ])
    }
}
