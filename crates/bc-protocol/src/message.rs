//! Conversation events and session notifications.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::transcript::Turn;

/// One classified event from the agent's stream.
///
/// The serde representation is the wire format: an object tagged by `type`,
/// e.g. `{"type":"tool_call","tool":"calculator","arguments":{"expr":"2+2"}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConversationEvent {
    /// The agent invoked a tool.
    #[serde(rename = "tool_call")]
    ToolCall {
        #[serde(rename = "tool")]
        tool_name: String,
        #[serde(default)]
        arguments: Value,
    },

    /// A tool returned.
    #[serde(rename = "tool_result")]
    ToolResult {
        #[serde(rename = "tool")]
        tool_name: String,
        #[serde(default)]
        result: Value,
    },

    /// Final (or intermediate) assistant text.
    #[serde(rename = "message")]
    AssistantMessage { content: String },

    /// The backend reported an error inside the stream.
    #[serde(rename = "error")]
    StreamError { content: String },
}

impl ConversationEvent {
    /// Discriminants accepted on the wire.
    pub const KINDS: [&'static str; 4] = ["tool_call", "tool_result", "message", "error"];

    /// The wire discriminant of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::AssistantMessage { .. } => "message",
            Self::StreamError { .. } => "error",
        }
    }
}

/// Whether a session has a request in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    AwaitingResponse,
}

impl SessionStatus {
    pub fn is_busy(self) -> bool {
        self == Self::AwaitingResponse
    }
}

/// Notification delivered to session observers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// A turn was appended at `index`.
    TurnAppended { index: usize, turn: Turn },
    /// The session moved to a new status.
    StatusChanged(SessionStatus),
}
