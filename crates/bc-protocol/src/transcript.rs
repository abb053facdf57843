//! The append-only conversation transcript and its reducer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::ConversationEvent;

/// One entry in the transcript. Never modified after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Turn {
    User { text: String },
    Assistant { text: String },
    ToolCall { tool_name: String, arguments: Value },
    ToolResult { tool_name: String, result: Value },
    Error { text: String },
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::Error { text: text.into() }
    }

    /// Short name of the variant, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Error { .. } => "error",
        }
    }
}

impl From<ConversationEvent> for Turn {
    fn from(event: ConversationEvent) -> Self {
        match event {
            ConversationEvent::ToolCall {
                tool_name,
                arguments,
            } => Self::ToolCall {
                tool_name,
                arguments,
            },
            ConversationEvent::ToolResult { tool_name, result } => {
                Self::ToolResult { tool_name, result }
            }
            ConversationEvent::AssistantMessage { content } => Self::Assistant { text: content },
            ConversationEvent::StreamError { content } => Self::Error { text: content },
        }
    }
}

/// Ordered record of every turn in a conversation.
///
/// Insertion order is conversation order is rendering order. The only
/// mutations are appends, so a renderer can draw incrementally by index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Turn> {
        self.turns.get(index)
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    /// Fold one event into the transcript, appending exactly one turn.
    pub fn apply(&mut self, event: ConversationEvent) -> &Turn {
        self.append(Turn::from(event))
    }

    pub fn push_user(&mut self, text: impl Into<String>) -> &Turn {
        self.append(Turn::user(text))
    }

    pub fn push_error(&mut self, text: impl Into<String>) -> &Turn {
        self.append(Turn::error(text))
    }

    fn append(&mut self, turn: Turn) -> &Turn {
        let index = self.turns.len();
        self.turns.push(turn);
        &self.turns[index]
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}

/// Pure reducer: the transcript after `event` has been applied.
pub fn reduce(mut transcript: Transcript, event: ConversationEvent) -> Transcript {
    transcript.apply(event);
    transcript
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_events() -> Vec<ConversationEvent> {
        vec![
            ConversationEvent::ToolCall {
                tool_name: "calculator".to_string(),
                arguments: json!({"expr": "2+2"}),
            },
            ConversationEvent::ToolResult {
                tool_name: "calculator".to_string(),
                result: json!(4),
            },
            ConversationEvent::AssistantMessage {
                content: "The answer is 4.".to_string(),
            },
            ConversationEvent::StreamError {
                content: "iteration limit".to_string(),
            },
        ]
    }

    #[test]
    fn each_event_maps_to_one_turn() {
        let transcript = sample_events().into_iter().fold(Transcript::new(), reduce);
        assert_eq!(
            transcript.turns(),
            &[
                Turn::ToolCall {
                    tool_name: "calculator".to_string(),
                    arguments: json!({"expr": "2+2"}),
                },
                Turn::ToolResult {
                    tool_name: "calculator".to_string(),
                    result: json!(4),
                },
                Turn::Assistant {
                    text: "The answer is 4.".to_string()
                },
                Turn::error("iteration limit"),
            ]
        );
    }

    #[test]
    fn reduce_is_append_only() {
        let mut before = Transcript::new();
        before.push_user("hello");
        before.push_error("earlier failure");
        let snapshot = before.clone();

        let events = sample_events();
        let n = events.len();
        let after = events.into_iter().fold(before, reduce);

        assert_eq!(after.len(), snapshot.len() + n);
        assert_eq!(&after.turns()[..snapshot.len()], snapshot.turns());
    }

    #[test]
    fn prefix_survives_every_step() {
        let mut transcript = Transcript::new();
        transcript.push_user("2+2?");
        let mut seen: Vec<Turn> = transcript.turns().to_vec();

        for event in sample_events() {
            let appended = transcript.apply(event).clone();
            assert_eq!(&transcript.turns()[..seen.len()], seen.as_slice());
            seen.push(appended);
            assert_eq!(transcript.len(), seen.len());
        }
    }

    #[test]
    fn apply_returns_appended_turn() {
        let mut transcript = Transcript::new();
        let turn = transcript
            .apply(ConversationEvent::AssistantMessage {
                content: "hi".to_string(),
            })
            .clone();
        assert_eq!(transcript.last(), Some(&turn));
        assert_eq!(turn.kind(), "assistant");
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let mut transcript = Transcript::new();
        transcript.push_user("a");
        transcript.push_user("b");
        let texts: Vec<&str> = transcript
            .iter()
            .filter_map(|t| match t {
                Turn::User { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["a", "b"]);
        assert_eq!((&transcript).into_iter().count(), 2);
    }

    #[test]
    fn turn_serialization_is_tagged() {
        let json = serde_json::to_value(Turn::user("hi")).unwrap();
        assert_eq!(json, json!({"type": "user", "text": "hi"}));
    }
}
