//! Maps frame payloads to typed conversation events.
//!
//! Malformed payloads are dropped rather than escalated: one bad frame must
//! never end the stream.

use bc_protocol::ConversationEvent;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("payload has no \"type\" field")]
    MissingKind,
    #[error("unknown event type {0:?}")]
    UnknownKind(String),
}

/// Classify a payload, reporting why it was rejected.
pub fn try_classify(payload: &str) -> Result<ConversationEvent, ClassifyError> {
    let value: Value = serde_json::from_str(payload)?;
    classify_value(value)
}

/// Classify an already-parsed value.
pub fn classify_value(value: Value) -> Result<ConversationEvent, ClassifyError> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ClassifyError::MissingKind)?;

    if !ConversationEvent::KINDS.contains(&kind) {
        return Err(ClassifyError::UnknownKind(kind.to_string()));
    }

    Ok(serde_json::from_value(value)?)
}

/// Classify a payload, dropping anything that is not a known event.
pub fn classify(payload: &str) -> Option<ConversationEvent> {
    match try_classify(payload) {
        Ok(event) => Some(event),
        Err(err) => {
            debug!(%err, payload, "dropping unclassifiable frame");
            None
        }
    }
}
