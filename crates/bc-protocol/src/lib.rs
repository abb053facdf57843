//! bc-protocol: Shared types for bridgechat.
//!
//! This crate defines the conversation events decoded from the agent's stream,
//! the transcript they fold into, and the wire types shared between the
//! backend client and the front end.

pub mod catalog;
pub mod message;
pub mod transcript;

pub use catalog::{ChatRequest, ToolCatalog, ToolInfo};
pub use message::{ConversationEvent, SessionStatus, SessionUpdate};
pub use serde_json::Value;
pub use transcript::{reduce, Transcript, Turn};
