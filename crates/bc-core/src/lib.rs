//! bc-core: Front end and session logic for bridgechat.
//!
//! This crate holds the conversation session, configuration, logging setup,
//! terminal rendering, and the REPL and batch front ends. Exposed as a
//! library for integration testing.

pub mod batch;
pub mod config;
pub mod logging;
pub mod renderer;
pub mod repl;
pub mod session;
pub mod style;

pub use session::{
    spawn_session, ExchangeOutcome, Session, SessionClosed, SessionHandle, SessionObserver,
    SubmitRejection,
};
