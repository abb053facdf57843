//! bc-backend: Agent backend client for bridgechat.
//!
//! Decodes the agent's line-framed event stream, classifies each frame into a
//! conversation event, and provides the HTTP transport plus a scripted mock
//! transport for tests.

pub mod classify;
pub mod client;
pub mod error;
pub mod frame;
pub mod mock;
pub mod transport;

pub use classify::{classify, try_classify, ClassifyError};
pub use client::{BridgeClient, ClientOptions, SyncReply};
pub use error::BackendError;
pub use frame::{parse_frame_stream, Frame, FrameDecoder, FrameStream};
pub use mock::{MockConfig, MockResponse, MockTransport};
pub use transport::{ByteStream, ChatTransport};
