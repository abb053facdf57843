//! The seam between a session and the network.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::BackendError;

/// Response body of a chat request, as raw chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes, BackendError>>;

/// Something that can carry a chat message to the agent and stream back the reply.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send `message`. Resolves once the response has started with a success
    /// status; the body is then read chunk by chunk.
    async fn open_chat(&self, message: &str) -> Result<ByteStream, BackendError>;
}

#[async_trait]
impl<T: ChatTransport + ?Sized> ChatTransport for Arc<T> {
    async fn open_chat(&self, message: &str) -> Result<ByteStream, BackendError> {
        (**self).open_chat(message).await
    }
}
