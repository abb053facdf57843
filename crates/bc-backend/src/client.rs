//! HTTP client for the agent's bridge API.

use std::time::Duration;

use async_trait::async_trait;
use bc_protocol::{ChatRequest, ConversationEvent, ToolCatalog, ToolInfo};
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::classify::classify_value;
use crate::error::BackendError;
use crate::transport::{ByteStream, ChatTransport};

const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Endpoint layout and timeouts for [`BridgeClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub base_url: String,
    pub chat_path: String,
    pub tools_path: String,
    pub connect_timeout: Duration,
    /// Maximum silence between two body chunks.
    pub read_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_path: "/chat".to_string(),
            tools_path: "/tools".to_string(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(300),
        }
    }
}

/// Reply of the non-streaming chat endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReply {
    /// Final assistant text, empty if the agent never answered.
    pub message: String,
    pub events: Vec<ConversationEvent>,
}

#[derive(Deserialize)]
struct RawSyncReply {
    #[serde(default)]
    message: String,
    #[serde(default)]
    events: Vec<Value>,
}

/// Client for the agent backend.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    options: ClientOptions,
    http: Client,
}

impl BridgeClient {
    /// Create a client for `base_url` with default paths and timeouts.
    pub fn new(base_url: impl Into<String>) -> Result<Self, BackendError> {
        Self::with_options(ClientOptions {
            base_url: base_url.into(),
            ..ClientOptions::default()
        })
    }

    pub fn with_options(mut options: ClientOptions) -> Result<Self, BackendError> {
        let trimmed = options.base_url.trim().trim_end_matches('/').to_string();
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(BackendError::InvalidUrl(options.base_url));
        }
        options.base_url = trimmed;

        let http = Client::builder()
            .connect_timeout(options.connect_timeout)
            .read_timeout(options.read_timeout)
            .pool_max_idle_per_host(2)
            .build()?;

        Ok(Self { options, http })
    }

    pub fn base_url(&self) -> &str {
        &self.options.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.options.base_url)
        } else {
            format!("{}/{path}", self.options.base_url)
        }
    }

    /// Post a chat message and return the streamed response body.
    pub async fn chat_stream(&self, message: &str) -> Result<ByteStream, BackendError> {
        let url = self.url(&self.options.chat_path);
        info!(%url, chars = message.chars().count(), "opening chat stream");

        let response = self
            .http
            .post(&url)
            .header(ACCEPT, "text/event-stream")
            .json(&ChatRequest::new(message))
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(BackendError::from))
            .boxed())
    }

    /// Post a chat message to the non-streaming endpoint.
    pub async fn chat_sync(&self, message: &str) -> Result<SyncReply, BackendError> {
        let url = self.url(&format!("{}/sync", self.options.chat_path.trim_end_matches('/')));
        let response = self
            .http
            .post(&url)
            .json(&ChatRequest::new(message))
            .send()
            .await?;
        let raw: RawSyncReply = check_status(response).await?.json().await?;

        let events = raw
            .events
            .into_iter()
            .filter_map(|value| match classify_value(value) {
                Ok(event) => Some(event),
                Err(err) => {
                    debug!(%err, "dropping unclassifiable event in sync reply");
                    None
                }
            })
            .collect();

        Ok(SyncReply {
            message: raw.message,
            events,
        })
    }

    /// Fetch the tool catalog.
    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>, BackendError> {
        let response = self.http.get(self.url(&self.options.tools_path)).send().await?;
        let catalog: ToolCatalog = check_status(response).await?.json().await?;
        Ok(catalog.tools)
    }

    /// Succeeds if the backend answers its health check with a 2xx status.
    pub async fn health(&self) -> Result<(), BackendError> {
        let response = self.http.get(self.url("/health")).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for BridgeClient {
    async fn open_chat(&self, message: &str) -> Result<ByteStream, BackendError> {
        self.chat_stream(message).await
    }
}

async fn check_status(response: Response) -> Result<Response, BackendError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status {
        status,
        body: body.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::parse_frame_stream;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    fn http_response(status_line: &str, content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Serve one canned response and hand back the raw request.
    async fn serve_once(response: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            request
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn rejects_non_http_url() {
        assert!(matches!(
            BridgeClient::new("localhost:8000"),
            Err(BackendError::InvalidUrl(_))
        ));
    }

    #[test]
    fn trims_trailing_slash() {
        let client = BridgeClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.url("/tools"), "http://localhost:8000/tools");
        assert_eq!(client.url("tools"), "http://localhost:8000/tools");
    }

    #[tokio::test]
    async fn chat_stream_posts_message_and_streams_body() {
        let body = "data: {\"type\":\"message\",\"content\":\"hi\"}\n\ndata: [DONE]\n\n";
        let (base, server) = serve_once(http_response("200 OK", "text/event-stream", body)).await;

        let client = BridgeClient::new(base).unwrap();
        let stream = client.chat_stream("2+2?").await.unwrap();
        let frames: Vec<_> = parse_frame_stream(stream)
            .map(|r| r.unwrap().payload)
            .collect()
            .await;
        assert_eq!(frames, vec![r#"{"type":"message","content":"hi"}"#]);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /chat HTTP/1.1"));
        assert!(request.to_lowercase().contains("accept: text/event-stream"));
        assert!(request.ends_with(r#"{"message":"2+2?"}"#));
    }

    #[tokio::test]
    async fn chat_stream_reports_bad_status() {
        let (base, _server) =
            serve_once(http_response("502 Bad Gateway", "text/plain", "upstream down")).await;

        let client = BridgeClient::new(base).unwrap();
        let err = match client.chat_stream("hi").await {
            Ok(_) => panic!("expected a status error"),
            Err(err) => err,
        };
        assert_eq!(err.to_string(), "server returned 502 Bad Gateway: upstream down");
    }

    #[tokio::test]
    async fn list_tools_parses_catalog() {
        let body = r#"{"tools":[{"name":"calculator","description":"Evaluate arithmetic"}]}"#;
        let (base, server) = serve_once(http_response("200 OK", "application/json", body)).await;

        let tools = BridgeClient::new(base).unwrap().list_tools().await.unwrap();
        assert_eq!(
            tools,
            vec![ToolInfo {
                name: "calculator".to_string(),
                description: "Evaluate arithmetic".to_string(),
            }]
        );
        assert!(server.await.unwrap().starts_with("GET /tools HTTP/1.1"));
    }

    #[tokio::test]
    async fn chat_sync_classifies_events() {
        let body = r#"{"message":"4","events":[{"type":"tool_call","tool":"calculator","arguments":{"expr":"2+2"}},{"type":"ping"},{"type":"message","content":"4"}]}"#;
        let (base, server) = serve_once(http_response("200 OK", "application/json", body)).await;

        let reply = BridgeClient::new(base).unwrap().chat_sync("2+2?").await.unwrap();
        assert_eq!(reply.message, "4");
        assert_eq!(reply.events.len(), 2);
        assert_eq!(reply.events[0].kind(), "tool_call");
        assert!(server.await.unwrap().starts_with("POST /chat/sync HTTP/1.1"));
    }

    #[tokio::test]
    async fn health_checks_status() {
        let (base, _server) =
            serve_once(http_response("200 OK", "application/json", r#"{"status":"ok"}"#)).await;
        BridgeClient::new(base).unwrap().health().await.unwrap();

        let (base, _server) =
            serve_once(http_response("503 Service Unavailable", "text/plain", "")).await;
        assert!(matches!(
            BridgeClient::new(base).unwrap().health().await,
            Err(BackendError::Status { .. })
        ));
    }

    #[tokio::test]
    async fn connection_refused_is_http_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = BridgeClient::new(format!("http://{addr}")).unwrap();
        assert!(matches!(
            client.chat_stream("hi").await,
            Err(BackendError::Http(_))
        ));
    }
}
