//! End-to-end session tests.
//!
//! These drive a spawned session through the scripted mock transport and
//! through the real HTTP client against a throwaway local server.

use std::time::Duration;

use bc_backend::mock::fixtures;
use bc_backend::{BridgeClient, MockTransport};
use bc_core::{spawn_session, ExchangeOutcome, SessionHandle, SubmitRejection};
use bc_protocol::{SessionStatus, SessionUpdate, Transcript, Turn};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

fn kinds(transcript: &Transcript) -> Vec<&'static str> {
    transcript.iter().map(Turn::kind).collect()
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

/// Answer one request with `status_line`, then write `pieces` of the body
/// with a pause between each, and close.
async fn serve_pieces(
    status_line: &str,
    pieces: Vec<&'static str>,
) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let head = format!(
        "HTTP/1.1 {status_line}\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n"
    );
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        socket.write_all(head.as_bytes()).await.unwrap();
        for piece in pieces {
            socket.write_all(piece.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let _ = socket.shutdown().await;
        request
    });
    (format!("http://{addr}"), handle)
}

#[tokio::test]
async fn calculator_exchange_through_spawned_session() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = spawn_session(MockTransport::new([fixtures::calculator_exchange()]), tx);

    let outcome = handle.request("2+2?").await.unwrap().unwrap();
    assert_eq!(
        outcome,
        ExchangeOutcome::Completed {
            events: 3,
            dropped: 0
        }
    );
    assert_eq!(handle.status(), SessionStatus::Idle);

    let transcript = handle.shutdown().await.unwrap();
    assert_eq!(
        kinds(&transcript),
        ["user", "tool_call", "tool_result", "assistant"]
    );

    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    assert_eq!(
        updates.first(),
        Some(&SessionUpdate::StatusChanged(SessionStatus::AwaitingResponse))
    );
    assert_eq!(
        updates.last(),
        Some(&SessionUpdate::StatusChanged(SessionStatus::Idle))
    );
    let indices: Vec<usize> = updates
        .iter()
        .filter_map(|u| match u {
            SessionUpdate::TurnAppended { index, .. } => Some(*index),
            SessionUpdate::StatusChanged(_) => None,
        })
        .collect();
    assert_eq!(indices, [0, 1, 2, 3]);
}

#[tokio::test]
async fn http_stream_split_across_writes() {
    let (base, server) = serve_pieces(
        "200 OK",
        vec![
            "data: {\"type\":\"tool_call\",\"tool\":\"calcu",
            "lator\",\"arguments\":{\"expr\":\"2+2\"}}\n\ndata: {\"type\":\"tool_result\",",
            "\"tool\":\"calculator\",\"result\":4}\n\ndata: {\"type\":\"ping\"}\n\n",
            "data: {\"type\":\"message\",\"content\":\"The answer is 4.\"}\n\n",
            "data: [DONE]\n\n",
        ],
    )
    .await;

    let handle = spawn_session(BridgeClient::new(base).unwrap(), ());
    let outcome = handle.request("2+2?").await.unwrap().unwrap();
    assert_eq!(
        outcome,
        ExchangeOutcome::Completed {
            events: 3,
            dropped: 1
        }
    );

    let transcript = handle.shutdown().await.unwrap();
    assert_eq!(
        transcript.turns(),
        &[
            Turn::user("2+2?"),
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
        ]
    );

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /chat HTTP/1.1"));
    assert!(request.ends_with(r#"{"message":"2+2?"}"#));
}

#[tokio::test]
async fn server_error_status_becomes_error_turn() {
    let (base, _server) = serve_pieces("500 Internal Server Error", vec!["no API key"]).await;

    let handle = spawn_session(BridgeClient::new(base).unwrap(), ());
    let outcome = handle.request("hi").await.unwrap().unwrap();
    assert!(matches!(outcome, ExchangeOutcome::Failed { .. }));

    let transcript = handle.shutdown().await.unwrap();
    assert_eq!(
        transcript.turns(),
        &[
            Turn::user("hi"),
            Turn::error("request failed: server returned 500 Internal Server Error: no API key"),
        ]
    );
}

#[tokio::test]
async fn unreachable_backend_becomes_error_turn() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let handle = spawn_session(BridgeClient::new(format!("http://{addr}")).unwrap(), ());
    handle.request("hi").await.unwrap().unwrap();
    assert_eq!(handle.status(), SessionStatus::Idle);

    let transcript = handle.shutdown().await.unwrap();
    assert_eq!(kinds(&transcript), ["user", "error"]);
    match transcript.last() {
        Some(Turn::Error { text }) => assert!(text.starts_with("request failed: ")),
        other => panic!("expected an error turn, got {other:?}"),
    }
}

#[tokio::test]
async fn second_submission_while_streaming_is_ignored() {
    let handle = spawn_session(MockTransport::new([fixtures::slow_reply(200, "done")]), ());

    let first = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.request("first").await })
    };
    tokio::time::timeout(Duration::from_secs(2), wait_busy(&handle))
        .await
        .unwrap();

    assert_eq!(
        handle.request("second").await.unwrap(),
        Err(SubmitRejection::Busy)
    );
    first.await.unwrap().unwrap().unwrap();

    let transcript = handle.shutdown().await.unwrap();
    assert_eq!(kinds(&transcript), ["user", "assistant"]);
}

async fn wait_busy(handle: &SessionHandle) {
    while !handle.status().is_busy() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
