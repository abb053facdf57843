//! Non-interactive batch mode.
//!
//! Send one message, print the agent's reply to stdout, and exit. Tool
//! activity and errors go to stderr so the reply can be piped on.

use std::io::{IsTerminal, Write};
use std::time::Instant;

use bc_backend::{BackendError, BridgeClient, ChatTransport, SyncReply};
use bc_protocol::{reduce, SessionUpdate, Transcript, Turn, Value};
use tracing::info;

use crate::config::Config;
use crate::session::{ExchangeOutcome, Session, SessionObserver, SubmitRejection};
use crate::style::{ellipsize, Style};

const PREFIX: &str = "[bc:batch]";

/// Encapsulates all output for batch mode.
///
/// Assistant text goes to `out`; everything else is a prefixed progress line
/// on `err`.
pub struct BatchOutput<W: Write, E: Write> {
    out: W,
    err: E,
    style: Style,
    start_time: Instant,
    line_width: usize,
    tool_calls: usize,
}

impl<W: Write, E: Write> BatchOutput<W, E> {
    pub fn new(out: W, err: E, style: Style, line_width: usize) -> Self {
        Self {
            out,
            err,
            style,
            start_time: Instant::now(),
            line_width,
            tool_calls: 0,
        }
    }

    fn prefix(&self) -> String {
        format!("{}{PREFIX}{}", self.style.dim_start(), self.style.reset())
    }

    /// Compact one-line rendering of a tool payload, cut to the line width.
    fn summarize(&self, value: &Value) -> String {
        let text = match value {
            Value::String(s) => s.replace('\n', " "),
            other => other.to_string(),
        };
        let room = self.line_width.saturating_sub(PREFIX.len() + 4);
        ellipsize(&text, room)
    }

    pub fn emit_start(&mut self, message: &str) {
        let summary = ellipsize(message, 60);
        let _ = writeln!(self.err, "{} --- \"{summary}\"", self.prefix());
    }

    pub fn emit_turn(&mut self, turn: &Turn) {
        let s = self.style;
        match turn {
            Turn::User { .. } => {}
            Turn::ToolCall {
                tool_name,
                arguments,
            } => {
                self.tool_calls += 1;
                let args = if arguments.is_null() {
                    String::new()
                } else {
                    format!(" {}", self.summarize(arguments))
                };
                let _ = writeln!(
                    self.err,
                    "{} {}{tool_name}{}{args}",
                    self.prefix(),
                    s.yellow_start(),
                    s.reset()
                );
            }
            Turn::ToolResult { tool_name, result } => {
                let _ = writeln!(
                    self.err,
                    "{} {}{tool_name} ->{} {}",
                    self.prefix(),
                    s.green_start(),
                    s.reset(),
                    self.summarize(result)
                );
            }
            Turn::Assistant { text } => {
                let _ = writeln!(self.out, "{text}");
                let _ = self.out.flush();
            }
            Turn::Error { text } => {
                let _ = writeln!(
                    self.err,
                    "{} {}error: {text}{}",
                    self.prefix(),
                    s.red_start(),
                    s.reset()
                );
            }
        }
    }

    /// A submission refused before any request was made.
    pub fn emit_rejection(&mut self, rejection: &SubmitRejection) {
        let _ = writeln!(
            self.err,
            "{} {}error: {rejection}{}",
            self.prefix(),
            self.style.red_start(),
            self.style.reset()
        );
    }

    pub fn emit_done(&mut self) {
        let elapsed = self.start_time.elapsed().as_secs();
        let _ = writeln!(
            self.err,
            "{} --- done ({elapsed}s, {} tool calls)",
            self.prefix(),
            self.tool_calls
        );
    }
}

impl<W: Write + Send, E: Write + Send> SessionObserver for BatchOutput<W, E> {
    fn on_update(&mut self, update: &SessionUpdate) {
        if let SessionUpdate::TurnAppended { turn, .. } = update {
            self.emit_turn(turn);
        }
    }
}

/// Exit code for a finished transcript: 1 if the exchange ended in an error.
pub fn exit_code(transcript: &Transcript) -> i32 {
    if transcript.iter().any(|t| matches!(t, Turn::Error { .. })) {
        1
    } else {
        0
    }
}

/// Trim `message`, rejecting it if nothing is left. Runs before any request
/// is made, on both the streaming and the sync path.
pub fn admit(message: &str) -> Result<&str, SubmitRejection> {
    let message = message.trim();
    if message.is_empty() {
        return Err(SubmitRejection::EmptyMessage);
    }
    Ok(message)
}

/// Stream one exchange through `transport`, rendering into `output`.
///
/// A rejected submission is reported on `output` and adds no turn.
pub async fn stream_once<T, W, E>(
    transport: &T,
    message: &str,
    output: BatchOutput<W, E>,
) -> (Result<Transcript, SubmitRejection>, BatchOutput<W, E>)
where
    T: ChatTransport + ?Sized,
    W: Write + Send,
    E: Write + Send,
{
    let mut session = Session::new(output);
    let outcome = session.submit(transport, message).await;
    let (transcript, mut output) = session.into_parts();
    match outcome {
        Ok(ExchangeOutcome::Completed { events, dropped }) => {
            info!(events, dropped, "batch exchange complete");
        }
        Ok(other) => info!(?other, "batch exchange ended early"),
        Err(rejection) => {
            output.emit_rejection(&rejection);
            return (Err(rejection), output);
        }
    }
    (Ok(transcript), output)
}

/// Fold a `/chat/sync` reply into a transcript.
///
/// The reply's `message` is only used when the event list carries no
/// assistant message of its own.
pub fn fold_sync_reply(message: &str, reply: Result<SyncReply, BackendError>) -> Transcript {
    let mut transcript = Transcript::new();
    transcript.push_user(message.trim());
    match reply {
        Ok(reply) => {
            let mut transcript = reply.events.into_iter().fold(transcript, reduce);
            let answered = transcript
                .iter()
                .any(|t| matches!(t, Turn::Assistant { .. }));
            if !answered && !reply.message.is_empty() {
                transcript.apply(bc_protocol::ConversationEvent::AssistantMessage {
                    content: reply.message,
                });
            }
            transcript
        }
        Err(err) => {
            transcript.push_error(format!("request failed: {err}"));
            transcript
        }
    }
}

/// Run batch mode. Returns the process exit code.
pub async fn run_batch(config: &Config, client: &BridgeClient, message: &str, sync: bool) -> i32 {
    let stderr = std::io::stderr();
    let is_tty = stderr.is_terminal();
    let style = Style::new(config.display.color && is_tty);
    let width = if is_tty {
        crossterm::terminal::size()
            .map(|(w, _)| w as usize)
            .unwrap_or(80)
    } else {
        80
    };
    let mut output = BatchOutput::new(std::io::stdout(), stderr, style, width);

    let message = match admit(message) {
        Ok(message) => message,
        Err(rejection) => {
            output.emit_rejection(&rejection);
            return 1;
        }
    };
    output.emit_start(message);

    let (transcript, mut output) = if sync {
        let reply = client.chat_sync(message).await;
        let transcript = fold_sync_reply(message, reply);
        for turn in transcript.iter() {
            output.emit_turn(turn);
        }
        (Ok(transcript), output)
    } else {
        stream_once(client, message, output).await
    };

    output.emit_done();
    match transcript {
        Ok(transcript) => exit_code(&transcript),
        Err(_) => 1,
    }
}
