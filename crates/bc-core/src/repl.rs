//! Interactive line REPL.
//!
//! Each line read from the terminal is submitted to a session running on its
//! own task; the renderer draws turns as they stream in. Ctrl-C abandons the
//! reply in flight, or quits when nothing is pending.

use std::io::{IsTerminal, Stdout};

use bc_backend::BridgeClient;
use bc_protocol::ToolInfo;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::config::Config;
use crate::renderer::{RenderOptions, TranscriptRenderer};
use crate::session::{spawn_session, SessionClosed, SessionHandle};
use crate::style::Style;

const PROMPT: &str = "> ";

const HELP: &str = "\
commands:
  /tools   list the agent's tools
  /help    show this help
  /quit    exit (also /exit, ctrl-d)
ctrl-c cancels a pending reply";

#[derive(Debug, Error)]
pub enum ReplError {
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Closed(#[from] SessionClosed),
}

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Empty,
    Quit,
    Help,
    Tools,
    Unknown(String),
    Message(String),
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    match line {
        "/quit" | "/exit" => Input::Quit,
        "/help" | "/?" => Input::Help,
        "/tools" => Input::Tools,
        _ if line.starts_with('/') && !line.contains(char::is_whitespace) => {
            Input::Unknown(line.to_string())
        }
        _ => Input::Message(line.to_string()),
    }
}

struct Repl {
    handle: SessionHandle,
    style: Style,
    options: RenderOptions,
    tools: Vec<ToolInfo>,
}

impl Repl {
    /// Renderer for output produced outside the session task.
    fn side_renderer(&self) -> TranscriptRenderer<Stdout> {
        TranscriptRenderer::new(std::io::stdout(), self.style, self.options.clone())
    }

    fn notice(&self, text: &str) {
        self.side_renderer().emit_notice(text);
    }

    fn prompt(&self) {
        self.side_renderer().emit_prompt();
    }

    /// Handle one line. Returns false when the REPL should exit.
    fn handle_line(&mut self, line: &str) -> Result<bool, ReplError> {
        match parse_input(line) {
            Input::Empty => {
                if !self.handle.status().is_busy() {
                    self.prompt();
                }
            }
            Input::Quit => return Ok(false),
            Input::Help => {
                self.notice(HELP);
                self.prompt();
            }
            Input::Tools => {
                self.side_renderer().emit_catalog(&self.tools);
                self.prompt();
            }
            Input::Unknown(command) => {
                self.notice(&format!("unknown command {command}; try /help"));
                self.prompt();
            }
            Input::Message(text) => {
                if self.handle.status().is_busy() {
                    self.notice("still waiting for the previous reply (ctrl-c to cancel)");
                } else {
                    self.handle.submit(text)?;
                }
            }
        }
        Ok(true)
    }
}

/// Run the interactive REPL until the user quits or stdin closes.
pub async fn run_repl(config: &Config, client: BridgeClient) -> Result<(), ReplError> {
    let is_tty = std::io::stdout().is_terminal();
    let style = Style::new(config.display.color && is_tty);
    let options = RenderOptions {
        echo_user: false,
        spinner: is_tty,
        prompt: Some(PROMPT.to_string()),
        ..RenderOptions::from_display(&config.display)
    };

    let tools = match client.list_tools().await {
        Ok(tools) => tools,
        Err(err) => {
            warn!(%err, "could not load the tool catalog");
            Vec::new()
        }
    };

    let mut banner = TranscriptRenderer::new(std::io::stdout(), style, options.clone());
    banner.emit_notice(&format!(
        "bridgechat {} connected to {} (/help for commands)",
        env!("CARGO_PKG_VERSION"),
        client.base_url()
    ));
    if !tools.is_empty() {
        banner.emit_catalog(&tools);
    }

    let renderer = TranscriptRenderer::new(std::io::stdout(), style, options.clone());
    let handle = spawn_session(client, renderer);
    let mut repl = Repl {
        handle: handle.clone(),
        style,
        options,
        tools,
    };
    repl.prompt();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !repl.handle_line(&line)? {
                        break;
                    }
                }
                None => {
                    debug!("stdin closed");
                    handle.wait_idle().await?;
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                if handle.status().is_busy() {
                    handle.cancel()?;
                    repl.notice("cancelled");
                } else {
                    break;
                }
            }
        }
    }

    drop(repl);
    let transcript = handle.shutdown().await?;
    debug!(turns = transcript.len(), "session closed");
    println!();
    Ok(())
}
