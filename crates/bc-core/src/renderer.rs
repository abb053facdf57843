//! Terminal rendering of the transcript.
//!
//! `TranscriptRenderer<W: Write>` draws each turn once, as it is appended, and
//! a one-line spinner while a reply is pending. Every persistent emit clears
//! the spinner first so it never bleeds into turn output.

use std::io::Write;

use bc_protocol::{SessionStatus, SessionUpdate, ToolInfo, Turn, Value};

use crate::config::DisplayConfig;
use crate::session::SessionObserver;
use crate::style::{clip_lines, truncate_chars, Style};

const SPINNER_FRAME: &str = "⠋";

/// Knobs for how turns are drawn.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub max_result_lines: usize,
    pub description_width: usize,
    /// Draw user turns (off when the terminal already echoed the input).
    pub echo_user: bool,
    /// Show the pending-reply line while awaiting a response.
    pub spinner: bool,
    /// Printed whenever the session becomes idle.
    pub prompt: Option<String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            max_result_lines: 20,
            description_width: 50,
            echo_user: true,
            spinner: false,
            prompt: None,
        }
    }
}

impl RenderOptions {
    pub fn from_display(display: &DisplayConfig) -> Self {
        Self {
            max_result_lines: display.max_result_lines,
            description_width: display.description_width,
            ..Self::default()
        }
    }
}

pub struct TranscriptRenderer<W: Write> {
    pub writer: W,
    style: Style,
    options: RenderOptions,
    spinner_active: bool,
    busy: bool,
}

impl<W: Write> TranscriptRenderer<W> {
    pub fn new(writer: W, style: Style, options: RenderOptions) -> Self {
        Self {
            writer,
            style,
            options,
            spinner_active: false,
            busy: false,
        }
    }

    /// Clear the spinner line if one is active.
    pub fn clear_spinner(&mut self) {
        if self.spinner_active {
            let _ = write!(self.writer, "\r\x1b[K");
            self.spinner_active = false;
        }
    }

    fn show_spinner(&mut self) {
        if !self.options.spinner || self.spinner_active {
            return;
        }
        let _ = write!(
            self.writer,
            "{}{SPINNER_FRAME} waiting for the agent...{}",
            self.style.cyan_start(),
            self.style.reset()
        );
        let _ = self.writer.flush();
        self.spinner_active = true;
    }

    pub fn emit_prompt(&mut self) {
        if let Some(prompt) = &self.options.prompt {
            let _ = write!(
                self.writer,
                "{}{prompt}{}",
                self.style.bold_start(),
                self.style.reset()
            );
            let _ = self.writer.flush();
        }
    }

    pub fn emit_status(&mut self, status: SessionStatus) {
        self.busy = status.is_busy();
        match status {
            SessionStatus::AwaitingResponse => self.show_spinner(),
            SessionStatus::Idle => {
                self.clear_spinner();
                self.emit_prompt();
            }
        }
    }

    pub fn emit_turn(&mut self, turn: &Turn) {
        if matches!(turn, Turn::User { .. }) && !self.options.echo_user {
            return;
        }
        self.clear_spinner();
        let s = self.style;
        match turn {
            Turn::User { text } => {
                let _ = writeln!(
                    self.writer,
                    "{}{}you ›{} {text}",
                    s.bold_start(),
                    s.blue_start(),
                    s.reset()
                );
            }
            Turn::Assistant { text } => {
                let _ = writeln!(self.writer, "{}agent ›{} {text}", s.bold_start(), s.reset());
            }
            Turn::ToolCall {
                tool_name,
                arguments,
            } => {
                let _ = writeln!(
                    self.writer,
                    "{}⚙ calling {tool_name}{}",
                    s.yellow_start(),
                    s.reset()
                );
                if !arguments.is_null() {
                    self.emit_value(arguments);
                }
            }
            Turn::ToolResult { tool_name, result } => {
                let _ = writeln!(
                    self.writer,
                    "{}✓ {tool_name} returned{}",
                    s.green_start(),
                    s.reset()
                );
                self.emit_value(result);
            }
            Turn::Error { text } => {
                let _ = writeln!(self.writer, "{}error:{} {text}", s.red_start(), s.reset());
            }
        }
        let _ = self.writer.flush();
        if self.busy {
            self.show_spinner();
        }
    }

    /// Indented, clipped body of a tool call or result.
    fn emit_value(&mut self, value: &Value) {
        let text = match value {
            Value::String(s) => s.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        };
        let (kept, hidden) = clip_lines(&text, self.options.max_result_lines);
        for line in kept.lines() {
            let _ = writeln!(
                self.writer,
                "  {}{line}{}",
                self.style.dim_start(),
                self.style.reset()
            );
        }
        if hidden > 0 {
            let _ = writeln!(
                self.writer,
                "  {}... {hidden} more lines{}",
                self.style.dim_start(),
                self.style.reset()
            );
        }
    }

    pub fn emit_catalog(&mut self, tools: &[ToolInfo]) {
        self.clear_spinner();
        let s = self.style;
        let _ = writeln!(
            self.writer,
            "{}available tools: {}{}",
            s.bold_start(),
            tools.len(),
            s.reset()
        );
        for tool in tools {
            let description = truncate_chars(&tool.description, self.options.description_width);
            if description.is_empty() {
                let _ = writeln!(self.writer, "  {}{}{}", s.cyan_start(), tool.name, s.reset());
            } else {
                let _ = writeln!(
                    self.writer,
                    "  {}{}{}  {}{description}{}",
                    s.cyan_start(),
                    tool.name,
                    s.reset(),
                    s.dim_start(),
                    s.reset()
                );
            }
        }
        let _ = self.writer.flush();
    }

    /// A dim informational line (hints, notices).
    pub fn emit_notice(&mut self, text: &str) {
        self.clear_spinner();
        let _ = writeln!(
            self.writer,
            "{}{text}{}",
            self.style.dim_start(),
            self.style.reset()
        );
        let _ = self.writer.flush();
    }
}

impl<W: Write + Send> SessionObserver for TranscriptRenderer<W> {
    fn on_update(&mut self, update: &SessionUpdate) {
        match update {
            SessionUpdate::TurnAppended { turn, .. } => self.emit_turn(turn),
            SessionUpdate::StatusChanged(status) => self.emit_status(*status),
        }
    }
}
