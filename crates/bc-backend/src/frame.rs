//! Line-framed event stream decoder.
//!
//! The agent streams one event per line, each line prefixed with `data: `.
//! Chunks from the transport can split a line anywhere (including inside a
//! multi-byte character), so the decoder carries the unterminated tail of
//! each chunk over to the next call and only emits a frame once its newline
//! has arrived.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tracing::{debug, trace};

/// Prefix that marks a line as carrying a frame.
pub const DATA_PREFIX: &str = "data: ";

/// Payload that marks the graceful end of the stream.
pub const DONE_MARKER: &str = "[DONE]";

/// One logical unit of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub payload: String,
}

impl Frame {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }
}

/// What a single complete line turned out to be.
#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Frame(&'a str),
    Done,
    Ignored,
}

fn decode_line(line: &str) -> Line<'_> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    match line.strip_prefix(DATA_PREFIX) {
        Some(DONE_MARKER) => Line::Done,
        Some(payload) => Line::Frame(payload),
        // Blank keep-alives, comments, and other SSE fields
        None => Line::Ignored,
    }
}

/// Incremental decoder from raw chunks to frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes of the current, not yet terminated line.
    carry: Vec<u8>,
    /// Set once the end marker has been seen. Decoding carries on after it;
    /// only the transport closing ends the stream.
    done: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the end marker has been consumed.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn feed(&mut self, chunk: &str) -> Vec<Frame> {
        self.feed_bytes(chunk.as_bytes())
    }

    /// Feed one chunk and return every frame it completed, in order.
    pub fn feed_bytes(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        self.carry.extend_from_slice(chunk);

        // `\n` never occurs inside a multi-byte UTF-8 sequence, so splitting
        // on the raw byte keeps characters intact.
        let mut start = 0;
        while let Some(offset) = self.carry[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.carry[start..end]);
            start = end + 1;

            match decode_line(&line) {
                Line::Frame(payload) => frames.push(Frame::new(payload)),
                Line::Done => {
                    trace!("end marker received");
                    self.done = true;
                }
                Line::Ignored => {}
            }
        }

        self.carry.drain(..start);
        frames
    }

    /// Take the unterminated trailing fragment, if any.
    ///
    /// The fragment never becomes a frame; it is returned so the caller can
    /// report a truncated stream.
    pub fn finish(&mut self) -> Option<String> {
        if self.carry.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.carry);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// Stream adapter that decodes frames out of a byte stream.
///
/// Ends when the inner stream ends. The end marker is recorded but does not
/// cut the stream short. Transport errors are passed through unchanged.
pub struct FrameStream<S> {
    inner: S,
    decoder: FrameDecoder,
    pending: VecDeque<Frame>,
    exhausted: bool,
}

impl<S> FrameStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Whether the end marker was seen.
    pub fn saw_done(&self) -> bool {
        self.decoder.is_done()
    }
}

impl<S, E> Stream for FrameStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Frame, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if let Some(frame) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }
            if this.exhausted {
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.pending.extend(this.decoder.feed_bytes(&bytes));
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.exhausted = true;
                    if let Some(rest) = this.decoder.finish() {
                        debug!(fragment = %rest, "stream ended inside a line; fragment discarded");
                    }
                }
                Poll::Pending => {
                    return Poll::Pending;
                }
            }
        }
    }
}

/// Create a frame stream from a byte stream.
pub fn parse_frame_stream<S, E>(stream: S) -> FrameStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    FrameStream::new(stream)
}
