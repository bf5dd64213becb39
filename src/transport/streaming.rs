//! Streaming response handling and frame decoding.
//!
//! The backend frames its output as text lines:
//!
//! ```text
//! event: <event-type>
//! data: <payload>
//! ```
//!
//! An `event:` line sets the current event type, which stays in effect for
//! every following `data:` line until another `event:` line replaces it, even
//! across chunk boundaries. Each `data:` line yields exactly one [`Frame`];
//! multi-line payloads are not concatenated.

use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::task::{Context, Poll};

use super::http::header_value;
use super::TransportError;

/// Payload that marks the end of the answer stream. Never yields a frame.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Event type assigned to payload lines seen before any `event:` line.
pub const DEFAULT_EVENT_TYPE: &str = "unknown";

const EVENT_MARKER: &str = "event:";
const DATA_MARKER: &str = "data:";

/// Boxed response body stream.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Streaming HTTP response.
pub struct StreamingResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, names lowercased.
    pub headers: HashMap<String, String>,
    /// Byte stream.
    pub stream: ByteStream,
}

impl StreamingResponse {
    /// Returns true if the status indicates success (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the `content-type` header, if any.
    pub fn content_type(&self) -> Option<&str> {
        header_value(&self.headers, "content-type")
    }

    /// Returns true if the response declares an event stream body.
    pub fn is_event_stream(&self) -> bool {
        self.content_type()
            .is_some_and(|ct| ct.contains(mime::TEXT_EVENT_STREAM.essence_str()))
    }
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// One decoded `(event type, payload)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Event type in effect when the payload line was read.
    pub event_type: String,
    /// Raw payload text, trimmed.
    pub payload: String,
}

impl Frame {
    /// Creates a frame.
    pub fn new(event_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            payload: payload.into(),
        }
    }
}

/// Incremental line decoder, one per open stream.
///
/// Input is buffered as bytes so a multi-byte character split across two
/// chunks decodes the same as if it had arrived whole.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    current_event: Option<String>,
}

impl FrameDecoder {
    /// Creates a decoder with an empty buffer and no current event type.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns the frames completed by it.
    pub fn feed(&mut self, chunk: impl AsRef<[u8]>) -> Vec<Frame> {
        let Self {
            pending,
            current_event,
        } = self;

        pending.extend_from_slice(chunk.as_ref());

        let mut frames = Vec::new();
        let mut start = 0;

        while let Some(offset) = pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&pending[start..end]);

            if let Some(frame) = parse_line(&line, current_event) {
                frames.push(frame);
            }

            start = end + 1;
        }

        pending.drain(..start);
        frames
    }

    /// Ends the stream. A dangling partial line is discarded, never promoted.
    pub fn flush(&mut self) -> Vec<Frame> {
        if !self.pending.is_empty() {
            tracing::debug!(
                discarded_bytes = self.pending.len(),
                "Discarding incomplete trailing line"
            );
            self.pending.clear();
        }
        Vec::new()
    }

    /// Returns the event type that the next payload line will be paired with.
    pub fn current_event(&self) -> Option<&str> {
        self.current_event.as_deref()
    }

    /// Returns true if a partial line is buffered.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

fn parse_line(line: &str, current_event: &mut Option<String>) -> Option<Frame> {
    let line = line.strip_suffix('\r').unwrap_or(line);

    if line.trim().is_empty() {
        return None;
    }

    if let Some(event) = line.strip_prefix(EVENT_MARKER) {
        *current_event = Some(event.trim().to_string());
        return None;
    }

    let payload = line.strip_prefix(DATA_MARKER)?.trim();
    if payload == DONE_SENTINEL {
        return None;
    }

    let event_type = current_event
        .clone()
        .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string());

    Some(Frame::new(event_type, payload))
}

pin_project! {
    /// Frame stream over a response body.
    ///
    /// Yields frames in byte-arrival order. A read error is yielded once and
    /// ends the stream.
    pub struct FrameStream {
        #[pin]
        inner: ByteStream,
        decoder: FrameDecoder,
        queued: VecDeque<Frame>,
        done: bool,
    }
}

impl FrameStream {
    /// Wraps a body stream.
    pub fn new(inner: ByteStream) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::new(),
            queued: VecDeque::new(),
            done: false,
        }
    }
}

impl Stream for FrameStream {
    type Item = Result<Frame, TransportError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(frame) = this.queued.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }

            if *this.done {
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.queued.extend(this.decoder.feed(&bytes));
                }
                Poll::Ready(Some(Err(e))) => {
                    *this.done = true;
                    this.decoder.flush();
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    *this.done = true;
                    this.queued.extend(this.decoder.flush());
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
