//! HTTP transport layer for the FastGPT client.
//!
//! Provides the transport abstraction the chat services talk to, the reqwest
//! implementation, and the incremental frame decoder that turns a streamed
//! response body into `(event type, payload)` frames.

mod http;
mod streaming;

pub(crate) use http::header_value;
pub use http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, HttpTransportImpl};
pub use streaming::{
    ByteStream, Frame, FrameDecoder, FrameStream, StreamingResponse, DEFAULT_EVENT_TYPE,
    DONE_SENTINEL,
};

use std::time::Duration;

/// Transport error types.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Connection error.
    #[error("Connection error: {message}")]
    Connection {
        /// Error message.
        message: String,
    },

    /// Timeout error.
    #[error("Timeout after {timeout:?}")]
    Timeout {
        /// Timeout duration.
        timeout: Duration,
    },

    /// TLS error.
    #[error("TLS error: {message}")]
    Tls {
        /// Error message.
        message: String,
    },

    /// Invalid response or failed body read.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Error message.
        message: String,
    },
}
