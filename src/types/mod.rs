//! Type definitions for the FastGPT API.
//!
//! Covers chat requests and completions, the workflow event vocabulary
//! carried by streamed frames, and chat session payloads.

pub mod chat;
pub mod events;
pub mod session;
