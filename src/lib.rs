//! FastGPT Client Library
//!
//! A Rust client for FastGPT-style conversational backends. Streams chat
//! turns over server-sent events, routes workflow events (node status, tool
//! calls, reasoning, flow responses) to caller callbacks, and degrades to a
//! fixed offline answer when the backend cannot be reached.
//!
//! # Features
//!
//! - **Streaming**: Incremental frame decoding over arbitrary chunk boundaries
//! - **Event Dispatch**: Answer deltas, processing steps and intermediate values
//! - **Resilience**: Whole-exchange retries with exponential backoff
//! - **Graceful Degradation**: Failed turns end with an offline answer, not an error
//! - **Cancellation**: Cooperative cancellation through `CancellationToken`
//! - **Observability**: Tracing, stream metrics, redacted log previews
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use fastgpt_client::{ChatOptions, ChatTurn, FastGptClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = FastGptClient::builder()
//!         .base_url("https://api.fastgpt.in/api")
//!         .api_key("fastgpt-your-key")
//!         .app_id("your-app-id")
//!         .build()?;
//!
//!     let answer = client
//!         .chat()
//!         .chat(&[ChatTurn::user("Hello!")], ChatOptions::new())
//!         .await?;
//!     println!("{answer}");
//!     Ok(())
//! }
//! ```
//!
//! # Streaming Example
//!
//! ```rust,no_run
//! use fastgpt_client::{Callbacks, ChatOptions, ChatTurn, FastGptClient, StreamOutcome};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = FastGptClient::from_env()?;
//!
//!     let callbacks = Callbacks::new()
//!         .with_chunk(|text| print!("{text}"))
//!         .with_processing_step(|step| eprintln!("[{:?}] {}", step.status, step.name))
//!         .with_finish(|| println!());
//!
//!     match client
//!         .chat()
//!         .send_chat(&[ChatTurn::user("Tell me a story")], ChatOptions::new(), &callbacks)
//!         .await?
//!     {
//!         StreamOutcome::Degraded { error } => eprintln!("offline: {error}"),
//!         StreamOutcome::Finished | StreamOutcome::Canceled => {}
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod callbacks;
pub mod client;
pub mod config;
pub mod errors;
pub mod observability;
pub mod resilience;
pub mod services;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use callbacks::{Callbacks, NoopCallbacks, StreamCallbacks};
pub use client::{FastGptClient, FastGptClientBuilder};
pub use config::{AgentConfig, AgentConfigBuilder, ChatOptions, ConversationId};
pub use errors::{FastGptError, FastGptResult};
pub use observability::{init_tracing, LogConfig, LogLevel, StreamMetrics};
pub use resilience::RetryConfig;
pub use services::{
    ChatService, EventDispatcher, SessionService, StreamOutcome, DEGRADED_MESSAGE,
};
pub use transport::{Frame, FrameDecoder};

// Type re-exports
pub use types::chat::{ChatCompletion, ChatTurn, Role};
pub use types::events::{EventType, ProcessingStep, StepStatus};
pub use types::session::{ChatInitResponse, QuestionGuideResponse};

/// Mock implementations for testing.
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
