//! Async client for the Anthropic Messages API with streaming response
//! reconstruction.
//!
//! A streaming session decodes server-sent events into typed wire events and
//! exposes them through four equivalent views over the same network
//! operation: a blocking finalize-to-response call, a lazy raw-event stream,
//! a lazy text-fragment stream, and synchronous callbacks.
//!
//! # Blocking usage
//!
//! ```no_run
//! use anthropic_client::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Error> {
//! let client = Client::from_env()?;
//! let request = MessagesRequest::new("claude-sonnet-4-5", 1024)
//!     .system("Answer briefly.")
//!     .user("Write a haiku about rust");
//!
//! let message = client.stream_messages(&request).await?.run().await?;
//! println!("{}", message.text());
//! # Ok(())
//! # }
//! ```
//!
//! # Lazy text usage
//!
//! ```no_run
//! use anthropic_client::prelude::*;
//! use futures::StreamExt as _;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Error> {
//! # let client = Client::from_env()?;
//! # let request = MessagesRequest::new("claude-sonnet-4-5", 1024).user("hi");
//! let mut text = Box::pin(client.stream_messages(&request).await?.into_text());
//! while let Some(fragment) = text.next().await {
//!     print!("{}", fragment?);
//! }
//! # Ok(())
//! # }
//! ```

/// Incremental assembly of a response from wire events.
pub mod accumulator;
/// HTTP client and endpoint configuration.
pub mod client;
/// Public error types.
pub mod errors;
/// Typed wire events decoded from the stream.
pub mod events;
/// Response data model.
pub mod message;
/// Common imports for typical usage.
pub mod prelude;
/// Request body types.
pub mod request;
/// SSE frame decoding.
mod sse;
/// Streaming session, relay, and consumption adapters.
pub mod stream;

pub use accumulator::MessageAccumulator;
pub use client::{Client, ClientConfig};
pub use errors::{ApiError, Error, TimeoutStage};
pub use events::{ContentDelta, MessageDeltaBody, StreamEvent, UsageDelta};
pub use message::{ContentBlock, Message, Usage};
pub use request::{MessageParam, MessagesRequest, Role};
pub use stream::{AbortHandle, MessageStream, StreamOptions};
