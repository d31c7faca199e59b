//! Common imports for typical client usage.
//!
//! This module intentionally exports the most frequently used request,
//! response, and streaming types so application code needs fewer import
//! lines.
pub use crate::{
    AbortHandle, Client, ClientConfig, ContentBlock, ContentDelta, Error, Message, MessageParam,
    MessageStream, MessagesRequest, Role, StreamEvent, StreamOptions, Usage,
};
