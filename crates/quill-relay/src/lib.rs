//! quill-relay: Client for the chat relay endpoint
//!
//! The relay accepts a single user message and answers with the completion
//! model's reply. This crate owns the wire format and the request lifecycle of
//! one turn; it never retries and never queues.

pub mod client;
pub mod error;
pub mod types;

pub use client::{Relay, RelayClient, RelayConfig};
pub use error::{Error, Result};
pub use types::{ChatReply, ChatRequest, DEFAULT_FALLBACK_REPLY};
