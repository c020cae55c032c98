//! Error types for quill-chat

use thiserror::Error;

use crate::message::MessageId;

/// Result type alias using quill-chat Error
pub type Result<T> = std::result::Result<T, Error>;

/// Message store contract violations.
///
/// These indicate a bug in the caller, not a runtime condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The message would break an invariant of the conversation
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// No message with this id exists
    #[error("Message not found: {0}")]
    NotFound(MessageId),
}

/// Errors that can occur in the conversation runtime
#[derive(Error, Debug)]
pub enum Error {
    /// Store contract violation
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An error from the relay client
    #[error(transparent)]
    Relay(#[from] quill_relay::Error),

    /// Durable slot I/O failed
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Snapshot (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
