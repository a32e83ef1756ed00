//! Error types for consensus wire messages.

use thiserror::Error;

/// Errors that can occur while encoding or decoding consensus messages.
#[derive(Error, Debug)]
pub enum MessageError {
    /// Failed to (de)serialize a message.
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Encoded message exceeds the maximum allowed size.
    #[error("message too large: {size} bytes (max {max} bytes)")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A round key string was not of the form `<height>_<round>`.
    #[error("malformed round key: {0:?}")]
    MalformedRoundKey(String),

    /// The envelope payload was decoded as the wrong message type.
    #[error("expected {expected} payload, envelope carries {actual}")]
    WrongKind {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Convenience result type for message operations.
pub type Result<T> = std::result::Result<T, MessageError>;
