//! Error types for the protocol layer.
//!
//! Each crate in the workspace defines its own error enum. When you see a
//! `ProtocolError`, the problem is in serialization or in the shape of a
//! message, not in networking or room management.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into a JSON frame).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, a missing `action`
    /// discriminant, or a missing required field.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A board was built from the wrong number of goals.
    #[error("a board needs {expected} goals, got {actual}")]
    BoardSize { expected: usize, actual: usize },

    /// The message decoded but violates protocol rules.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
