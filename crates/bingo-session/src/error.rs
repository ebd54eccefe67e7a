//! Error types for the session layer.

/// Errors that can occur while authorizing or resolving room tokens.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The password did not match the room's password or monitor password.
    #[error("authorization rejected: {0}")]
    AuthRejected(String),

    /// The token was never issued by this room, or has been revoked.
    /// Empty tokens land here too.
    #[error("invalid room token")]
    InvalidToken,

    /// The token sat idle longer than the configured TTL.
    #[error("room token expired")]
    TokenExpired,
}
