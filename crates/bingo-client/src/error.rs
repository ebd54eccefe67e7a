//! Error types for the client.

use bingo_protocol::ProtocolError;
use bingo_transport::TransportError;

use crate::ConnectionState;

/// Errors surfaced to callers of [`RoomClient`](crate::RoomClient).
///
/// Only failures of the call that was made are reported here. Problems on
/// an established socket (bad frames, a missed pong, the server going
/// away) are handled inside the session and show up as a state change.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The authorize request reached the server and was refused.
    #[error("handshake failed with HTTP {status}: {message}")]
    Handshake { status: u16, message: String },

    /// The authorize request never got an answer.
    #[error("handshake request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The socket could not be opened.
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Reading or writing the persisted token file failed.
    #[error("token store: {0}")]
    TokenStore(#[from] std::io::Error),

    /// The action needs a joined session.
    #[error("not connected")]
    NotConnected,

    /// The call is not allowed in the current connection state.
    #[error("cannot do that while {0}")]
    InvalidState(ConnectionState),

    /// Row or column outside the current board.
    #[error("cell ({row}, {col}) is outside the board")]
    OutOfRange { row: usize, col: usize },
}

impl ClientError {
    /// The HTTP status of a refused handshake, if that is what this is.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Handshake { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
