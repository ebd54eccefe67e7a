//! Unified error type for the bingo server.

use bingo_protocol::ProtocolError;
use bingo_room::RoomError;
use bingo_session::SessionError;
use bingo_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum BingoError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (rejected password, unknown or expired token).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (not found, bad settings, actor gone).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// Binding the HTTP listener or reading a config file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The rooms file could not be parsed.
    #[error("invalid rooms file: {0}")]
    Config(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let bingo_err: BingoError = err.into();
        assert!(matches!(bingo_err, BingoError::Transport(_)));
        assert!(bingo_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::BoardSize {
            expected: 25,
            actual: 3,
        };
        let bingo_err: BingoError = err.into();
        assert!(matches!(bingo_err, BingoError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::AuthRejected("nope".into());
        let bingo_err: BingoError = err.into();
        assert!(matches!(bingo_err, BingoError::Session(_)));
    }

    #[test]
    fn test_from_room_error() {
        let err = RoomError::NotFound("sunday-race".into());
        let bingo_err: BingoError = err.into();
        assert!(matches!(bingo_err, BingoError::Room(_)));
        assert!(bingo_err.to_string().contains("sunday-race"));
    }
}
