//! The connection state machine.
//!
//! ```text
//!  Uninitialized ──(connect / stored token)──→ Connecting ──(connected)──→ Connected
//!                                                  │                          │
//!                                 handshake failure│             close        │
//!                                                  ▼                          ▼
//!  Closed ←──────────────(transport closed)──────────────────────────── Closing
//!
//!  Connecting / Connected ──(transport closed)──→ Closed
//!  any ──(unauthorized)──→ Unauthorized
//!  Closed / Unauthorized ──(manual connect)──→ Connecting
//! ```
//!
//! Transitions are a pure function of (state, event) so they can be tested
//! without a socket.

use std::fmt;

/// Where a client session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Uninitialized,
    /// Authorizing, opening the socket, or waiting for `connected`.
    Connecting,
    Connected,
    /// The authority rejected the token. The token has been purged.
    Unauthorized,
    /// A close was requested and the socket is shutting down.
    Closing,
    /// The socket is gone. The last board stays readable.
    Closed,
}

/// Something that moves the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    /// `connect(...)` was called, or a stored token was found.
    Connect,
    /// The authority answered `join` with `connected`.
    Joined,
    /// The authority answered `unauthorized`.
    Unauthorized,
    /// The authorize request failed.
    HandshakeFailed,
    /// The caller asked to close.
    Close,
    /// The socket closed, failed, or missed a heartbeat.
    TransportClosed,
}

impl ConnectionState {
    /// Returns the next state, or `None` if `event` means nothing here.
    pub fn on(self, event: StateEvent) -> Option<Self> {
        use ConnectionState::*;

        match (self, event) {
            (_, StateEvent::Unauthorized) => Some(Unauthorized),

            (Uninitialized | Closed | Unauthorized, StateEvent::Connect) => {
                Some(Connecting)
            }

            // A re-sent `connected` while connected is a resync.
            (Connecting | Connected, StateEvent::Joined) => Some(Connected),

            (Connecting, StateEvent::HandshakeFailed) => Some(Closed),

            (Connecting | Connected, StateEvent::Close) => Some(Closing),

            (Connecting | Connected | Closing, StateEvent::TransportClosed) => {
                Some(Closed)
            }

            _ => None,
        }
    }

    /// `Closed` and `Unauthorized` end a session; only a manual
    /// `connect` leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Unauthorized)
    }

    /// A socket may be open in these states.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Closing)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Unauthorized => "unauthorized",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
