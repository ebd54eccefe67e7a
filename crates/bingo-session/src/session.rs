//! Session types: the room's record of one issued token.
//!
//! A session tracks:
//! - WHO holds the token (nickname, color, spectator and monitor flags)
//! - WHETHER a socket is currently joined with it
//! - WHEN it went idle (so it can expire)

use std::time::Duration;

use bingo_protocol::{Color, Player};
use bingo_transport::ConnectionId;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for token behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long (in seconds) a token may sit unjoined before it expires.
    /// A joined token never expires.
    ///
    /// Default: 24 hours. Set to 0 to expire tokens as soon as they idle.
    pub token_ttl_secs: u64,
}

impl SessionConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: 24 * 60 * 60,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Where a token is in its lifecycle.
///
/// ```text
///   issue ──→ Idle ──(join)──→ Joined ──(leave / close)──→ Idle
///              │                  ↑                          │
///              │                  └──────────(join)──────────┘
///              ▼ (ttl elapsed)
///           Expired ──→ cleanup
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Issued or released; expires once `since + ttl` has passed.
    Idle { since: Instant },

    /// Bound to a live socket.
    Joined { conn: ConnectionId },

    /// TTL elapsed. Removed on the next cleanup.
    Expired,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One token and the identity bound to it.
#[derive(Debug, Clone)]
pub struct Session {
    /// 32 hex characters, 128 bits of randomness.
    pub token: String,

    /// Set on the first join and kept for every later one.
    pub nickname: Option<String>,

    pub color: Color,

    pub spectator: bool,

    pub monitor: bool,

    /// Race-timing status passed through from the bridge.
    pub race_status: Option<serde_json::Value>,

    pub state: SessionState,
}

impl Session {
    pub fn is_joined(&self) -> bool {
        matches!(self.state, SessionState::Joined { .. })
    }

    /// The connection currently joined with this token, if any.
    pub fn connection(&self) -> Option<ConnectionId> {
        match self.state {
            SessionState::Joined { conn } => Some(conn),
            _ => None,
        }
    }

    /// The roster entry for this session. `None` until a nickname is bound.
    pub fn player(&self) -> Option<Player> {
        Some(Player {
            nickname: self.nickname.clone()?,
            color: self.color.clone(),
            spectator: self.spectator,
            monitor: self.monitor,
            race_status: self.race_status.clone(),
        })
    }
}
