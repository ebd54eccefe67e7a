//! The session manager: every token one room has issued.
//!
//! Responsibilities:
//! - Issuing tokens after a successful authorization
//! - Resolving a token on every inbound action (with lazy expiry)
//! - Binding tokens to sockets on join and releasing them on leave
//! - Expiring idle tokens and cleaning them up
//!
//! # Concurrency note
//!
//! `SessionManager` is a plain `HashMap`, not a concurrent one. Each room
//! actor owns its own manager and is the only task that touches it.

use std::collections::HashMap;

use bingo_protocol::Color;
use bingo_transport::ConnectionId;
use rand::Rng;
use tokio::time::Instant;

use crate::{Claims, Session, SessionConfig, SessionError, SessionState};

/// Registry of one room's tokens.
///
/// ## Lifecycle
///
/// ```text
/// issue() ──→ join() ──→ release() ──→ join() ...
///    │                       │
///    ▼                       ▼
/// [Idle] ──(ttl)──→ expire_stale() / resolve() ──→ [Expired] ──→ cleanup_expired()
///
/// revoke() removes a token immediately from any state.
/// ```
pub struct SessionManager {
    /// Sessions keyed by their token.
    sessions: HashMap<String, Session>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            config,
        }
    }

    /// Issues a fresh token carrying `claims`. The session starts idle,
    /// with no nickname and the default color.
    pub fn issue(&mut self, claims: Claims) -> &Session {
        let token = generate_token();
        let session = Session {
            token: token.clone(),
            nickname: None,
            color: Color::default(),
            spectator: claims.spectator,
            monitor: claims.monitor,
            race_status: None,
            state: SessionState::Idle {
                since: Instant::now(),
            },
        };
        tracing::debug!(
            spectator = claims.spectator,
            monitor = claims.monitor,
            "room token issued"
        );
        self.sessions.entry(token).or_insert(session)
    }

    /// Looks up a token, expiring it first if it has idled past the TTL.
    ///
    /// # Errors
    /// - [`SessionError::InvalidToken`]: never issued, or revoked
    /// - [`SessionError::TokenExpired`]: idle longer than the TTL
    pub fn resolve(&mut self, token: &str) -> Result<&Session, SessionError> {
        let ttl = self.config.token_ttl();
        let session = self
            .sessions
            .get_mut(token)
            .ok_or(SessionError::InvalidToken)?;

        let state = session.state;
        match state {
            SessionState::Joined { .. } => Ok(session),
            SessionState::Idle { since } if since.elapsed() < ttl => {
                Ok(session)
            }
            SessionState::Idle { .. } => {
                session.state = SessionState::Expired;
                tracing::debug!("room token expired on use");
                Err(SessionError::TokenExpired)
            }
            SessionState::Expired => Err(SessionError::TokenExpired),
        }
    }

    /// Binds a valid token to `conn`.
    ///
    /// A token is joined from at most one socket. If it was already joined
    /// elsewhere, the displaced connection is returned so the caller can
    /// drop it.
    ///
    /// # Errors
    /// Same as [`resolve`](Self::resolve).
    pub fn join(
        &mut self,
        token: &str,
        conn: ConnectionId,
    ) -> Result<Option<ConnectionId>, SessionError> {
        self.resolve(token)?;
        let session = self
            .sessions
            .get_mut(token)
            .ok_or(SessionError::InvalidToken)?;

        let displaced = session.connection().filter(|&old| old != conn);
        session.state = SessionState::Joined { conn };
        Ok(displaced)
    }

    /// Releases a token from `conn`, starting its idle period.
    ///
    /// Does nothing (and returns `false`) if the token is unknown or is
    /// joined from a different connection.
    pub fn release(&mut self, token: &str, conn: ConnectionId) -> bool {
        match self.sessions.get_mut(token) {
            Some(session) if session.connection() == Some(conn) => {
                session.state = SessionState::Idle {
                    since: Instant::now(),
                };
                true
            }
            _ => false,
        }
    }

    /// Removes a token immediately, whatever its state.
    pub fn revoke(&mut self, token: &str) -> Option<Session> {
        let removed = self.sessions.remove(token);
        if removed.is_some() {
            tracing::info!("room token revoked");
        }
        removed
    }

    /// Marks every idle token past its TTL as expired and returns them.
    ///
    /// Expired tokens stay in the map until
    /// [`cleanup_expired`](Self::cleanup_expired) runs, so a late `resolve`
    /// still reports `TokenExpired` rather than `InvalidToken`.
    pub fn expire_stale(&mut self) -> Vec<String> {
        let ttl = self.config.token_ttl();
        let mut expired = Vec::new();

        for session in self.sessions.values_mut() {
            if let SessionState::Idle { since } = session.state {
                if since.elapsed() >= ttl {
                    session.state = SessionState::Expired;
                    expired.push(session.token.clone());
                }
            }
        }

        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "room tokens expired");
        }
        expired
    }

    /// Removes all expired sessions.
    pub fn cleanup_expired(&mut self) {
        self.sessions
            .retain(|_, session| session.state != SessionState::Expired);
    }

    pub fn get(&self, token: &str) -> Option<&Session> {
        self.sessions.get(token)
    }

    /// Mutable access for identity updates (nickname, color, race status).
    pub fn get_mut(&mut self, token: &str) -> Option<&mut Session> {
        self.sessions.get_mut(token)
    }

    /// Finds the session whose nickname matches, e.g. for race-status
    /// updates addressed by player name.
    pub fn find_by_nickname(&mut self, nickname: &str) -> Option<&mut Session> {
        self.sessions
            .values_mut()
            .find(|s| s.nickname.as_deref() == Some(nickname))
    }

    /// Returns `nickname` if no token holds it yet, otherwise the first free
    /// `nickname (n)` counting up from 2.
    pub fn unique_nickname(&self, nickname: &str) -> String {
        let taken = |candidate: &str| {
            self.sessions
                .values()
                .any(|s| s.nickname.as_deref() == Some(candidate))
        };
        if !taken(nickname) {
            return nickname.to_owned();
        }
        (2..)
            .map(|n| format!("{nickname} ({n})"))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| nickname.to_owned())
    }

    /// Returns the number of tracked tokens (any state).
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Generates a random 32-character hex string (128 bits of entropy).
fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// =========================================================================
// Tests
// =========================================================================
