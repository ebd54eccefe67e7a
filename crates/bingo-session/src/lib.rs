//! Room tokens and player identity for bingo rooms.
//!
//! This crate handles the lifecycle of a room credential:
//!
//! 1. **Authorization**: checking a room password ([`Authenticator`] trait)
//! 2. **Token tracking**: which tokens a room has issued ([`SessionManager`])
//! 3. **Resumption**: a token keeps its nickname and color across socket
//!    closes, until it sits idle longer than the configured TTL
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)  ← owns one SessionManager per room
//!     ↕
//! Session Layer (this crate)  ← tokens, claims, identity
//!     ↕
//! Protocol / Transport (below)  ← Color, ConnectionId
//! ```

mod auth;
mod error;
mod manager;
mod session;

pub use auth::{Authenticator, Claims, PasswordAuthenticator};
pub use error::SessionError;
pub use manager::SessionManager;
pub use session::{Session, SessionConfig, SessionState};
