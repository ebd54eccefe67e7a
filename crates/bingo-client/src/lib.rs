//! Client side of a bingo room.
//!
//! A [`RoomClient`] authorizes over HTTP, opens the room socket, joins, and
//! then keeps a background task draining server frames in order:
//!
//! ```text
//! RoomClient (handle) ──actions──→ session task ──frames──→ room socket
//!       ↑                             │
//!       └── state, roster, chat ──────┤
//!                                     └──→ BoardStore ──→ listeners
//! ```
//!
//! - [`BoardStore`]: the board as immutable, structurally shared snapshots
//! - [`ConnectionState`]: the session lifecycle as a pure state machine
//! - [`TokenStore`]: where room tokens live between runs
//! - [`Authorizer`] / [`Dialer`]: the HTTP and socket seams, swappable in tests
//!
//! The client never changes the board on its own. Marks show up in the
//! store when the server's `cellUpdate` comes back.

mod authorize;
mod client;
mod error;
mod state;
mod store;
mod token;

pub use authorize::{Authorizer, Dialer, HttpAuthorizer, WebSocketDialer};
pub use client::{
    ClientConfig, ClientEvent, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_PONG_TIMEOUT,
    DEFAULT_SHUTDOWN_TIMEOUT, MIN_HEARTBEAT_INTERVAL, RoomClient,
};
pub use error::ClientError;
pub use state::{ConnectionState, StateEvent};
pub use store::{BoardSnapshot, BoardStore, Subscription};
pub use token::{FileTokenStore, MemoryTokenStore, TokenStore};
