//! Wire protocol for shared bingo rooms.
//!
//! This crate defines the "language" that clients and the room authority
//! speak:
//!
//! - **Board types** ([`Board`], [`Cell`], [`Goal`], [`Color`]): the shared
//!   grid and its per-cell color sets.
//! - **Messages** ([`RoomAction`], [`ServerFrame`]): the two closed,
//!   `action`-tagged families that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`], [`Frame`]): how messages
//!   and heartbeats become text frames.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (text) → Protocol (RoomAction / ServerFrame) → Room / Client
//! ```

mod board;
mod codec;
mod error;
mod types;

pub use board::{BOARD_CELLS, BOARD_SIZE, Board, Cell, Color, Goal};
pub use codec::{Codec, Frame, JsonCodec, PING, PONG};
pub use error::ProtocolError;
pub use types::{
    Action, ChatMessage, ChatSegment, GenerationMode, Player, RaceHandler,
    RoomAction, RoomData, ServerFrame, ServerMessage,
};
