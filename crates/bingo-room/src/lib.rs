//! Room authority for shared bingo boards.
//!
//! Each room is an actor that owns its board, chat history, room data,
//! and token registry, and serializes every mutation:
//!
//! ```text
//! RoomManager
//!  ├── "sunday-race" → RoomHandle ──→ RoomActor (Tokio task)
//!  └── "practice"    → RoomHandle ──→ RoomActor (Tokio task)
//! ```
//!
//! - [`RoomManager`]: creates, finds, and destroys rooms by slug
//! - [`RoomHandle`]: cheap cloneable handle for talking to one room
//! - [`CardGenerator`]: the seam through which new boards are produced
//! - [`RoomSettings`] / [`RoomConfig`]: what a room is, and how rooms behave

mod config;
mod error;
mod generator;
mod manager;
mod room;

pub use config::{GameSettings, RoomConfig, RoomSettings};
pub use error::RoomError;
pub use generator::{CardGenerator, CardRequest, ShuffleGenerator};
pub use manager::RoomManager;
pub use room::{
    MEMBER_QUEUE_CAPACITY, MemberSender, RoomDataUpdate, RoomHandle, RoomInfo, RoomOutbound,
};
