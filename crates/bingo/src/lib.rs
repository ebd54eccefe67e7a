//! # Bingo
//!
//! Server for shared bingo rooms.
//!
//! Players authorize over HTTP, then play on a WebSocket per room. Each
//! room is an actor that owns the canonical board, roster, and chat, and
//! broadcasts every change to all of its sockets. This crate wires the
//! layers together and re-exports what a server binary needs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bingo::prelude::*;
//!
//! # async fn example() -> Result<(), BingoError> {
//! let rooms = bingo::load_rooms("rooms.json")?;
//! let server = BingoServer::builder()
//!     .socket_addr("0.0.0.0:8081")
//!     .http_addr("0.0.0.0:8080")
//!     .rooms(rooms)
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod api;
mod config;
mod error;
mod handler;
pub mod logging;
mod server;

pub use config::{ServerConfig, load_rooms};
pub use error::BingoError;
pub use server::{BingoServer, BingoServerBuilder, ServerHandle};

/// Everything needed to configure and run a server.
pub mod prelude {
    pub use crate::{BingoError, BingoServer, ServerConfig, ServerHandle};
    pub use bingo_protocol::{Color, GenerationMode, Goal, RaceHandler, RoomData};
    pub use bingo_room::{
        CardGenerator, CardRequest, GameSettings, RoomConfig, RoomDataUpdate,
        RoomError, RoomHandle, RoomSettings, ShuffleGenerator,
    };
    pub use bingo_session::SessionConfig;
}
