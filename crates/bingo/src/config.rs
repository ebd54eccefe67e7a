//! Server configuration and the rooms file.

use std::path::Path;
use std::time::Duration;

use bingo_room::{RoomConfig, RoomSettings};

use crate::BingoError;

/// Where the server listens and how long it tolerates silent sockets.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address for room sockets (`/socket/{slug}`).
    pub socket_addr: String,

    /// Address for the HTTP API (`/api/rooms/{slug}/authorize`).
    pub http_addr: String,

    /// A socket that sends nothing, heartbeats included, for this long is
    /// dropped and its player deregistered.
    pub idle_timeout: Duration,

    pub room: RoomConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_addr: "127.0.0.1:8081".to_string(),
            http_addr: "127.0.0.1:8080".to_string(),
            idle_timeout: Duration::from_secs(60),
            room: RoomConfig::default(),
        }
    }
}

/// Reads a JSON array of [`RoomSettings`].
///
/// # Errors
/// [`BingoError::Io`] if the file cannot be read, [`BingoError::Config`]
/// if it is not a valid rooms list.
pub fn load_rooms(path: impl AsRef<Path>) -> Result<Vec<RoomSettings>, BingoError> {
    let text = std::fs::read_to_string(path)?;
    parse_rooms(&text)
}

pub(crate) fn parse_rooms(text: &str) -> Result<Vec<RoomSettings>, BingoError> {
    serde_json::from_str(text).map_err(BingoError::Config)
}
