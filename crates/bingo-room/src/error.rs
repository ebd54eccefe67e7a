//! Error types for the room layer.

use bingo_session::SessionError;

/// Errors that can occur in room management.
///
/// Rooms are addressed by slug, so every variant that names a room
/// carries it for logging.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No room is registered under this slug.
    #[error("room {0} not found")]
    NotFound(String),

    /// A room with this slug is already running.
    #[error("room {0} already exists")]
    AlreadyExists(String),

    /// The room's settings are unusable (bad slug, empty name, ...).
    #[error("invalid room settings: {0}")]
    InvalidSettings(String),

    /// The card generator could not produce a board.
    #[error("card generation failed: {0}")]
    Generation(String),

    /// No player with this nickname holds a token in the room.
    #[error("player {0} not in room")]
    PlayerNotFound(String),

    /// Authorization or token resolution failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The room's actor has stopped and can no longer accept commands.
    #[error("room {0} is unavailable")]
    Unavailable(String),
}
