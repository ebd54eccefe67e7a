//! Room configuration.
//!
//! Two kinds of configuration live here:
//!
//! - [`RoomSettings`]: what one room *is*: name, slug, passwords, game.
//!   Loaded from the rooms file, so it derives serde.
//! - [`RoomConfig`]: how every room actor *behaves*: history limits,
//!   sweep cadence, channel sizes, token TTL. Built in code with
//!   `Default` plus struct-update syntax.

use std::time::Duration;

use bingo_protocol::{Goal, RaceHandler, RoomData};
use bingo_session::SessionConfig;
use serde::{Deserialize, Serialize};

use crate::RoomError;

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Runtime behavior shared by every room actor.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Oldest chat lines are dropped once the history reaches this length.
    pub max_chat_history: usize,

    /// How often the actor expires idle tokens.
    pub token_sweep_interval: Duration,

    /// Capacity of each actor's command channel.
    pub channel_size: usize,

    /// Token TTL for every room.
    pub session: SessionConfig,
}

impl RoomConfig {
    /// Rejects values the actor cannot run with.
    ///
    /// # Errors
    /// Returns [`RoomError::InvalidSettings`] for a zero sweep interval or
    /// a zero channel size.
    pub fn validate(&self) -> Result<(), RoomError> {
        if self.token_sweep_interval.is_zero() {
            return Err(RoomError::InvalidSettings(
                "token sweep interval must be non-zero".into(),
            ));
        }
        if self.channel_size == 0 {
            return Err(RoomError::InvalidSettings(
                "room channel size must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_chat_history: 500,
            token_sweep_interval: Duration::from_secs(60),
            channel_size: 64,
            session: SessionConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// RoomSettings
// ---------------------------------------------------------------------------

/// The game a room plays and the inputs its card generator needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSettings {
    pub name: String,

    /// New cards start hidden until someone reveals them.
    #[serde(default)]
    pub hide_card: bool,

    /// Goal catalog handed to the card generator.
    #[serde(default)]
    pub goals: Vec<Goal>,
}

/// One room as listed in the rooms file.
///
/// ```json
/// {
///   "name": "Sunday Race",
///   "slug": "sunday-race",
///   "password": "hunter2",
///   "monitorPassword": "mod-only",
///   "raceHandler": "local",
///   "game": { "name": "Super Mario 64", "hideCard": true, "goals": [] }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    pub name: String,
    pub slug: String,
    pub password: String,
    #[serde(default)]
    pub monitor_password: Option<String>,
    pub game: GameSettings,
    #[serde(default)]
    pub race_handler: Option<RaceHandler>,
}

impl RoomSettings {
    /// Checks the fields the room relies on.
    ///
    /// Slugs appear in URLs, so they are limited to lowercase ASCII
    /// letters, digits, and `-`.
    ///
    /// # Errors
    /// Returns [`RoomError::InvalidSettings`] describing the first problem.
    pub fn validate(&self) -> Result<(), RoomError> {
        if self.name.trim().is_empty() {
            return Err(RoomError::InvalidSettings("room name is empty".into()));
        }
        if self.slug.is_empty()
            || !self
                .slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(RoomError::InvalidSettings(format!(
                "slug {:?} must be lowercase letters, digits, or '-'",
                self.slug
            )));
        }
        Ok(())
    }

    /// The room data clients see before any race activity.
    pub fn initial_room_data(&self) -> RoomData {
        RoomData {
            name: self.name.clone(),
            game: self.game.name.clone(),
            slug: self.slug.clone(),
            race_handler: self.race_handler,
            started_at: None,
            finished_at: None,
            racetime_connection: None,
        }
    }
}
