//! Room registry: creates, finds, and destroys room actors by slug.
//!
//! The manager itself holds no room state, only [`RoomHandle`]s. All
//! per-room work happens inside the actors, so the manager can sit behind
//! a single async `Mutex` on the server without becoming a bottleneck:
//! callers lock it just long enough to clone a handle.

use std::collections::HashMap;
use std::sync::Arc;

use bingo_session::Authenticator;

use crate::room::spawn_room;
use crate::{
    CardGenerator, RoomConfig, RoomError, RoomHandle, RoomInfo, RoomSettings,
    ShuffleGenerator,
};

/// Tracks every running room, keyed by slug.
pub struct RoomManager {
    rooms: HashMap<String, RoomHandle>,
    config: RoomConfig,
    generator: Arc<dyn CardGenerator>,
}

impl RoomManager {
    /// A manager whose rooms use the [`ShuffleGenerator`].
    pub fn new(config: RoomConfig) -> Self {
        Self::with_generator(config, Arc::new(ShuffleGenerator))
    }

    pub fn with_generator(
        config: RoomConfig,
        generator: Arc<dyn CardGenerator>,
    ) -> Self {
        Self {
            rooms: HashMap::new(),
            config,
            generator,
        }
    }

    /// Validates `settings`, generates the first board, and starts the
    /// room's actor.
    ///
    /// # Errors
    /// - [`RoomError::AlreadyExists`] if the slug is taken
    /// - [`RoomError::InvalidSettings`] if the settings or the manager's
    ///   [`RoomConfig`] don't validate
    /// - [`RoomError::Generation`] if no initial board can be built
    pub fn create_room(
        &mut self,
        settings: RoomSettings,
    ) -> Result<RoomHandle, RoomError> {
        self.create_room_with(settings, None)
    }

    /// Like [`create_room`](Self::create_room) but with a custom
    /// authenticator instead of the settings' passwords.
    pub fn create_room_with(
        &mut self,
        settings: RoomSettings,
        authenticator: Option<Arc<dyn Authenticator>>,
    ) -> Result<RoomHandle, RoomError> {
        self.config.validate()?;
        settings.validate()?;
        if self.rooms.contains_key(&settings.slug) {
            return Err(RoomError::AlreadyExists(settings.slug));
        }

        let slug = settings.slug.clone();
        let handle = spawn_room(
            settings,
            self.config.clone(),
            Arc::clone(&self.generator),
            authenticator,
        )?;
        self.rooms.insert(slug.clone(), handle.clone());
        tracing::info!(room = %slug, "room created");
        Ok(handle)
    }

    /// Looks up a room by slug.
    pub fn get(&self, slug: &str) -> Option<RoomHandle> {
        self.rooms.get(slug).cloned()
    }

    /// Shuts a room down and forgets it. Its sockets receive
    /// `disconnected` and are closed.
    ///
    /// # Errors
    /// Returns [`RoomError::NotFound`] if no room has this slug.
    pub async fn destroy_room(&mut self, slug: &str) -> Result<(), RoomError> {
        let handle = self
            .rooms
            .remove(slug)
            .ok_or_else(|| RoomError::NotFound(slug.to_owned()))?;

        // The actor may already be gone; either way it's removed here.
        let _ = handle.shutdown().await;

        tracing::info!(room = %slug, "room destroyed");
        Ok(())
    }

    /// Snapshots every room that still answers.
    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let mut infos = Vec::with_capacity(self.rooms.len());
        for handle in self.rooms.values() {
            if let Ok(info) = handle.info().await {
                infos.push(info);
            }
        }
        infos.sort_by(|a, b| a.room_data.slug.cmp(&b.room_data.slug));
        infos
    }

    pub fn room_handles(&self) -> Vec<RoomHandle> {
        self.rooms.values().cloned().collect()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn slugs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = self.rooms.keys().cloned().collect();
        slugs.sort();
        slugs
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new(RoomConfig::default())
    }
}
