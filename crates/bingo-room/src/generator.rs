//! The card generation seam.
//!
//! How a board's goals are chosen is not the room's business. The room
//! hands a [`CardRequest`] to whatever [`CardGenerator`] it was built
//! with and lays the returned goals out row by row. [`ShuffleGenerator`]
//! is the reference implementation: a seeded shuffle of the game's goal
//! catalog.

use bingo_protocol::{BOARD_CELLS, GenerationMode, Goal};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::{GameSettings, RoomError};

/// Everything a generator may look at. All fields come straight from the
/// `newCard` action or the room's settings.
#[derive(Debug, Clone, Copy)]
pub struct CardRequest<'a> {
    pub game: &'a GameSettings,
    pub seed: Option<u64>,
    pub mode: &'a GenerationMode,
    pub difficulty: Option<u32>,
}

/// Produces the goals for a new board.
///
/// Implementations must return exactly [`BOARD_CELLS`] goals; anything
/// else is reported by the room as a generation failure.
pub trait CardGenerator: Send + Sync + 'static {
    /// # Errors
    /// Returns [`RoomError::Generation`] if no board can be produced.
    fn generate(&self, request: &CardRequest<'_>) -> Result<Vec<Goal>, RoomError>;
}

/// Picks 25 goals from the catalog with a seeded RNG.
///
/// Only the `"random"` mode is supported. A `difficulty` limits the pool
/// to goals at or below that difficulty; goals without one always qualify.
/// The same seed over the same catalog yields the same board.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShuffleGenerator;

impl CardGenerator for ShuffleGenerator {
    fn generate(&self, request: &CardRequest<'_>) -> Result<Vec<Goal>, RoomError> {
        if *request.mode != GenerationMode::default() {
            return Err(RoomError::Generation(format!(
                "unsupported generation mode {:?}",
                request.mode.0
            )));
        }

        let mut pool: Vec<&Goal> = request
            .game
            .goals
            .iter()
            .filter(|goal| match (request.difficulty, goal.difficulty) {
                (Some(limit), Some(d)) => d <= limit,
                _ => true,
            })
            .collect();

        if pool.len() < BOARD_CELLS {
            return Err(RoomError::Generation(format!(
                "{} needs {BOARD_CELLS} goals, only {} available",
                request.game.name,
                pool.len()
            )));
        }

        let seed = request.seed.unwrap_or_else(|| rand::rng().random());
        let mut rng = StdRng::seed_from_u64(seed);
        let (picked, _) = pool.partial_shuffle(&mut rng, BOARD_CELLS);
        Ok(picked.iter().map(|&goal| goal.clone()).collect())
    }
}
