use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::Movie;

/// Instruction to the player backend about looping a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopHint {
    /// Loop the item internally forever instead of being re-invoked per
    /// cycle. Used when the playlist has exactly one entry.
    Infinite,
}

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("failed to launch player process: {0}")]
    Launch(#[source] std::io::Error),
    #[error("player i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// A video player backend.
///
/// The orchestrator only ever polls `is_playing` and reacts; it never learns
/// why playback ended, so a crashed player looks exactly like a finished one
/// and simply gets re-driven.
#[async_trait]
pub trait Player: Send + Sync {
    /// Whether the player is currently running a movie.
    async fn is_playing(&self) -> bool;

    /// Start playback. Any already-running playback is stopped first.
    async fn play(
        &self,
        movie: &Movie,
        loop_hint: Option<LoopHint>,
        volume_mb: i32,
    ) -> Result<(), PlayerError>;

    /// Stop playback, waiting at most `timeout` for the player to go away.
    async fn stop(&self, timeout: Duration);

    /// Whether the backend counts loops natively (so the orchestrator must
    /// not re-invoke it per repeat).
    fn can_loop_count(&self) -> bool;

    /// Media file extensions this backend accepts, without dots.
    fn supported_extensions(&self) -> &[String];
}
