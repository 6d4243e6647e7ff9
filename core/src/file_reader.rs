use std::path::PathBuf;

use async_trait::async_trait;

/// Abstraction over "where do media files currently live".
///
/// Backed either by a fixed local directory or by the USB ingestion
/// pipeline; the orchestrator rebuilds its playlist whenever `is_changed`
/// fires.
#[async_trait]
pub trait FileReader: Send + Sync {
    /// Directories to scan for media. May have side effects: the USB
    /// variant mounts drives and ingests their content here.
    async fn search_paths(&self) -> Vec<PathBuf>;

    /// Edge-triggered: true once after the set of media sources changed.
    async fn is_changed(&self) -> bool;

    /// Operator-facing message shown while no media is available.
    fn idle_message(&self) -> String;

    /// Release background resources (watcher tasks and the like). Called
    /// once during the quit sequence; the default source has none.
    async fn shutdown(&self) {}
}
