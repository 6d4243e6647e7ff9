//! Core library of the video looper appliance.
//!
//! Everything the service binary needs lives here: typed configuration,
//! the playlist model, player and file-source abstractions with their
//! process/directory/USB implementations, and the orchestration loop that
//! ties them together.

pub mod config;
pub mod error;
pub mod file_reader;
pub mod ingest;
pub mod looper;
pub mod model;
pub mod mount;
pub mod player;
pub mod players;
pub mod playlist;
pub mod readers;
pub mod registry;
pub mod service;
pub mod storage;
pub mod volume;

pub use config::Config;
pub use error::{ConfigError, LooperError};
pub use looper::{Looper, LooperHandle, QuitMode};
pub use registry::{create_player, create_reader};
pub use service::{spawn_service, ServiceHandle, StopHandle};
