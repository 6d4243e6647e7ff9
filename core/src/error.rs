use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Startup configuration problems. These are fatal: the operator gets the
/// message and the process exits, nothing tries to recover from them.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {detail}")]
    InvalidValue { key: &'static str, detail: String },
    #[error("no ALSA card matches {0:?}")]
    UnknownAlsaCard(String),
}

/// Hardware mixer failures. Deliberately fatal: a kiosk that silently plays
/// at the wrong volume is worse than one that restarts.
#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("failed to run amixer: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("amixer exited with {status}: {stderr}")]
    CommandFailed { status: ExitStatus, stderr: String },
}

/// Errors that terminate the orchestration loop.
#[derive(Debug, Error)]
pub enum LooperError {
    #[error(transparent)]
    Volume(#[from] VolumeError),
    #[error("orchestrator task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
