//! Typed configuration for the looper service.
//!
//! The whole configuration is read once at startup from a TOML file and
//! validated up front; anything invalid surfaces as a [`ConfigError`]
//! before the orchestration loop starts.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Which player implementation to instantiate at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerBackend {
    /// Spawns an external player process per movie.
    Process,
}

/// Which file-source implementation to instantiate at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderBackend {
    /// A fixed local directory, never changes.
    Directory,
    /// USB drives with automatic mounting and content ingestion.
    UsbCopy,
}

/// Content ingestion policy for removable media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyMode {
    /// Copy new files next to the existing library.
    Add,
    /// Wipe matching files from the library first, then copy.
    Replace,
}

impl fmt::Display for CopyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyMode::Add => write!(f, "add"),
            CopyMode::Replace => write!(f, "replace"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LooperConfig {
    pub player: PlayerBackend,
    pub file_reader: ReaderBackend,
    /// Pick movies uniformly at random instead of in sorted order.
    pub random: bool,
    /// Remember the playlist position across rebuilds.
    pub resume_playlist: bool,
    /// Seconds counted down before the first playback of a session.
    pub countdown_seconds: u64,
    /// Seconds to pause between two items.
    pub wait_seconds: u64,
    /// Show countdown/idle text on the console.
    pub osd: bool,
    /// Optional playlist file. Absolute, or relative to any file-source root.
    pub playlist_path: Option<PathBuf>,
}

impl Default for LooperConfig {
    fn default() -> Self {
        Self {
            player: PlayerBackend::Process,
            file_reader: ReaderBackend::UsbCopy,
            random: false,
            resume_playlist: false,
            countdown_seconds: 10,
            wait_seconds: 0,
            osd: true,
            playlist_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// The local media library. Ingestion copies into this directory and
    /// the directory reader serves straight out of it.
    pub path: PathBuf,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/home/pi/video"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UsbDriveConfig {
    /// Mount points are created below this directory, one per drive.
    pub mount_root: PathBuf,
    /// Mount drives read-only. Recommended; the appliance never needs to
    /// write to removable media.
    pub readonly: bool,
}

impl Default for UsbDriveConfig {
    fn default() -> Self {
        Self {
            mount_root: PathBuf::from("/mnt/usbdrive"),
            readonly: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CopymodeConfig {
    pub mode: CopyMode,
    /// When non-empty, a drive must carry a file with this name (with or
    /// without extension) at its root before anything is copied from it.
    pub password: String,
    /// Copy a `loader.png` boot splash from the drive if present.
    pub copyloader: bool,
    /// Where the loader image lands.
    pub loader_target: PathBuf,
}

impl Default for CopymodeConfig {
    fn default() -> Self {
        Self {
            mode: CopyMode::Replace,
            password: String::new(),
            copyloader: false,
            loader_target: PathBuf::from("/home/pi/loader.png"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AlsaConfig {
    /// Either "card,device" (e.g. "0,0") or an ALSA card display name.
    /// Empty means: never touch the mixer.
    pub hw_device: String,
    /// Mixer simple control to set, e.g. "PCM".
    pub hw_vol_control: String,
    /// Name of a sidecar file carrying the hardware volume, looked for in
    /// every scanned media root. Empty disables the lookup.
    pub hw_vol_file: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerCmdConfig {
    /// Player executable.
    pub command: String,
    /// Arguments always passed, before the movie path.
    pub args: Vec<String>,
    /// Argument appended when the player should loop a single item forever.
    pub loop_arg: Option<String>,
    /// Argument that takes the volume value (millibels) as its successor.
    pub volume_arg: Option<String>,
    /// Media file extensions this player accepts, without dots.
    pub extensions: Vec<String>,
    /// Name of a sidecar file carrying the playback volume, looked for in
    /// every scanned media root. Empty disables the lookup.
    pub sound_vol_file: String,
}

impl Default for PlayerCmdConfig {
    fn default() -> Self {
        Self {
            command: String::from("mpv"),
            args: vec![
                String::from("--fullscreen"),
                String::from("--no-terminal"),
            ],
            loop_arg: Some(String::from("--loop-file=inf")),
            volume_arg: None,
            extensions: ["avi", "mov", "mkv", "mp4", "m4v"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            sound_vol_file: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub looper: LooperConfig,
    pub directory: DirectoryConfig,
    pub usb_drive: UsbDriveConfig,
    pub copymode: CopymodeConfig,
    pub alsa: AlsaConfig,
    pub player_cmd: PlayerCmdConfig,
}

impl Config {
    /// Read and validate the configuration file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.player_cmd.command.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "player_cmd.command",
                detail: "player command must not be empty".into(),
            });
        }
        if self.player_cmd.extensions.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "player_cmd.extensions",
                detail: "at least one media extension is required".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.looper.player, PlayerBackend::Process);
        assert_eq!(config.looper.file_reader, ReaderBackend::UsbCopy);
        assert_eq!(config.looper.countdown_seconds, 10);
        assert_eq!(config.copymode.mode, CopyMode::Replace);
        assert!(config.usb_drive.readonly);
        assert!(config.alsa.hw_device.is_empty());
    }

    #[test]
    fn parses_sections() {
        let config: Config = toml::from_str(
            r#"
            [looper]
            file_reader = "directory"
            random = true
            wait_seconds = 5
            playlist_path = "shows.m3u"

            [directory]
            path = "/var/media"

            [copymode]
            mode = "add"
            password = "secret"

            [alsa]
            hw_device = "0,0"
            hw_vol_control = "PCM"
            "#,
        )
        .unwrap();
        assert_eq!(config.looper.file_reader, ReaderBackend::Directory);
        assert!(config.looper.random);
        assert_eq!(config.looper.wait_seconds, 5);
        assert_eq!(config.looper.playlist_path.as_deref(), Some(Path::new("shows.m3u")));
        assert_eq!(config.directory.path, PathBuf::from("/var/media"));
        assert_eq!(config.copymode.mode, CopyMode::Add);
        assert_eq!(config.copymode.password, "secret");
    }

    #[test]
    fn rejects_unknown_copy_mode() {
        let err = toml::from_str::<Config>("[copymode]\nmode = \"merge\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load(Path::new("/nonexistent/looper.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn load_rejects_empty_player_command() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[player_cmd]\ncommand = \"\"").unwrap();
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "player_cmd.command",
                ..
            }
        ));
    }
}
