//! Maps the configured backend names onto concrete implementations.

use anyhow::Result;

use crate::config::{Config, PlayerBackend, ReaderBackend};
use crate::file_reader::FileReader;
use crate::player::Player;
use crate::players::ProcessPlayer;
use crate::readers::{DirectoryReader, UsbCopyReader};

pub fn create_player(config: &Config) -> Box<dyn Player> {
    match config.looper.player {
        PlayerBackend::Process => Box::new(ProcessPlayer::from_config(&config.player_cmd)),
    }
}

/// Build the configured file source. The USB variant starts its storage
/// monitor here, so this must run inside a tokio runtime.
pub fn create_reader(config: &Config, extensions: &[String]) -> Result<Box<dyn FileReader>> {
    Ok(match config.looper.file_reader {
        ReaderBackend::Directory => Box::new(DirectoryReader::new(config.directory.path.clone())),
        ReaderBackend::UsbCopy => Box::new(UsbCopyReader::new(config, extensions)?),
    })
}
