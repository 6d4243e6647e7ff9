use std::path::PathBuf;

use anyhow::Context;
use log::info;
use looper_core::{create_player, create_reader, Config, Looper, QuitMode};

const DEFAULT_CONFIG_PATH: &str = "/boot/video_looper.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    info!("Loading configuration from {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    let player = create_player(&config);
    let extensions = player.supported_extensions().to_vec();
    let reader = create_reader(&config, &extensions).context("failed to set up file source")?;

    let looper = Looper::new(config, player, reader)?;
    let mut handle = looper.spawn();

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        result = handle.finished() => {
            return result.map_err(Into::into);
        }
    }
    handle.quit(QuitMode::Exit).await?;
    Ok(())
}
