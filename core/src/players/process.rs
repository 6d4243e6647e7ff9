//! Player backend that drives an external player process per movie.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::config::PlayerCmdConfig;
use crate::model::Movie;
use crate::player::{LoopHint, Player, PlayerError};

pub struct ProcessPlayer {
    command: String,
    args: Vec<String>,
    loop_arg: Option<String>,
    volume_arg: Option<String>,
    extensions: Vec<String>,
    child: Mutex<Option<Child>>,
}

impl ProcessPlayer {
    pub fn from_config(config: &PlayerCmdConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            loop_arg: config.loop_arg.clone(),
            volume_arg: config.volume_arg.clone(),
            extensions: config.extensions.clone(),
            child: Mutex::new(None),
        }
    }

    fn build_args(&self, movie: &Movie, loop_hint: Option<LoopHint>, volume_mb: i32) -> Vec<String> {
        let mut args = self.args.clone();
        if let (Some(volume_arg), true) = (&self.volume_arg, volume_mb != 0) {
            args.push(volume_arg.clone());
            args.push(volume_mb.to_string());
        }
        if let (Some(loop_arg), Some(LoopHint::Infinite)) = (&self.loop_arg, loop_hint) {
            args.push(loop_arg.clone());
        }
        args.push(movie.path.to_string_lossy().into_owned());
        args
    }
}

#[async_trait]
impl Player for ProcessPlayer {
    async fn is_playing(&self) -> bool {
        let mut guard = self.child.lock().await;
        match guard.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(None) => true,
                Ok(Some(status)) => {
                    debug!("Player process exited with {}", status);
                    *guard = None;
                    false
                }
                Err(e) => {
                    warn!("Failed to query player process: {}", e);
                    *guard = None;
                    false
                }
            },
            None => false,
        }
    }

    async fn play(
        &self,
        movie: &Movie,
        loop_hint: Option<LoopHint>,
        volume_mb: i32,
    ) -> Result<(), PlayerError> {
        self.stop(Duration::from_secs(3)).await;
        let args = self.build_args(movie, loop_hint, volume_mb);
        debug!("Launching {} {}", self.command, args.join(" "));
        let child = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(PlayerError::Launch)?;
        *self.child.lock().await = Some(child);
        Ok(())
    }

    async fn stop(&self, timeout: Duration) {
        let mut guard = self.child.lock().await;
        let Some(mut child) = guard.take() else {
            return;
        };
        drop(guard);
        if let Err(e) = child.start_kill() {
            debug!("Player process already gone: {}", e);
            return;
        }
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => debug!("Player process stopped with {}", status),
            Ok(Err(e)) => warn!("Failed to reap player process: {}", e),
            Err(_) => {
                warn!("Player process did not exit within {:?}", timeout);
                let _ = child.kill().await;
            }
        }
    }

    fn can_loop_count(&self) -> bool {
        // The process backend re-invokes the player per repeat; it has no
        // way to observe loop completions inside the child.
        false
    }

    fn supported_extensions(&self) -> &[String] {
        &self.extensions
    }
}
