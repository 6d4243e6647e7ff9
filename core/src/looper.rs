//! The playback orchestration engine.
//!
//! A single cooperative loop owns the playlist, drives the player, polls
//! the file source for changes and applies hardware volume. The loop never
//! blocks indefinitely: player stops are bounded, quit is a flag observed
//! at the top of each iteration, and the tick sleep keeps CPU usage down
//! while staying responsive to device churn.

use std::time::Duration;

use log::{debug, info, warn};
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::{ConfigError, LooperError, VolumeError};
use crate::file_reader::FileReader;
use crate::model::{new_resume_slot, Movie, Playlist, ResumeSlot};
use crate::player::{LoopHint, Player};
use crate::playlist::{read_m3u, scan_directories};
use crate::volume::{parse_hw_device, set_hardware_volume, AlsaDevice};

/// Loop tick. Low values shorten the gap between files and make storage
/// changes feel immediate, at the cost of CPU.
const TICK: Duration = Duration::from_millis(2);

/// Bounded wait for the old player to go away when the file source changes.
const PLAYER_STOP_TIMEOUT: Duration = Duration::from_secs(3);

/// How the orchestrator should leave its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitMode {
    /// Stop playback and return.
    Exit,
    /// Stop playback and request a system power-off on the way out.
    PowerOff,
}

/// Handle to a spawned orchestrator.
pub struct LooperHandle {
    join: JoinHandle<Result<(), LooperError>>,
    quit_tx: Option<oneshot::Sender<QuitMode>>,
}

impl LooperHandle {
    /// Request the quit sequence without awaiting completion.
    pub fn request_quit(&mut self, mode: QuitMode) {
        if let Some(tx) = self.quit_tx.take() {
            let _ = tx.send(mode);
        }
    }

    /// Await loop completion without requesting quit. Useful in a `select!`
    /// to catch a fatal error while also listening for signals.
    pub async fn finished(&mut self) -> Result<(), LooperError> {
        match (&mut self.join).await {
            Ok(result) => result,
            Err(e) => Err(LooperError::Task(e)),
        }
    }

    /// Request quit and await completion.
    pub async fn quit(mut self, mode: QuitMode) -> Result<(), LooperError> {
        self.request_quit(mode);
        match self.join.await {
            Ok(result) => result,
            Err(e) => Err(LooperError::Task(e)),
        }
    }

    pub fn abort(self) {
        self.join.abort();
    }
}

/// The main control loop; see the module docs.
pub struct Looper {
    config: Config,
    player: Box<dyn Player>,
    reader: Box<dyn FileReader>,
    resume: ResumeSlot,
    alsa_device: Option<AlsaDevice>,
    /// Hardware volume discovered from a sidecar file; retained across
    /// rebuilds until a later root overrides it.
    hw_volume: Option<String>,
    /// Playback volume in millibels, also sidecar-discovered.
    sound_volume_mb: i32,
    playback_stopped: bool,
    first_start: bool,
}

impl Looper {
    /// Validates the hardware-device configuration up front; a bad value is
    /// an operator error and must not surface mid-loop.
    pub fn new(
        config: Config,
        player: Box<dyn Player>,
        reader: Box<dyn FileReader>,
    ) -> Result<Self, ConfigError> {
        let alsa_device = parse_hw_device(&config.alsa.hw_device)?;
        Ok(Self {
            config,
            player,
            reader,
            resume: new_resume_slot(),
            alsa_device,
            hw_volume: None,
            sound_volume_mb: 0,
            playback_stopped: false,
            first_start: true,
        })
    }

    /// Spawn the loop and return its handle.
    pub fn spawn(self) -> LooperHandle {
        let (quit_tx, quit_rx) = oneshot::channel();
        let join = tokio::spawn(self.run(quit_rx));
        LooperHandle {
            join,
            quit_tx: Some(quit_tx),
        }
    }

    async fn run(mut self, mut quit_rx: oneshot::Receiver<QuitMode>) -> Result<(), LooperError> {
        let mut playlist = self.build_playlist().await;
        self.prepare_to_run_playlist(&playlist).await;
        self.apply_hardware_volume().await?;
        let random = self.config.looper.random;
        let resume = self.config.looper.resume_playlist;
        let mut movie = playlist.get_next(random, resume);

        loop {
            match quit_rx.try_recv() {
                Ok(mode) => {
                    self.quit(mode).await;
                    break;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Closed) => {
                    // Handle dropped without an explicit quit
                    self.quit(QuitMode::Exit).await;
                    break;
                }
            }

            if !self.player.is_playing().await && !self.playback_stopped {
                if let Some(current) = movie.as_mut() {
                    let advance = current.finished()
                        || (self.player.can_loop_count() && current.playcount > 0);
                    if advance {
                        current.clear_playcount();
                        movie = playlist.get_next(random, resume);
                    }
                }
                if let Some(current) = movie.as_mut() {
                    current.was_played();
                    if self.config.looper.wait_seconds > 0 && !self.first_start {
                        info!(
                            "Waiting {} seconds before the next movie",
                            self.config.looper.wait_seconds
                        );
                        tokio::time::sleep(Duration::from_secs(self.config.looper.wait_seconds))
                            .await;
                    }
                    self.first_start = false;
                    let loop_hint = (playlist.length() == 1).then_some(LoopHint::Infinite);
                    info!(
                        "Playing movie: {} {}",
                        current,
                        self.play_info(current, playlist.length())
                    );
                    if let Err(e) = self
                        .player
                        .play(current, loop_hint, self.sound_volume_mb)
                        .await
                    {
                        warn!("Failed to start playback of {}: {}", current.path.display(), e);
                    }
                }
            }

            if !self.playback_stopped && self.reader.is_changed().await {
                info!("File source changed, stopping player");
                self.player.stop(PLAYER_STOP_TIMEOUT).await;
                playlist = self.build_playlist().await;
                self.prepare_to_run_playlist(&playlist).await;
                self.apply_hardware_volume().await?;
                movie = playlist.get_next(random, resume);
            }

            tokio::time::sleep(TICK).await;
        }
        Ok(())
    }

    /// Build a playlist from the configured playlist file when possible,
    /// falling back to a full directory scan on any resolution or format
    /// failure.
    async fn build_playlist(&mut self) -> Playlist {
        let Some(configured) = self.config.looper.playlist_path.clone() else {
            return self.build_playlist_from_scan().await;
        };
        if configured.as_os_str().is_empty() {
            return self.build_playlist_from_scan().await;
        }

        let playlist_path = if configured.is_absolute() {
            if !configured.is_file() {
                info!("Playlist path {} does not exist", configured.display());
                return self.build_playlist_from_scan().await;
            }
            configured
        } else {
            let roots = self.reader.search_paths().await;
            if roots.is_empty() {
                return Playlist::new(Vec::new(), self.resume.clone());
            }
            match roots.iter().map(|r| r.join(&configured)).find(|c| c.is_file()) {
                Some(resolved) => {
                    info!("Playlist path resolved to {}", resolved.display());
                    resolved
                }
                None => {
                    info!(
                        "Playlist path {} does not resolve to any file",
                        configured.display()
                    );
                    return self.build_playlist_from_scan().await;
                }
            }
        };

        let is_m3u = playlist_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("m3u") || e.eq_ignore_ascii_case("m3u8"))
            .unwrap_or(false);
        if !is_m3u {
            info!(
                "Unrecognized playlist format {}",
                playlist_path.display()
            );
            return self.build_playlist_from_scan().await;
        }
        match read_m3u(&playlist_path) {
            Ok(movies) => Playlist::new(movies, self.resume.clone()),
            Err(e) => {
                warn!("Failed to read playlist {}: {}", playlist_path.display(), e);
                self.build_playlist_from_scan().await
            }
        }
    }

    async fn build_playlist_from_scan(&mut self) -> Playlist {
        let roots = self.reader.search_paths().await;
        let hw_vol_file = Some(self.config.alsa.hw_vol_file.as_str());
        let sound_vol_file = Some(self.config.player_cmd.sound_vol_file.as_str());
        let outcome = scan_directories(
            &roots,
            self.player.supported_extensions(),
            hw_vol_file,
            sound_vol_file,
        );
        if let Some(hw_volume) = outcome.hw_volume {
            self.hw_volume = Some(hw_volume);
        }
        if let Some(volume_mb) = outcome.sound_volume_mb {
            self.sound_volume_mb = volume_mb;
        }
        Playlist::new(outcome.movies, self.resume.clone())
    }

    /// Announce a freshly built playlist: countdown when there is media,
    /// idle message when there is none.
    async fn prepare_to_run_playlist(&mut self, playlist: &Playlist) {
        self.first_start = true;
        if playlist.is_empty() {
            info!("{}", self.reader.idle_message());
            return;
        }
        info!(
            "Found {} media file{}.",
            playlist.length(),
            if playlist.length() >= 2 { "s" } else { "" }
        );
        for remaining in (1..=self.config.looper.countdown_seconds).rev() {
            if self.config.looper.osd {
                debug!("Playback starts in {} second{}", remaining, if remaining > 1 { "s" } else { "" });
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    fn play_info(&self, movie: &Movie, playlist_length: usize) -> String {
        if playlist_length == 1 {
            "(endless loop)".to_string()
        } else if self.player.can_loop_count() {
            format!(
                "{} time{} (player counts loops)",
                movie.repeats,
                if movie.repeats > 1 { "s" } else { "" }
            )
        } else {
            format!("{}/{}", movie.playcount, movie.repeats)
        }
    }

    async fn apply_hardware_volume(&self) -> Result<(), VolumeError> {
        if let Some(value) = &self.hw_volume {
            set_hardware_volume(self.alsa_device, &self.config.alsa.hw_vol_control, value).await?;
        }
        Ok(())
    }

    async fn quit(&mut self, mode: QuitMode) {
        info!("Quitting video looper");
        self.playback_stopped = true;
        self.player.stop(PLAYER_STOP_TIMEOUT).await;
        self.reader.shutdown().await;
        if mode == QuitMode::PowerOff {
            info!("Requesting system power-off");
            if let Err(e) = Command::new("sudo").args(["shutdown", "now"]).spawn() {
                warn!("Failed to request power-off: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ReaderBackend};
    use crate::player::PlayerError;
    use async_trait::async_trait;
    use std::fs::File;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct PlayCall {
        title: String,
        loop_hint: Option<LoopHint>,
        volume_mb: i32,
    }

    struct MockPlayer {
        plays: Mutex<Vec<PlayCall>>,
        stops: AtomicUsize,
        extensions: Vec<String>,
    }

    impl MockPlayer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                plays: Mutex::new(Vec::new()),
                stops: AtomicUsize::new(0),
                extensions: vec!["mp4".into()],
            })
        }

        fn plays(&self) -> Vec<PlayCall> {
            self.plays.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Player for Arc<MockPlayer> {
        async fn is_playing(&self) -> bool {
            false
        }

        async fn play(
            &self,
            movie: &Movie,
            loop_hint: Option<LoopHint>,
            volume_mb: i32,
        ) -> Result<(), PlayerError> {
            self.plays.lock().unwrap().push(PlayCall {
                title: movie.title.clone(),
                loop_hint,
                volume_mb,
            });
            Ok(())
        }

        async fn stop(&self, _timeout: Duration) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }

        fn can_loop_count(&self) -> bool {
            false
        }

        fn supported_extensions(&self) -> &[String] {
            &self.extensions
        }
    }

    struct MockReader {
        paths: Vec<PathBuf>,
        changed_once: AtomicBool,
        shut_down: Arc<AtomicBool>,
    }

    impl MockReader {
        fn new(paths: Vec<PathBuf>) -> Self {
            Self {
                paths,
                changed_once: AtomicBool::new(false),
                shut_down: Arc::new(AtomicBool::new(false)),
            }
        }

        fn with_pending_change(paths: Vec<PathBuf>) -> Self {
            Self {
                paths,
                changed_once: AtomicBool::new(true),
                shut_down: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl FileReader for MockReader {
        async fn search_paths(&self) -> Vec<PathBuf> {
            self.paths.clone()
        }

        async fn is_changed(&self) -> bool {
            self.changed_once.swap(false, Ordering::SeqCst)
        }

        fn idle_message(&self) -> String {
            "no media".to_string()
        }

        async fn shutdown(&self) {
            self.shut_down.store(true, Ordering::SeqCst);
        }
    }

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.looper.file_reader = ReaderBackend::Directory;
        config.looper.countdown_seconds = 0;
        config.looper.wait_seconds = 0;
        config
    }

    fn touch(dir: &Path, name: &str) {
        File::create(dir.join(name)).unwrap();
    }

    async fn run_briefly(looper: Looper) -> Result<(), LooperError> {
        let handle = looper.spawn();
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.quit(QuitMode::Exit).await
    }

    #[tokio::test]
    async fn plays_library_in_sorted_order() {
        let library = tempfile::tempdir().unwrap();
        touch(library.path(), "b.mp4");
        touch(library.path(), "a.mp4");
        let player = MockPlayer::new();
        let reader = MockReader::new(vec![library.path().to_path_buf()]);
        let looper = Looper::new(
            fast_config(),
            Box::new(player.clone()),
            Box::new(reader),
        )
        .unwrap();
        run_briefly(looper).await.unwrap();

        let plays = player.plays();
        assert!(plays.len() >= 2, "expected at least two plays, got {plays:?}");
        assert_eq!(plays[0].title, "a");
        assert_eq!(plays[1].title, "b");
        assert!(plays.iter().all(|p| p.loop_hint.is_none()));
        // Quit always stops the player once
        assert!(player.stops.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn single_item_library_gets_the_infinite_loop_hint() {
        let library = tempfile::tempdir().unwrap();
        touch(library.path(), "only.mp4");
        let player = MockPlayer::new();
        let reader = MockReader::new(vec![library.path().to_path_buf()]);
        let looper =
            Looper::new(fast_config(), Box::new(player.clone()), Box::new(reader)).unwrap();
        run_briefly(looper).await.unwrap();

        let plays = player.plays();
        assert!(!plays.is_empty());
        assert_eq!(plays[0].loop_hint, Some(LoopHint::Infinite));
    }

    #[tokio::test]
    async fn quit_releases_the_file_source() {
        let library = tempfile::tempdir().unwrap();
        touch(library.path(), "a.mp4");
        let player = MockPlayer::new();
        let reader = MockReader::new(vec![library.path().to_path_buf()]);
        let shut_down = reader.shut_down.clone();
        let looper =
            Looper::new(fast_config(), Box::new(player.clone()), Box::new(reader)).unwrap();
        run_briefly(looper).await.unwrap();
        assert!(shut_down.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn empty_library_plays_nothing_and_quits_cleanly() {
        let library = tempfile::tempdir().unwrap();
        let player = MockPlayer::new();
        let reader = MockReader::new(vec![library.path().to_path_buf()]);
        let looper =
            Looper::new(fast_config(), Box::new(player.clone()), Box::new(reader)).unwrap();
        run_briefly(looper).await.unwrap();
        assert!(player.plays().is_empty());
    }

    #[tokio::test]
    async fn source_change_stops_player_and_rebuilds() {
        let library = tempfile::tempdir().unwrap();
        touch(library.path(), "a.mp4");
        let player = MockPlayer::new();
        let reader = MockReader::with_pending_change(vec![library.path().to_path_buf()]);
        let looper =
            Looper::new(fast_config(), Box::new(player.clone()), Box::new(reader)).unwrap();
        run_briefly(looper).await.unwrap();
        // One stop for the change, one for quit
        assert!(player.stops.load(Ordering::SeqCst) >= 2);
        assert!(!player.plays().is_empty());
    }

    #[tokio::test]
    async fn sidecar_sound_volume_reaches_the_player() {
        let library = tempfile::tempdir().unwrap();
        touch(library.path(), "a.mp4");
        std::fs::write(library.path().join("sound_vol"), "-600\n").unwrap();
        let mut config = fast_config();
        config.player_cmd.sound_vol_file = "sound_vol".into();
        let player = MockPlayer::new();
        let reader = MockReader::new(vec![library.path().to_path_buf()]);
        let looper = Looper::new(config, Box::new(player.clone()), Box::new(reader)).unwrap();
        run_briefly(looper).await.unwrap();
        assert_eq!(player.plays()[0].volume_mb, -600);
    }

    #[tokio::test]
    async fn relative_playlist_file_is_resolved_against_roots() {
        let library = tempfile::tempdir().unwrap();
        touch(library.path(), "a.mp4");
        touch(library.path(), "b.mp4");
        std::fs::write(
            library.path().join("list.m3u"),
            "# comment\nb.mp4\na.mp4\n",
        )
        .unwrap();
        let mut config = fast_config();
        config.looper.playlist_path = Some(PathBuf::from("list.m3u"));
        let player = MockPlayer::new();
        let reader = MockReader::new(vec![library.path().to_path_buf()]);
        let mut looper =
            Looper::new(config, Box::new(player.clone()), Box::new(reader)).unwrap();
        let mut playlist = looper.build_playlist().await;
        assert_eq!(playlist.length(), 2);
        // m3u order is preserved, not sorted
        assert_eq!(playlist.get_next(false, false).unwrap().title, "b");
    }

    #[tokio::test]
    async fn unresolvable_playlist_path_falls_back_to_scan() {
        let library = tempfile::tempdir().unwrap();
        touch(library.path(), "a.mp4");
        let mut config = fast_config();
        config.looper.playlist_path = Some(PathBuf::from("/nonexistent/list.m3u"));
        let player = MockPlayer::new();
        let reader = MockReader::new(vec![library.path().to_path_buf()]);
        let mut looper =
            Looper::new(config, Box::new(player.clone()), Box::new(reader)).unwrap();
        let playlist = looper.build_playlist().await;
        assert_eq!(playlist.length(), 1);
    }

    #[tokio::test]
    async fn unknown_playlist_format_falls_back_to_scan() {
        let library = tempfile::tempdir().unwrap();
        touch(library.path(), "a.mp4");
        std::fs::write(library.path().join("list.pls"), "a.mp4\n").unwrap();
        let mut config = fast_config();
        config.looper.playlist_path = Some(PathBuf::from("list.pls"));
        let player = MockPlayer::new();
        let reader = MockReader::new(vec![library.path().to_path_buf()]);
        let mut looper =
            Looper::new(config, Box::new(player.clone()), Box::new(reader)).unwrap();
        let playlist = looper.build_playlist().await;
        // Fallback scans the whole library (the .pls file itself is not media)
        assert_eq!(playlist.length(), 1);
    }

    #[tokio::test]
    async fn relative_playlist_with_no_roots_yields_empty_playlist() {
        let mut config = fast_config();
        config.looper.playlist_path = Some(PathBuf::from("list.m3u"));
        let player = MockPlayer::new();
        let reader = MockReader::new(Vec::new());
        let mut looper =
            Looper::new(config, Box::new(player.clone()), Box::new(reader)).unwrap();
        let playlist = looper.build_playlist().await;
        assert_eq!(playlist.length(), 0);
    }
}
