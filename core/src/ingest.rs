//! Content ingestion from mounted removable media into the local library.
//!
//! Trigger files at the source root steer the copy: a password file gates
//! the whole root, `replace`/`add` override the configured copy mode, and a
//! `loader.png` optionally replaces the boot splash. Every per-file I/O
//! error is logged and skipped; one bad file or root never aborts the batch.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::CopyMode;
use crate::playlist::{extension_matches, is_hidden};

const COPY_CHUNK_SIZE: usize = 16 * 1024;

/// Wait after spotting a loader image before reading it; freshly mounted
/// drives have been seen serving truncated reads while still settling.
const LOADER_SETTLE_DELAY: Duration = Duration::from_secs(2);

const LOADER_FILE_NAME: &str = "loader.png";

pub struct IngestionPipeline {
    target: PathBuf,
    default_mode: CopyMode,
    password: String,
    copy_loader: bool,
    loader_target: PathBuf,
    extensions: Vec<String>,
}

impl IngestionPipeline {
    pub fn new(
        target: PathBuf,
        default_mode: CopyMode,
        password: String,
        copy_loader: bool,
        loader_target: PathBuf,
        extensions: Vec<String>,
    ) -> Self {
        Self {
            target,
            default_mode,
            password,
            copy_loader,
            loader_target,
            extensions,
        }
    }

    /// Copy qualifying media from each source root into the target library.
    pub async fn copy_files(&self, source_roots: &[PathBuf]) {
        for root in source_roots {
            if !root.is_dir() {
                continue;
            }
            if !self.password.is_empty() && !trigger_exists(root, &self.password) {
                debug!(
                    "No password file on {}, not copying from it",
                    root.display()
                );
                continue;
            }
            let (mode, mode_origin) = self.effective_mode(root);
            info!(
                "Copying from {} in {} mode ({})",
                root.display(),
                mode,
                mode_origin
            );
            if mode == CopyMode::Replace {
                self.clear_target();
            }
            self.copy_root(root);
            if self.copy_loader && root.join(LOADER_FILE_NAME).is_file() {
                tokio::time::sleep(LOADER_SETTLE_DELAY).await;
                self.copy_one(&root.join(LOADER_FILE_NAME), &self.loader_target);
            }
        }
    }

    /// Copy mode for one root: a single `replace` or `add` trigger file
    /// overrides the configured default; both present falls back to the
    /// default (the ambiguous override is ignored, not an error).
    fn effective_mode(&self, root: &Path) -> (CopyMode, &'static str) {
        let replace = trigger_exists(root, "replace");
        let add = trigger_exists(root, "add");
        match (replace, add) {
            (true, false) => (CopyMode::Replace, "overridden"),
            (false, true) => (CopyMode::Add, "overridden"),
            _ => (self.default_mode, "from config"),
        }
    }

    /// Delete every non-hidden, extension-matching file in the target
    /// library before a replace-mode copy.
    fn clear_target(&self) {
        let entries = match fs::read_dir(&self.target) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to list target {}: {}", self.target.display(), e);
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if is_hidden(name) || !extension_matches(name, &self.extensions) {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => debug!("Removed {}", entry.path().display()),
                Err(e) => warn!("Failed to remove {}: {}", entry.path().display(), e),
            }
        }
    }

    fn copy_root(&self, root: &Path) {
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to list source {}: {}", root.display(), e);
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if is_hidden(name) || !extension_matches(name, &self.extensions) {
                continue;
            }
            if entry.path().is_dir() {
                continue;
            }
            self.copy_one(&entry.path(), &self.target.join(name));
        }
    }

    /// Copy a single file, logging progress in 10% steps. Failures are
    /// logged and leave a partial target behind; the next ingestion run
    /// overwrites it.
    fn copy_one(&self, src: &Path, dst: &Path) {
        let mut last_reported = 0u64;
        let result = copy_with_progress(src, dst, |copied, total| {
            if total == 0 {
                return;
            }
            let percent = copied * 100 / total;
            if percent >= last_reported + 10 {
                last_reported = percent - percent % 10;
                debug!("Copying {}: {}%", src.display(), percent);
            }
        });
        match result {
            Ok(bytes) => info!("Copied {} -> {} ({} bytes)", src.display(), dst.display(), bytes),
            Err(e) => warn!("Failed to copy {}: {}", src.display(), e),
        }
    }
}

/// True when `<root>/<name>` exists, with or without any extension.
pub fn trigger_exists(root: &Path, name: &str) -> bool {
    if root.join(name).exists() {
        return true;
    }
    let prefix = format!("{name}.");
    fs::read_dir(root)
        .map(|entries| {
            entries
                .flatten()
                .any(|e| e.file_name().to_string_lossy().starts_with(&prefix))
        })
        .unwrap_or(false)
}

/// Chunked file copy with a byte-level progress callback. Overwrites the
/// destination.
pub fn copy_with_progress<F>(src: &Path, dst: &Path, mut progress: F) -> io::Result<u64>
where
    F: FnMut(u64, u64),
{
    let total = fs::metadata(src)?.len();
    let mut reader = fs::File::open(src)?;
    let mut writer = fs::File::create(dst)?;
    let mut buf = [0u8; COPY_CHUNK_SIZE];
    let mut copied = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
        copied += n as u64;
        progress(copied, total);
    }
    writer.flush()?;
    Ok(copied)
}
