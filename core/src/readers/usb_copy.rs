//! File source backed by USB drives with automatic content ingestion.
//!
//! Media is never served from the drives directly: every `search_paths`
//! call mounts whatever is attached, runs the ingestion pipeline against
//! the mounted roots, and then hands back the local library as the single
//! search path. Unplugging a drive mid-copy at worst leaves a partial file
//! that the next ingestion run overwrites.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use log::warn;

use crate::config::{Config, CopyMode};
use crate::file_reader::FileReader;
use crate::ingest::IngestionPipeline;
use crate::mount::MountManager;
use crate::storage::StorageMonitor;

pub struct UsbCopyReader {
    monitor: StorageMonitor,
    mounter: tokio::sync::Mutex<MountManager>,
    pipeline: IngestionPipeline,
    target: PathBuf,
    copy_mode: CopyMode,
}

impl UsbCopyReader {
    /// Create the reader and start the storage watcher. The target library
    /// directory is created if missing.
    pub fn new(config: &Config, extensions: &[String]) -> anyhow::Result<Self> {
        let target = config.directory.path.clone();
        fs::create_dir_all(&target)
            .with_context(|| format!("failed to create media library {}", target.display()))?;
        let monitor = StorageMonitor::start()?;
        let mounter = MountManager::new(
            config.usb_drive.mount_root.clone(),
            config.usb_drive.readonly,
        );
        let pipeline = IngestionPipeline::new(
            target.clone(),
            config.copymode.mode,
            config.copymode.password.clone(),
            config.copymode.copyloader,
            config.copymode.loader_target.clone(),
            extensions.to_vec(),
        );
        Ok(Self {
            monitor,
            mounter: tokio::sync::Mutex::new(mounter),
            pipeline,
            target,
            copy_mode: config.copymode.mode,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_parts(
        monitor: StorageMonitor,
        mounter: MountManager,
        pipeline: IngestionPipeline,
        target: PathBuf,
        copy_mode: CopyMode,
    ) -> Self {
        Self {
            monitor,
            mounter: tokio::sync::Mutex::new(mounter),
            pipeline,
            target,
            copy_mode,
        }
    }

    #[cfg(test)]
    pub(crate) async fn mounted_roots(&self) -> Vec<PathBuf> {
        self.mounter.lock().await.mounted_paths()
    }
}

#[async_trait]
impl FileReader for UsbCopyReader {
    async fn search_paths(&self) -> Vec<PathBuf> {
        let nodes = self.monitor.list_nodes();
        let roots = {
            let mut mounter = self.mounter.lock().await;
            // Reconcile even when the last drive is gone, so a stale mount
            // point does not linger until the next attach.
            mounter.unmount_missing(&nodes).await;
            if nodes.is_empty() {
                Vec::new()
            } else {
                mounter.mount_all(&nodes).await;
                mounter.mounted_paths()
            }
        };
        if !nodes.is_empty() {
            if roots.is_empty() {
                warn!("USB drives detected but none could be mounted");
            }
            self.pipeline.copy_files(&roots).await;
        }
        vec![self.target.clone()]
    }

    async fn is_changed(&self) -> bool {
        // Edge-triggered on any attach/detach, but only worth a rebuild
        // while something is actually attached.
        self.monitor.poll_changes() && self.monitor.has_nodes()
    }

    fn idle_message(&self) -> String {
        format!(
            "Insert USB drive with compatible movies. Copy mode: {} - files are copied to local storage.",
            self.copy_mode
        )
    }

    async fn shutdown(&self) {
        self.monitor.shutdown().await;
    }
}
