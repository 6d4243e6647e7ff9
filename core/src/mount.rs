//! Mounting of detected storage nodes under a fixed root.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use thiserror::Error;
use tokio::process::Command;

use crate::storage::StorageNode;

#[derive(Debug, Error)]
pub enum MountError {
    #[error("failed to create mount point {path}: {source}")]
    CreateMountPoint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to run mount: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("mount of {device} failed: {detail}")]
    MountFailed { device: PathBuf, detail: String },
}

/// Deterministic mount point for a node: keyed by filesystem UUID, so the
/// same drive always lands in the same place and two drives never collide.
pub fn mount_point_for(root: &Path, node: &StorageNode) -> PathBuf {
    root.join(&node.fs_uuid)
}

/// Owns the mapping from storage nodes to mount points below a fixed root.
///
/// Mounting is idempotent per node; a failure to mount one node is logged
/// and skipped without affecting the rest of the batch.
pub struct MountManager {
    root: PathBuf,
    readonly: bool,
    mounted: HashMap<PathBuf, PathBuf>, // device path -> mount point
}

impl MountManager {
    pub fn new(root: PathBuf, readonly: bool) -> Self {
        Self {
            root,
            readonly,
            mounted: HashMap::new(),
        }
    }

    /// Mount every node not already mounted. Already-mounted nodes are left
    /// untouched.
    pub async fn mount_all(&mut self, nodes: &HashSet<StorageNode>) {
        for node in nodes {
            if self.mounted.contains_key(&node.device_path) {
                continue;
            }
            match self.mount_node(node).await {
                Ok(mount_point) => {
                    info!(
                        "Mounted {} at {}",
                        node.device_path.display(),
                        mount_point.display()
                    );
                    self.mounted.insert(node.device_path.clone(), mount_point);
                }
                Err(e) => warn!("Skipping {}: {}", node.device_path.display(), e),
            }
        }
    }

    async fn mount_node(&self, node: &StorageNode) -> Result<PathBuf, MountError> {
        let mount_point = mount_point_for(&self.root, node);
        fs::create_dir_all(&mount_point).map_err(|source| MountError::CreateMountPoint {
            path: mount_point.clone(),
            source,
        })?;
        let mut cmd = Command::new("mount");
        if self.readonly {
            cmd.args(["-o", "ro"]);
        }
        cmd.arg(&node.device_path).arg(&mount_point);
        let output = cmd.output().await.map_err(MountError::Spawn)?;
        if !output.status.success() {
            return Err(MountError::MountFailed {
                device: node.device_path.clone(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(mount_point)
    }

    /// Unmount everything whose node disappeared from the current set.
    pub async fn unmount_missing(&mut self, nodes: &HashSet<StorageNode>) {
        let gone: Vec<PathBuf> = self
            .mounted
            .keys()
            .filter(|device| !nodes.iter().any(|n| &n.device_path == *device))
            .cloned()
            .collect();
        for device in gone {
            if let Some(mount_point) = self.mounted.remove(&device) {
                info!(
                    "Unmounting {} ({} detached)",
                    mount_point.display(),
                    device.display()
                );
                match Command::new("umount").arg(&mount_point).output().await {
                    Ok(output) if !output.status.success() => warn!(
                        "umount {} failed: {}",
                        mount_point.display(),
                        String::from_utf8_lossy(&output.stderr).trim()
                    ),
                    Err(e) => warn!("Failed to run umount: {}", e),
                    Ok(_) => {
                        let _ = fs::remove_dir(&mount_point);
                    }
                }
            }
        }
    }

    /// Record a mount made elsewhere, without running mount(8).
    #[cfg(test)]
    pub(crate) fn record_mounted(&mut self, device: PathBuf, mount_point: PathBuf) {
        self.mounted.insert(device, mount_point);
    }

    /// Current mount points, the ingestion pipeline's source roots.
    pub fn mounted_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.mounted.values().cloned().collect();
        paths.sort();
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(device: &str, uuid: &str) -> StorageNode {
        StorageNode {
            device_path: PathBuf::from(device),
            bus: "usb".to_string(),
            fs_uuid: uuid.to_string(),
        }
    }

    #[test]
    fn mount_point_is_keyed_by_uuid() {
        let root = Path::new("/mnt/usbdrive");
        let a = node("/dev/sda1", "1234-ABCD");
        let b = node("/dev/sdb1", "5678-EF01");
        assert_eq!(
            mount_point_for(root, &a),
            PathBuf::from("/mnt/usbdrive/1234-ABCD")
        );
        assert_ne!(mount_point_for(root, &a), mount_point_for(root, &b));
        // Same node, same mount point, every time
        assert_eq!(mount_point_for(root, &a), mount_point_for(root, &a));
    }

    #[test]
    fn mounted_paths_starts_empty() {
        let manager = MountManager::new(PathBuf::from("/mnt/usbdrive"), true);
        assert!(manager.mounted_paths().is_empty());
    }

    #[tokio::test]
    async fn unmount_missing_drops_departed_nodes_from_the_map() {
        let mut manager = MountManager::new(PathBuf::from("/mnt/usbdrive"), true);
        let kept = node("/dev/sda1", "1234-ABCD");
        manager.record_mounted(
            kept.device_path.clone(),
            PathBuf::from("/mnt/usbdrive/1234-ABCD"),
        );
        manager.record_mounted(
            PathBuf::from("/dev/sdb1"),
            PathBuf::from("/mnt/usbdrive/5678-EF01"),
        );
        let mut current = HashSet::new();
        current.insert(kept);
        manager.unmount_missing(&current).await;
        assert_eq!(
            manager.mounted_paths(),
            [PathBuf::from("/mnt/usbdrive/1234-ABCD")]
        );

        manager.unmount_missing(&HashSet::new()).await;
        assert!(manager.mounted_paths().is_empty());
    }
}
