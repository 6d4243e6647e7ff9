//! Removable-storage monitoring.
//!
//! A background task watches `/dev` for device churn and keeps the current
//! set of qualifying USB storage nodes in a shared snapshot. The foreground
//! loop only ever reads that snapshot through [`StorageMonitor::poll_changes`]
//! and friends; it never blocks on device enumeration.
//!
//! A node qualifies when its block device sits on the USB bus (sysfs device
//! link resolves through a `usb` segment) and carries a filesystem UUID
//! (symlink under `/dev/disk/by-uuid`). Bare controllers and unformatted
//! disks do not show up.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use log::{debug, warn};
use notify::{RecursiveMode, Watcher};

use crate::service::{spawn_service, ServiceHandle};

const BY_UUID_DIR: &str = "/dev/disk/by-uuid";
const SYS_BLOCK_DIR: &str = "/sys/block";

/// Grace period after a device event before re-enumerating, so a drive that
/// is still settling does not produce a half-populated snapshot.
const SETTLE_DELAY: Duration = Duration::from_millis(250);

/// A detected removable-storage block device. Re-enumerated on every device
/// event, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageNode {
    /// Resolved block device path, e.g. `/dev/sda1`. Node identity.
    pub device_path: PathBuf,
    /// Bus the device is attached to; only "usb" qualifies.
    pub bus: String,
    /// Filesystem UUID, also used to derive a stable mount point name.
    pub fs_uuid: String,
}

/// Enumerate qualifying USB storage nodes from sysfs and /dev.
pub fn enumerate_usb_nodes() -> io::Result<HashSet<StorageNode>> {
    enumerate_usb_nodes_in(Path::new(BY_UUID_DIR), Path::new(SYS_BLOCK_DIR))
}

fn enumerate_usb_nodes_in(
    by_uuid: &Path,
    sys_block: &Path,
) -> io::Result<HashSet<StorageNode>> {
    let mut nodes = HashSet::new();
    if !by_uuid.is_dir() {
        // No filesystem-bearing devices at all (fresh boot, nothing attached)
        return Ok(nodes);
    }
    for entry in fs::read_dir(by_uuid)? {
        let entry = entry?;
        let fs_uuid = entry.file_name().to_string_lossy().to_string();
        let Ok(device_path) = fs::canonicalize(entry.path()) else {
            continue;
        };
        let Some(name) = device_path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        // Base block device name, e.g. "sda" for "sda1". USB mass storage
        // always enumerates as sdX, so stripping trailing digits is enough.
        let base: String = name.chars().take_while(|c| !c.is_ascii_digit()).collect();
        if device_on_usb_bus(&sys_block.join(&base).join("device")) {
            nodes.insert(StorageNode {
                device_path,
                bus: "usb".to_string(),
                fs_uuid,
            });
        }
    }
    Ok(nodes)
}

fn device_on_usb_bus(device_link: &Path) -> bool {
    fs::canonicalize(device_link)
        .map(|resolved| {
            resolved
                .components()
                .any(|c| c.as_os_str().to_string_lossy().starts_with("usb"))
        })
        .unwrap_or(false)
}

/// Watches USB storage attach/detach and exposes a poll-based change signal.
pub struct StorageMonitor {
    nodes: Arc<Mutex<HashSet<StorageNode>>>,
    /// Snapshot compared against on every poll. None until the first poll,
    /// so the initial device set always registers as a change.
    last_seen: Mutex<Option<HashSet<StorageNode>>>,
    /// Taken out on shutdown; None afterwards (and in detached monitors).
    watch: Mutex<Option<ServiceHandle>>,
}

impl StorageMonitor {
    /// Enumerate the current device set and start the background watcher.
    pub fn start() -> anyhow::Result<Self> {
        let initial = enumerate_usb_nodes().unwrap_or_else(|e| {
            warn!("Initial storage enumeration failed: {}", e);
            HashSet::new()
        });
        let nodes = Arc::new(Mutex::new(initial));

        let (event_tx, mut event_rx) = tokio::sync::mpsc::channel::<()>(16);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if res.is_ok() {
                // Coalesced: a full channel already implies a pending refresh
                let _ = event_tx.try_send(());
            }
        })
        .context("failed to create device watcher")?;
        watcher
            .watch(Path::new("/dev"), RecursiveMode::NonRecursive)
            .context("failed to watch /dev")?;
        // Missing until the first formatted device appears; /dev events
        // still trigger a refresh in that case.
        if let Err(e) = watcher.watch(Path::new(BY_UUID_DIR), RecursiveMode::NonRecursive) {
            debug!("Not watching {}: {}", BY_UUID_DIR, e);
        }

        let shared = nodes.clone();
        let watch = spawn_service(move |mut stop| async move {
            // Watch subscriptions live exactly as long as this task
            let _watcher = watcher;
            loop {
                tokio::select! {
                    _ = stop.signaled() => break,
                    received = event_rx.recv() => {
                        if received.is_none() {
                            break;
                        }
                        tokio::time::sleep(SETTLE_DELAY).await;
                        while event_rx.try_recv().is_ok() {}
                        match enumerate_usb_nodes() {
                            Ok(current) => {
                                *shared.lock().unwrap() = current;
                            }
                            Err(e) => warn!("Storage enumeration failed: {}", e),
                        }
                    }
                }
            }
        });

        Ok(Self {
            nodes,
            last_seen: Mutex::new(None),
            watch: Mutex::new(Some(watch)),
        })
    }

    /// Monitor over an externally managed node set, without a watcher task.
    #[cfg(test)]
    pub(crate) fn detached(nodes: Arc<Mutex<HashSet<StorageNode>>>) -> Self {
        Self {
            nodes,
            last_seen: Mutex::new(None),
            watch: Mutex::new(None),
        }
    }

    /// Edge-triggered change signal: true exactly once per observed change
    /// in the attached node set since the previous call.
    pub fn poll_changes(&self) -> bool {
        let current = self.nodes.lock().unwrap().clone();
        let mut last = self.last_seen.lock().unwrap();
        let changed = last.as_ref() != Some(&current);
        *last = Some(current);
        changed
    }

    /// Whether at least one qualifying node is currently attached.
    pub fn has_nodes(&self) -> bool {
        !self.nodes.lock().unwrap().is_empty()
    }

    /// Consistent snapshot of the currently attached nodes.
    pub fn list_nodes(&self) -> HashSet<StorageNode> {
        self.nodes.lock().unwrap().clone()
    }

    /// Stop the background watcher. Idempotent.
    pub async fn shutdown(&self) {
        let watch = self.watch.lock().unwrap().take();
        if let Some(watch) = watch {
            if let Err(e) = watch.shutdown().await {
                warn!("Storage watch task failed on shutdown: {}", e);
            }
        }
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
    fn first_poll_reports_a_change_then_settles() {
        let nodes = Arc::new(Mutex::new(HashSet::new()));
        let monitor = StorageMonitor::detached(nodes);
        assert!(monitor.poll_changes());
        assert!(!monitor.poll_changes());
        assert!(!monitor.poll_changes());
    }

    #[test]
    fn attach_and_detach_each_fire_once() {
        let nodes = Arc::new(Mutex::new(HashSet::new()));
        let monitor = StorageMonitor::detached(nodes.clone());
        monitor.poll_changes();

        nodes
            .lock()
            .unwrap()
            .insert(node("/dev/sda1", "1234-ABCD"));
        assert!(monitor.poll_changes());
        assert!(!monitor.poll_changes());
        assert!(monitor.has_nodes());

        nodes.lock().unwrap().clear();
        assert!(monitor.poll_changes());
        assert!(!monitor.poll_changes());
        assert!(!monitor.has_nodes());
    }

    #[test]
    fn list_nodes_returns_a_snapshot() {
        let nodes = Arc::new(Mutex::new(HashSet::new()));
        let monitor = StorageMonitor::detached(nodes.clone());
        nodes
            .lock()
            .unwrap()
            .insert(node("/dev/sdb1", "CAFE-BABE"));
        let snapshot = monitor.list_nodes();
        nodes.lock().unwrap().clear();
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn enumeration_handles_missing_by_uuid_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("by-uuid");
        let nodes = enumerate_usb_nodes_in(&missing, dir.path()).unwrap();
        assert!(nodes.is_empty());
    }
}
