//! Recording mock implementations of every collaborator contract the
//! storage model consumes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use storage_contracts::{
    Bootloader, BootloaderFactory, EscrowFetcher, HostnameSource, MountOps, StorageError,
};
use storage_model::{Device, DeviceNode, DeviceScanner, DeviceTree, Result, Root, RootFinder};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

/// Scanner that reports a fixed set of device nodes and records what
/// the model asks it to do.
#[derive(Debug, Default)]
pub struct MockScanner {
    nodes: Mutex<Vec<DeviceNode>>,
    pub scans: AtomicUsize,
    pub image_setups: AtomicUsize,
    pub torn_down: Mutex<Vec<String>>,
    pub fail_next_scan: AtomicBool,
}

impl MockScanner {
    pub fn new(nodes: Vec<DeviceNode>) -> Self {
        Self {
            nodes: Mutex::new(nodes),
            ..Self::default()
        }
    }

    /// Replace the reported nodes, simulating a hardware change between
    /// resets.
    pub fn set_nodes(&self, nodes: Vec<DeviceNode>) {
        *lock(&self.nodes) = nodes;
    }

    pub fn torn_down_names(&self) -> Vec<String> {
        lock(&self.torn_down).clone()
    }
}

impl DeviceScanner for MockScanner {
    fn scan(&self, _cleanup_only: bool) -> Result<Vec<DeviceNode>> {
        if self.fail_next_scan.swap(false, Ordering::SeqCst) {
            return Err(StorageError::backend("simulated scan failure"));
        }
        self.scans.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.nodes).clone())
    }

    fn teardown(&self, device: &Device) -> Result<()> {
        lock(&self.torn_down).push(device.name.clone());
        Ok(())
    }

    fn setup_disk_images(&self, _images: &BTreeMap<String, PathBuf>) -> Result<()> {
        self.image_setups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountEvent {
    Mount {
        source: PathBuf,
        target: PathBuf,
        fstype: String,
    },
    Umount {
        target: PathBuf,
    },
    Swapon {
        device: PathBuf,
    },
    Swapoff {
        device: PathBuf,
    },
    Chown {
        path: PathBuf,
        uid: u32,
        gid: u32,
    },
}

/// Mount backend that records every primitive instead of touching the
/// kernel.
#[derive(Debug, Default)]
pub struct MockMountOps {
    pub events: Mutex<Vec<MountEvent>>,
    pub fail_chown: AtomicBool,
}

impl MockMountOps {
    pub fn recorded(&self) -> Vec<MountEvent> {
        lock(&self.events).clone()
    }
}

impl MountOps for MockMountOps {
    fn mount(
        &self,
        source: &Path,
        target: &Path,
        fstype: &str,
        _options: &str,
    ) -> std::result::Result<(), StorageError> {
        lock(&self.events).push(MountEvent::Mount {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            fstype: fstype.to_string(),
        });
        Ok(())
    }

    fn umount(&self, target: &Path) -> std::result::Result<(), StorageError> {
        lock(&self.events).push(MountEvent::Umount {
            target: target.to_path_buf(),
        });
        Ok(())
    }

    fn swapon(&self, device: &Path) -> std::result::Result<(), StorageError> {
        lock(&self.events).push(MountEvent::Swapon {
            device: device.to_path_buf(),
        });
        Ok(())
    }

    fn swapoff(&self, device: &Path) -> std::result::Result<(), StorageError> {
        lock(&self.events).push(MountEvent::Swapoff {
            device: device.to_path_buf(),
        });
        Ok(())
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> std::result::Result<(), StorageError> {
        lock(&self.events).push(MountEvent::Chown {
            path: path.to_path_buf(),
            uid,
            gid,
        });
        if self.fail_chown.load(Ordering::SeqCst) {
            return Err(StorageError::backend("simulated chown failure"));
        }
        Ok(())
    }
}

/// Fetcher that counts requests and returns a fixed payload.
#[derive(Debug)]
pub struct MockEscrowFetcher {
    pub requests: Mutex<Vec<String>>,
    payload: Vec<u8>,
}

impl Default for MockEscrowFetcher {
    fn default() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            payload: b"-----BEGIN CERTIFICATE-----".to_vec(),
        }
    }
}

impl MockEscrowFetcher {
    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

impl EscrowFetcher for MockEscrowFetcher {
    fn download_escrow_certificate(&self, url: &str) -> std::result::Result<Vec<u8>, StorageError> {
        lock(&self.requests).push(url.to_string());
        Ok(self.payload.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FixedHostname {
    pub configured: Option<String>,
    pub live: Option<String>,
}

impl HostnameSource for FixedHostname {
    fn hostname(&self) -> Option<String> {
        self.configured.clone()
    }

    fn current_hostname(&self) -> Option<String> {
        self.live.clone()
    }
}

#[derive(Debug)]
pub struct MockBootloader {
    stage2: Vec<String>,
    pub resets: usize,
}

impl Bootloader for MockBootloader {
    fn stage2_format_types(&self) -> &[String] {
        &self.stage2
    }

    fn reset(&mut self) {
        self.resets += 1;
    }
}

/// Factory counting how many bootloader singletons the model built.
#[derive(Debug)]
pub struct MockBootloaderFactory {
    pub created: AtomicUsize,
    pub stage2: Vec<String>,
}

impl Default for MockBootloaderFactory {
    fn default() -> Self {
        Self {
            created: AtomicUsize::new(0),
            stage2: vec!["ext4".to_string(), "xfs".to_string()],
        }
    }
}

impl BootloaderFactory for MockBootloaderFactory {
    fn create_boot_loader(&self) -> Box<dyn Bootloader> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Box::new(MockBootloader {
            stage2: self.stage2.clone(),
            resets: 0,
        })
    }
}

/// Recipe for one discovered installation, resolved against whatever
/// tree the finder is invoked on.
#[derive(Debug, Clone)]
pub struct RootBlueprint {
    pub name: String,
    /// Mountpoint -> device name.
    pub mounts: Vec<(String, String)>,
    pub swaps: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MockRootFinder {
    pub blueprints: Vec<RootBlueprint>,
}

impl RootFinder for MockRootFinder {
    fn find_existing_installations(&self, tree: &DeviceTree) -> Result<Vec<Root>> {
        let roots = self
            .blueprints
            .iter()
            .map(|blueprint| Root {
                name: blueprint.name.clone(),
                mounts: blueprint
                    .mounts
                    .iter()
                    .filter_map(|(mountpoint, device)| {
                        tree.resolve_device(device)
                            .map(|cell| (mountpoint.clone(), cell.id()))
                    })
                    .collect(),
                swaps: blueprint
                    .swaps
                    .iter()
                    .filter_map(|device| tree.resolve_device(device).map(|cell| cell.id()))
                    .collect(),
            })
            .collect();

        Ok(roots)
    }
}
