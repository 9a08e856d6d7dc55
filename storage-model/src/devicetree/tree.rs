// SPDX-License-Identifier: GPL-3.0-only

//! The live model of attached storage: visible and hidden device
//! collections, populated from a [`DeviceScanner`] and torn down
//! through it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use storage_types::DiskLabelKind;
use uuid::Uuid;

use crate::devicetree::{Device, DeviceCell, DeviceId, DeviceKind, Format, PartedDisk};
use crate::error::Result;

/// Mountpoint the live installation medium is kept at. Its backing
/// device and that device's whole parent chain must never be torn down.
pub const LIVE_BACKING_MOUNTPOINT: &str = "/run/initramfs/live";

/// Declarative description of one device as reported by a rescan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceNode {
    pub name: String,
    /// Defaults to `/dev/<name>`.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub size: u64,
    pub kind: DeviceNodeKind,
    /// Parent device names. Unresolvable names are skipped.
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default = "default_true")]
    pub media_present: bool,
    /// Devices the scanner reports as hidden, e.g. local disks ignored
    /// during an image installation.
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub format: FormatNode,
    #[serde(default)]
    pub raw_free: u64,
    #[serde(default)]
    pub reclaimable_free: u64,
    /// Backing file, loop devices only.
    #[serde(default)]
    pub backing_file: Option<String>,
    /// Owning volume name, subvolumes only.
    #[serde(default)]
    pub volume: Option<String>,
    /// Requested allocation disks, partitions only.
    #[serde(default)]
    pub req_disks: Vec<String>,
    /// Whether the partition has a live native handle in its disk's
    /// partition table.
    #[serde(default)]
    pub has_parted: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceNodeKind {
    Disk,
    Dasd,
    Cdrom,
    Partition,
    Volume,
    Subvolume,
    Luks,
    Loop,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormatNode {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub exists: bool,
    #[serde(default)]
    pub free: u64,
    #[serde(default)]
    pub mountpoint: Option<String>,
    #[serde(default)]
    pub label_type: Option<DiskLabelKind>,
    #[serde(default)]
    pub luks_version: Option<String>,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub uuid: Option<Uuid>,
    #[serde(default)]
    pub hidden: bool,
}

/// The low-level enumeration and manipulation engine, reduced to the
/// three operations this model drives it with.
pub trait DeviceScanner: Send + Sync {
    /// Rescan and describe the device tree. `cleanup_only` prepares the
    /// tree only far enough to deactivate devices.
    fn scan(&self, cleanup_only: bool) -> Result<Vec<DeviceNode>>;

    /// Deactivate one device.
    fn teardown(&self, device: &Device) -> Result<()>;

    /// Attach disk-image files so they appear as block devices on the
    /// next scan.
    fn setup_disk_images(&self, images: &BTreeMap<String, PathBuf>) -> Result<()>;
}

pub struct DeviceTree {
    scanner: Arc<dyn DeviceScanner>,
    devices: Vec<DeviceCell>,
    hidden: Vec<DeviceCell>,
    disk_images: BTreeMap<String, PathBuf>,
    default_fstype: String,
    next_id: u64,
}

impl DeviceTree {
    pub fn new(
        scanner: Arc<dyn DeviceScanner>,
        disk_images: BTreeMap<String, PathBuf>,
        default_fstype: String,
    ) -> Self {
        Self {
            scanner,
            devices: Vec::new(),
            hidden: Vec::new(),
            disk_images,
            default_fstype,
            next_id: 0,
        }
    }

    pub fn default_fstype(&self) -> &str {
        &self.default_fstype
    }

    pub fn set_default_fstype(&mut self, fstype: impl Into<String>) {
        self.default_fstype = fstype.into();
    }

    pub fn disk_images(&self) -> &BTreeMap<String, PathBuf> {
        &self.disk_images
    }

    /// Visible devices, in scan order (parents before children).
    pub fn devices(&self) -> &[DeviceCell] {
        &self.devices
    }

    pub fn hidden(&self) -> &[DeviceCell] {
        &self.hidden
    }

    pub fn all_devices(&self) -> impl Iterator<Item = &DeviceCell> {
        self.devices.iter().chain(self.hidden.iter())
    }

    /// Visible disk-like devices.
    pub fn disks(&self) -> Vec<DeviceCell> {
        self.devices
            .iter()
            .filter(|cell| cell.read().is_disk_like())
            .cloned()
            .collect()
    }

    pub fn get_device_by_id(&self, id: DeviceId) -> Option<DeviceCell> {
        self.all_devices().find(|cell| cell.read().id == id).cloned()
    }

    pub fn is_visible(&self, id: DeviceId) -> bool {
        self.devices.iter().any(|cell| cell.read().id == id)
    }

    /// Resolve a device specifier to a device. Accepts a plain name, a
    /// `/dev/...` path or a `UUID=` spec; returns `None` when nothing
    /// matches, since devices legitimately disappear between a UI
    /// presentation and the action acting on it.
    pub fn resolve_device(&self, spec: &str) -> Option<DeviceCell> {
        if let Some(uuid_spec) = spec.strip_prefix("UUID=") {
            let uuid = Uuid::parse_str(uuid_spec).ok()?;
            return self
                .all_devices()
                .find(|cell| cell.read().format.uuid == Some(uuid))
                .cloned();
        }

        self.all_devices()
            .find(|cell| {
                let device = cell.read();
                device.name == spec || device.path == spec
            })
            .cloned()
    }

    /// Re-synchronize with physical reality through the scanner.
    pub fn populate(&mut self, cleanup_only: bool) -> Result<()> {
        tracing::debug!(cleanup_only, "populating device tree");
        let nodes = self.scanner.scan(cleanup_only)?;
        self.rebuild(&nodes);
        tracing::debug!(
            visible = self.devices.len(),
            hidden = self.hidden.len(),
            "device tree populated"
        );
        Ok(())
    }

    fn rebuild(&mut self, nodes: &[DeviceNode]) {
        let mut ids: BTreeMap<String, DeviceId> = BTreeMap::new();
        for node in nodes {
            self.next_id += 1;
            ids.insert(node.name.clone(), DeviceId(self.next_id));
        }

        let resolve_names = |names: &[String]| -> Vec<DeviceId> {
            names
                .iter()
                .filter_map(|name| {
                    let id = ids.get(name).copied();
                    if id.is_none() {
                        tracing::debug!(%name, "skipping unresolvable device reference");
                    }
                    id
                })
                .collect()
        };

        // Partition paths per disk, for opening disklabel tables.
        let mut table_paths: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for node in nodes {
            if node.kind != DeviceNodeKind::Partition {
                continue;
            }
            for parent in &node.parents {
                table_paths
                    .entry(parent.clone())
                    .or_default()
                    .push(node_path(node));
            }
        }

        self.devices.clear();
        self.hidden.clear();

        for node in nodes {
            let id = ids[&node.name];
            let path = node_path(node);

            let mut format = Format {
                kind: node.format.kind.clone(),
                exists: node.format.exists,
                free: node.format.free,
                mountpoint: node.format.mountpoint.clone(),
                label_type: node.format.label_type,
                luks_version: node.format.luks_version.clone(),
                passphrase: node.format.passphrase.clone(),
                uuid: node.format.uuid,
                hidden: node.format.hidden,
                parted_disk: None,
            };

            if format.is_kind("disklabel") && format.exists {
                let paths = table_paths.get(&node.name).cloned().unwrap_or_default();
                format.parted_disk = Some(PartedDisk::open(&path, &paths));
            }

            let kind = match node.kind {
                DeviceNodeKind::Disk => DeviceKind::Disk,
                DeviceNodeKind::Dasd => DeviceKind::Dasd,
                DeviceNodeKind::Cdrom => DeviceKind::Cdrom,
                DeviceNodeKind::Partition => DeviceKind::Partition {
                    parted: None,
                    req_disks: resolve_names(&node.req_disks),
                },
                DeviceNodeKind::Volume => DeviceKind::Volume,
                DeviceNodeKind::Subvolume => DeviceKind::Subvolume {
                    volume: node
                        .volume
                        .as_ref()
                        .and_then(|name| ids.get(name).copied())
                        .unwrap_or(id),
                },
                DeviceNodeKind::Luks => DeviceKind::Luks,
                DeviceNodeKind::Loop => DeviceKind::Loop {
                    backing_file: node.backing_file.clone().unwrap_or_default(),
                },
            };

            let device = Device {
                id,
                name: node.name.clone(),
                path,
                size: node.size,
                kind,
                parents: resolve_names(&node.parents),
                protected: node.protected,
                media_present: node.media_present,
                format,
                raw_free: node.raw_free,
                reclaimable_free: node.reclaimable_free,
            };

            let cell = DeviceCell::new(device);
            if node.hidden {
                self.hidden.push(cell);
            } else {
                self.devices.push(cell);
            }
        }

        // Attach live partition handles from the owning disk's table.
        for node in nodes.iter().filter(|node| node.has_parted) {
            let Some(cell) = ids.get(&node.name).and_then(|id| self.get_device_by_id(*id))
            else {
                continue;
            };
            let handle = self.table_handle_for(&cell);
            if let DeviceKind::Partition { parted, .. } = &mut cell.write().kind {
                *parted = handle;
            }
        }
    }

    /// Look up the live handle for a partition in its disk's open
    /// partition table.
    pub fn table_handle_for(
        &self,
        partition: &DeviceCell,
    ) -> Option<crate::devicetree::PartedPartition> {
        let (path, parents) = {
            let device = partition.read();
            (device.path.clone(), device.parents.clone())
        };

        parents.iter().find_map(|parent| {
            let disk = self.get_device_by_id(*parent)?;
            let disk = disk.read();
            disk.format
                .parted_disk
                .as_ref()
                .and_then(|table| table.partition_by_path(&path))
        })
    }

    /// Tear down all unprotected devices, children first.
    pub fn teardown_all(&mut self) -> Result<()> {
        for cell in self.devices.iter().rev() {
            let device = cell.read();
            if device.protected {
                tracing::debug!(name = %device.name, "skipping teardown of protected device");
                continue;
            }
            self.scanner.teardown(&device)?;
        }
        Ok(())
    }

    pub fn setup_disk_images(&mut self) -> Result<()> {
        tracing::info!(count = self.disk_images.len(), "attaching disk images");
        self.scanner.setup_disk_images(&self.disk_images)
    }

    /// Hide a device and everything stacked on top of it.
    pub fn hide(&mut self, id: DeviceId) {
        let closure = self.dependent_closure(id);
        let (hide, keep): (Vec<_>, Vec<_>) = self
            .devices
            .drain(..)
            .partition(|cell| closure.contains(&cell.read().id));
        self.devices = keep;
        for cell in hide {
            tracing::debug!(name = %cell.read().name, "hiding device");
            self.hidden.push(cell);
        }
    }

    /// Bring a hidden device and its hidden dependents back.
    pub fn unhide(&mut self, id: DeviceId) {
        let closure = self.dependent_closure(id);
        let (unhide, keep): (Vec<_>, Vec<_>) = self
            .hidden
            .drain(..)
            .partition(|cell| closure.contains(&cell.read().id));
        self.hidden = keep;
        for cell in unhide {
            tracing::debug!(name = %cell.read().name, "unhiding device");
            self.devices.push(cell);
        }
    }

    /// The device plus every device that transitively lists it as a
    /// parent.
    fn dependent_closure(&self, id: DeviceId) -> Vec<DeviceId> {
        let mut closure = vec![id];
        loop {
            let mut grew = false;
            for cell in self.all_devices() {
                let device = cell.read();
                if closure.contains(&device.id) {
                    continue;
                }
                if device.parents.iter().any(|parent| closure.contains(parent)) {
                    closure.push(device.id);
                    grew = true;
                }
            }
            if !grew {
                return closure;
            }
        }
    }

    /// Per-disk `(raw_free, reclaimable_free)` snapshot from the last
    /// scan. The two components are distinct quantities and are never
    /// summed together here.
    pub fn get_free_space(&self, disks: &[DeviceCell]) -> BTreeMap<DeviceId, (u64, u64)> {
        disks
            .iter()
            .map(|cell| {
                let device = cell.read();
                (device.id, (device.raw_free, device.reclaimable_free))
            })
            .collect()
    }

    /// The device backing the live installation medium, if any.
    pub fn live_backing_device(&self) -> Option<DeviceCell> {
        self.devices
            .iter()
            .find(|cell| {
                cell.read().format.mountpoint.as_deref() == Some(LIVE_BACKING_MOUNTPOINT)
            })
            .cloned()
    }

    /// Structural deep copy: fresh cells with the same identities.
    /// Native partition handles are deliberately not copied; the copy
    /// engine reattaches them from the clone's own reopened tables.
    pub fn deep_copy(&self) -> DeviceTree {
        let copy_cells = |cells: &[DeviceCell]| {
            cells
                .iter()
                .map(|cell| {
                    let mut device = cell.read().clone();
                    if let DeviceKind::Partition { parted, .. } = &mut device.kind {
                        *parted = None;
                    }
                    DeviceCell::new(device)
                })
                .collect()
        };

        DeviceTree {
            scanner: Arc::clone(&self.scanner),
            devices: copy_cells(&self.devices),
            hidden: copy_cells(&self.hidden),
            disk_images: self.disk_images.clone(),
            default_fstype: self.default_fstype.clone(),
            next_id: self.next_id,
        }
    }
}

fn node_path(node: &DeviceNode) -> String {
    node.path
        .clone()
        .unwrap_or_else(|| format!("/dev/{}", node.name))
}

impl std::fmt::Debug for DeviceTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceTree")
            .field("devices", &self.devices.len())
            .field("hidden", &self.hidden.len())
            .field("default_fstype", &self.default_fstype)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticScanner(Vec<DeviceNode>);

    impl DeviceScanner for StaticScanner {
        fn scan(&self, _cleanup_only: bool) -> Result<Vec<DeviceNode>> {
            Ok(self.0.clone())
        }

        fn teardown(&self, _device: &Device) -> Result<()> {
            Ok(())
        }

        fn setup_disk_images(&self, _images: &BTreeMap<String, PathBuf>) -> Result<()> {
            Ok(())
        }
    }

    fn disk(name: &str) -> DeviceNode {
        DeviceNode {
            name: name.to_string(),
            path: None,
            size: 500_000_000_000,
            kind: DeviceNodeKind::Disk,
            parents: Vec::new(),
            media_present: true,
            hidden: false,
            protected: false,
            format: FormatNode {
                kind: Some("disklabel".to_string()),
                exists: true,
                label_type: Some(DiskLabelKind::Gpt),
                ..FormatNode::default()
            },
            raw_free: 0,
            reclaimable_free: 0,
            backing_file: None,
            volume: None,
            req_disks: Vec::new(),
            has_parted: false,
        }
    }

    fn partition(name: &str, parent: &str) -> DeviceNode {
        DeviceNode {
            kind: DeviceNodeKind::Partition,
            parents: vec![parent.to_string()],
            has_parted: true,
            format: FormatNode {
                kind: Some("ext4".to_string()),
                exists: true,
                ..FormatNode::default()
            },
            ..disk(name)
        }
    }

    fn tree_with(nodes: Vec<DeviceNode>) -> DeviceTree {
        let mut tree = DeviceTree::new(
            Arc::new(StaticScanner(nodes)),
            BTreeMap::new(),
            "ext4".to_string(),
        );
        tree.populate(false).unwrap();
        tree
    }

    #[test]
    fn populate_links_partitions_to_their_table() {
        let tree = tree_with(vec![disk("sda"), partition("sda1", "sda")]);

        let part = tree.resolve_device("sda1").unwrap();
        let handle = part.read().parted_partition().cloned().unwrap();
        assert_eq!(handle.path(), "/dev/sda1");

        let disk = tree.resolve_device("/dev/sda").unwrap();
        let from_table = disk
            .read()
            .format
            .parted_disk
            .as_ref()
            .unwrap()
            .partition_by_path("/dev/sda1")
            .unwrap();
        assert!(handle.shares_handle(&from_table));
    }

    #[test]
    fn hide_takes_dependents_and_unhide_restores_them() {
        let mut tree = tree_with(vec![disk("sda"), partition("sda1", "sda")]);
        let id = tree.resolve_device("sda").unwrap().id();

        tree.hide(id);
        assert!(tree.resolve_device("sda").is_some(), "still resolvable");
        assert!(!tree.is_visible(id));
        assert_eq!(tree.devices().len(), 0);

        tree.unhide(id);
        assert!(tree.is_visible(id));
        assert_eq!(tree.devices().len(), 2);
    }

    #[test]
    fn deep_copy_strips_partition_handles() {
        let tree = tree_with(vec![disk("sda"), partition("sda1", "sda")]);
        let copy = tree.deep_copy();

        let part = copy.resolve_device("sda1").unwrap();
        assert!(part.read().parted_partition().is_none());

        // The clone's disk reopened its own table.
        let orig_disk = tree.resolve_device("sda").unwrap();
        let copy_disk = copy.resolve_device("sda").unwrap();
        let orig_handle = orig_disk
            .read()
            .format
            .parted_disk
            .as_ref()
            .unwrap()
            .partition_by_path("/dev/sda1")
            .unwrap();
        let copy_handle = copy_disk
            .read()
            .format
            .parted_disk
            .as_ref()
            .unwrap()
            .partition_by_path("/dev/sda1")
            .unwrap();
        assert!(!orig_handle.shares_handle(&copy_handle));
    }
}
