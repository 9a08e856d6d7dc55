// SPDX-License-Identifier: GPL-3.0-only

//! Devices and the shared cells the tree hands out.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::devicetree::{Format, PartedPartition};

/// Stable device identity. Preserved across `copy()` so cloned state
/// can be re-resolved against the clone's own device map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub u64);

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dev#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum DeviceKind {
    Disk,
    /// s390 DASD. May legitimately report size 0 before formatting and
    /// still be usable for installation.
    Dasd,
    Cdrom,
    Partition {
        /// Live native partition handle. Excluded from structural copy;
        /// the copy engine relinks it from the clone's own table.
        parted: Option<PartedPartition>,
        /// Disks this partition was requested to be allocated on.
        req_disks: Vec<DeviceId>,
    },
    /// Composite volume whose subvolumes share one backing free-space
    /// pool.
    Volume,
    Subvolume {
        volume: DeviceId,
    },
    Luks,
    Loop {
        backing_file: String,
    },
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Disk => "disk",
            DeviceKind::Dasd => "dasd",
            DeviceKind::Cdrom => "cdrom",
            DeviceKind::Partition { .. } => "partition",
            DeviceKind::Volume => "volume",
            DeviceKind::Subvolume { .. } => "subvolume",
            DeviceKind::Luks => "luks",
            DeviceKind::Loop { .. } => "loop",
        }
    }
}

/// One block device as the tree sees it.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    /// Device node path, e.g. `/dev/sda1`.
    pub path: String,
    pub size: u64,
    pub kind: DeviceKind,
    pub parents: Vec<DeviceId>,
    /// Protected devices survive any teardown or format operation for
    /// the remainder of the current reset cycle.
    pub protected: bool,
    pub media_present: bool,
    pub format: Format,
    /// Disk-level planning numbers from the last scan: bytes genuinely
    /// outside any partition, and bytes recoverable by shrinking or
    /// deleting existing partitions. Zero for non-disks.
    pub raw_free: u64,
    pub reclaimable_free: u64,
}

impl Device {
    pub fn is_disk_like(&self) -> bool {
        matches!(self.kind, DeviceKind::Disk | DeviceKind::Dasd)
    }

    pub fn is_dasd(&self) -> bool {
        matches!(self.kind, DeviceKind::Dasd)
    }

    pub fn parted_partition(&self) -> Option<&PartedPartition> {
        match &self.kind {
            DeviceKind::Partition { parted, .. } => parted.as_ref(),
            _ => None,
        }
    }
}

/// Shared-ownership cell for one device. The tree, the FSSet and roots
/// all reference the same cell; a single controlling thread drives all
/// mutation, the lock only guards against accidental tearing.
#[derive(Debug, Clone)]
pub struct DeviceCell {
    inner: Arc<RwLock<Device>>,
}

impl DeviceCell {
    pub fn new(device: Device) -> Self {
        Self {
            inner: Arc::new(RwLock::new(device)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Device> {
        self.inner.read().unwrap_or_else(|poison| poison.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Device> {
        self.inner
            .write()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    pub fn id(&self) -> DeviceId {
        self.read().id
    }

    pub fn name(&self) -> String {
        self.read().name.clone()
    }

    pub fn ptr_eq(&self, other: &DeviceCell) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_disk() -> Device {
        Device {
            id: DeviceId(1),
            name: "sda".to_string(),
            path: "/dev/sda".to_string(),
            size: 500,
            kind: DeviceKind::Disk,
            parents: Vec::new(),
            protected: false,
            media_present: true,
            format: Format::default(),
            raw_free: 0,
            reclaimable_free: 0,
        }
    }

    #[test]
    fn disk_like_covers_disks_and_dasds() {
        let mut device = plain_disk();
        assert!(device.is_disk_like());

        device.kind = DeviceKind::Dasd;
        assert!(device.is_disk_like());

        device.kind = DeviceKind::Cdrom;
        assert!(!device.is_disk_like());
    }

    #[test]
    fn cell_clones_share_the_device() {
        let cell = DeviceCell::new(plain_disk());
        let alias = cell.clone();

        alias.write().protected = true;
        assert!(cell.read().protected);
        assert!(cell.ptr_eq(&alias));
    }
}
