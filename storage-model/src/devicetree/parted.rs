// SPDX-License-Identifier: GPL-3.0-only

//! Opaque wrappers over the partition-table engine's native handles.
//!
//! A live partition-table handle cannot survive a structural deep copy
//! of the device tree: the copy engine must reopen the table on the
//! clone's side and reattach partition handles by path. `PartedDisk`'s
//! `Clone` therefore reopens fresh handles instead of sharing the
//! original's, and partition handles are stripped during the copy and
//! relinked afterwards (see `StorageModel::copy`).

use std::sync::Arc;

use uuid::Uuid;

/// One open native partition handle. The token identifies the concrete
/// handle instance, so tests can verify that a clone received handles
/// from its own reopened table rather than the original's.
#[derive(Debug)]
pub struct PartedPartitionHandle {
    path: String,
    token: Uuid,
}

impl PartedPartitionHandle {
    fn open(path: &str) -> Self {
        Self {
            path: path.to_string(),
            token: Uuid::new_v4(),
        }
    }
}

/// Shared reference to a live partition handle.
#[derive(Debug, Clone)]
pub struct PartedPartition {
    handle: Arc<PartedPartitionHandle>,
}

impl PartedPartition {
    pub fn path(&self) -> &str {
        &self.handle.path
    }

    pub fn handle_token(&self) -> Uuid {
        self.handle.token
    }

    /// Whether two references point at the same open handle.
    pub fn shares_handle(&self, other: &PartedPartition) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }
}

/// An open partition table on one disk.
#[derive(Debug)]
pub struct PartedDisk {
    device_path: String,
    partitions: Vec<PartedPartition>,
}

impl PartedDisk {
    /// Open the table on `device_path` with handles for the given
    /// partition paths.
    pub fn open(device_path: &str, partition_paths: &[String]) -> Self {
        let partitions = partition_paths
            .iter()
            .map(|path| PartedPartition {
                handle: Arc::new(PartedPartitionHandle::open(path)),
            })
            .collect();

        Self {
            device_path: device_path.to_string(),
            partitions,
        }
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Look up the live handle for a partition by its device path.
    pub fn partition_by_path(&self, path: &str) -> Option<PartedPartition> {
        self.partitions
            .iter()
            .find(|partition| partition.path() == path)
            .cloned()
    }
}

impl Clone for PartedDisk {
    /// Reopens the table: the clone gets fresh handles, never shared
    /// ones.
    fn clone(&self) -> Self {
        let paths: Vec<String> = self
            .partitions
            .iter()
            .map(|partition| partition.path().to_string())
            .collect();

        Self::open(&self.device_path, &paths)
    }
}
