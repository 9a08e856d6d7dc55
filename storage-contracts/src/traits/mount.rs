// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;

use crate::StorageError;

/// Primitive mount-table operations the model delegates to the system.
///
/// Implementations require elevated privileges; tests substitute a
/// recording mock. Every call blocks until the kernel returns.
pub trait MountOps: Send + Sync {
    fn mount(
        &self,
        source: &Path,
        target: &Path,
        fstype: &str,
        options: &str,
    ) -> Result<(), StorageError>;

    fn umount(&self, target: &Path) -> Result<(), StorageError>;

    fn swapon(&self, device: &Path) -> Result<(), StorageError>;

    fn swapoff(&self, device: &Path) -> Result<(), StorageError>;

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> Result<(), StorageError>;
}
