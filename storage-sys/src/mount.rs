// SPDX-License-Identifier: GPL-3.0-only

//! mount(2)/umount(2), swap activation and ownership fix-ups.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use nix::mount::{MntFlags, MsFlags, mount, umount2};
use nix::unistd::{Gid, Uid, chown};
use storage_contracts::{MountOps, StorageError};

use crate::error::{Result, SysError};

/// The real, privileged implementation of the model's mount contract.
#[derive(Debug, Default)]
pub struct LinuxMountOps;

impl LinuxMountOps {
    fn do_mount(source: &Path, target: &Path, fstype: &str, options: &str) -> Result<()> {
        let data = if options.is_empty() || options == "defaults" {
            None
        } else {
            Some(options)
        };

        tracing::debug!(source = ?source, target = ?target, fstype, "mount");
        mount(Some(source), target, Some(fstype), MsFlags::empty(), data)?;
        Ok(())
    }

    fn do_umount(target: &Path) -> Result<()> {
        tracing::debug!(target = ?target, "umount");
        umount2(target, MntFlags::empty())?;
        Ok(())
    }

    fn do_swapon(device: &Path) -> Result<()> {
        let path = CString::new(device.as_os_str().as_bytes())
            .map_err(|_| SysError::InvalidTableLine(format!("{device:?}")))?;

        tracing::debug!(device = ?device, "swapon");
        // SAFETY: path is a valid NUL-terminated string for the call's
        // lifetime.
        let rc = unsafe { libc::swapon(path.as_ptr(), 0) };
        if rc != 0 {
            return Err(SysError::Swap {
                device: device.display().to_string(),
                errno: std::io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    fn do_swapoff(device: &Path) -> Result<()> {
        let path = CString::new(device.as_os_str().as_bytes())
            .map_err(|_| SysError::InvalidTableLine(format!("{device:?}")))?;

        tracing::debug!(device = ?device, "swapoff");
        // SAFETY: path is a valid NUL-terminated string for the call's
        // lifetime.
        let rc = unsafe { libc::swapoff(path.as_ptr()) };
        if rc != 0 {
            return Err(SysError::Swap {
                device: device.display().to_string(),
                errno: std::io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    fn do_chown(path: &Path, uid: u32, gid: u32) -> Result<()> {
        tracing::debug!(path = ?path, uid, gid, "chown");
        chown(path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)))?;
        Ok(())
    }
}

fn backend(error: SysError) -> StorageError {
    StorageError::backend(error.to_string())
}

impl MountOps for LinuxMountOps {
    fn mount(
        &self,
        source: &Path,
        target: &Path,
        fstype: &str,
        options: &str,
    ) -> std::result::Result<(), StorageError> {
        Self::do_mount(source, target, fstype, options).map_err(backend)
    }

    fn umount(&self, target: &Path) -> std::result::Result<(), StorageError> {
        Self::do_umount(target).map_err(backend)
    }

    fn swapon(&self, device: &Path) -> std::result::Result<(), StorageError> {
        Self::do_swapon(device).map_err(backend)
    }

    fn swapoff(&self, device: &Path) -> std::result::Result<(), StorageError> {
        Self::do_swapoff(device).map_err(backend)
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> std::result::Result<(), StorageError> {
        Self::do_chown(path, uid, gid).map_err(backend)
    }
}
