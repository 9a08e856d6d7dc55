// SPDX-License-Identifier: GPL-3.0-only

//! The target filesystem set: mountpoint bookkeeping, mount/umount and
//! swap orchestration, fstab reading and writing.
//!
//! An FSSet is rebuilt from scratch on every `reset()`; one that
//! references a torn-down tree must never be reused.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use storage_contracts::MountOps;

use crate::devicetree::{DeviceId, DeviceTree, LIVE_BACKING_MOUNTPOINT};
use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct FSSet {
    /// Mountpoint -> device for the target hierarchy.
    mountpoints: BTreeMap<String, DeviceId>,
    /// Every swap-formatted device in the tree.
    swap_devices: Vec<DeviceId>,
    /// The subset of swap devices that will be persisted to fstab.
    fstab_swaps: Vec<DeviceId>,
}

impl FSSet {
    /// Build fresh from a populated tree.
    pub fn new(tree: &DeviceTree) -> Self {
        let mut mountpoints = BTreeMap::new();
        let mut swap_devices = Vec::new();

        for cell in tree.devices() {
            let device = cell.read();
            if device.format.is_kind("swap") {
                swap_devices.push(device.id);
                continue;
            }
            if let Some(mountpoint) = device.format.mountpoint.as_deref()
                && mountpoint.starts_with('/')
                && mountpoint != LIVE_BACKING_MOUNTPOINT
            {
                mountpoints.insert(mountpoint.to_string(), device.id);
            }
        }

        Self {
            mountpoints,
            swap_devices,
            fstab_swaps: Vec::new(),
        }
    }

    pub fn mountpoints(&self) -> &BTreeMap<String, DeviceId> {
        &self.mountpoints
    }

    pub fn device_for(&self, mountpoint: &str) -> Option<DeviceId> {
        self.mountpoints.get(mountpoint).copied()
    }

    pub fn root_device(&self) -> Option<DeviceId> {
        self.device_for("/")
    }

    pub fn swap_devices(&self) -> &[DeviceId] {
        &self.swap_devices
    }

    pub fn fstab_swaps(&self) -> &[DeviceId] {
        &self.fstab_swaps
    }

    pub fn add_fstab_swap(&mut self, device: DeviceId) {
        if !self.fstab_swaps.contains(&device) {
            self.fstab_swaps.push(device);
        }
        if !self.swap_devices.contains(&device) {
            self.swap_devices.push(device);
        }
    }

    pub fn set_fstab_swaps(&mut self, devices: &[DeviceId]) {
        self.fstab_swaps = devices.to_vec();
        for device in devices {
            if !self.swap_devices.contains(device) {
                self.swap_devices.push(*device);
            }
        }
    }

    /// Mount every entry under `root_path`, shallowest mountpoint
    /// first. A pre-existing home directory gets its ownership fixed;
    /// failure there is fatal.
    pub fn mount_filesystems(
        &self,
        tree: &DeviceTree,
        ops: &dyn MountOps,
        root_path: &Path,
    ) -> Result<()> {
        for (mountpoint, id) in self.mount_order() {
            let Some(cell) = tree.get_device_by_id(id) else {
                tracing::debug!(%mountpoint, "skipping mount of vanished device");
                continue;
            };
            let device = cell.read();
            let fstype = device
                .format
                .kind_str()
                .unwrap_or(tree.default_fstype())
                .to_string();
            let target = target_path(root_path, &mountpoint);

            tracing::info!(device = %device.name, %mountpoint, %fstype, "mounting");
            fs::create_dir_all(&target)?;
            ops.mount(Path::new(&device.path), &target, &fstype, "defaults")?;
        }

        let home = root_path.join("home");
        if self.mountpoints.contains_key("/home") && home.is_dir() {
            if let Err(error) = ops.chown(&home, 0, 0) {
                tracing::error!(%error, path = ?home, "cannot fix ownership of existing home");
                return Err(error);
            }
        }

        Ok(())
    }

    /// Unmount everything in reverse mount order, optionally turning
    /// swap off first.
    pub fn umount_filesystems(
        &self,
        tree: &DeviceTree,
        ops: &dyn MountOps,
        root_path: &Path,
        swapoff: bool,
    ) -> Result<()> {
        if swapoff {
            self.turn_off_swap(tree, ops)?;
        }

        for (mountpoint, _) in self.mount_order().into_iter().rev() {
            let target = target_path(root_path, &mountpoint);
            tracing::info!(%mountpoint, "unmounting");
            ops.umount(&target)?;
        }

        Ok(())
    }

    /// Activate every swap device, resolving swap-file paths relative
    /// to `root_path`.
    pub fn turn_on_swap(
        &self,
        tree: &DeviceTree,
        ops: &dyn MountOps,
        root_path: &Path,
    ) -> Result<()> {
        for id in &self.swap_devices {
            let Some(cell) = tree.get_device_by_id(*id) else {
                continue;
            };
            let device = cell.read();
            let path = if device.path.starts_with('/') {
                PathBuf::from(&device.path)
            } else {
                root_path.join(&device.path)
            };
            tracing::info!(device = %device.name, "activating swap");
            ops.swapon(&path)?;
        }
        Ok(())
    }

    fn turn_off_swap(&self, tree: &DeviceTree, ops: &dyn MountOps) -> Result<()> {
        for id in &self.swap_devices {
            let Some(cell) = tree.get_device_by_id(*id) else {
                continue;
            };
            let device = cell.read();
            tracing::info!(device = %device.name, "deactivating swap");
            ops.swapoff(Path::new(&device.path))?;
        }
        Ok(())
    }

    /// Read `<chroot>/etc/fstab` into the mount and swap bookkeeping.
    /// A missing fstab is not an error; unresolvable device specs are
    /// skipped.
    pub fn parse_fstab(&mut self, tree: &DeviceTree, chroot: &Path) -> Result<()> {
        let path = chroot.join("etc/fstab");
        if !path.exists() {
            tracing::debug!(path = ?path, "no fstab to parse");
            return Ok(());
        }

        for line in fs::read_to_string(&path)?.lines() {
            let Some((spec, mountpoint, fstype)) = parse_fstab_line(line) else {
                continue;
            };

            let Some(cell) = tree.resolve_device(spec) else {
                tracing::debug!(spec, "skipping fstab entry for unknown device");
                continue;
            };
            let id = cell.id();

            if fstype == "swap" {
                self.add_fstab_swap(id);
            } else if mountpoint.starts_with('/') {
                self.mountpoints.insert(mountpoint.to_string(), id);
            }
        }

        Ok(())
    }

    /// Render the mountpoints and persisted swaps into
    /// `<chroot>/etc/fstab`.
    pub fn write_fstab(&self, tree: &DeviceTree, chroot: &Path) -> Result<()> {
        let mut rendered = String::from(
            "#\n# /etc/fstab\n# Created by the installer\n#\n",
        );

        for (mountpoint, id) in &self.mountpoints {
            let Some(cell) = tree.get_device_by_id(*id) else {
                continue;
            };
            let device = cell.read();
            let spec = fstab_spec(&device.format.uuid, &device.path);
            let fstype = device.format.kind_str().unwrap_or("auto");
            let pass = if mountpoint == "/" { 1 } else { 2 };
            rendered.push_str(&format!(
                "{spec} {mountpoint} {fstype} defaults 0 {pass}\n"
            ));
        }

        for id in &self.fstab_swaps {
            let Some(cell) = tree.get_device_by_id(*id) else {
                continue;
            };
            let device = cell.read();
            let spec = fstab_spec(&device.format.uuid, &device.path);
            rendered.push_str(&format!("{spec} none swap defaults 0 0\n"));
        }

        let etc = chroot.join("etc");
        fs::create_dir_all(&etc)?;
        fs::write(etc.join("fstab"), rendered)?;
        Ok(())
    }

    /// Mount entries sorted shallowest first, so `/` mounts before
    /// `/boot` before `/boot/efi`.
    fn mount_order(&self) -> Vec<(String, DeviceId)> {
        let mut entries: Vec<(String, DeviceId)> = self
            .mountpoints
            .iter()
            .map(|(mountpoint, id)| (mountpoint.clone(), *id))
            .collect();
        entries.sort_by_key(|(mountpoint, _)| (path_depth(mountpoint), mountpoint.clone()));
        entries
    }
}

fn path_depth(mountpoint: &str) -> usize {
    mountpoint
        .split('/')
        .filter(|component| !component.is_empty())
        .count()
}

fn target_path(root_path: &Path, mountpoint: &str) -> PathBuf {
    root_path.join(mountpoint.trim_start_matches('/'))
}

fn fstab_spec(uuid: &Option<uuid::Uuid>, path: &str) -> String {
    match uuid {
        Some(uuid) => format!("UUID={uuid}"),
        None => path.to_string(),
    }
}

/// Split one fstab line into `(spec, mountpoint, fstype)`. Comments,
/// blank lines and short lines yield `None`.
fn parse_fstab_line(line: &str) -> Option<(&str, &str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut fields = line.split_whitespace();
    let spec = fields.next()?;
    let mountpoint = fields.next()?;
    let fstype = fields.next()?;
    Some((spec, mountpoint, fstype))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fstab_lines_parse_and_comments_are_skipped() {
        assert_eq!(
            parse_fstab_line("/dev/sda1 / ext4 defaults 0 1"),
            Some(("/dev/sda1", "/", "ext4"))
        );
        assert_eq!(
            parse_fstab_line("UUID=0d4d3333-88b1-4b8c-94f5-6e8a1cf1c45e /boot ext4 defaults 0 2"),
            Some((
                "UUID=0d4d3333-88b1-4b8c-94f5-6e8a1cf1c45e",
                "/boot",
                "ext4"
            ))
        );
        assert_eq!(parse_fstab_line("# comment"), None);
        assert_eq!(parse_fstab_line("   "), None);
        assert_eq!(parse_fstab_line("/dev/sda1 /"), None);
    }

    #[test]
    fn shallow_mountpoints_sort_first() {
        let mut set = FSSet::default();
        set.mountpoints.insert("/boot/efi".to_string(), DeviceId(3));
        set.mountpoints.insert("/".to_string(), DeviceId(1));
        set.mountpoints.insert("/boot".to_string(), DeviceId(2));

        let order: Vec<String> = set
            .mount_order()
            .into_iter()
            .map(|(mountpoint, _)| mountpoint)
            .collect();
        assert_eq!(order, vec!["/", "/boot", "/boot/efi"]);
    }
}
