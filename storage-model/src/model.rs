// SPDX-License-Identifier: GPL-3.0-only

//! The installer storage model: lifecycle, device protection, disk
//! selection, free-space aggregation, what-if copies, mount and fstab
//! orchestration.
//!
//! All operations are synchronous and assume a single controlling
//! thread; a failed `reset()` leaves the state unreliable and callers
//! must not proceed to mount or partition operations.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use storage_contracts::{
    Bootloader, BootloaderFactory, EscrowFetcher, HostnameSource, MountOps,
};
use storage_types::{DiskLabelKind, safe_device_name};

use crate::config::StorageConfig;
use crate::devicetree::{
    DeviceCell, DeviceId, DeviceKind, DeviceScanner, DeviceTree, FormatOptions, FormatRegistry,
};
use crate::error::Result;
use crate::fsset::FSSet;
use crate::root::{Root, RootFinder};

/// Mount points scanned by default when estimating filesystem free
/// space for package installation.
pub const DEFAULT_FREE_SPACE_MOUNT_POINTS: &[&str] = &["/", "/usr"];

const IGNORED_HOSTNAMES: &[&str] = &["", "localhost", "localhost.localdomain"];

/// The external engines the model delegates to. Shared by reference
/// with every copy of the model; they are the surrounding installer's
/// machinery, not model state.
#[derive(Clone)]
pub struct Collaborators {
    pub scanner: Arc<dyn DeviceScanner>,
    pub root_finder: Arc<dyn RootFinder>,
    pub format_registry: Arc<dyn FormatRegistry>,
    pub bootloader_factory: Arc<dyn BootloaderFactory>,
    pub mount_ops: Arc<dyn MountOps>,
    pub escrow: Arc<dyn EscrowFetcher>,
    pub hostname_source: Arc<dyn HostnameSource>,
}

pub struct StorageModel {
    config: StorageConfig,
    devicetree: DeviceTree,
    fsset: FSSet,
    roots: Vec<Root>,
    /// The requested protection specs, distinct from the resolved set
    /// of protected devices.
    protected_devices: Vec<String>,
    /// Escrow certificate cache, keyed by exact URL. Never expires
    /// within the process lifetime.
    escrow_certificates: HashMap<String, Vec<u8>>,
    /// LUKS passphrases cached across resets so the user is not
    /// re-prompted.
    saved_passphrases: HashMap<String, String>,
    default_luks_version: String,
    /// Lazily constructed; dropped on every reset and never shared with
    /// a copy.
    bootloader: Option<Box<dyn Bootloader>>,
    /// Active system root recorded by `mount_filesystems`.
    system_root: Option<PathBuf>,
    root_finder: Arc<dyn RootFinder>,
    format_registry: Arc<dyn FormatRegistry>,
    bootloader_factory: Arc<dyn BootloaderFactory>,
    mount_ops: Arc<dyn MountOps>,
    escrow: Arc<dyn EscrowFetcher>,
    hostname_source: Arc<dyn HostnameSource>,
}

impl StorageModel {
    pub fn new(config: StorageConfig, collaborators: Collaborators) -> Result<Self> {
        let devicetree = DeviceTree::new(
            Arc::clone(&collaborators.scanner),
            config.disk_images.clone(),
            config.default_fstype.clone(),
        );

        let mut model = Self {
            devicetree,
            fsset: FSSet::default(),
            roots: Vec::new(),
            protected_devices: Vec::new(),
            escrow_certificates: HashMap::new(),
            saved_passphrases: HashMap::new(),
            default_luks_version: String::new(),
            bootloader: None,
            system_root: None,
            root_finder: collaborators.root_finder,
            format_registry: collaborators.format_registry,
            bootloader_factory: collaborators.bootloader_factory,
            mount_ops: collaborators.mount_ops,
            escrow: collaborators.escrow,
            hostname_source: collaborators.hostname_source,
            config,
        };

        let luks_version = model.config.default_luks_version.clone();
        model.set_default_luks_version(&luks_version)?;
        Ok(model)
    }

    // ------------------------------------------------------------------
    // Lifecycle and protection

    /// Re-synchronize with actual system state: re-attach disk images,
    /// cache LUKS passphrases, rescan, recompute protection, tear down
    /// unprotected devices, rebuild the FSSet, drop the bootloader and
    /// rediscover prior installations.
    ///
    /// Any error propagates as-is; there is no partial-success state.
    pub fn reset(&mut self, cleanup_only: bool) -> Result<()> {
        tracing::info!(cleanup_only, "resetting storage model");

        if self.config.is_image {
            self.devicetree.setup_disk_images()?;
        }

        for cell in self.devicetree.all_devices() {
            let device = cell.read();
            if device.format.is_kind("luks")
                && device.format.exists
                && let Some(passphrase) = device.format.passphrase.clone()
            {
                self.saved_passphrases.insert(device.name.clone(), passphrase);
            }
        }

        self.devicetree.populate(cleanup_only)?;
        self.mark_protected_devices();
        self.devicetree.teardown_all()?;

        self.fsset = FSSet::new(&self.devicetree);
        self.bootloader = None;

        self.roots.clear();
        self.roots = self
            .root_finder
            .find_existing_installations(&self.devicetree)?;

        tracing::info!(roots = self.roots.len(), "storage model reset complete");
        Ok(())
    }

    /// Mark the union of requested specs, the live backing device with
    /// its parent chain, all cdrom devices and all iso9660-formatted
    /// devices as protected. Only ever adds protection.
    fn mark_protected_devices(&mut self) {
        let mut protected: Vec<DeviceCell> = Vec::new();

        for spec in &self.protected_devices {
            match self.devicetree.resolve_device(spec) {
                Some(cell) => {
                    tracing::debug!(%spec, device = %cell.name(), "protected spec resolved");
                    protected.push(cell);
                }
                None => tracing::debug!(%spec, "protected spec did not resolve, skipping"),
            }
        }

        if let Some(live) = self.devicetree.live_backing_device() {
            tracing::debug!(device = %live.name(), "resolved live backing device");
            let mut stack = live.read().parents.clone();
            protected.push(live);
            while let Some(id) = stack.pop() {
                if let Some(parent) = self.devicetree.get_device_by_id(id) {
                    stack.extend(parent.read().parents.iter().copied());
                    protected.push(parent);
                }
            }
        }

        // Tearing a cdrom down unmounts the media; iso9660 devices are
        // only ever an installation source.
        for cell in self.devicetree.devices() {
            let device = cell.read();
            if matches!(device.kind, DeviceKind::Cdrom) || device.format.is_kind("iso9660") {
                protected.push(cell.clone());
            }
        }

        for cell in protected {
            let mut device = cell.write();
            if !device.protected {
                tracing::debug!(device = %device.name, "marking device as protected");
                device.protected = true;
            }
        }
    }

    /// Replace the requested protection set. Devices protected now but
    /// absent from `specs` are unprotected, newly listed ones are
    /// protected, the rest are untouched. Unresolvable specs are
    /// skipped.
    pub fn protect_devices(&mut self, specs: Vec<String>) {
        let requested: HashSet<&str> = specs.iter().map(String::as_str).collect();
        let current: HashSet<&str> = self.protected_devices.iter().map(String::as_str).collect();

        for spec in current.difference(&requested) {
            if let Some(cell) = self.devicetree.resolve_device(spec) {
                tracing::debug!(device = %cell.name(), "marking device as unprotected");
                cell.write().protected = false;
            }
        }

        for spec in requested.difference(&current) {
            if let Some(cell) = self.devicetree.resolve_device(spec) {
                tracing::debug!(device = %cell.name(), "marking device as protected");
                cell.write().protected = true;
            }
        }

        self.protected_devices = specs;
    }

    /// Disks the installation may use: disk-like, unprotected, with a
    /// visible format, and either carrying media or an unformatted
    /// DASD. Deduplicated and sorted by name.
    pub fn usable_disks(&self) -> Vec<DeviceCell> {
        let mut candidates: Vec<DeviceCell> = self.devicetree.devices().to_vec();

        if self.config.is_image {
            candidates.extend(
                self.devicetree
                    .hidden()
                    .iter()
                    .filter(|cell| {
                        self.devicetree
                            .disk_images()
                            .contains_key(&cell.read().name)
                    })
                    .cloned(),
            );
        } else {
            candidates.extend(self.devicetree.hidden().iter().cloned());
        }

        let mut seen: BTreeSet<DeviceId> = BTreeSet::new();
        let mut disks: Vec<DeviceCell> = Vec::new();

        for cell in candidates {
            let accepted = {
                let device = cell.read();
                let eligible =
                    device.is_disk_like() && !device.format.hidden && !device.protected;
                // Unformatted DASDs scan with size 0 but stay usable.
                let has_media =
                    device.is_dasd() || (device.size > 0 && device.media_present);
                eligible && has_media && seen.insert(device.id)
            };
            if accepted {
                disks.push(cell);
            }
        }

        disks.sort_by_key(|cell| cell.read().name.clone());
        disks
    }

    /// Reconcile disk visibility with the selection: hide usable disks
    /// that are not selected, unhide selected ones. Idempotent.
    pub fn select_disks(&mut self, selected_names: &[String]) {
        for cell in self.usable_disks() {
            let (id, name) = {
                let device = cell.read();
                (device.id, device.name.clone())
            };

            if selected_names.contains(&name) {
                if !self.devicetree.is_visible(id) {
                    self.devicetree.unhide(id);
                }
            } else if self.devicetree.is_visible(id) {
                self.devicetree.hide(id);
            }
        }
    }

    // ------------------------------------------------------------------
    // Free-space aggregation

    /// Total free space over the given mount points, counting each
    /// composite volume at most once and estimating for filesystems
    /// that do not exist yet.
    pub fn get_file_system_free_space(&self, mount_points: &[&str]) -> u64 {
        let mut free = 0u64;
        let mut visited_volumes: Vec<DeviceId> = Vec::new();

        for mount_point in mount_points {
            let Some(id) = self.fsset.device_for(mount_point) else {
                continue;
            };
            let Some(cell) = self.devicetree.get_device_by_id(id) else {
                continue;
            };
            let device = cell.read();

            if let DeviceKind::Subvolume { volume } = device.kind {
                if visited_volumes.contains(&volume) {
                    continue;
                }
                visited_volumes.push(volume);
            }

            free += if device.format.exists {
                device.format.free
            } else {
                device.format.free_space_estimate(device.size)
            };
        }

        free
    }

    /// Space genuinely outside any partition, summed over the disks.
    pub fn get_disk_free_space(&self, disks: Option<Vec<DeviceCell>>) -> u64 {
        let disks = self.supported_label_disks(disks);
        self.devicetree
            .get_free_space(&disks)
            .values()
            .map(|(raw_free, _)| raw_free)
            .sum()
    }

    /// Space recoverable by shrinking or deleting existing partitions,
    /// summed over the disks. Reported separately from raw free space,
    /// never conflated with it.
    pub fn get_disk_reclaimable_space(&self, disks: Option<Vec<DeviceCell>>) -> u64 {
        let disks = self.supported_label_disks(disks);
        self.devicetree
            .get_free_space(&disks)
            .values()
            .map(|(_, reclaimable)| reclaimable)
            .sum()
    }

    fn supported_label_disks(&self, disks: Option<Vec<DeviceCell>>) -> Vec<DeviceCell> {
        let disks = disks.unwrap_or_else(|| self.devicetree.disks());
        skip_unsupported_disk_labels(disks)
    }

    // ------------------------------------------------------------------
    // Snapshot / copy

    /// Produce a fully independent clone for evaluating a hypothetical
    /// configuration. Mutating the clone has no observable effect on
    /// the original and vice versa; native partition handles are
    /// reattached from the clone's own reopened tables.
    pub fn copy(&self) -> StorageModel {
        tracing::debug!("creating a copy of the storage model");

        let tree = self.devicetree.deep_copy();

        for cell in self.devicetree.all_devices() {
            let (id, had_handle) = {
                let original = cell.read();
                let DeviceKind::Partition { parted, .. } = &original.kind else {
                    continue;
                };
                (original.id, parted.is_some())
            };

            let Some(clone_cell) = tree.get_device_by_id(id) else {
                continue;
            };

            let relinked = if had_handle {
                tree.table_handle_for(&clone_cell)
            } else {
                None
            };

            let mut clone_device = clone_cell.write();
            if let DeviceKind::Partition { parted, req_disks } = &mut clone_device.kind {
                *parted = relinked;
                req_disks.retain(|disk| tree.get_device_by_id(*disk).is_some());
            }
        }

        let roots = self.roots.iter().map(|root| root.copy_with(&tree)).collect();

        tracing::debug!("finished a copy of the storage model");

        StorageModel {
            config: self.config.clone(),
            devicetree: tree,
            fsset: self.fsset.clone(),
            roots,
            protected_devices: self.protected_devices.clone(),
            escrow_certificates: self.escrow_certificates.clone(),
            saved_passphrases: self.saved_passphrases.clone(),
            default_luks_version: self.default_luks_version.clone(),
            bootloader: None,
            system_root: self.system_root.clone(),
            root_finder: Arc::clone(&self.root_finder),
            format_registry: Arc::clone(&self.format_registry),
            bootloader_factory: Arc::clone(&self.bootloader_factory),
            mount_ops: Arc::clone(&self.mount_ops),
            escrow: Arc::clone(&self.escrow),
            hostname_source: Arc::clone(&self.hostname_source),
        }
    }

    // ------------------------------------------------------------------
    // Mount and fstab orchestration

    pub fn turn_on_swap(&self) -> Result<()> {
        let root = self.active_root();
        self.fsset
            .turn_on_swap(&self.devicetree, self.mount_ops.as_ref(), &root)
    }

    /// Mount the target hierarchy under `root_path` and record it as
    /// the active system root.
    pub fn mount_filesystems(&mut self, root_path: &Path) -> Result<()> {
        self.fsset
            .mount_filesystems(&self.devicetree, self.mount_ops.as_ref(), root_path)?;
        self.system_root = Some(root_path.to_path_buf());
        Ok(())
    }

    /// Unmount the target hierarchy and clear the active system root.
    pub fn umount_filesystems(&mut self, swapoff: bool) -> Result<()> {
        let root = self.active_root();
        self.fsset
            .umount_filesystems(&self.devicetree, self.mount_ops.as_ref(), &root, swapoff)?;
        self.system_root = None;
        Ok(())
    }

    pub fn parse_fstab(&mut self, chroot: Option<&Path>) -> Result<()> {
        let chroot = chroot
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.active_root());
        self.fsset.parse_fstab(&self.devicetree, &chroot)
    }

    pub fn write_fstab(&self, chroot: Option<&Path>) -> Result<()> {
        let chroot = chroot
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.active_root());
        self.fsset.write_fstab(&self.devicetree, &chroot)
    }

    /// Ensure `/etc/mtab` inside the target is a symlink to
    /// `/proc/self/mounts`. Returns whether the link had to be written;
    /// a correct pre-existing link is left untouched.
    pub fn make_mtab(&self, chroot: Option<&Path>) -> Result<bool> {
        let chroot = chroot
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.active_root());
        let path = chroot.join("etc/mtab");
        let target = Path::new("/proc/self/mounts");

        if let Ok(existing) = fs::read_link(&path)
            && existing == target
        {
            return Ok(false);
        }

        if path.symlink_metadata().is_ok() {
            fs::remove_file(&path)?;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        std::os::unix::fs::symlink(target, &path)?;
        Ok(true)
    }

    pub fn add_fstab_swap(&mut self, device: DeviceId) {
        self.fsset.add_fstab_swap(device);
    }

    pub fn set_fstab_swaps(&mut self, devices: &[DeviceId]) {
        self.fsset.set_fstab_swaps(devices);
    }

    // ------------------------------------------------------------------
    // Escrow certificates and naming

    /// Certificate bytes for `url`, fetched once per process and cached
    /// thereafter. An empty URL yields `None`.
    pub fn get_escrow_certificate(&mut self, url: &str) -> Result<Option<Vec<u8>>> {
        if url.is_empty() {
            return Ok(None);
        }

        if let Some(cached) = self.escrow_certificates.get(url) {
            return Ok(Some(cached.clone()));
        }

        tracing::info!(url, "downloading escrow certificate");
        let certificate = self.escrow.download_escrow_certificate(url)?;
        self.escrow_certificates
            .insert(url.to_string(), certificate.clone());
        Ok(Some(certificate))
    }

    fn get_hostname(&self) -> Option<String> {
        let keep = |hostname: Option<String>| {
            hostname.filter(|name| !IGNORED_HOSTNAMES.contains(&name.as_str()))
        };

        keep(self.hostname_source.hostname())
            .or_else(|| keep(self.hostname_source.current_hostname()))
    }

    /// Template for suggested container and volume-group names: the
    /// prefix plus the first DNS label of the hostname, reduced to
    /// characters the device-naming scheme accepts, with an `_image`
    /// suffix when installing into disk images.
    pub fn container_name_template(&self, prefix: Option<&str>) -> String {
        let prefix = prefix.unwrap_or("");

        let mut template = match self.get_hostname() {
            Some(hostname) => {
                let label = hostname.split('.').next().unwrap_or("").to_lowercase();
                safe_device_name(&format!("{prefix}_{label}"))
            }
            None => prefix.to_string(),
        };

        if self.config.is_image {
            template = format!("{template}_image");
        }

        template
    }

    // ------------------------------------------------------------------
    // Defaults

    pub fn default_luks_version(&self) -> &str {
        &self.default_luks_version
    }

    /// Validates before mutating: an unsupported version errors and
    /// leaves the current default untouched.
    pub fn set_default_luks_version(&mut self, version: &str) -> Result<()> {
        tracing::debug!(version, "trying to set new default luks version");
        self.check_valid_luks_version(version)?;
        self.default_luks_version = version.to_string();
        Ok(())
    }

    fn check_valid_luks_version(&self, version: &str) -> Result<()> {
        let options = FormatOptions {
            luks_version: Some(version.to_string()),
            ..FormatOptions::default()
        };
        self.format_registry.get_format("luks", &options)?;
        Ok(())
    }

    pub fn default_fstype(&self) -> &str {
        self.devicetree.default_fstype()
    }

    pub fn set_default_fstype(&mut self, fstype: &str) -> Result<()> {
        self.format_registry
            .get_format(fstype, &FormatOptions::default())?;
        self.devicetree.set_default_fstype(fstype);
        Ok(())
    }

    /// The default filesystem type for `mountpoint`; `/boot` is limited
    /// to what the bootloader can read its second stage from.
    pub fn get_fstype(&mut self, mountpoint: Option<&str>) -> String {
        if mountpoint == Some("/boot") {
            self.default_boot_fstype()
        } else {
            self.devicetree.default_fstype().to_string()
        }
    }

    pub fn default_boot_fstype(&mut self) -> String {
        let default = self.devicetree.default_fstype().to_string();
        let stage2 = self.bootloader().stage2_format_types();

        if stage2.iter().any(|fstype| *fstype == default) {
            default
        } else {
            stage2.first().cloned().unwrap_or(default)
        }
    }

    /// The bootloader singleton, constructed on first access.
    pub fn bootloader(&mut self) -> &mut Box<dyn Bootloader> {
        self.bootloader
            .get_or_insert_with(|| self.bootloader_factory.create_boot_loader())
    }

    // ------------------------------------------------------------------
    // Read-only views

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn devicetree(&self) -> &DeviceTree {
        &self.devicetree
    }

    pub fn devicetree_mut(&mut self) -> &mut DeviceTree {
        &mut self.devicetree
    }

    pub fn fsset(&self) -> &FSSet {
        &self.fsset
    }

    pub fn roots(&self) -> &[Root] {
        &self.roots
    }

    pub fn protected_devices(&self) -> &[String] {
        &self.protected_devices
    }

    pub fn saved_passphrases(&self) -> &HashMap<String, String> {
        &self.saved_passphrases
    }

    pub fn system_root(&self) -> Option<&Path> {
        self.system_root.as_deref()
    }

    pub fn mountpoints(&self) -> &BTreeMap<String, DeviceId> {
        self.fsset.mountpoints()
    }

    pub fn root_device(&self) -> Option<DeviceCell> {
        self.fsset
            .root_device()
            .and_then(|id| self.devicetree.get_device_by_id(id))
    }

    /// The device `/boot` lives on, falling back to the root device.
    pub fn boot_device(&self) -> Option<DeviceCell> {
        let id = self
            .fsset
            .device_for("/boot")
            .or_else(|| self.fsset.root_device())?;
        self.devicetree.get_device_by_id(id)
    }

    fn active_root(&self) -> PathBuf {
        self.system_root
            .clone()
            .unwrap_or_else(|| self.config.system_root.clone())
    }
}

/// Keep disks whose disklabel, if any, the current platform supports;
/// uninitialized disks always pass.
fn skip_unsupported_disk_labels(disks: Vec<DeviceCell>) -> Vec<DeviceCell> {
    let supported = DiskLabelKind::platform_label_types();

    disks
        .into_iter()
        .filter(|cell| {
            let device = cell.read();
            match device.format.kind_str() {
                None => true,
                Some("disklabel") => device
                    .format
                    .label_type
                    .is_some_and(|label| supported.contains(&label)),
                Some(_) => false,
            }
        })
        .collect()
}

impl std::fmt::Debug for StorageModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageModel")
            .field("devicetree", &self.devicetree)
            .field("roots", &self.roots.len())
            .field("protected_devices", &self.protected_devices)
            .field("default_luks_version", &self.default_luks_version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devicetree::{Device, Format};

    fn labeled_disk(name: &str, label: Option<DiskLabelKind>) -> DeviceCell {
        DeviceCell::new(Device {
            id: DeviceId(name.len() as u64),
            name: name.to_string(),
            path: format!("/dev/{name}"),
            size: 1 << 30,
            kind: DeviceKind::Disk,
            parents: Vec::new(),
            protected: false,
            media_present: true,
            format: Format {
                kind: label.map(|_| "disklabel".to_string()),
                exists: label.is_some(),
                label_type: label,
                ..Format::default()
            },
            raw_free: 0,
            reclaimable_free: 0,
        })
    }

    #[test]
    fn unlabeled_disks_always_pass_the_label_filter() {
        let disks = vec![
            labeled_disk("sda", Some(DiskLabelKind::Gpt)),
            labeled_disk("sdb", None),
        ];

        let kept = skip_unsupported_disk_labels(disks);
        assert!(kept.iter().any(|cell| cell.read().name == "sdb"));
    }

    #[test]
    fn sun_labels_are_dropped_on_non_sparc_platforms() {
        if cfg!(any(target_arch = "x86_64", target_arch = "aarch64")) {
            let kept = skip_unsupported_disk_labels(vec![labeled_disk(
                "sdc",
                Some(DiskLabelKind::Sun),
            )]);
            assert!(kept.is_empty());
        }
    }
}
