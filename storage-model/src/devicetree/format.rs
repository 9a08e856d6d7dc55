// SPDX-License-Identifier: GPL-3.0-only

//! Filesystem and metadata formats carried by devices.

use storage_contracts::StorageError;
use storage_types::{DiskLabelKind, MIB};
use uuid::Uuid;

use crate::devicetree::PartedDisk;
use crate::error::Result;

/// The format (filesystem, disklabel, LUKS, swap, ...) on one device.
///
/// `kind == None` means the device is uninitialized. `parted_disk` is
/// only populated for existing disklabels; its `Clone` reopens the
/// native table instead of sharing handles.
#[derive(Debug, Clone, Default)]
pub struct Format {
    pub kind: Option<String>,
    pub exists: bool,
    /// Free bytes as reported by the filesystem itself. Only meaningful
    /// when `exists` is true.
    pub free: u64,
    pub mountpoint: Option<String>,
    pub label_type: Option<DiskLabelKind>,
    pub luks_version: Option<String>,
    pub passphrase: Option<String>,
    pub uuid: Option<Uuid>,
    /// Formats hidden from user-facing disk listings, e.g. multipath
    /// member signatures.
    pub hidden: bool,
    pub parted_disk: Option<PartedDisk>,
}

impl Format {
    pub fn kind_str(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind.as_deref() == Some(kind)
    }

    /// Estimate the free space a not-yet-created filesystem of this
    /// kind would have on a device of `size` bytes. The per-kind
    /// overhead model is opaque to callers.
    pub fn free_space_estimate(&self, size: u64) -> u64 {
        let overhead = match self.kind.as_deref() {
            Some("ext2") | Some("ext3") | Some("ext4") => size / 20 + 16 * MIB,
            Some("xfs") => size / 25 + 32 * MIB,
            Some("btrfs") => size / 10 + 64 * MIB,
            Some("vfat") => size / 50 + 4 * MIB,
            Some("swap") => size,
            _ => size / 10,
        };

        size.saturating_sub(overhead)
    }
}

/// Construction options understood by the format registry.
#[derive(Debug, Clone, Default)]
pub struct FormatOptions {
    pub luks_version: Option<String>,
    pub mountpoint: Option<String>,
}

/// Validating constructor for formats, backed by the low-level engine.
/// An unsupported kind or LUKS version must error so setters can reject
/// bad configuration before mutating any state.
pub trait FormatRegistry: Send + Sync {
    fn get_format(&self, kind: &str, options: &FormatOptions) -> Result<Format>;
}

/// Registry over the format kinds the installer can create itself. Used
/// as the default when no richer engine-backed registry is supplied.
#[derive(Debug, Default)]
pub struct BuiltinFormatRegistry;

const LUKS_VERSIONS: &[&str] = &["luks1", "luks2"];
const FORMAT_KINDS: &[&str] = &[
    "ext2", "ext3", "ext4", "xfs", "btrfs", "vfat", "swap", "luks", "disklabel", "iso9660",
];

impl FormatRegistry for BuiltinFormatRegistry {
    fn get_format(&self, kind: &str, options: &FormatOptions) -> Result<Format> {
        if !FORMAT_KINDS.contains(&kind) {
            return Err(StorageError::invalid_input(format!(
                "unknown format kind '{kind}'"
            )));
        }

        if kind == "luks"
            && let Some(version) = options.luks_version.as_deref()
            && !LUKS_VERSIONS.contains(&version)
        {
            return Err(StorageError::invalid_input(format!(
                "unsupported LUKS version '{version}'"
            )));
        }

        Ok(Format {
            kind: Some(kind.to_string()),
            mountpoint: options.mountpoint.clone(),
            luks_version: if kind == "luks" {
                options.luks_version.clone()
            } else {
                None
            },
            ..Format::default()
        })
    }
}
