// SPDX-License-Identifier: GPL-3.0-only

//! Installation-target settings the model is constructed with.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use storage_contracts::StorageError;

use crate::error::Result;

/// Target configuration, loaded from TOML by the surrounding installer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Installing into disk-image files instead of real block devices.
    pub is_image: bool,
    /// Disk image name -> image file path. Attached on every `reset()`
    /// when `is_image` is set.
    pub disk_images: BTreeMap<String, PathBuf>,
    /// Where the target root is made writable.
    pub system_root: PathBuf,
    /// Mountpoint of the physical root during installation.
    pub physical_root: PathBuf,
    pub default_fstype: String,
    pub default_luks_version: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            is_image: false,
            disk_images: BTreeMap::new(),
            system_root: PathBuf::from("/mnt/sysroot"),
            physical_root: PathBuf::from("/mnt/sysimage"),
            default_fstype: "ext4".to_string(),
            default_luks_version: "luks2".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|error| {
            StorageError::invalid_input(format!("bad storage config {path:?}: {error}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_config_with_defaults() {
        let config: StorageConfig = toml::from_str(
            r#"
            is_image = true
            default_fstype = "xfs"

            [disk_images]
            disk0 = "/var/tmp/disk0.img"
            "#,
        )
        .unwrap();

        assert!(config.is_image);
        assert_eq!(config.default_fstype, "xfs");
        assert_eq!(config.default_luks_version, "luks2");
        assert_eq!(
            config.disk_images.get("disk0"),
            Some(&PathBuf::from("/var/tmp/disk0.img"))
        );
    }
}
