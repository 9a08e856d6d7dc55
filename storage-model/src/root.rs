// SPDX-License-Identifier: GPL-3.0-only

//! Previously installed operating systems discovered on the tree.

use std::collections::BTreeMap;

use crate::devicetree::{DeviceId, DeviceTree};
use crate::error::Result;

/// One discovered prior installation. Holds device identities rather
/// than device references, so it can be rebound against a copied tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root {
    pub name: String,
    /// Mountpoint -> device, as recorded in the installation's fstab.
    pub mounts: BTreeMap<String, DeviceId>,
    pub swaps: Vec<DeviceId>,
}

impl Root {
    /// Rebind this root against another storage model's tree, dropping
    /// any device reference that no longer resolves there.
    pub fn copy_with(&self, tree: &DeviceTree) -> Root {
        let mounts = self
            .mounts
            .iter()
            .filter(|(_, id)| tree.get_device_by_id(**id).is_some())
            .map(|(mountpoint, id)| (mountpoint.clone(), *id))
            .collect();

        let swaps = self
            .swaps
            .iter()
            .copied()
            .filter(|id| tree.get_device_by_id(*id).is_some())
            .collect();

        Root {
            name: self.name.clone(),
            mounts,
            swaps,
        }
    }

    pub fn root_device(&self) -> Option<DeviceId> {
        self.mounts.get("/").copied()
    }
}

/// Scans a populated tree for existing installations.
pub trait RootFinder: Send + Sync {
    fn find_existing_installations(&self, tree: &DeviceTree) -> Result<Vec<Root>>;
}

/// Finder that reports no prior installations. Useful for fresh-disk
/// deployments and as a default collaborator.
#[derive(Debug, Default)]
pub struct NoopRootFinder;

impl RootFinder for NoopRootFinder {
    fn find_existing_installations(&self, _tree: &DeviceTree) -> Result<Vec<Root>> {
        Ok(Vec::new())
    }
}
