// SPDX-License-Identifier: GPL-3.0-only

//! Installer storage model.
//!
//! The stateful orchestration layer above the low-level device and
//! format engine: which block devices exist, which are eligible for
//! installation, which must be protected from modification, how much
//! space is reclaimable, how the target hierarchy is mounted, and how a
//! what-if copy of the whole configuration is produced and discarded
//! without touching the real one.

pub mod config;
pub mod devicetree;
pub mod error;
pub mod fsset;
pub mod model;
pub mod root;

pub use config::StorageConfig;
pub use devicetree::{
    BuiltinFormatRegistry, Device, DeviceCell, DeviceId, DeviceKind, DeviceNode, DeviceNodeKind,
    DeviceScanner, DeviceTree, Format, FormatNode, FormatOptions, FormatRegistry, PartedDisk,
    PartedPartition,
};
pub use error::{Result, StorageError, StorageErrorKind};
pub use fsset::FSSet;
pub use model::{Collaborators, DEFAULT_FREE_SPACE_MOUNT_POINTS, StorageModel};
pub use root::{NoopRootFinder, Root, RootFinder};
