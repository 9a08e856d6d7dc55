// SPDX-License-Identifier: GPL-3.0-only

//! The device-tree layer: devices, formats, native partition-table
//! handles and the tree bookkeeping over them.

mod device;
mod format;
mod parted;
mod tree;

pub use device::{Device, DeviceCell, DeviceId, DeviceKind};
pub use format::{BuiltinFormatRegistry, Format, FormatOptions, FormatRegistry};
pub use parted::{PartedDisk, PartedPartition, PartedPartitionHandle};
pub use tree::{
    DeviceNode, DeviceNodeKind, DeviceScanner, DeviceTree, FormatNode, LIVE_BACKING_MOUNTPOINT,
};
