// SPDX-License-Identifier: GPL-3.0-only

//! Low-level system backend for the installer storage model
//!
//! This crate provides the direct system-call implementations the
//! model's collaborator traits delegate to:
//! - mount(2)/umount(2) and ownership fix-ups
//! - swapon(2)/swapoff(2)
//! - active mount and swap table queries from /proc
//!
//! These operations require elevated privileges and should only be
//! called from the privileged installer process.

pub mod error;
pub mod mount;
pub mod tables;

pub use error::{Result, SysError};
pub use mount::LinuxMountOps;
pub use tables::{active_mounts, active_swaps, MountTableEntry, SwapTableEntry};
