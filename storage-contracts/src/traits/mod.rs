// SPDX-License-Identifier: GPL-3.0-only

pub mod bootloader;
pub mod escrow;
pub mod hostname;
pub mod mount;

pub use bootloader::{Bootloader, BootloaderFactory};
pub use escrow::EscrowFetcher;
pub use hostname::HostnameSource;
pub use mount::MountOps;
