// SPDX-License-Identifier: GPL-3.0-only

/// The bootloader installer collaborator.
///
/// The model holds at most one instance, constructed lazily on first
/// access and dropped on every `reset()` so no stale device references
/// survive a rescan.
pub trait Bootloader: Send + Sync {
    /// Filesystem types the bootloader can read its second stage from.
    /// Never empty.
    fn stage2_format_types(&self) -> &[String];

    /// Clear any cached device state.
    fn reset(&mut self);
}

pub trait BootloaderFactory: Send + Sync {
    fn create_boot_loader(&self) -> Box<dyn Bootloader>;
}
