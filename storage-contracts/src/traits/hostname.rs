// SPDX-License-Identifier: GPL-3.0-only

/// Source of the machine's hostname, used when suggesting container and
/// volume-group names. Both values may be absent or a placeholder like
/// `localhost`; the model filters those out.
pub trait HostnameSource: Send + Sync {
    /// The statically configured hostname.
    fn hostname(&self) -> Option<String>;

    /// The live hostname as currently reported by the system.
    fn current_hostname(&self) -> Option<String>;
}
