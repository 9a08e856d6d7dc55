//! Disk label (partition table) kinds and per-platform support.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Partition table kinds the installer knows how to work with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskLabelKind {
    Gpt,
    Msdos,
    Dasd,
    Sun,
}

impl DiskLabelKind {
    /// Label kinds the current hardware platform can boot from and
    /// partition. Disks carrying any other label are skipped by the
    /// free-space aggregation.
    pub fn platform_label_types() -> &'static [DiskLabelKind] {
        if cfg!(target_arch = "s390x") {
            &[DiskLabelKind::Dasd, DiskLabelKind::Msdos]
        } else if cfg!(target_arch = "sparc64") {
            &[DiskLabelKind::Sun]
        } else if cfg!(target_arch = "powerpc64") {
            &[DiskLabelKind::Msdos, DiskLabelKind::Gpt]
        } else {
            &[DiskLabelKind::Gpt, DiskLabelKind::Msdos]
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DiskLabelKind::Gpt => "gpt",
            DiskLabelKind::Msdos => "msdos",
            DiskLabelKind::Dasd => "dasd",
            DiskLabelKind::Sun => "sun",
        }
    }
}

impl fmt::Display for DiskLabelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
