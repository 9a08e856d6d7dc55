// SPDX-License-Identifier: GPL-3.0-only

//! Active mount and swap tables from /proc.

use std::fs;
use std::path::PathBuf;

use crate::error::{Result, SysError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountTableEntry {
    pub source: Option<String>,
    pub mount_point: PathBuf,
    pub fs_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapTableEntry {
    pub device: PathBuf,
    pub kind: String,
    pub size_kib: u64,
}

/// The calling process's view of currently mounted filesystems.
pub fn active_mounts() -> Result<Vec<MountTableEntry>> {
    let process = procfs::process::Process::myself()
        .map_err(|error| SysError::InvalidTableLine(error.to_string()))?;
    let mounts = process
        .mountinfo()
        .map_err(|error| SysError::InvalidTableLine(error.to_string()))?;

    Ok(mounts
        .0
        .into_iter()
        .map(|info| MountTableEntry {
            source: info.mount_source,
            mount_point: info.mount_point,
            fs_type: info.fs_type,
        })
        .collect())
}

/// Currently active swap areas.
pub fn active_swaps() -> Result<Vec<SwapTableEntry>> {
    parse_swaps(&fs::read_to_string("/proc/swaps")?)
}

/// Parse the /proc/swaps table. The first line is a header; fields are
/// filename, type, size (KiB), used, priority.
fn parse_swaps(input: &str) -> Result<Vec<SwapTableEntry>> {
    let mut entries = Vec::new();

    for line in input.lines().skip(1).filter(|line| !line.trim().is_empty()) {
        let mut fields = line.split_whitespace();
        let (Some(device), Some(kind), Some(size)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(SysError::InvalidTableLine(line.to_string()));
        };

        let size_kib = size
            .parse()
            .map_err(|_| SysError::InvalidTableLine(line.to_string()))?;

        entries.push(SwapTableEntry {
            device: PathBuf::from(device),
            kind: kind.to_string(),
            size_kib,
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_proc_swaps_and_skips_the_header() {
        let sample = "Filename\t\t\t\tType\t\tSize\t\tUsed\t\tPriority\n/dev/dm-1                               partition\t8388604\t\t0\t\t-2\n";

        let swaps = parse_swaps(sample).expect("parse should succeed");
        assert_eq!(
            swaps,
            vec![SwapTableEntry {
                device: PathBuf::from("/dev/dm-1"),
                kind: "partition".to_string(),
                size_kib: 8388604,
            }]
        );
    }

    #[test]
    fn rejects_malformed_swap_lines() {
        let sample = "Filename Type Size Used Priority\n/dev/dm-1 partition\n";
        assert!(parse_swaps(sample).is_err());
    }
}
