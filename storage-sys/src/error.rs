// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

/// Error types for system-level operations
#[derive(Error, Debug)]
pub enum SysError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("system call failed: {0}")]
    Sys(#[from] nix::Error),

    #[error("swap operation on {device} failed: {errno}")]
    Swap { device: String, errno: std::io::Error },

    #[error("invalid /proc table line: {0}")]
    InvalidTableLine(String),
}

/// Result type alias for system operations
pub type Result<T> = std::result::Result<T, SysError>;
