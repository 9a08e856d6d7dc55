// SPDX-License-Identifier: GPL-3.0-only

pub use storage_contracts::{StorageError, StorageErrorKind};

/// Result type alias for storage-model operations.
pub type Result<T> = std::result::Result<T, StorageError>;
