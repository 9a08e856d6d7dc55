// SPDX-License-Identifier: GPL-3.0-only

mod error;

pub use error::{StorageError, StorageErrorKind};
