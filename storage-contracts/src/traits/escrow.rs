// SPDX-License-Identifier: GPL-3.0-only

use crate::StorageError;

/// Downloads escrow certificates used to unlock encrypted storage
/// during automated deployments. The model caches results per URL for
/// the lifetime of the process, so a fetcher is called at most once for
/// any given URL.
pub trait EscrowFetcher: Send + Sync {
    fn download_escrow_certificate(&self, url: &str) -> Result<Vec<u8>, StorageError>;
}
