//! Blob storage for generated feedback audio.
//!
//! The pipeline writes synthesized audio here and hands the resulting
//! public URL to the messaging gateway.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::error::StorageError;

/// Write-once blob sink returning a publicly reachable URL per key.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String, StorageError>;
}

/// Filesystem-backed blob storage: writes under a base directory and maps
/// keys to URLs under a configured public base (served by a static host).
pub struct FsBlobStorage {
    base_dir: PathBuf,
    public_base_url: String,
}

impl FsBlobStorage {
    pub fn new(base_dir: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl BlobStorage for FsBlobStorage {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String, StorageError> {
        // Keys are generated internally (uuid-based); reject anything that
        // could escape the base directory anyway.
        if key.contains("..") || key.starts_with('/') {
            return Err(StorageError::PutFailed {
                key: key.to_string(),
                reason: "invalid key".to_string(),
            });
        }

        let path = self.base_dir.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        debug!(key = %key, bytes = bytes.len(), "Blob stored");
        Ok(format!("{}/{key}", self.public_base_url))
    }
}
