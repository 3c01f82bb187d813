//! Raw message storage.
//!
//! Raw MIME bytes live outside the record store, keyed by message ID.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Errors from blob storage.
#[derive(Debug, Error)]
pub enum BlobError {
    /// No blob under this key.
    #[error("blob not found: {0}")]
    NotFound(String),

    /// The key cannot name a blob.
    #[error("invalid blob key: {0:?}")]
    InvalidKey(String),

    /// I/O failure.
    #[error("blob I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for blob operations.
pub type BlobResult<T> = std::result::Result<T, BlobError>;

/// Key-addressed byte storage.
#[allow(async_fn_in_trait)]
pub trait BlobStore {
    /// Returns the bytes stored under `key`.
    async fn get(&self, key: &str) -> BlobResult<Vec<u8>>;

    /// Stores `bytes` under `key`, replacing any previous blob.
    async fn put(&self, key: &str, bytes: &[u8]) -> BlobResult<()>;

    /// Removes the blob under `key`.
    async fn delete(&self, key: &str) -> BlobResult<()>;
}

/// Blob store with one file per key under a root directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Opens (and creates if needed) a blob directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn open(root: impl Into<PathBuf>) -> BlobResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> BlobResult<PathBuf> {
        let valid = !key.is_empty()
            && key != "."
            && key != ".."
            && !key.starts_with('.')
            && !key.contains(['/', '\\', '\0']);
        if valid {
            Ok(self.root.join(key))
        } else {
            Err(BlobError::InvalidKey(key.to_string()))
        }
    }
}

fn not_found(key: &str) -> impl FnOnce(std::io::Error) -> BlobError + '_ {
    move |err| {
        if err.kind() == ErrorKind::NotFound {
            BlobError::NotFound(key.to_string())
        } else {
            BlobError::Io(err)
        }
    }
}

impl BlobStore for FsBlobStore {
    async fn get(&self, key: &str) -> BlobResult<Vec<u8>> {
        let path = self.path(key)?;
        tokio::fs::read(&path).await.map_err(not_found(key))
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> BlobResult<()> {
        let path = self.path(key)?;
        let tmp = self.root.join(format!(".{key}.tmp"));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(key, size = bytes.len(), "stored blob");
        Ok(())
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        let path = self.path(key)?;
        tokio::fs::remove_file(&path).await.map_err(not_found(key))?;
        debug!(key, "deleted blob");
        Ok(())
    }
}
