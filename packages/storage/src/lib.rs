//! Upload storage used by the receiver and the ingestion workers.
//!
//! Two backends:
//! - On-disk storage rooted at the upload directory
//! - In-memory storage for tests
//!
//! Implementation note:
//! This is a small wrapper around `object_store`, which provides both
//! backends plus create-exclusive writes and streaming reads.

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::TryStreamExt;
use object_store::path::Path;
use object_store::{ObjectStore, ObjectStoreExt, PutMode, PutOptions, PutPayload};
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid object key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("object already exists: {0}")]
    AlreadyExists(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object_store error: {0}")]
    ObjectStore(object_store::Error),
}

impl From<object_store::Error> for StorageError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::AlreadyExists { path, .. } => StorageError::AlreadyExists(path),
            object_store::Error::NotFound { path, .. } => StorageError::NotFound(path),
            other => StorageError::ObjectStore(other),
        }
    }
}

#[derive(Debug, Clone)]
pub enum StorageConfig {
    Filesystem { root: PathBuf },
    Memory,
}

impl StorageConfig {
    pub fn memory() -> Self {
        StorageConfig::Memory
    }

    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        StorageConfig::Filesystem { root: root.into() }
    }
}

/// Byte stream over one stored object.
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Clone)]
pub struct Storage {
    /// Upload directory, for the filesystem backend.
    root: Option<PathBuf>,
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("root", &self.root)
            .finish()
    }
}

impl Storage {
    pub fn new(cfg: StorageConfig) -> Result<Self, StorageError> {
        match cfg {
            StorageConfig::Filesystem { root } => {
                ensure_dir(&root)?;
                let fs = object_store::local::LocalFileSystem::new_with_prefix(&root)?;
                Ok(Self {
                    root: Some(root),
                    store: Arc::new(fs),
                })
            }
            StorageConfig::Memory => Ok(Self {
                root: None,
                store: Arc::new(object_store::memory::InMemory::new()),
            }),
        }
    }

    /// Make sure the backing directory exists. Safe to call repeatedly.
    pub async fn ensure_root(&self) -> Result<(), StorageError> {
        if let Some(root) = &self.root {
            tokio::fs::create_dir_all(root).await?;
        }
        Ok(())
    }

    fn to_path(&self, key: &str) -> Result<Path, StorageError> {
        let key = key.trim_start_matches('/');
        if key.is_empty() {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
                reason: "object key must not be empty".to_string(),
            });
        }

        Path::parse(key).map_err(|e| StorageError::InvalidKey {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Write an object only if nothing is stored under `key` yet.
    ///
    /// Fails with [`StorageError::AlreadyExists`] otherwise; the existing
    /// object is left untouched.
    pub async fn put_new(&self, key: &str, bytes: Bytes) -> Result<(), StorageError> {
        let path = self.to_path(key)?;
        self.store
            .put_opts(
                &path,
                PutPayload::from(bytes),
                PutOptions::from(PutMode::Create),
            )
            .await?;
        tracing::debug!(key, root = ?self.root, "stored object");
        Ok(())
    }

    /// Open an object for streaming reads without buffering it whole.
    pub async fn open_reader(&self, key: &str) -> Result<ObjectReader, StorageError> {
        let path = self.to_path(key)?;
        let res = self.store.get(&path).await?;
        let stream = res.into_stream().map_err(std::io::Error::other);
        Ok(Box::new(StreamReader::new(stream)))
    }

    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.to_path(key)?;
        self.store.delete(&path).await?;
        Ok(())
    }
}

fn ensure_dir(root: &FsPath) -> Result<(), StorageError> {
    std::fs::create_dir_all(root)?;
    Ok(())
}
