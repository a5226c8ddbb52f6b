use async_trait::async_trait;
use axum::body::Bytes;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::{errors::AppError, storage::traits::BlobStore};

/// One file per attachment under `root`, named by its hash.
pub struct FilesystemBlobStore {
    root: PathBuf,
}

impl FilesystemBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, hash: &str) -> Result<PathBuf, AppError> {
        if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AppError::BadRequest(format!("Invalid attachment hash: {hash}")));
        }
        Ok(self.root.join(hash.to_ascii_lowercase()))
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put(&self, hash: &str, bytes: Bytes) -> Result<(), AppError> {
        let path = self.path_for(hash)?;
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(&path, &bytes).await?;
        tracing::debug!("Stored attachment {} ({} bytes)", hash, bytes.len());
        Ok(())
    }

    async fn get(&self, hash: &str) -> Result<Option<Bytes>, AppError> {
        let path = self.path_for(hash)?;
        match tokio::fs::read(&path).await {
            Ok(contents) => Ok(Some(Bytes::from(contents))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
