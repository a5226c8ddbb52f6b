use async_trait::async_trait;
use axum::body::Bytes;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::{errors::AppError, storage::traits::BlobStore};

#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, Bytes>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, hash: &str, bytes: Bytes) -> Result<(), AppError> {
        self.blobs
            .write()
            .map_err(|_| AppError::InternalError(anyhow::anyhow!("blob store lock poisoned")))?
            .insert(hash.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, hash: &str) -> Result<Option<Bytes>, AppError> {
        Ok(self
            .blobs
            .read()
            .map_err(|_| AppError::InternalError(anyhow::anyhow!("blob store lock poisoned")))?
            .get(hash)
            .cloned())
    }
}
