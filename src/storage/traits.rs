use async_trait::async_trait;
use axum::body::Bytes;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::{errors::AppError, storage::expression::Expression};

/// Documents yielded by a find, each carrying its `_id`.
pub type Cursor = BoxStream<'static, Result<Value, AppError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Sorting is always on the insertion-order key.
#[derive(Debug, Clone, Copy, Default)]
pub struct FindOptions {
    pub sort: Option<SortOrder>,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn sorted(sort: SortOrder) -> Self {
        Self {
            sort: Some(sort),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Registers a unique constraint on a dotted field of a collection.
    /// Inserts violating it fail with `AppError::Conflict`.
    async fn create_unique_index(&self, collection: &str, field: &str) -> Result<(), AppError>;

    async fn find(
        &self,
        collection: &str,
        filter: &Expression,
        options: FindOptions,
    ) -> Result<Cursor, AppError>;

    async fn find_one(&self, collection: &str, filter: &Expression)
    -> Result<Option<Value>, AppError>;

    async fn count(&self, collection: &str, filter: &Expression) -> Result<u64, AppError>;

    /// Returns the assigned `_id`.
    async fn insert_one(&self, collection: &str, document: Value) -> Result<i64, AppError>;

    /// All-or-nothing: either every document is inserted or none is.
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Value>,
    ) -> Result<Vec<i64>, AppError>;

    /// Replaces the body of every matching document, returning how many matched.
    async fn update(
        &self,
        collection: &str,
        filter: &Expression,
        document: Value,
    ) -> Result<u64, AppError>;

    /// Replaces the first matching document, or inserts when nothing matches.
    async fn upsert(
        &self,
        collection: &str,
        filter: &Expression,
        document: Value,
    ) -> Result<(), AppError>;

    async fn delete(&self, collection: &str, filter: &Expression) -> Result<u64, AppError>;
}

/// Attachment bytes keyed by their SHA-2 hash.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, hash: &str, bytes: Bytes) -> Result<(), AppError>;

    async fn get(&self, hash: &str) -> Result<Option<Bytes>, AppError>;
}
