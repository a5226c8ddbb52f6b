use std::sync::Arc;

use sqlx::PgPool;

use crate::storage::{
    Storage, postgres::documents::PostgresDocumentStore, traits::BlobStore,
};

pub fn postgres_storage(pool: PgPool, blobs: Arc<dyn BlobStore>) -> Storage {
    Storage {
        documents: Arc::new(PostgresDocumentStore::new(pool)),
        blobs,
    }
}
