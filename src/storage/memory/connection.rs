use std::sync::Arc;

use crate::storage::Storage;
use crate::storage::memory::{blobs::InMemoryBlobStore, documents::InMemoryDocumentStore};

pub fn memory_storage() -> Storage {
    Storage {
        documents: Arc::new(InMemoryDocumentStore::new()),
        blobs: Arc::new(InMemoryBlobStore::new()),
    }
}
