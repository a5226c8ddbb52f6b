pub mod blobs;
pub mod connection;
pub mod documents;

pub use blobs::InMemoryBlobStore;
pub use documents::InMemoryDocumentStore;
