pub mod connection;
pub mod documents;
pub mod sql;

pub use documents::PostgresDocumentStore;
