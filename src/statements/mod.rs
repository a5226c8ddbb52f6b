pub mod handlers;
pub mod ingest;
pub mod normalizer;
pub mod query;
pub mod result;

pub use ingest::IngestOutcome;
pub use query::StatementQuery;
pub use result::StatementResult;

/// Statement resource operations over the `statements` collection.
pub struct StatementService;
