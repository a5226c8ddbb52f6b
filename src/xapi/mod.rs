pub mod agent;
pub mod extensions;
pub mod ids;
pub mod multipart;
pub mod statement;
pub mod timestamp;

pub use agent::Ifi;
pub use statement::StatementDocument;

pub const VOIDING_VERB: &str = "adlnet.gov/expapi/verbs/voided";
pub const SUPPORTED_VERSIONS: &[&str] = &["1.0.3", "1.0.2", "1.0.1", "1.0.0"];
