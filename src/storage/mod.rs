pub mod expression;
pub mod filesystem;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod traits;

use crate::storage::traits::*;
use std::sync::Arc;

pub const STATEMENTS: &str = "statements";
pub const ACTIVITIES: &str = "activities";
pub const ACTIVITY_STATES: &str = "activityStates";
pub const AGENT_PROFILES: &str = "agentProfiles";
pub const AUTH_TOKENS: &str = "authTokens";
pub const ATTACHMENTS: &str = "attachments";

#[derive(Clone)]
pub struct Storage {
    pub documents: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
}

impl Storage {
    /// Unique constraints every backend must enforce.
    pub async fn ensure_indexes(&self) -> Result<(), crate::errors::AppError> {
        self.documents
            .create_unique_index(STATEMENTS, "statement.id")
            .await?;
        self.documents.create_unique_index(AUTH_TOKENS, "token").await?;
        self.documents.create_unique_index(ACTIVITIES, "id").await?;
        self.documents.create_unique_index(ATTACHMENTS, "sha2").await?;
        Ok(())
    }
}
