use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::{
    errors::AppError,
    storage::{
        AUTH_TOKENS,
        expression::Expression,
        models::{StoredToken, from_document, to_document},
        traits::DocumentStore,
    },
    xapi::timestamp,
};

/// Access tokens and basic-auth credentials in the `authTokens` collection.
#[derive(Clone)]
pub struct TokenStore {
    documents: Arc<dyn DocumentStore>,
}

pub fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}

fn check_usable(token: StoredToken) -> Result<StoredToken, AppError> {
    let past_expiry = token
        .expires_at
        .is_some_and(|expires_at| expires_at <= timestamp::to_millis(timestamp::now()));
    if token.expired || past_expiry {
        return Err(AppError::Forbidden("Expired token.".to_string()));
    }
    Ok(token)
}

impl TokenStore {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }

    /// Persists the token, assigning a fresh token string when empty.
    pub async fn store_token(&self, mut token: StoredToken) -> Result<StoredToken, AppError> {
        if token.token.is_empty() {
            token.token = generate_token();
        }
        self.documents
            .insert_one(AUTH_TOKENS, to_document(&token)?)
            .await?;
        info!("Stored token for user {}", token.user_id);
        Ok(token)
    }

    async fn find(&self, filter: &Expression) -> Result<StoredToken, AppError> {
        let document = self
            .documents
            .find_one(AUTH_TOKENS, filter)
            .await?
            .ok_or_else(|| AppError::Forbidden("Invalid credentials.".to_string()))?;
        check_usable(from_document(document)?)
    }

    pub async fn get_token(&self, token: &str) -> Result<StoredToken, AppError> {
        self.find(&Expression::eq("token", token)).await
    }

    pub async fn get_basic(&self, key: &str, secret: &str) -> Result<StoredToken, AppError> {
        let mut filter = Expression::new();
        filter.where_eq("key", key).where_eq("secret", secret);
        self.find(&filter).await
    }

    pub async fn expire_token(&self, token: &str) -> Result<(), AppError> {
        let filter = Expression::eq("token", token);
        let Some(document) = self.documents.find_one(AUTH_TOKENS, &filter).await? else {
            return Err(AppError::NotFound(format!("Token not found: {token}")));
        };
        let mut stored: StoredToken = from_document(document)?;
        stored.expired = true;
        self.documents
            .update(AUTH_TOKENS, &filter, to_document(&stored)?)
            .await?;
        info!("Expired token for user {}", stored.user_id);
        Ok(())
    }

    pub async fn delete_token(&self, token: &str) -> Result<(), AppError> {
        self.documents
            .delete(AUTH_TOKENS, &Expression::eq("token", token))
            .await?;
        Ok(())
    }

    /// Trades a one-time authorization code for its token; the code is cleared.
    pub async fn exchange_code(&self, code: &str) -> Result<StoredToken, AppError> {
        let filter = Expression::eq("code", code);
        let mut token = self.find(&filter).await?;
        token.code = None;
        self.documents
            .update(AUTH_TOKENS, &Expression::eq("token", token.token.as_str()), to_document(&token)?)
            .await?;
        Ok(token)
    }
}
