pub mod handlers;

use axum::body::Bytes;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::{
    AppState,
    errors::AppError,
    storage::{
        ATTACHMENTS,
        expression::Expression,
        models::{StoredAttachment, from_document, to_document},
    },
    xapi::{multipart::Part, timestamp},
};

pub const HASH_HEADER: &str = "X-Experience-API-Hash";

/// Attachment payloads received alongside statements.
pub struct AttachmentService;

pub fn sha2_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

impl AttachmentService {
    /// Validates one non-statement part of a `multipart/mixed` body and
    /// persists it under its hash.
    pub async fn store_part(state: &AppState, part: Part) -> Result<StoredAttachment, AppError> {
        let declared = part
            .header(HASH_HEADER)
            .map(|hash| hash.trim().to_ascii_lowercase())
            .ok_or_else(|| {
                AppError::BadRequest(format!("Attachment part is missing {HASH_HEADER}"))
            })?;
        let content_type = part
            .header("Content-Type")
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::BadRequest("Attachment part is missing Content-Type".to_string())
            })?;

        let actual = sha2_hex(&part.body);
        if actual != declared {
            return Err(AppError::BadRequest(format!(
                "Attachment hash mismatch: declared {declared}, computed {actual}"
            )));
        }

        Self::store(state, &declared, &content_type, part.body).await
    }

    pub async fn store(
        state: &AppState,
        sha2: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<StoredAttachment, AppError> {
        let record = StoredAttachment {
            sha2: sha2.to_string(),
            content_type: content_type.to_string(),
            length: bytes.len() as u64,
            stored_at: timestamp::to_millis(timestamp::now()),
        };
        state.storage.blobs.put(sha2, bytes).await?;
        state
            .storage
            .documents
            .upsert(ATTACHMENTS, &Expression::eq("sha2", sha2), to_document(&record)?)
            .await?;
        info!("Stored attachment {} ({} bytes)", sha2, record.length);
        Ok(record)
    }

    pub async fn get(state: &AppState, sha2: &str) -> Result<(StoredAttachment, Bytes), AppError> {
        let sha2 = sha2.trim().to_ascii_lowercase();
        let not_found = || AppError::NotFound(format!("Attachment not found: {sha2}"));
        let record: StoredAttachment = state
            .storage
            .documents
            .find_one(ATTACHMENTS, &Expression::eq("sha2", sha2.as_str()))
            .await?
            .map(from_document)
            .transpose()?
            .ok_or_else(not_found)?;
        let bytes = state.storage.blobs.get(&sha2).await?.ok_or_else(not_found)?;
        Ok((record, bytes))
    }
}
