//! Key-value documents attached to an agent: activity state and agent profiles.

pub mod activity_state;
pub mod agent_profile;
pub mod handlers;
pub mod merge;
pub mod preconditions;

use futures::TryStreamExt;
use serde_json::Value;
use std::collections::HashMap;

use crate::{
    AppState,
    errors::AppError,
    storage::{
        expression::Expression,
        models::{StoredDocument, from_document, to_document},
        traits::FindOptions,
    },
    xapi::{Ifi, agent::parse_agent_param, ids, timestamp},
};

pub use activity_state::ActivityStateService;
pub use agent_profile::AgentProfileService;
pub use preconditions::Preconditions;

/// Result of a document GET: one document, or the ids of many.
#[derive(Debug, Clone)]
pub enum DocumentResult {
    Single(StoredDocument),
    Ids(Vec<String>),
}

/// Query parameters shared by the state and profile resources.
#[derive(Debug, Clone, Default)]
pub struct DocumentParams {
    pub activity_id: Option<String>,
    pub agent: Option<Value>,
    pub state_id: Option<String>,
    pub profile_id: Option<String>,
    pub registration: Option<String>,
    pub since: Option<i64>,
}

impl DocumentParams {
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, AppError> {
        let get = |key: &str| params.get(key).map(String::as_str);
        Ok(Self {
            activity_id: get("activityId").map(str::to_string),
            agent: get("agent").map(parse_agent_param).transpose()?,
            state_id: get("stateId").map(str::to_string),
            profile_id: get("profileId").map(str::to_string),
            registration: get("registration").map(ids::normalize_uuid).transpose()?,
            since: get("since")
                .map(|raw| timestamp::parse_param("since", raw).map(timestamp::to_millis))
                .transpose()?,
        })
    }

    /// The `agent` parameter and its identifier; both are mandatory.
    pub fn agent(&self) -> Result<(Value, Ifi), AppError> {
        let agent = self
            .agent
            .clone()
            .ok_or_else(|| AppError::BadRequest("The agent parameter is required".to_string()))?;
        let ifi = Ifi::extract(&agent).ok_or_else(|| {
            AppError::BadRequest("Invalid agent parameter: missing IFI".to_string())
        })?;
        Ok((agent, ifi))
    }
}

pub(crate) fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, AppError> {
    value
        .as_deref()
        .ok_or_else(|| AppError::BadRequest(format!("The {name} parameter is required")))
}

/// Counts before fetching so an absent document is NOT_FOUND.
pub(crate) async fn find_single(
    state: &AppState,
    collection: &str,
    filter: &Expression,
    missing: &str,
) -> Result<StoredDocument, AppError> {
    let documents = &state.storage.documents;
    if documents.count(collection, filter).await? == 0 {
        return Err(AppError::NotFound(missing.to_string()));
    }
    documents
        .find_one(collection, filter)
        .await?
        .map(from_document)
        .transpose()?
        .ok_or_else(|| AppError::NotFound(missing.to_string()))
}

pub(crate) async fn find_current(
    state: &AppState,
    collection: &str,
    filter: &Expression,
) -> Result<Option<StoredDocument>, AppError> {
    state
        .storage
        .documents
        .find_one(collection, filter)
        .await?
        .map(from_document)
        .transpose()
}

pub(crate) async fn find_all(
    state: &AppState,
    collection: &str,
    filter: &Expression,
) -> Result<Vec<StoredDocument>, AppError> {
    let cursor = state
        .storage
        .documents
        .find(collection, filter, FindOptions::default())
        .await?;
    let drained = tokio::time::timeout(
        state.settings.request_timeout,
        cursor.try_collect::<Vec<Value>>(),
    )
    .await
    .map_err(|_| anyhow::anyhow!("document query timed out"))?;
    drained?.into_iter().map(from_document).collect()
}

/// Writes `body` into `record`, merging with `current` where both are JSON.
/// An existing document is only replaced while its hash is still the one
/// read by the caller.
pub(crate) async fn save(
    state: &AppState,
    collection: &str,
    filter: &Expression,
    current: Option<StoredDocument>,
    mut record: StoredDocument,
    body: &[u8],
) -> Result<StoredDocument, AppError> {
    let existing = match &current {
        Some(current) => Some(current.content_bytes()?),
        None => None,
    };
    let content = merge::resolve_content(
        existing
            .as_deref()
            .zip(current.as_ref().map(|c| c.content_type.as_str())),
        body,
        &record.content_type,
    )?;
    record.set_content(&content);
    record.hash = merge::sha1_hex(&content);
    record.stored_at = timestamp::to_millis(timestamp::now());

    let document = to_document(&record)?;
    let documents = &state.storage.documents;
    match current {
        Some(current) => {
            let mut guarded = filter.clone();
            guarded.where_eq("hash", current.hash.as_str());
            if documents.update(collection, &guarded, document).await? == 0 {
                return Err(AppError::PreconditionFailed(
                    "The document changed while it was being written".to_string(),
                ));
            }
        }
        None => documents.upsert(collection, filter, document).await?,
    }
    Ok(record)
}

pub(crate) fn content_type_or_default(content_type: Option<&str>) -> String {
    match content_type.map(str::trim) {
        Some(content_type) if !content_type.is_empty() => content_type.to_string(),
        _ => merge::DEFAULT_CONTENT_TYPE.to_string(),
    }
}
