use tracing::info;

use crate::{
    AppState,
    documents::{
        DocumentParams, DocumentResult, content_type_or_default, find_all, find_current,
        find_single, required, save,
    },
    errors::AppError,
    storage::{ACTIVITY_STATES, expression::Expression, models::StoredDocument},
};

/// Documents keyed by `(activityId, agent, stateId[, registration])`.
pub struct ActivityStateService;

impl ActivityStateService {
    fn key_filter(params: &DocumentParams, with_state_id: bool) -> Result<Expression, AppError> {
        let activity_id = required(&params.activity_id, "activityId")?;
        let (_, ifi) = params.agent()?;

        let mut filter = Expression::new();
        filter
            .where_eq("activityId", activity_id)
            .where_and(vec![ifi.at("agent")]);
        if with_state_id {
            if let Some(state_id) = &params.state_id {
                filter.where_eq("stateId", state_id.as_str());
            }
        }
        if let Some(registration) = &params.registration {
            filter.where_eq("registration", registration.as_str());
        }
        Ok(filter)
    }

    pub async fn get_filtered(
        state: &AppState,
        params: &DocumentParams,
    ) -> Result<DocumentResult, AppError> {
        if params.state_id.is_some() {
            let filter = Self::key_filter(params, true)?;
            let document =
                find_single(state, ACTIVITY_STATES, &filter, "Activity state does not exist.")
                    .await?;
            return Ok(DocumentResult::Single(document));
        }

        let mut filter = Self::key_filter(params, false)?;
        if let Some(since) = params.since {
            filter.where_greater_or_equal("storedAt", since);
        }
        let ids = find_all(state, ACTIVITY_STATES, &filter)
            .await?
            .into_iter()
            .filter_map(|document| document.state_id)
            .collect();
        Ok(DocumentResult::Ids(ids))
    }

    pub async fn put(
        state: &AppState,
        params: &DocumentParams,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Result<StoredDocument, AppError> {
        let state_id = required(&params.state_id, "stateId")?;
        let activity_id = required(&params.activity_id, "activityId")?;
        let (agent, _) = params.agent()?;
        let filter = Self::key_filter(params, true)?;

        let current = find_current(state, ACTIVITY_STATES, &filter).await?;
        // The matched document keeps its identity fields.
        let (agent, registration) = match &current {
            Some(current) => (current.agent.clone(), current.registration.clone()),
            None => (agent, params.registration.clone()),
        };
        let record = StoredDocument {
            id: None,
            state_id: Some(state_id.to_string()),
            profile_id: None,
            activity_id: Some(activity_id.to_string()),
            agent,
            registration,
            content: String::new(),
            binary: false,
            content_type: content_type_or_default(content_type),
            hash: String::new(),
            stored_at: 0,
        };
        let saved = save(state, ACTIVITY_STATES, &filter, current, record, body).await?;
        info!("Stored activity state {} for {}", state_id, activity_id);
        Ok(saved)
    }

    pub async fn post(
        state: &AppState,
        params: &DocumentParams,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Result<StoredDocument, AppError> {
        Self::put(state, params, content_type, body).await
    }

    /// Without `stateId` every state under the key is removed.
    pub async fn delete(state: &AppState, params: &DocumentParams) -> Result<u64, AppError> {
        let filter = Self::key_filter(params, true)?;
        let deleted = state
            .storage
            .documents
            .delete(ACTIVITY_STATES, &filter)
            .await?;
        info!("Deleted {} activity state document(s)", deleted);
        Ok(deleted)
    }
}
