use tracing::info;

use crate::{
    AppState,
    documents::{
        DocumentParams, DocumentResult, Preconditions, content_type_or_default, find_all,
        find_current, find_single, required, save,
    },
    errors::AppError,
    storage::{AGENT_PROFILES, expression::Expression, models::StoredDocument},
};

/// Documents keyed by `(profileId, agent)`, written under If-Match rules.
pub struct AgentProfileService;

impl AgentProfileService {
    fn agent_filter(params: &DocumentParams) -> Result<Expression, AppError> {
        let (_, ifi) = params.agent()?;
        let mut filter = Expression::new();
        filter.where_and(vec![ifi.at("agent")]);
        Ok(filter)
    }

    fn key_filter(params: &DocumentParams) -> Result<Expression, AppError> {
        let profile_id = required(&params.profile_id, "profileId")?;
        let mut filter = Self::agent_filter(params)?;
        filter.where_eq("profileId", profile_id);
        Ok(filter)
    }

    pub async fn get_filtered(
        state: &AppState,
        params: &DocumentParams,
    ) -> Result<DocumentResult, AppError> {
        if params.profile_id.is_some() {
            let filter = Self::key_filter(params)?;
            let document =
                find_single(state, AGENT_PROFILES, &filter, "Agent profile does not exist.")
                    .await?;
            return Ok(DocumentResult::Single(document));
        }

        let mut filter = Self::agent_filter(params)?;
        if let Some(since) = params.since {
            filter.where_greater_or_equal("storedAt", since);
        }
        let ids = find_all(state, AGENT_PROFILES, &filter)
            .await?
            .into_iter()
            .filter_map(|document| document.profile_id)
            .collect();
        Ok(DocumentResult::Ids(ids))
    }

    pub async fn put(
        state: &AppState,
        params: &DocumentParams,
        preconditions: &Preconditions,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Result<StoredDocument, AppError> {
        let profile_id = required(&params.profile_id, "profileId")?;
        let (agent, _) = params.agent()?;
        let filter = Self::key_filter(params)?;

        let current = find_current(state, AGENT_PROFILES, &filter).await?;
        preconditions.check(current.as_ref())?;

        let record = StoredDocument {
            id: None,
            state_id: None,
            profile_id: Some(profile_id.to_string()),
            activity_id: None,
            agent,
            registration: None,
            content: String::new(),
            binary: false,
            content_type: content_type_or_default(content_type),
            hash: String::new(),
            stored_at: 0,
        };
        let saved = save(state, AGENT_PROFILES, &filter, current, record, body).await?;
        info!("Stored agent profile {}", profile_id);
        Ok(saved)
    }

    pub async fn post(
        state: &AppState,
        params: &DocumentParams,
        preconditions: &Preconditions,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Result<StoredDocument, AppError> {
        Self::put(state, params, preconditions, content_type, body).await
    }

    pub async fn delete(
        state: &AppState,
        params: &DocumentParams,
        preconditions: &Preconditions,
    ) -> Result<(), AppError> {
        let filter = Self::key_filter(params)?;
        let current = find_current(state, AGENT_PROFILES, &filter)
            .await?
            .ok_or_else(|| AppError::NotFound("Profile does not exist.".to_string()))?;
        preconditions.check(Some(&current))?;

        let mut guarded = filter;
        guarded.where_eq("hash", current.hash.as_str());
        let deleted = state
            .storage
            .documents
            .delete(AGENT_PROFILES, &guarded)
            .await?;
        if deleted == 0 {
            return Err(AppError::PreconditionFailed(
                "The profile changed while it was being deleted".to_string(),
            ));
        }
        info!("Deleted agent profile {:?}", current.profile_id);
        Ok(())
    }
}
