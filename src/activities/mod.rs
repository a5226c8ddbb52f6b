pub mod handlers;

use serde_json::Value;

use crate::{
    AppState,
    errors::AppError,
    storage::{
        ACTIVITIES,
        expression::Expression,
        models::{StoredActivity, from_document},
    },
    xapi::extensions::unescape_activity,
};

/// Activity definitions collected from statements submitted with `define`.
pub struct ActivityService;

impl ActivityService {
    pub async fn get(state: &AppState, activity_id: &str) -> Result<Value, AppError> {
        let filter = Expression::eq("id", activity_id);
        let documents = &state.storage.documents;
        if documents.count(ACTIVITIES, &filter).await? == 0 {
            return Err(AppError::NotFound("Activity does not exist.".to_string()));
        }
        let stored: StoredActivity = documents
            .find_one(ACTIVITIES, &filter)
            .await?
            .map(from_document)
            .transpose()?
            .ok_or_else(|| AppError::NotFound("Activity does not exist.".to_string()))?;

        let mut activity = stored.activity;
        unescape_activity(&mut activity);
        Ok(activity)
    }
}
