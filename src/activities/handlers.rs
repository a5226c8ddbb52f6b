use std::{collections::HashMap, sync::Arc};

use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde_json::Value;

use crate::{
    AppState,
    activities::ActivityService,
    auth::{
        Principal,
        permissions::{DEFINE, STATEMENTS_READ, STATEMENTS_READ_MINE},
    },
    errors::AppError,
};

pub async fn get_activity_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Arc<Principal>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    principal.require_any_permission(&[DEFINE, STATEMENTS_READ, STATEMENTS_READ_MINE])?;
    let activity_id = params
        .get("activityId")
        .ok_or_else(|| AppError::BadRequest("The activityId parameter is required".to_string()))?;
    Ok(Json(ActivityService::get(&state, activity_id).await?))
}
