use std::{collections::HashMap, sync::Arc};

use axum::{
    Extension, Json,
    extract::Query,
};
use serde_json::Value;

use crate::{
    agents::person,
    auth::{Principal, permissions::PROFILE},
    errors::AppError,
    xapi::agent::parse_agent_param,
};

pub async fn get_agents_handler(
    Extension(principal): Extension<Arc<Principal>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    principal.require_permission(PROFILE)?;
    let raw = params
        .get("agent")
        .ok_or_else(|| AppError::BadRequest("The agent parameter is required".to_string()))?;
    Ok(Json(person(&parse_agent_param(raw)?)?))
}
