use std::{collections::HashMap, sync::Arc};

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::{
    AppState,
    auth::{
        Principal,
        permissions::{PROFILE, STATE},
    },
    documents::{
        ActivityStateService, AgentProfileService, DocumentParams, DocumentResult, Preconditions,
    },
    errors::AppError,
};

fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
}

fn document_response(result: DocumentResult) -> Result<Response, AppError> {
    match result {
        DocumentResult::Single(document) => {
            let etag = format!("\"{}\"", document.hash);
            let bytes = document.content_bytes()?;
            Ok((
                [
                    (header::CONTENT_TYPE, document.content_type),
                    (header::ETAG, etag),
                ],
                bytes,
            )
                .into_response())
        }
        DocumentResult::Ids(ids) => Ok(Json(ids).into_response()),
    }
}

pub async fn get_state_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Arc<Principal>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    principal.require_permission(STATE)?;
    let params = DocumentParams::from_params(&params)?;
    document_response(ActivityStateService::get_filtered(&state, &params).await?)
}

pub async fn put_state_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Arc<Principal>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    principal.require_permission(STATE)?;
    let params = DocumentParams::from_params(&params)?;
    ActivityStateService::put(&state, &params, content_type(&headers), &body).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn post_state_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Arc<Principal>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    principal.require_permission(STATE)?;
    let params = DocumentParams::from_params(&params)?;
    ActivityStateService::post(&state, &params, content_type(&headers), &body).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_state_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Arc<Principal>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<StatusCode, AppError> {
    principal.require_permission(STATE)?;
    let params = DocumentParams::from_params(&params)?;
    ActivityStateService::delete(&state, &params).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_profile_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Arc<Principal>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    principal.require_permission(PROFILE)?;
    let params = DocumentParams::from_params(&params)?;
    document_response(AgentProfileService::get_filtered(&state, &params).await?)
}

pub async fn put_profile_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Arc<Principal>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    principal.require_permission(PROFILE)?;
    let params = DocumentParams::from_params(&params)?;
    let preconditions = Preconditions::from_headers(&headers);
    AgentProfileService::put(&state, &params, &preconditions, content_type(&headers), &body)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn post_profile_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Arc<Principal>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    principal.require_permission(PROFILE)?;
    let params = DocumentParams::from_params(&params)?;
    let preconditions = Preconditions::from_headers(&headers);
    AgentProfileService::post(&state, &params, &preconditions, content_type(&headers), &body)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_profile_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Arc<Principal>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    principal.require_permission(PROFILE)?;
    let params = DocumentParams::from_params(&params)?;
    AgentProfileService::delete(&state, &params, &Preconditions::from_headers(&headers)).await?;
    Ok(StatusCode::NO_CONTENT)
}
