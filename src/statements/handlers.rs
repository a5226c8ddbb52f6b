use std::{collections::HashMap, sync::Arc};

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
};
use serde_json::Value;

use crate::{
    AppState,
    attachments::AttachmentService,
    auth::{
        Principal,
        permissions::{STATEMENTS_READ, STATEMENTS_READ_MINE, STATEMENTS_WRITE},
    },
    errors::AppError,
    middleware::XapiVersion,
    statements::{StatementQuery, StatementService},
    xapi::multipart,
};

pub const STATEMENTS_PATH: &str = "/statements";

fn parse_json(body: &[u8]) -> Result<Value, AppError> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON in request body: {e}")))
}

/// Statement payload of a write request. Attachment parts of a
/// `multipart/mixed` body are validated and stored on the way.
async fn read_payload(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Value, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/json");

    match multipart::media_type(content_type).as_str() {
        "application/json" => parse_json(body),
        "multipart/mixed" => {
            let boundary = multipart::boundary(content_type).ok_or_else(|| {
                AppError::BadRequest("multipart/mixed body without a boundary".to_string())
            })?;
            let mut parts = multipart::parse(body, &boundary)?.into_iter();
            let first = parts
                .next()
                .ok_or_else(|| AppError::BadRequest("Empty multipart body".to_string()))?;
            let statements = parse_json(&first.body)?;
            for part in parts {
                AttachmentService::store_part(state, part).await?;
            }
            Ok(statements)
        }
        other => Err(AppError::BadRequest(format!(
            "Unsupported Content-Type for statements: {other}"
        ))),
    }
}

pub async fn get_statements_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Arc<Principal>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    principal.require_any_permission(&[STATEMENTS_READ, STATEMENTS_READ_MINE])?;
    let query = StatementQuery::from_params(&params)?;
    let result = StatementService::get(&state, &principal, &query).await?;
    Ok(Json(result.body(STATEMENTS_PATH, &query.raw)))
}

/// Accepts one statement or an array; responds with the stored ids in order.
pub async fn post_statements_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Arc<Principal>>,
    Extension(version): Extension<XapiVersion>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Vec<String>>, AppError> {
    principal.require_permission(STATEMENTS_WRITE)?;
    let raws = match read_payload(&state, &headers, &body).await? {
        Value::Array(items) => items,
        single => vec![single],
    };
    let result = StatementService::insert_many(&state, &principal, &version.0, raws).await?;
    Ok(Json(result.ids()))
}

pub async fn put_statement_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Arc<Principal>>,
    Extension(version): Extension<XapiVersion>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    principal.require_permission(STATEMENTS_WRITE)?;
    let raw = read_payload(&state, &headers, &body).await?;
    StatementService::put(
        &state,
        &principal,
        &version.0,
        params.get("statementId").map(String::as_str),
        raw,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_statement_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Arc<Principal>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<StatusCode, AppError> {
    principal.require_permission(STATEMENTS_WRITE)?;
    let statement_id = params.get("statementId").map(String::as_str).unwrap_or_default();
    StatementService::delete(&state, statement_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
