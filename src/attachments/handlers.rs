use std::{collections::HashMap, sync::Arc};

use axum::{
    Extension,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};

use crate::{
    AppState,
    attachments::AttachmentService,
    auth::{
        Principal,
        permissions::{ATTACHMENTS, STATEMENTS_READ},
    },
    errors::AppError,
};

pub async fn get_attachment_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Arc<Principal>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    principal.require_any_permission(&[ATTACHMENTS, STATEMENTS_READ])?;
    let sha2 = params
        .get("sha2")
        .ok_or_else(|| AppError::BadRequest("The sha2 parameter is required".to_string()))?;
    let (record, bytes) = AttachmentService::get(&state, sha2).await?;
    Ok(([(header::CONTENT_TYPE, record.content_type)], bytes).into_response())
}
