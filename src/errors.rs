use axum::{
    http::StatusCode,
    response::{IntoResponse, Json as AxumJson, Response},
};
use serde_json::json;
use tracing::{error, warn};

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    PreconditionFailed(String),
    InternalError(anyhow::Error),
}

/// Detail of an internal failure, carried on the response so the header
/// middleware can expose it when detailed error display is switched on.
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            AppError::BadRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::PreconditionFailed(msg) => msg.clone(),
            AppError::InternalError(_) => "Internal server error".to_string(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::InternalError(e) => write!(f, "{}: {:#}", self.status(), e),
            other => write!(f, "{}: {}", other.status(), other.message()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        let detail = match &self {
            AppError::InternalError(e) => {
                error!("Internal server error: {:#}", e);
                Some(ErrorDetail(format!("{:#}", e)))
            }
            AppError::Unauthorized(msg) | AppError::Forbidden(msg) => {
                warn!("Rejected credentials ({}): {}", status.as_u16(), msg);
                None
            }
            other => {
                warn!("Request failed ({}): {}", status.as_u16(), other.message());
                None
            }
        };

        let body = AxumJson(json!({
            "code": status.as_u16(),
            "message": message,
            "data": {},
        }));

        let mut response = (status, body).into_response();
        if let Some(detail) = detail {
            response.extensions_mut().insert(detail);
        }
        response
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        AppError::InternalError(err.into())
    }
}
