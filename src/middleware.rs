use std::sync::Arc;

use axum::{
    Json,
    body::{Body, to_bytes},
    extract::State,
    http::{
        HeaderName, HeaderValue, Method, Request, Uri,
        header::{
            ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, ETAG, IF_MATCH, IF_NONE_MATCH,
            LAST_MODIFIED, ORIGIN,
        },
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::headers::{
    Authorization, Header,
    authorization::{Basic, Bearer},
};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, warn};

use crate::{
    AppState,
    auth::Principal,
    errors::{AppError, ErrorDetail},
    xapi::timestamp,
};

pub const VERSION_HEADER: &str = "X-Experience-API-Version";
pub const CONSISTENT_THROUGH_HEADER: &str = "X-Experience-API-Consistent-Through";
pub const ABOUT_PATH: &str = "/about";

/// Protocol version in effect for a request.
#[derive(Debug, Clone)]
pub struct XapiVersion(pub String);

/// A typed header, or `None` when absent or in another scheme.
fn typed_header<H: Header>(request: &Request<Body>) -> Option<H> {
    let mut values = request.headers().get_all(H::name()).iter();
    H::decode(&mut values).ok()
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = typed_header::<Authorization<Bearer>>(&request);
    let basic = typed_header::<Authorization<Basic>>(&request);

    let tokens = state.tokens();
    let token = match (bearer, basic) {
        (Some(auth), _) => tokens.get_token(auth.token()).await?,
        (None, Some(auth)) => tokens.get_basic(auth.username(), auth.password()).await?,
        (None, None) => {
            return Err(AppError::Unauthorized(
                "Authentication required: send a Bearer token or Basic credentials".to_string(),
            ));
        }
    };
    let principal = Principal::from_token(&token, &state.permissions, &state.settings.base_url);
    request.extensions_mut().insert(Arc::new(principal));

    let response = next.run(request).await;

    Ok(response)
}

/// `1.0` or `1.0.x`.
pub fn is_supported_version(version: &str) -> bool {
    match version.strip_prefix("1.0") {
        Some("") => true,
        Some(patch) => patch
            .strip_prefix('.')
            .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())),
        None => false,
    }
}

/// Form fields of an alternate-syntax request that travel as headers.
const ALTERNATE_HEADERS: [&str; 6] = [
    "content-type",
    "authorization",
    "x-experience-api-version",
    "content-length",
    "if-match",
    "if-none-match",
];

/// Cross-origin access for browser-based clients.
pub fn cors_layer() -> CorsLayer {
    let version = HeaderName::from_static("x-experience-api-version");
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::POST,
            Method::PUT,
            Method::GET,
            Method::HEAD,
            Method::OPTIONS,
            Method::DELETE,
        ])
        .allow_headers([
            ORIGIN,
            CONTENT_TYPE,
            AUTHORIZATION,
            ACCEPT,
            version.clone(),
            IF_MATCH,
            IF_NONE_MATCH,
        ])
        .expose_headers([
            ETAG,
            LAST_MODIFIED,
            CONTENT_LENGTH,
            version,
            HeaderName::from_static("x-experience-api-consistent-through"),
        ])
}

fn form_pairs(raw: &[u8]) -> Result<Vec<(String, String)>, AppError> {
    serde_urlencoded::from_bytes(raw)
        .map_err(|e| AppError::BadRequest(format!("Invalid form encoding: {e}")))
}

/// Turns `POST <path>?method=<METHOD>` with a form body into the request it
/// stands for. Header fields become headers, `content` becomes the body and
/// every other field becomes a query parameter. Must run before routing.
pub async fn alternate_request_syntax(
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    if request.method() != Method::POST {
        return Ok(next.run(request).await);
    }
    let Ok(mut params) = form_pairs(request.uri().query().unwrap_or("").as_bytes()) else {
        return Ok(next.run(request).await);
    };
    let Some(position) = params.iter().position(|(key, _)| key == "method") else {
        return Ok(next.run(request).await);
    };
    let (_, method) = params.remove(position);
    // `more` links carry until_id alongside the method.
    let until_id = params
        .iter()
        .position(|(key, _)| key == "until_id")
        .map(|position| params.remove(position));
    if !params.is_empty() {
        return Err(AppError::BadRequest(
            "Alternate request syntax: only the method query parameter is allowed".to_string(),
        ));
    }
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| AppError::BadRequest(format!("Invalid method: {method}")))?;

    let (mut parts, body) = request.into_parts();
    let form = to_bytes(body, usize::MAX)
        .await
        .map_err(|e| AppError::BadRequest(format!("Could not read request body: {e}")))?;
    parts.headers.remove(CONTENT_TYPE);

    let mut content = None;
    let mut query = Vec::new();
    for (key, value) in form_pairs(&form)? {
        let lowered = key.to_ascii_lowercase();
        if key == "method" {
            continue;
        } else if key == "content" {
            content = Some(value);
        } else if ALTERNATE_HEADERS.contains(&lowered.as_str()) {
            let name = HeaderName::from_bytes(lowered.as_bytes())
                .map_err(|_| AppError::BadRequest(format!("Invalid header name: {key}")))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|_| AppError::BadRequest(format!("Invalid value for header {key}")))?;
            parts.headers.insert(name, value);
        } else {
            query.push((key, value));
        }
    }
    query.extend(until_id);

    let path = parts.uri.path().to_string();
    let query = serde_urlencoded::to_string(&query)?;
    let uri = if query.is_empty() {
        path
    } else {
        format!("{path}?{query}")
    };
    parts.uri = uri
        .parse::<Uri>()
        .map_err(|_| AppError::BadRequest(format!("Invalid request target: {uri}")))?;
    let content = content.unwrap_or_default();
    if !content.is_empty() && !parts.headers.contains_key(CONTENT_TYPE) {
        parts
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    parts
        .headers
        .insert(CONTENT_LENGTH, HeaderValue::from(content.len()));
    debug!("Alternate request syntax: {} {}", method, parts.uri);
    parts.method = method;

    Ok(next.run(Request::from_parts(parts, Body::from(content))).await)
}

/// Checks the requested protocol version and stamps the xAPI headers on
/// every response.
pub async fn xapi_headers(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let requested = request
        .headers()
        .get(VERSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string());
    let exempt = request.uri().path() == ABOUT_PATH;

    let version = match requested {
        Some(version) if is_supported_version(&version) && version != "1.0" => version,
        Some(version) if is_supported_version(&version) => state.settings.xapi_version.clone(),
        Some(version) if !exempt => {
            let error = AppError::BadRequest(format!("Unsupported {VERSION_HEADER}: {version}"));
            return decorate(&state, error.into_response()).await;
        }
        None if !exempt => {
            let error = AppError::BadRequest(format!("The {VERSION_HEADER} header is required"));
            return decorate(&state, error.into_response()).await;
        }
        _ => state.settings.xapi_version.clone(),
    };
    request.extensions_mut().insert(XapiVersion(version));

    let response = next.run(request).await;
    decorate(&state, response).await
}

async fn decorate(state: &AppState, response: Response) -> Response {
    let mut response = if state.settings.display_error_details {
        with_error_detail(response).await
    } else {
        response
    };

    let headers = response.headers_mut();
    if let Ok(version) = HeaderValue::from_str(&state.settings.xapi_version) {
        headers.insert(VERSION_HEADER, version);
    }
    match timestamp::format_stored(timestamp::now()) {
        Ok(now) => {
            if let Ok(value) = HeaderValue::from_str(&now) {
                headers.insert(CONSISTENT_THROUGH_HEADER, value);
            }
        }
        Err(e) => warn!("Could not format consistent-through time: {}", e),
    }
    response
}

/// Copies an internal error's detail into `data.detail` of the error body.
async fn with_error_detail(response: Response) -> Response {
    let Some(ErrorDetail(detail)) = response.extensions().get::<ErrorDetail>().cloned() else {
        return response;
    };
    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Could not read error body: {}", e);
            return Response::from_parts(parts, Body::empty());
        }
    };
    let Ok(mut json) = serde_json::from_slice::<Value>(&bytes) else {
        return Response::from_parts(parts, Body::from(bytes));
    };
    if let Some(data) = json.get_mut("data").and_then(Value::as_object_mut) {
        data.insert("detail".to_string(), Value::String(detail));
    }

    let mut rebuilt = (parts.status, Json(json)).into_response();
    rebuilt.extensions_mut().extend(parts.extensions);
    rebuilt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_only_one_point_zero_versions() {
        for version in ["1.0", "1.0.0", "1.0.3", "1.0.12"] {
            assert!(is_supported_version(version), "{version}");
        }
        for version in ["", "0.95", "1.1", "1.0.", "1.0.x", "1.01", "2.0.0"] {
            assert!(!is_supported_version(version), "{version}");
        }
    }
}
