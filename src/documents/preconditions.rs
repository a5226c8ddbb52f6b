use axum::http::{HeaderMap, header};

use crate::{errors::AppError, storage::models::StoredDocument};

/// `If-Match` / `If-None-Match` as sent, quotes trimmed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preconditions {
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
}

fn trimmed(value: &str) -> String {
    value.trim().trim_matches('"').to_string()
}

impl Preconditions {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(trimmed)
        };
        Self {
            if_match: read(header::IF_MATCH),
            if_none_match: read(header::IF_NONE_MATCH),
        }
    }

    /// Checks the headers against the document currently stored, if any.
    pub fn check(&self, current: Option<&StoredDocument>) -> Result<(), AppError> {
        let Some(current) = current else {
            return Ok(());
        };
        if self.if_match.is_none() && self.if_none_match.is_none() {
            return Err(AppError::Conflict(
                "The resource already exists. Read it first and send If-Match with the current ETag"
                    .to_string(),
            ));
        }
        if let Some(if_match) = &self.if_match {
            if *if_match != current.hash {
                return Err(AppError::PreconditionFailed(
                    "If-Match header doesn't match the current ETag".to_string(),
                ));
            }
        }
        match self.if_none_match.as_deref() {
            Some("*") => Err(AppError::PreconditionFailed(
                "If-None-Match header is *, but the resource already exists".to_string(),
            )),
            Some(if_none_match) if if_none_match == current.hash => {
                Err(AppError::PreconditionFailed(
                    "If-None-Match header matches the current ETag".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stored(hash: &str) -> StoredDocument {
        StoredDocument {
            id: None,
            state_id: None,
            profile_id: Some("p".into()),
            activity_id: None,
            agent: json!({"mbox": "mailto:a@b.com"}),
            registration: None,
            content: "{}".into(),
            binary: false,
            content_type: "application/json".into(),
            hash: hash.into(),
            stored_at: 0,
        }
    }

    fn conditions(if_match: Option<&str>, if_none_match: Option<&str>) -> Preconditions {
        Preconditions {
            if_match: if_match.map(str::to_string),
            if_none_match: if_none_match.map(str::to_string),
        }
    }

    #[test]
    fn anything_goes_for_a_new_resource() {
        assert!(conditions(None, None).check(None).is_ok());
        assert!(conditions(Some("stale"), None).check(None).is_ok());
    }

    #[test]
    fn existing_resource_needs_a_header() {
        let err = conditions(None, None).check(Some(&stored("h"))).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn if_match_must_equal_current_hash() {
        let current = stored("h");
        assert!(conditions(Some("h"), None).check(Some(&current)).is_ok());
        let err = conditions(Some("old"), None).check(Some(&current)).unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(_)));
    }

    #[test]
    fn if_none_match_rejects_star_and_current_hash() {
        let current = stored("h");
        for value in ["*", "h"] {
            let err = conditions(None, Some(value)).check(Some(&current)).unwrap_err();
            assert!(matches!(err, AppError::PreconditionFailed(_)));
        }
        assert!(conditions(None, Some("other")).check(Some(&current)).is_ok());
    }

    #[test]
    fn header_values_lose_their_quotes() {
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_MATCH, "\"abc\"".parse().unwrap());
        let parsed = Preconditions::from_headers(&headers);
        assert_eq!(parsed.if_match.as_deref(), Some("abc"));
        assert_eq!(parsed.if_none_match, None);
    }
}
