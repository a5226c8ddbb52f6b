//! Content handling shared by activity state and agent profile documents.

use serde_json::Value;
use sha1::{Digest, Sha1};

use crate::{errors::AppError, xapi::multipart::media_type};

pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// `application/json`, ignoring parameters such as `charset`.
pub fn is_json(content_type: &str) -> bool {
    media_type(content_type) == "application/json"
}

pub fn sha1_hex(content: &[u8]) -> String {
    hex::encode(Sha1::digest(content))
}

fn object(content: &[u8], side: &str) -> Result<serde_json::Map<String, Value>, AppError> {
    match serde_json::from_slice(content) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(AppError::BadRequest(format!(
            "{side} document is not a JSON object. Cannot merge!"
        ))),
    }
}

/// Top-level keys of `incoming` overwrite those of `existing`.
pub fn shallow_merge(existing: &[u8], incoming: &[u8]) -> Result<Vec<u8>, AppError> {
    let mut merged = object(existing, "Original")?;
    merged.extend(object(incoming, "Posted")?);
    Ok(serde_json::to_vec(&Value::Object(merged))?)
}

/// Content to store when `incoming` is written over a document that may
/// already exist. Only JSON over JSON is merged; anything else replaces.
pub fn resolve_content(
    existing: Option<(&[u8], &str)>,
    incoming: &[u8],
    incoming_type: &str,
) -> Result<Vec<u8>, AppError> {
    match existing {
        Some((content, content_type)) if is_json(content_type) && is_json(incoming_type) => {
            shallow_merge(content, incoming)
        }
        _ => Ok(incoming.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_json_with_parameters() {
        assert!(is_json("application/json; charset=utf-8"));
        assert!(is_json("Application/JSON"));
        assert!(!is_json("text/plain"));
    }

    #[test]
    fn merge_overwrites_top_level_keys_only() {
        let merged = shallow_merge(
            br#"{"a": 1, "nested": {"x": 1}}"#,
            br#"{"b": 2, "nested": {"y": 2}}"#,
        )
        .unwrap();
        let merged: Value = serde_json::from_slice(&merged).unwrap();
        assert_eq!(merged, json!({"a": 1, "b": 2, "nested": {"y": 2}}));
    }

    #[test]
    fn merge_requires_objects_on_both_sides() {
        let err = shallow_merge(br#"[1, 2]"#, br#"{"a": 1}"#).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        let err = shallow_merge(br#"{"a": 1}"#, b"plain").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn non_json_content_replaces() {
        let content = resolve_content(
            Some((br#"{"a": 1}"#, "application/json")),
            b"raw",
            "text/plain",
        )
        .unwrap();
        assert_eq!(content, b"raw");

        let content = resolve_content(None, br#"{"a": 1}"#, "application/json").unwrap();
        assert_eq!(content, br#"{"a": 1}"#);
    }

    #[test]
    fn hashes_as_lowercase_hex_sha1() {
        assert_eq!(sha1_hex(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }
}
