//! Raw statement to canonical storage form.

use serde_json::Value;
use time::OffsetDateTime;

use crate::{
    auth::{Principal, permissions::SUPER},
    errors::AppError,
    xapi::{StatementDocument, timestamp},
};

pub struct NormalizeContext<'a> {
    pub principal: &'a Principal,
    pub version: &'a str,
    pub attachment_url: &'a str,
    pub now: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub document: StatementDocument,
    /// The `stored` instant in epoch milliseconds.
    pub stored_at: i64,
}

pub fn normalize(raw: Value, context: &NormalizeContext<'_>) -> Result<Normalized, AppError> {
    let mut document = StatementDocument::new(raw)?;

    if document.has_voided() && !document.is_referencing() {
        return Err(AppError::BadRequest(
            "Voiding statements must reference a statement with a StatementRef object"
                .to_string(),
        ));
    }
    document.validate_definition()?;
    document.normalize_ids()?;

    let keep_authority =
        context.principal.has_permission(SUPER) && document.authority().is_some();
    if !keep_authority {
        document.set_authority(context.principal.generate_authority());
    }

    document.set_version(context.version);
    document.set_stored(&timestamp::format_stored(context.now)?);
    document.default_timestamp();
    document.fill_attachment_urls(context.attachment_url);
    document.escape_extensions();
    document.default_id();
    document.wrap_legacy_context_activities();

    Ok(Normalized {
        document,
        stored_at: timestamp::to_millis(context.now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::PermissionTable,
        storage::models::StoredToken,
        xapi::ids,
    };
    use serde_json::json;
    use time::macros::datetime;

    fn principal(permissions: &[&str]) -> Principal {
        let token = StoredToken {
            token: "t".into(),
            key: None,
            secret: None,
            user_id: "user-1".into(),
            name: None,
            email: Some("lrs@example.com".into()),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            expires_at: None,
            expired: false,
            code: None,
        };
        Principal::from_token(&token, &PermissionTable::default(), "http://lrs")
    }

    fn run(raw: Value, principal: &Principal) -> Result<Normalized, AppError> {
        normalize(
            raw,
            &NormalizeContext {
                principal,
                version: "1.0.3",
                attachment_url: "http://lrs/attachments",
                now: datetime!(2024-05-06 07:08:09.123 UTC),
            },
        )
    }

    #[test]
    fn fills_id_stored_timestamp_and_version() {
        let normalized = run(
            json!({"actor": {"mbox": "mailto:a@b.com"}, "verb": {"id": "http://v"}, "object": {"id": "http://o"}}),
            &principal(&["statements/write"]),
        )
        .unwrap();
        let statement = normalized.document.into_value();

        assert!(ids::normalize_uuid(statement["id"].as_str().unwrap()).is_ok());
        assert_eq!(statement["stored"], "2024-05-06T07:08:09.123Z");
        assert_eq!(statement["timestamp"], statement["stored"]);
        assert_eq!(statement["version"], "1.0.3");
        assert_eq!(statement["authority"]["mbox"], "mailto:lrs@example.com");
        assert_eq!(normalized.stored_at, 1_714_979_289_123);
    }

    #[test]
    fn only_super_keeps_a_supplied_authority() {
        let raw = json!({
            "verb": {"id": "http://v"},
            "object": {"id": "http://o"},
            "authority": {"mbox": "mailto:someone@else.com"}
        });
        let kept = run(raw.clone(), &principal(&["super"])).unwrap();
        assert_eq!(kept.document.authority().unwrap()["mbox"], "mailto:someone@else.com");

        let replaced = run(raw, &principal(&["statements/write"])).unwrap();
        assert_eq!(replaced.document.authority().unwrap()["mbox"], "mailto:lrs@example.com");
    }

    #[test]
    fn voided_verb_without_statement_ref_is_rejected() {
        let raw = json!({
            "verb": {"id": "http://adlnet.gov/expapi/verbs/voided"},
            "object": {"id": "http://o"}
        });
        assert!(matches!(
            run(raw, &principal(&["statements/write"])),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn supplied_timestamp_is_kept() {
        let normalized = run(
            json!({"verb": {"id": "http://v"}, "object": {"id": "http://o"}, "timestamp": "2020-01-01T00:00:00Z"}),
            &principal(&["statements/write"]),
        )
        .unwrap();
        assert_eq!(normalized.document.as_value()["timestamp"], "2020-01-01T00:00:00Z");
    }
}
