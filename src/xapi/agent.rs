//! Agent identification by inverse functional identifier.

use serde_json::Value;

use crate::{errors::AppError, storage::expression::Expression};

pub const IFI_KEYS: [&str; 4] = ["mbox", "mbox_sha1sum", "openid", "account"];

/// Positions an agent occupies by default in a statement query.
const DIRECT_POSITIONS: [&str; 2] = ["actor", "object"];

/// Additional positions searched when `related_agents=true`.
const RELATED_POSITIONS: [&str; 3] = ["authority", "context.team", "context.instructor"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ifi {
    Mbox(String),
    MboxSha1Sum(String),
    OpenId(String),
    Account { home_page: String, name: String },
}

impl Ifi {
    /// First identifier found on the agent, in xAPI precedence order.
    pub fn extract(agent: &Value) -> Option<Ifi> {
        let text = |key: &str| agent.get(key).and_then(Value::as_str).map(str::to_string);
        if let Some(mbox) = text("mbox") {
            return Some(Ifi::Mbox(mbox));
        }
        if let Some(sum) = text("mbox_sha1sum") {
            return Some(Ifi::MboxSha1Sum(sum));
        }
        if let Some(openid) = text("openid") {
            return Some(Ifi::OpenId(openid));
        }
        let account = agent.get("account")?;
        Some(Ifi::Account {
            home_page: account.get("homePage")?.as_str()?.to_string(),
            name: account.get("name")?.as_str()?.to_string(),
        })
    }

    /// Like [`Ifi::extract`], rejecting anonymous groups and unidentified agents.
    pub fn require(agent: &Value) -> Result<Ifi, AppError> {
        match Ifi::extract(agent) {
            Some(ifi) => Ok(ifi),
            None if is_group(agent) => Err(AppError::BadRequest(
                "No support for querying Anonymous Groups".to_string(),
            )),
            None => Err(AppError::BadRequest(
                "Unknown or invalid agent type".to_string(),
            )),
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Ifi::Mbox(_) => "mbox",
            Ifi::MboxSha1Sum(_) => "mbox_sha1sum",
            Ifi::OpenId(_) => "openid",
            Ifi::Account { .. } => "account",
        }
    }

    /// Match on the agent stored at `prefix`, e.g. `statement.actor`.
    pub fn at(&self, prefix: &str) -> Expression {
        match self {
            Ifi::Mbox(value) | Ifi::MboxSha1Sum(value) | Ifi::OpenId(value) => {
                Expression::eq(format!("{prefix}.{}", self.key()), value.as_str())
            }
            Ifi::Account { home_page, name } => Expression::and(vec![
                Expression::eq(format!("{prefix}.account.homePage"), home_page.as_str()),
                Expression::eq(format!("{prefix}.account.name"), name.as_str()),
            ]),
        }
    }

    /// Disjunction over every position this agent may occupy in a stored
    /// statement and its reference chain.
    pub fn statement_clause(&self, related: bool) -> Expression {
        let mut clauses = Vec::new();
        for root in ["statement", "references"] {
            for position in DIRECT_POSITIONS {
                clauses.push(self.at(&format!("{root}.{position}")));
            }
            if related {
                for position in RELATED_POSITIONS {
                    clauses.push(self.at(&format!("{root}.{position}")));
                }
                for position in ["object.actor", "object.object"] {
                    clauses.push(Expression::and(vec![
                        Expression::eq(format!("{root}.object.objectType"), "SubStatement"),
                        self.at(&format!("{root}.{position}")),
                    ]));
                }
            }
        }
        Expression::or(clauses)
    }
}

pub fn is_group(agent: &Value) -> bool {
    agent.get("objectType").and_then(Value::as_str) == Some("Group")
}

/// Decodes the JSON `agent` parameter used by queries and document resources.
pub fn parse_agent_param(raw: &str) -> Result<Value, AppError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(agent @ Value::Object(_)) => Ok(agent),
        _ => Err(AppError::BadRequest(format!("Invalid agent parameter: {raw}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_identifiers_in_precedence_order() {
        assert_eq!(
            Ifi::extract(&json!({"mbox": "mailto:a@b.com", "openid": "http://o"})),
            Some(Ifi::Mbox("mailto:a@b.com".into()))
        );
        assert_eq!(
            Ifi::extract(&json!({"account": {"homePage": "http://h", "name": "n"}})),
            Some(Ifi::Account {
                home_page: "http://h".into(),
                name: "n".into()
            })
        );
        assert_eq!(Ifi::extract(&json!({"account": {"name": "n"}})), None);
    }

    #[test]
    fn anonymous_groups_are_rejected() {
        let group = json!({"objectType": "Group", "member": []});
        let err = Ifi::require(&group).unwrap_err();
        assert_eq!(err.message(), "No support for querying Anonymous Groups");
        assert!(Ifi::require(&json!({"name": "nobody"})).is_err());
    }

    #[test]
    fn related_clause_reaches_reference_chain_and_substatements() {
        let ifi = Ifi::Mbox("mailto:a@b.com".into());
        let stored = json!({
            "statement": {"actor": {"mbox": "mailto:x@b.com"}},
            "references": [{
                "actor": {"mbox": "mailto:y@b.com"},
                "object": {"objectType": "SubStatement", "actor": {"mbox": "mailto:a@b.com"}}
            }]
        });
        assert!(!ifi.statement_clause(false).matches(&stored));
        assert!(ifi.statement_clause(true).matches(&stored));
    }

    #[test]
    fn account_matches_both_fields() {
        let ifi = Ifi::Account {
            home_page: "http://h".into(),
            name: "n".into(),
        };
        let stored = json!({"statement": {"actor": {"account": {"homePage": "http://h", "name": "other"}}}});
        assert!(!ifi.statement_clause(false).matches(&stored));
    }
}
