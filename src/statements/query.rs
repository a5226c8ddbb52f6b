//! Statement GET: parameters to filter, pagination and permission scope.

use futures::TryStreamExt;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::{
    AppState,
    auth::{
        Principal,
        permissions::{STATEMENTS_READ, STATEMENTS_READ_MINE},
    },
    errors::AppError,
    statements::{StatementService, result::StatementResult},
    storage::{
        STATEMENTS,
        expression::{Expression, ID_FIELD},
        models::{StoredStatement, from_document},
        traits::{FindOptions, SortOrder},
    },
    xapi::{Ifi, agent::parse_agent_param, ids, statement::Format, timestamp},
};

const KNOWN_PARAMETERS: [&str; 16] = [
    "statementId",
    "voidedStatementId",
    "agent",
    "verb",
    "activity",
    "registration",
    "related_agents",
    "related_activities",
    "since",
    "until",
    "since_id",
    "until_id",
    "limit",
    "ascending",
    "format",
    "attachments",
];

/// Parameters that may accompany a single-statement lookup.
const SINGLE_COMPANIONS: [&str; 2] = ["format", "attachments"];

const CONTEXT_ACTIVITY_KINDS: [&str; 4] = ["parent", "category", "grouping", "other"];

#[derive(Debug, Clone, Default)]
pub struct StatementQuery {
    pub statement_id: Option<String>,
    pub voided_statement_id: Option<String>,
    pub agent: Option<Value>,
    pub verb: Option<String>,
    pub activity: Option<String>,
    pub registration: Option<String>,
    pub related_agents: bool,
    pub related_activities: bool,
    pub since: Option<i64>,
    pub until: Option<i64>,
    pub since_id: Option<i64>,
    pub until_id: Option<i64>,
    /// Absent when missing or unparsable; the configured default applies.
    pub limit: Option<usize>,
    pub ascending: bool,
    pub format: Option<Format>,
    pub attachments: bool,
    /// The request parameters as received, in a stable order.
    pub raw: Vec<(String, String)>,
}

fn id_bound(name: &str, raw: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid {name}: {raw}")))
}

fn date_bound(name: &str, raw: &str) -> Result<i64, AppError> {
    Ok(timestamp::to_millis(timestamp::parse_param(name, raw)?))
}

impl StatementQuery {
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, AppError> {
        let mut raw: Vec<(String, String)> = params
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        raw.sort();

        if let Some((unknown, _)) = raw
            .iter()
            .find(|(key, _)| !KNOWN_PARAMETERS.contains(&key.as_str()))
        {
            return Err(AppError::BadRequest(format!(
                "Unknown statement query parameter: {unknown}"
            )));
        }

        let get = |key: &str| params.get(key).map(String::as_str);
        let single = get("statementId").is_some() || get("voidedStatementId").is_some();
        if single {
            let extra = raw.iter().find(|(key, _)| {
                key != "statementId"
                    && key != "voidedStatementId"
                    && !SINGLE_COMPANIONS.contains(&key.as_str())
            });
            if get("statementId").is_some() && get("voidedStatementId").is_some() {
                return Err(AppError::BadRequest(
                    "statementId and voidedStatementId cannot be combined".to_string(),
                ));
            }
            if let Some((key, _)) = extra {
                return Err(AppError::BadRequest(format!(
                    "{key} cannot be combined with a statement id lookup"
                )));
            }
        }

        Ok(Self {
            statement_id: get("statementId").map(str::to_string),
            voided_statement_id: get("voidedStatementId").map(str::to_string),
            agent: get("agent").map(parse_agent_param).transpose()?,
            verb: get("verb").map(str::to_string),
            activity: get("activity").map(str::to_string),
            registration: get("registration").map(ids::normalize_uuid).transpose()?,
            related_agents: get("related_agents") == Some("true"),
            related_activities: get("related_activities") == Some("true"),
            since: get("since").map(|v| date_bound("since", v)).transpose()?,
            until: get("until").map(|v| date_bound("until", v)).transpose()?,
            since_id: get("since_id").map(|v| id_bound("since_id", v)).transpose()?,
            until_id: get("until_id").map(|v| id_bound("until_id", v)).transpose()?,
            limit: get("limit").and_then(|v| v.trim().parse().ok()),
            ascending: get("ascending")
                .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1"),
            format: get("format").map(Format::parse).transpose()?,
            attachments: get("attachments") == Some("true"),
            raw,
        })
    }

    /// Limit to apply given the configured default, which is also the ceiling.
    pub fn effective_limit(&self, default: usize) -> usize {
        match self.limit {
            Some(limit) if limit > 0 && limit < default => limit,
            _ => default,
        }
    }
}

fn activity_clause(activity: &str, related: bool) -> Expression {
    let mut clauses = Vec::new();
    for root in ["statement", "references"] {
        clauses.push(Expression::eq(format!("{root}.object.id"), activity));
        if related {
            for kind in CONTEXT_ACTIVITY_KINDS {
                clauses.push(Expression::eq(
                    format!("{root}.context.contextActivities.{kind}.id"),
                    activity,
                ));
            }
            clauses.push(Expression::and(vec![
                Expression::eq(format!("{root}.object.objectType"), "SubStatement"),
                Expression::eq(format!("{root}.object.object.id"), activity),
            ]));
        }
    }
    Expression::or(clauses)
}

/// Callers holding only `statements/read/mine` see their own statements.
fn scope_to_principal(expression: &mut Expression, principal: &Principal) {
    if principal.has_permission(STATEMENTS_READ_MINE) && !principal.has_permission(STATEMENTS_READ)
    {
        expression.where_eq("userId", principal.user_id.as_str());
    }
}

impl StatementService {
    pub async fn get(
        state: &AppState,
        principal: &Principal,
        query: &StatementQuery,
    ) -> Result<StatementResult, AppError> {
        let format = query.format.unwrap_or(state.settings.statement_get_format);

        if let Some(raw_id) = &query.statement_id {
            return Self::get_single(state, principal, raw_id, false, format).await;
        }
        if let Some(raw_id) = &query.voided_statement_id {
            return Self::get_single(state, principal, raw_id, true, format).await;
        }

        let documents = &state.storage.documents;
        let mut expression = Expression::new();
        expression.where_eq("voided", false);

        if let Some(agent) = &query.agent {
            let ifi = Ifi::require(agent)?;
            expression.where_and(vec![ifi.statement_clause(query.related_agents)]);
        }
        if let Some(verb) = &query.verb {
            expression.where_or(vec![
                Expression::eq("statement.verb.id", verb.as_str()),
                Expression::eq("references.verb.id", verb.as_str()),
            ]);
        }
        if let Some(activity) = &query.activity {
            expression.where_and(vec![activity_clause(activity, query.related_activities)]);
        }
        if let Some(registration) = &query.registration {
            expression.where_or(vec![
                Expression::eq("statement.context.registration", registration.as_str()),
                Expression::eq("references.context.registration", registration.as_str()),
            ]);
        }
        if let Some(since) = query.since {
            expression.where_greater_or_equal("storedAt", since);
        }
        if let Some(until) = query.until {
            expression.where_less_or_equal("storedAt", until);
        }
        scope_to_principal(&mut expression, principal);

        let total_count = documents.count(STATEMENTS, &expression).await?;

        if let Some(since_id) = query.since_id {
            expression.where_greater(ID_FIELD, since_id);
        }
        if let Some(until_id) = query.until_id {
            expression.where_less(ID_FIELD, until_id);
        }

        let sort = if query.ascending {
            SortOrder::Ascending
        } else {
            SortOrder::Descending
        };
        let limit = query.effective_limit(state.settings.statement_get_limit);
        let remaining_count = documents.count(STATEMENTS, &expression).await?;
        debug!(
            "Statement query {:?}: total {}, remaining {}, limit {}",
            expression, total_count, remaining_count, limit
        );

        let cursor = documents
            .find(
                STATEMENTS,
                &expression,
                FindOptions::sorted(sort).with_limit(limit),
            )
            .await?;
        let drained = tokio::time::timeout(
            state.settings.request_timeout,
            cursor.try_collect::<Vec<Value>>(),
        )
        .await
        .map_err(|_| anyhow::anyhow!("statement query timed out"))?;
        let statements = drained?
            .into_iter()
            .map(from_document)
            .collect::<Result<Vec<StoredStatement>, AppError>>()?;

        Ok(StatementResult {
            statements,
            total_count,
            remaining_count,
            has_more: remaining_count > limit as u64,
            single: false,
            format,
            sort,
        })
    }

    async fn get_single(
        state: &AppState,
        principal: &Principal,
        raw_id: &str,
        voided: bool,
        format: Format,
    ) -> Result<StatementResult, AppError> {
        let id = ids::normalize_uuid(raw_id)?;
        let mut expression = Expression::new();
        expression
            .where_eq("statement.id", id.as_str())
            .where_eq("voided", voided);
        scope_to_principal(&mut expression, principal);

        let documents = &state.storage.documents;
        if documents.count(STATEMENTS, &expression).await? == 0 {
            return Err(AppError::NotFound(format!("Statement {id} not found")));
        }
        let document = documents
            .find_one(STATEMENTS, &expression)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Statement {id} not found")))?;
        Ok(StatementResult::single(from_document(document)?, format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn rejects_unknown_and_conflicting_parameters() {
        assert!(StatementQuery::from_params(&params(&[("foo", "1")])).is_err());
        assert!(
            StatementQuery::from_params(&params(&[
                ("statementId", "a1b2c3d4-e5f6-4711-8899-aabbccddeeff"),
                ("verb", "http://v"),
            ]))
            .is_err()
        );
        assert!(
            StatementQuery::from_params(&params(&[
                ("statementId", "a1b2c3d4-e5f6-4711-8899-aabbccddeeff"),
                ("format", "ids"),
            ]))
            .is_ok()
        );
    }

    #[test]
    fn limit_falls_back_to_default() {
        let limit = |raw: &str| {
            StatementQuery::from_params(&params(&[("limit", raw)]))
                .unwrap()
                .effective_limit(100)
        };
        assert_eq!(limit("10"), 10);
        assert_eq!(limit("0"), 100);
        assert_eq!(limit("5000"), 100);
        assert_eq!(limit("ten"), 100);
    }

    #[test]
    fn parses_flags_and_bounds() {
        let query = StatementQuery::from_params(&params(&[
            ("ascending", "1"),
            ("related_agents", "true"),
            ("since", "2024-01-02T03:04:05Z"),
            ("until_id", "42"),
        ]))
        .unwrap();
        assert!(query.ascending);
        assert!(query.related_agents);
        assert_eq!(query.since, Some(1_704_164_645_000));
        assert_eq!(query.until_id, Some(42));

        assert!(StatementQuery::from_params(&params(&[("since", "soon")])).is_err());
        assert!(StatementQuery::from_params(&params(&[("until_id", "x")])).is_err());
    }

    #[test]
    fn related_activity_clause_covers_context() {
        let stored = serde_json::json!({
            "statement": {
                "object": {"id": "http://x/act/other"},
                "context": {"contextActivities": {"grouping": [{"id": "http://x/act/1"}]}}
            }
        });
        assert!(!activity_clause("http://x/act/1", false).matches(&stored));
        assert!(activity_clause("http://x/act/1", true).matches(&stored));
    }
}
