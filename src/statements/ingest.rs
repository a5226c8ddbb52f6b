//! Statement writes: normalization, reference linkage, voiding, batch insert.

use serde_json::Value;
use std::collections::HashSet;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    AppState,
    auth::{Principal, permissions::DEFINE},
    errors::AppError,
    statements::{
        StatementService,
        normalizer::{NormalizeContext, normalize},
        result::StatementResult,
    },
    storage::{
        ACTIVITIES, STATEMENTS,
        expression::Expression,
        models::{StoredActivity, StoredStatement, from_document, to_document},
    },
    xapi::{StatementDocument, ids, timestamp},
};

/// Per-statement result of an ingest call.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Inserted(StoredStatement),
    /// Same id and same content already stored; nothing was written.
    AlreadyPresent(StoredStatement),
}

impl IngestOutcome {
    pub fn statement(&self) -> &StoredStatement {
        match self {
            IngestOutcome::Inserted(stored) | IngestOutcome::AlreadyPresent(stored) => stored,
        }
    }

    pub fn into_statement(self) -> StoredStatement {
        match self {
            IngestOutcome::Inserted(stored) | IngestOutcome::AlreadyPresent(stored) => stored,
        }
    }
}

struct Prepared {
    outcome: IngestOutcome,
    void_target: Option<String>,
    activities: Vec<Value>,
}

/// Version whose clients may void statements this store has never seen.
const TOLERANT_VOIDING_VERSION: &str = "1.0.3";

fn version_parts(version: &str) -> Vec<u32> {
    version
        .split('.')
        .map(|part| part.trim().parse().unwrap_or(0))
        .collect()
}

pub fn version_before(version: &str, other: &str) -> bool {
    let (mut a, mut b) = (version_parts(version), version_parts(other));
    let len = a.len().max(b.len());
    a.resize(len, 0);
    b.resize(len, 0);
    a < b
}

fn statement_id(statement: &Value) -> Option<&str> {
    statement.get("id").and_then(Value::as_str)
}

async fn find_statement(state: &AppState, id: &str) -> Result<Option<StoredStatement>, AppError> {
    state
        .storage
        .documents
        .find_one(STATEMENTS, &Expression::eq("statement.id", id))
        .await?
        .map(from_document)
        .transpose()
}

impl StatementService {
    pub async fn insert_one(
        state: &AppState,
        principal: &Principal,
        version: &str,
        raw: Value,
    ) -> Result<StatementResult, AppError> {
        Self::insert_many(state, principal, version, vec![raw]).await
    }

    /// All statements are validated before anything is written; one failure
    /// rejects the whole batch.
    pub async fn insert_many(
        state: &AppState,
        principal: &Principal,
        version: &str,
        raws: Vec<Value>,
    ) -> Result<StatementResult, AppError> {
        let outcomes = Self::ingest(state, principal, version, raws).await?;
        Ok(StatementResult::written(
            outcomes
                .into_iter()
                .map(IngestOutcome::into_statement)
                .collect(),
        ))
    }

    pub async fn ingest(
        state: &AppState,
        principal: &Principal,
        version: &str,
        raws: Vec<Value>,
    ) -> Result<Vec<IngestOutcome>, AppError> {
        let now = timestamp::now();
        let mut prepared: Vec<Prepared> = Vec::with_capacity(raws.len());
        for raw in raws {
            let next = Self::prepare(state, principal, version, now, raw, &prepared).await?;
            prepared.push(next);
        }

        // Targets written by this batch are stored already voided.
        let mut voided_in_batch = HashSet::new();
        let targets: HashSet<String> = prepared
            .iter()
            .filter_map(|p| p.void_target.clone())
            .collect();
        for p in prepared.iter_mut() {
            if let IngestOutcome::Inserted(stored) = &mut p.outcome {
                if let Some(id) = statement_id(&stored.statement) {
                    if targets.contains(id) {
                        stored.voided = true;
                        voided_in_batch.insert(id.to_string());
                    }
                }
            }
        }

        let pending = prepared
            .iter()
            .filter_map(|p| match &p.outcome {
                IngestOutcome::Inserted(stored) => Some(to_document(stored)),
                IngestOutcome::AlreadyPresent(_) => None,
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut assigned = if pending.is_empty() {
            Vec::new()
        } else {
            state
                .storage
                .documents
                .insert_many(STATEMENTS, pending)
                .await?
        }
        .into_iter();

        // Flips on previously stored statements and activity upserts follow
        // the insert and are not rolled back with it.
        let mut outcomes = Vec::with_capacity(prepared.len());
        for Prepared {
            outcome,
            void_target,
            activities,
        } in prepared
        {
            if let Some(target) = void_target.filter(|t| !voided_in_batch.contains(t)) {
                Self::mark_voided(state, &target).await?;
            }
            for activity in activities {
                Self::upsert_activity(state, activity).await?;
            }
            outcomes.push(match outcome {
                IngestOutcome::Inserted(mut stored) => {
                    stored.id = assigned.next();
                    IngestOutcome::Inserted(stored)
                }
                present => present,
            });
        }

        info!(
            "Ingested {} statement(s) for {}",
            outcomes.len(),
            principal.user_id
        );
        Ok(outcomes)
    }

    async fn prepare(
        state: &AppState,
        principal: &Principal,
        version: &str,
        now: OffsetDateTime,
        raw: Value,
        batch: &[Prepared],
    ) -> Result<Prepared, AppError> {
        let attachment_url = state.settings.attachment_url();
        let normalized = normalize(
            raw,
            &NormalizeContext {
                principal,
                version,
                attachment_url: &attachment_url,
                now,
            },
        )?;
        let document = normalized.document;
        let id = document
            .id()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("normalized statement without id"))?;

        let earlier = |wanted: &str| {
            batch
                .iter()
                .map(|p| p.outcome.statement())
                .find(|stored| statement_id(&stored.statement) == Some(wanted))
        };
        if earlier(id.as_str()).is_some() {
            return Err(AppError::BadRequest(format!(
                "Statement id {id} appears more than once in the batch"
            )));
        }

        if let Some(existing) = find_statement(state, &id).await? {
            let stored = StatementDocument::new(existing.statement.clone())?;
            if stored.comparable() == document.comparable() {
                return Ok(Prepared {
                    outcome: IngestOutcome::AlreadyPresent(existing),
                    void_target: None,
                    activities: Vec::new(),
                });
            }
            warn!("Statement {} resubmitted with different content", id);
            return Err(AppError::Conflict(format!(
                "Statement {id} already exists with different content"
            )));
        }

        let mut references = Vec::new();
        let mut void_target = None;
        if let Some(target_id) = document.referenced_id().map(str::to_string) {
            let target = match earlier(target_id.as_str()) {
                Some(stored) => Some(stored.clone()),
                None => find_statement(state, &target_id).await?,
            };
            if let Some(target) = &target {
                references = target.references.clone();
                references.push(target.statement.clone());
            }

            if document.is_voiding() {
                match target {
                    Some(target) => {
                        if StatementDocument::new(target.statement)?.is_voiding() {
                            return Err(AppError::Conflict(format!(
                                "Statement {target_id} is itself a voiding statement"
                            )));
                        }
                        void_target = Some(target_id);
                    }
                    None if version_before(version, TOLERANT_VOIDING_VERSION) => {
                        return Err(AppError::BadRequest(format!(
                            "Voided statement {target_id} does not exist"
                        )));
                    }
                    None => {}
                }
            }
        }

        let activities = if principal.has_permission(DEFINE) {
            document.activities()
        } else {
            Vec::new()
        };

        Ok(Prepared {
            outcome: IngestOutcome::Inserted(StoredStatement {
                id: None,
                statement: document.into_value(),
                references,
                voided: false,
                stored_at: normalized.stored_at,
                user_id: Some(principal.user_id.clone()),
            }),
            void_target,
            activities,
        })
    }

    async fn mark_voided(state: &AppState, statement_id: &str) -> Result<(), AppError> {
        let Some(mut target) = find_statement(state, statement_id).await? else {
            return Ok(());
        };
        target.voided = true;
        state
            .storage
            .documents
            .update(
                STATEMENTS,
                &Expression::eq("statement.id", statement_id),
                to_document(&target)?,
            )
            .await?;
        info!("Voided statement {}", statement_id);
        Ok(())
    }

    async fn upsert_activity(state: &AppState, activity: Value) -> Result<(), AppError> {
        let Some(id) = activity.get("id").and_then(Value::as_str).map(str::to_string) else {
            return Ok(());
        };
        let record = StoredActivity {
            id: id.clone(),
            activity,
        };
        state
            .storage
            .documents
            .upsert(ACTIVITIES, &Expression::eq("id", id), to_document(&record)?)
            .await
    }

    /// PUT with an explicit `statementId`; a body id must agree with it.
    pub async fn put(
        state: &AppState,
        principal: &Principal,
        version: &str,
        statement_id: Option<&str>,
        mut raw: Value,
    ) -> Result<StatementResult, AppError> {
        let statement_id = statement_id.ok_or_else(|| {
            AppError::BadRequest("The statementId parameter is required".to_string())
        })?;
        let statement_id = ids::normalize_uuid(statement_id)?;

        let Value::Object(body) = &mut raw else {
            return Err(AppError::BadRequest(
                "Statement must be a JSON object".to_string(),
            ));
        };
        match body.get("id").and_then(Value::as_str) {
            Some(body_id) if ids::normalize_uuid(body_id)? != statement_id => {
                return Err(AppError::BadRequest(format!(
                    "Statement id {body_id} does not match statementId {statement_id}"
                )));
            }
            Some(_) => {}
            None => {
                body.insert("id".to_string(), Value::String(statement_id));
            }
        }
        Self::insert_one(state, principal, version, raw).await
    }

    /// Stored statements are immutable.
    pub async fn delete(_state: &AppState, statement_id: &str) -> Result<(), AppError> {
        Err(AppError::InternalError(anyhow::anyhow!(
            "Statements cannot be deleted (requested {statement_id})"
        )))
    }
}
