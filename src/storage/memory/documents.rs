use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{
    errors::AppError,
    storage::{
        expression::{Expression, ID_FIELD, split_path},
        traits::{Cursor, DocumentStore, FindOptions, SortOrder},
    },
};

#[derive(Default)]
struct Collection {
    rows: Vec<(i64, Value)>,
    unique_fields: Vec<String>,
}

#[derive(Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
    next_id: RwLock<i64>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            next_id: RwLock::new(1),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Collection>>, AppError> {
        self.collections
            .read()
            .map_err(|_| AppError::InternalError(anyhow::anyhow!("document store lock poisoned")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Collection>>, AppError> {
        self.collections
            .write()
            .map_err(|_| AppError::InternalError(anyhow::anyhow!("document store lock poisoned")))
    }

    fn allocate_id(&self) -> Result<i64, AppError> {
        let mut next = self
            .next_id
            .write()
            .map_err(|_| AppError::InternalError(anyhow::anyhow!("id sequence lock poisoned")))?;
        let id = *next;
        *next += 1;
        Ok(id)
    }
}

fn with_id(id: i64, body: &Value) -> Value {
    let mut document = body.clone();
    if let Value::Object(map) = &mut document {
        map.insert(ID_FIELD.to_string(), Value::from(id));
    }
    document
}

fn strip_id(document: Value) -> Result<Value, AppError> {
    match document {
        Value::Object(mut map) => {
            map.remove(ID_FIELD);
            Ok(Value::Object(map))
        }
        _ => Err(AppError::InternalError(anyhow::anyhow!(
            "stored documents must be JSON objects"
        ))),
    }
}

/// Scalar reached by walking objects only; unique constraints do not fan out.
fn unique_key<'a>(document: &'a Value, field: &str) -> Option<&'a Value> {
    let mut current = document;
    for part in split_path(field) {
        current = current.as_object()?.get(part)?;
    }
    (!current.is_null()).then_some(current)
}

fn check_unique<'a>(
    collection: &Collection,
    incoming: impl IntoIterator<Item = &'a Value>,
    skip_id: Option<i64>,
) -> Result<(), AppError> {
    let incoming: Vec<&Value> = incoming.into_iter().collect();
    for field in &collection.unique_fields {
        let mut seen: Vec<&Value> = collection
            .rows
            .iter()
            .filter(|(id, _)| Some(*id) != skip_id)
            .filter_map(|(_, body)| unique_key(body, field))
            .collect();
        for document in &incoming {
            if let Some(key) = unique_key(document, field) {
                if seen.contains(&key) {
                    return Err(AppError::Conflict(format!(
                        "Duplicate value for unique field {field}: {key}"
                    )));
                }
                seen.push(key);
            }
        }
    }
    Ok(())
}

fn matching<'a>(
    collection: &'a Collection,
    filter: &'a Expression,
) -> impl Iterator<Item = &'a (i64, Value)> + 'a {
    collection
        .rows
        .iter()
        .filter(move |(id, body)| filter.matches(&with_id(*id, body)))
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create_unique_index(&self, collection: &str, field: &str) -> Result<(), AppError> {
        let mut collections = self.write()?;
        let entry = collections.entry(collection.to_string()).or_default();
        if !entry.unique_fields.iter().any(|existing| existing == field) {
            entry.unique_fields.push(field.to_string());
        }
        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Expression,
        options: FindOptions,
    ) -> Result<Cursor, AppError> {
        let collections = self.read()?;
        let mut found: Vec<(i64, Value)> = match collections.get(collection) {
            Some(entry) => matching(entry, filter).cloned().collect(),
            None => Vec::new(),
        };
        drop(collections);

        match options.sort {
            Some(SortOrder::Ascending) => found.sort_by_key(|(id, _)| *id),
            Some(SortOrder::Descending) => found.sort_by_key(|(id, _)| std::cmp::Reverse(*id)),
            None => {}
        }
        if let Some(limit) = options.limit {
            found.truncate(limit);
        }

        let documents: Vec<Result<Value, AppError>> = found
            .into_iter()
            .map(|(id, body)| Ok(with_id(id, &body)))
            .collect();
        Ok(stream::iter(documents).boxed())
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Expression,
    ) -> Result<Option<Value>, AppError> {
        let collections = self.read()?;
        Ok(collections
            .get(collection)
            .and_then(|entry| matching(entry, filter).next())
            .map(|(id, body)| with_id(*id, body)))
    }

    async fn count(&self, collection: &str, filter: &Expression) -> Result<u64, AppError> {
        let collections = self.read()?;
        Ok(collections
            .get(collection)
            .map(|entry| matching(entry, filter).count() as u64)
            .unwrap_or(0))
    }

    async fn insert_one(&self, collection: &str, document: Value) -> Result<i64, AppError> {
        let mut ids = self.insert_many(collection, vec![document]).await?;
        ids.pop()
            .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("insert produced no id")))
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Value>,
    ) -> Result<Vec<i64>, AppError> {
        let bodies = documents
            .into_iter()
            .map(strip_id)
            .collect::<Result<Vec<_>, _>>()?;

        let mut collections = self.write()?;
        let entry = collections.entry(collection.to_string()).or_default();
        check_unique(entry, &bodies, None)?;

        let mut ids = Vec::with_capacity(bodies.len());
        for body in bodies {
            let id = self.allocate_id()?;
            entry.rows.push((id, body));
            ids.push(id);
        }
        Ok(ids)
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Expression,
        document: Value,
    ) -> Result<u64, AppError> {
        let body = strip_id(document)?;
        let mut collections = self.write()?;
        let Some(entry) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let targets: Vec<i64> = matching(entry, filter).map(|(id, _)| *id).collect();
        for id in &targets {
            check_unique(entry, [&body], Some(*id))?;
        }
        for (id, stored) in entry.rows.iter_mut() {
            if targets.contains(id) {
                *stored = body.clone();
            }
        }
        Ok(targets.len() as u64)
    }

    async fn upsert(
        &self,
        collection: &str,
        filter: &Expression,
        document: Value,
    ) -> Result<(), AppError> {
        let body = strip_id(document)?;
        let mut collections = self.write()?;
        let entry = collections.entry(collection.to_string()).or_default();

        let target = matching(entry, filter).map(|(id, _)| *id).next();
        check_unique(entry, [&body], target)?;
        match target {
            Some(target) => {
                if let Some((_, stored)) = entry.rows.iter_mut().find(|(id, _)| *id == target) {
                    *stored = body;
                }
            }
            None => {
                let id = self.allocate_id()?;
                entry.rows.push((id, body));
            }
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, filter: &Expression) -> Result<u64, AppError> {
        let mut collections = self.write()?;
        let Some(entry) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = entry.rows.len();
        entry
            .rows
            .retain(|(id, body)| !filter.matches(&with_id(*id, body)));
        Ok((before - entry.rows.len()) as u64)
    }
}
