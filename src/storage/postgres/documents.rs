use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow, types::Json};
use tokio::sync::mpsc;

use crate::{
    errors::AppError,
    storage::{
        expression::{Expression, ID_FIELD},
        postgres::sql::{identifier, push_expression, text_path},
        traits::{Cursor, DocumentStore, FindOptions, SortOrder},
    },
};

/// Rows fetched ahead of the reader.
const CURSOR_BUFFER: usize = 64;

pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn scoped(prefix: &str, collection: &str, filter: &Expression) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(prefix);
    builder.push(" WHERE collection = ");
    builder.push_bind(collection.to_string());
    builder.push(" AND ");
    push_expression(&mut builder, filter);
    builder
}

fn body(document: Value) -> Result<Json<Value>, AppError> {
    match document {
        Value::Object(mut map) => {
            map.remove(ID_FIELD);
            Ok(Json(Value::Object(map)))
        }
        _ => Err(AppError::InternalError(anyhow::anyhow!(
            "stored documents must be JSON objects"
        ))),
    }
}

fn row_to_document(row: &PgRow) -> Result<Value, AppError> {
    let id: i64 = row.try_get("id")?;
    let Json(mut document): Json<Value> = row.try_get("doc")?;
    if let Value::Object(map) = &mut document {
        map.insert(ID_FIELD.to_string(), Value::from(id));
    }
    Ok(document)
}

fn write_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(format!("Duplicate key: {}", db.message()))
        }
        _ => err.into(),
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn create_unique_index(&self, collection: &str, field: &str) -> Result<(), AppError> {
        let name = format!(
            "documents_{}_{}_key",
            identifier(collection),
            identifier(field)
        );
        let sql = format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON documents ((doc #>> '{}')) WHERE collection = '{}'",
            name,
            text_path(field),
            collection.replace('\'', "''")
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Expression,
        options: FindOptions,
    ) -> Result<Cursor, AppError> {
        let mut builder = scoped("SELECT id, doc FROM documents", collection, filter);
        match options.sort {
            Some(SortOrder::Ascending) => {
                builder.push(" ORDER BY id ASC");
            }
            Some(SortOrder::Descending) => {
                builder.push(" ORDER BY id DESC");
            }
            None => {}
        }
        if let Some(limit) = options.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit as i64);
        }

        // Rows stream from a task owning the query. A dropped cursor ends it.
        let (tx, rx) = mpsc::channel::<Result<Value, AppError>>(CURSOR_BUFFER);
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let mut rows = builder.build().fetch(&pool);
            while let Some(row) = rows.next().await {
                let document = row
                    .map_err(AppError::from)
                    .and_then(|row| row_to_document(&row));
                let failed = document.is_err();
                if tx.send(document).await.is_err() || failed {
                    break;
                }
            }
        });

        let cursor = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|document| (document, rx))
        })
        .boxed();
        Ok(cursor)
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Expression,
    ) -> Result<Option<Value>, AppError> {
        let mut builder = scoped("SELECT id, doc FROM documents", collection, filter);
        builder.push(" ORDER BY id ASC LIMIT 1");
        let row = builder.build().fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn count(&self, collection: &str, filter: &Expression) -> Result<u64, AppError> {
        let mut builder = scoped("SELECT COUNT(*) AS total FROM documents", collection, filter);
        let row = builder.build().fetch_one(&self.pool).await?;
        let total: i64 = row.try_get("total")?;
        Ok(total as u64)
    }

    async fn insert_one(&self, collection: &str, document: Value) -> Result<i64, AppError> {
        let row = sqlx::query("INSERT INTO documents (collection, doc) VALUES ($1, $2) RETURNING id")
            .bind(collection)
            .bind(body(document)?)
            .fetch_one(&self.pool)
            .await
            .map_err(write_error)?;
        Ok(row.try_get("id")?)
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Value>,
    ) -> Result<Vec<i64>, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(documents.len());
        for document in documents {
            let row =
                sqlx::query("INSERT INTO documents (collection, doc) VALUES ($1, $2) RETURNING id")
                    .bind(collection)
                    .bind(body(document)?)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(write_error)?;
            ids.push(row.try_get("id")?);
        }
        tx.commit().await?;
        Ok(ids)
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Expression,
        document: Value,
    ) -> Result<u64, AppError> {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE documents SET doc = ");
        builder.push_bind(body(document)?);
        builder.push(" WHERE collection = ");
        builder.push_bind(collection.to_string());
        builder.push(" AND ");
        push_expression(&mut builder, filter);

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(write_error)?;
        Ok(result.rows_affected())
    }

    async fn upsert(
        &self,
        collection: &str,
        filter: &Expression,
        document: Value,
    ) -> Result<(), AppError> {
        let doc = body(document)?;
        let mut tx = self.pool.begin().await?;

        let mut select = scoped("SELECT id FROM documents", collection, filter);
        select.push(" ORDER BY id ASC LIMIT 1 FOR UPDATE");
        let existing = select.build().fetch_optional(&mut *tx).await?;

        match existing {
            Some(row) => {
                let id: i64 = row.try_get("id")?;
                sqlx::query("UPDATE documents SET doc = $1 WHERE id = $2")
                    .bind(doc)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(write_error)?;
            }
            None => {
                sqlx::query("INSERT INTO documents (collection, doc) VALUES ($1, $2)")
                    .bind(collection)
                    .bind(doc)
                    .execute(&mut *tx)
                    .await
                    .map_err(write_error)?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, filter: &Expression) -> Result<u64, AppError> {
        let mut builder = scoped("DELETE FROM documents", collection, filter);
        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use serde_json::json;

    /// Runs against `DATABASE_URL` when one is configured.
    async fn store() -> Option<PostgresDocumentStore> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let pool = crate::config::db_config(&url).await.unwrap();
        Some(PostgresDocumentStore::new(pool))
    }

    #[tokio::test]
    async fn find_streams_sorted_rows() {
        let Some(store) = store().await else {
            return;
        };
        let collection = format!("cursor-{}", uuid::Uuid::new_v4().simple());
        for n in 1..=3 {
            store.insert_one(&collection, json!({"n": n})).await.unwrap();
        }

        let options = FindOptions::sorted(SortOrder::Descending).with_limit(2);
        let docs: Vec<Value> = store
            .find(&collection, &Expression::new(), options)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(docs.iter().map(|d| d["n"].clone()).collect::<Vec<_>>(), vec![json!(3), json!(2)]);

        let mut cursor = store
            .find(&collection, &Expression::new(), FindOptions::sorted(SortOrder::Ascending))
            .await
            .unwrap();
        let first = cursor.try_next().await.unwrap().unwrap();
        assert_eq!(first["n"], 1);
        drop(cursor);
        assert_eq!(store.delete(&collection, &Expression::new()).await.unwrap(), 3);
    }
}
