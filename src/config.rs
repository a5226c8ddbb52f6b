use crate::storage::{
    Storage, filesystem::FilesystemBlobStore, memory::InMemoryBlobStore,
    memory::connection::memory_storage, postgres::connection::postgres_storage,
    traits::BlobStore,
};
use crate::xapi::statement::Format;
use anyhow::Context;
use sqlx::{PgPool, Postgres};
use std::{env::var, path::PathBuf, sync::Arc, time::Duration};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres,
}

/// Process-wide configuration, read once from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub listen_addr: String,
    pub base_url: String,
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub xapi_version: String,
    /// Default page size and the ceiling for client-requested limits.
    pub statement_get_limit: usize,
    pub statement_get_format: Format,
    pub display_error_details: bool,
    pub attachment_dir: Option<PathBuf>,
    pub request_timeout: Duration,
}

pub const ATTACHMENTS_PATH: &str = "/attachments";

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}: '{}' ({})", name, raw, e)),
        Err(_) => Ok(default),
    }
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = parsed("PORT", 3000u16)?;
        let storage_backend = match var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => StorageBackend::Memory,
            "postgres" => StorageBackend::Postgres,
            other => anyhow::bail!(
                "Invalid STORAGE_BACKEND: '{}'. Valid options are 'memory', 'postgres'",
                other
            ),
        };
        let format = var("STATEMENT_GET_FORMAT").unwrap_or_else(|_| "exact".to_string());

        Ok(Self {
            port,
            listen_addr: var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string()),
            base_url: var("BASE_URL")
                .unwrap_or_else(|_| format!("http://127.0.0.1:{}", port))
                .trim_end_matches('/')
                .to_string(),
            storage_backend,
            database_url: var("DATABASE_URL").ok(),
            xapi_version: var("XAPI_VERSION").unwrap_or_else(|_| "1.0.3".to_string()),
            statement_get_limit: parsed("STATEMENT_GET_LIMIT", 100usize)?,
            statement_get_format: Format::parse(&format)
                .map_err(|e| anyhow::anyhow!("Invalid STATEMENT_GET_FORMAT: {}", e))?,
            display_error_details: parsed("DISPLAY_ERROR_DETAILS", false)?,
            attachment_dir: var("ATTACHMENT_DIR").ok().map(PathBuf::from),
            request_timeout: Duration::from_secs(parsed("REQUEST_TIMEOUT_SECS", 30u64)?),
        })
    }

    /// In-memory storage and a short request timeout, for test harnesses only.
    pub fn for_tests() -> Self {
        Self {
            port: 0,
            listen_addr: "127.0.0.1".to_string(),
            base_url: "http://127.0.0.1".to_string(),
            storage_backend: StorageBackend::Memory,
            database_url: None,
            xapi_version: "1.0.3".to_string(),
            statement_get_limit: 100,
            statement_get_format: Format::Exact,
            display_error_details: false,
            attachment_dir: None,
            request_timeout: Duration::from_secs(5),
        }
    }

    pub fn attachment_url(&self) -> String {
        format!("{}{}", self.base_url, ATTACHMENTS_PATH)
    }
}

pub async fn db_config(database_url: &str) -> anyhow::Result<sqlx::Pool<Postgres>> {
    let pool = PgPool::connect_lazy(database_url).context("Failed to connect to Postgres")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    Ok(pool)
}

fn blob_config(settings: &Settings) -> Arc<dyn BlobStore> {
    match &settings.attachment_dir {
        Some(dir) => {
            info!("Storing attachments under {}", dir.display());
            Arc::new(FilesystemBlobStore::new(dir.clone()))
        }
        None => Arc::new(InMemoryBlobStore::new()),
    }
}

pub async fn storage_config(settings: &Settings) -> anyhow::Result<Storage> {
    let storage = match settings.storage_backend {
        StorageBackend::Memory => {
            info!("Using in-memory storage backend");
            let mut storage = memory_storage();
            storage.blobs = blob_config(settings);
            storage
        }
        StorageBackend::Postgres => {
            info!("Using PostgreSQL storage backend");
            let database_url = settings
                .database_url
                .as_deref()
                .context("DATABASE_URL not found in environment")?;
            let pool = db_config(database_url).await?;
            postgres_storage(pool, blob_config(settings))
        }
    };
    storage
        .ensure_indexes()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create indexes: {}", e))?;
    Ok(storage)
}
