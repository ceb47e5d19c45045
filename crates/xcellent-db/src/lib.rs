use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;

pub mod document;
pub mod file;
pub mod memory;
pub mod postgres;
pub mod snapshot_store;

pub use document::{DocumentBatch, DocumentOp, DocumentStore};
pub use file::FileDocumentStore;
pub use memory::MemoryDocumentStore;
pub use postgres::PgDocumentStore;
pub use snapshot_store::{PruneReport, SnapshotStore, SnapshotWriter};

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

// Path relative to crates/xcellent-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &xcellent_core::AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("document store i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed document at {key}: {source}")]
    Serde {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Run all pending migrations against the pool.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}

/// Open the document backend selected by the configuration.
///
/// A configured `DATABASE_URL` selects Postgres (migrations are applied);
/// otherwise the JSON file under the data directory is used.
///
/// # Errors
///
/// Returns [`DbError`] if the pool cannot connect, migrations fail, or the
/// snapshot file exists but cannot be read.
pub async fn open_document_store(
    config: &xcellent_core::AppConfig,
) -> Result<std::sync::Arc<dyn DocumentStore>, DbError> {
    if let Some(url) = &config.database_url {
        let pool = connect_pool(url, PoolConfig::from_app_config(config)).await?;
        run_migrations(&pool).await?;
        tracing::info!("document store: postgres");
        return Ok(std::sync::Arc::new(PgDocumentStore::new(pool)));
    }

    let path = config.snapshots_path();
    let store = FileDocumentStore::open(&path).await?;
    tracing::info!(path = %path.display(), "document store: json file");
    Ok(std::sync::Arc::new(store))
}
