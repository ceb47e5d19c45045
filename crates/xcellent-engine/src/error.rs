use thiserror::Error;
use xcellent_db::DbError;
use xcellent_source::SourceError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("metrics source fetch failed: {0}")]
    Upstream(#[from] SourceError),

    #[error("snapshot store error: {0}")]
    Store(#[from] DbError),

    #[error("invalid period {0:?}: expected 7d, 30d or 90d")]
    InvalidPeriod(String),
}
