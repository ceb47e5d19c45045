use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Credentials for the metrics source. Present only when every field is set.
#[derive(Clone)]
pub struct SourceCredentials {
    pub bearer_token: String,
    pub user_id: String,
    pub username: String,
}

impl std::fmt::Debug for SourceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceCredentials")
            .field("bearer_token", &"[redacted]")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .finish()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub data_dir: PathBuf,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub source: Option<SourceCredentials>,
    pub source_base_url: String,
    pub source_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub poll_startup_delay_secs: u64,
    pub poll_max_items: usize,
    pub backfill_lookback_days: u32,
    pub retention_days: u32,
}

impl AppConfig {
    /// Path of the JSON document used when no database is configured.
    #[must_use]
    pub fn snapshots_path(&self) -> PathBuf {
        self.data_dir.join("snapshots.json")
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("data_dir", &self.data_dir)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[redacted]"),
            )
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("source", &self.source)
            .field("source_base_url", &self.source_base_url)
            .field("source_timeout_secs", &self.source_timeout_secs)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("poll_startup_delay_secs", &self.poll_startup_delay_secs)
            .field("poll_max_items", &self.poll_max_items)
            .field("backfill_lookback_days", &self.backfill_lookback_days)
            .field("retention_days", &self.retention_days)
            .finish()
    }
}
