//! Domain types and configuration shared by every xcellent crate.

pub mod app_config;
pub mod config;
pub mod dates;
pub mod metrics;
pub mod snapshots;

use thiserror::Error;

pub use app_config::{AppConfig, Environment, SourceCredentials};
pub use config::{load_app_config, load_app_config_from_env};
pub use dates::{date_key, parse_date_key};
pub use metrics::{AccountCounters, CumulativeTotals, Metric, SourceItem};
pub use snapshots::{
    CumulativeSample, DailyAggregate, ItemMetricHistory, ItemSample, ITEM_HISTORY_CAP,
    ITEM_SAMPLE_MIN_SPACING_SECS, SAMPLES_PER_DAY_CAP,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
