//! The snapshot service: one explicit object owning the store, the optional
//! metrics source and the in-flight guard shared by poll and backfill.

use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use xcellent_core::{
    AppConfig, ITEM_HISTORY_CAP, ITEM_SAMPLE_MIN_SPACING_SECS, SAMPLES_PER_DAY_CAP,
};
use xcellent_db::SnapshotStore;
use xcellent_source::MetricsSource;

/// Tunables for polling, backfill and retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Item cap per poll or backfill fetch.
    pub max_items: usize,
    pub backfill_lookback_days: u32,
    pub retention_days: u32,
    pub samples_per_day: usize,
    pub item_history_cap: usize,
    pub item_sample_spacing_secs: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_items: 200,
            backfill_lookback_days: 7,
            retention_days: 365,
            samples_per_day: SAMPLES_PER_DAY_CAP,
            item_history_cap: ITEM_HISTORY_CAP,
            item_sample_spacing_secs: ITEM_SAMPLE_MIN_SPACING_SECS,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_items: config.poll_max_items,
            backfill_lookback_days: config.backfill_lookback_days,
            retention_days: config.retention_days,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn item_sample_spacing(&self) -> Duration {
        Duration::seconds(self.item_sample_spacing_secs)
    }
}

/// Why a poll or backfill did no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No credentials for the metrics source.
    NotConfigured,
    /// Another poll or backfill holds the in-flight guard.
    AlreadyRunning,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConfigured => f.write_str("not configured"),
            Self::AlreadyRunning => f.write_str("already running"),
        }
    }
}

/// Result of a guarded operation that may be skipped without being an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome<T> {
    Completed(T),
    Skipped { reason: SkipReason },
}

impl<T> Outcome<T> {
    #[must_use]
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Skipped { .. } => None,
        }
    }

    #[must_use]
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Completed(_) => None,
            Self::Skipped { reason } => Some(*reason),
        }
    }
}

/// Owns everything the poller, backfill engine and read model need.
///
/// Cheap to clone; clones share the store and the in-flight guard.
#[derive(Clone)]
pub struct SnapshotService {
    pub(crate) store: SnapshotStore,
    pub(crate) source: Option<Arc<dyn MetricsSource>>,
    pub(crate) config: EngineConfig,
    in_flight: Arc<Mutex<()>>,
}

impl std::fmt::Debug for SnapshotService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotService")
            .field("configured", &self.source.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SnapshotService {
    #[must_use]
    pub fn new(
        store: SnapshotStore,
        source: Option<Arc<dyn MetricsSource>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            source,
            config,
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.source.is_some()
    }

    /// Whether a poll or backfill is currently running.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// Resolve the source and take the in-flight guard, or say why not.
    ///
    /// Never waits: an operation already in flight means skip, not queue.
    pub(crate) fn begin(&self) -> Result<(&dyn MetricsSource, MutexGuard<'_, ()>), SkipReason> {
        let source = self.source.as_deref().ok_or(SkipReason::NotConfigured)?;
        let guard = self
            .in_flight
            .try_lock()
            .map_err(|_| SkipReason::AlreadyRunning)?;
        Ok((source, guard))
    }
}
