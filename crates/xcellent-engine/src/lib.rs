//! Snapshot and delta reconciliation engine.
//!
//! Polls cumulative counters from a [`MetricsSource`](xcellent_source::MetricsSource),
//! stores them as timestamped samples, derives non-negative daily deltas,
//! reconstructs missed days from per-item creation dates and assembles the
//! read model served to the presentation layer.

pub mod backfill;
pub mod error;
pub mod poller;
pub mod read_model;
pub mod reconcile;
pub mod service;
pub mod streak;

pub use backfill::{BackfillReport, MAX_BACKFILL_DAYS};
pub use error::EngineError;
pub use poller::{retention_cutoff, PollReport};
pub use read_model::{
    DailyPoint, DailySeries, EngagementBreakdown, MetricBreakdown, Period,
};
pub use reconcile::{compute_delta, derive_aggregate, new_followers, reconcile, select_baseline};
pub use service::{EngineConfig, Outcome, SkipReason, SnapshotService};
pub use streak::{compute_streak, Streak, CALENDAR_WINDOW_MONTHS};
