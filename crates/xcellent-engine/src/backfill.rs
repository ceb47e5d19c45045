//! Reconstruction of missed days from per-item creation dates.
//!
//! A day's estimate is the sum of the current counters of the items created
//! on that day. Engagement that older items picked up during the day is not
//! counted, so estimates undercount; they are flagged `estimated` for that
//! reason and are never re-estimated.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use xcellent_core::{CumulativeTotals, DailyAggregate, SourceItem};
use xcellent_db::SnapshotStore;
use xcellent_source::fetch_items;

use crate::error::EngineError;
use crate::service::{Outcome, SnapshotService};

/// Largest window a caller may ask a manual backfill to inspect.
pub const MAX_BACKFILL_DAYS: u32 = 90;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// Days in the window that had no usable aggregate, oldest first.
    pub missing_dates: Vec<NaiveDate>,
    /// Days that received an estimate, oldest first.
    pub filled_dates: Vec<NaiveDate>,
    pub items_fetched: usize,
}

/// Days in `today - lookback_days ..= today - 1` that backfill may write.
///
/// # Errors
///
/// Returns [`xcellent_db::DbError`] on store failure.
pub async fn find_missing_days(
    store: &SnapshotStore,
    today: NaiveDate,
    lookback_days: u32,
) -> Result<Vec<NaiveDate>, xcellent_db::DbError> {
    let mut missing = Vec::new();
    for offset in (1..=u64::from(lookback_days)).rev() {
        let Some(date) = today.checked_sub_days(Days::new(offset)) else {
            continue;
        };
        let candidate = store
            .daily(date)
            .await?
            .is_none_or(|agg| agg.is_backfill_candidate());
        if candidate {
            missing.push(date);
        }
    }
    Ok(missing)
}

/// Sum item counters per creation day.
#[must_use]
pub fn group_by_created_day(items: &[SourceItem]) -> BTreeMap<NaiveDate, CumulativeTotals> {
    let mut groups: BTreeMap<NaiveDate, CumulativeTotals> = BTreeMap::new();
    for item in items {
        groups
            .entry(item.created_at.date_naive())
            .or_default()
            .accumulate(&item.totals);
    }
    groups
}

/// The estimate for `date`, keeping any follower fields already on record.
#[must_use]
pub fn estimated_aggregate(
    date: NaiveDate,
    totals: CumulativeTotals,
    existing: Option<&DailyAggregate>,
) -> DailyAggregate {
    DailyAggregate {
        date,
        delta: totals,
        followers: existing.and_then(|e| e.followers),
        new_followers: existing.and_then(|e| e.new_followers),
        estimated: true,
    }
}

impl SnapshotService {
    /// Backfill the configured window ending yesterday.
    ///
    /// # Errors
    ///
    /// See [`SnapshotService::backfill_at`].
    pub async fn backfill(&self) -> Result<Outcome<BackfillReport>, EngineError> {
        self.backfill_at(Utc::now().date_naive(), self.config.backfill_lookback_days)
            .await
    }

    /// Estimate every missing day in the `lookback_days` before `today`.
    ///
    /// One bounded fetch covers the whole window, starting at midnight UTC of
    /// the earliest missing day. Nothing is written unless the fetch
    /// succeeds. Days whose items have no impressions yet stay missing, so a
    /// later pass can still estimate them.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Upstream`] when the fetch fails and
    /// [`EngineError::Store`] on store failure.
    pub async fn backfill_at(
        &self,
        today: NaiveDate,
        lookback_days: u32,
    ) -> Result<Outcome<BackfillReport>, EngineError> {
        let (source, _running) = match self.begin() {
            Ok(started) => started,
            Err(reason) => {
                tracing::debug!(%reason, "snapshots: backfill skipped");
                return Ok(Outcome::Skipped { reason });
            }
        };

        let missing_dates = find_missing_days(&self.store, today, lookback_days).await?;
        let Some(earliest) = missing_dates.first() else {
            tracing::debug!(lookback_days, "snapshots: nothing to backfill");
            return Ok(Outcome::Completed(BackfillReport {
                missing_dates,
                filled_dates: Vec::new(),
                items_fetched: 0,
            }));
        };

        let created_after = earliest.and_time(NaiveTime::MIN).and_utc();
        let items = fetch_items(source, self.config.max_items, Some(created_after)).await?;
        let groups = group_by_created_day(&items);

        let mut writer = self.store.writer().await;
        let mut filled_dates = Vec::new();
        for date in &missing_dates {
            let Some(totals) = groups.get(date).filter(|t| t.impressions > 0) else {
                continue;
            };
            let existing = writer.daily(*date).await?;
            if existing.as_ref().is_some_and(|e| !e.is_backfill_candidate()) {
                continue;
            }
            writer.put_daily(&estimated_aggregate(*date, *totals, existing.as_ref()))?;
            filled_dates.push(*date);
        }
        writer.commit().await?;

        tracing::info!(
            missing = missing_dates.len(),
            filled = filled_dates.len(),
            items = items.len(),
            "snapshots: backfill complete"
        );

        Ok(Outcome::Completed(BackfillReport {
            missing_dates,
            filled_dates,
            items_fetched: items.len(),
        }))
    }
}
