//! Scheduled poll: read current counters, store a sample, derive today's
//! aggregate, sample each item and sweep retention.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use xcellent_core::{
    CumulativeSample, CumulativeTotals, DailyAggregate, ItemMetricHistory, ItemSample, SourceItem,
};
use xcellent_db::{DbError, PruneReport, SnapshotWriter};
use xcellent_source::fetch_items;

use crate::error::EngineError;
use crate::reconcile::reconcile;
use crate::service::{Outcome, SnapshotService};

/// What a completed poll observed and wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollReport {
    pub date: NaiveDate,
    pub timestamp: DateTime<Utc>,
    pub items_polled: usize,
    pub totals: CumulativeTotals,
    pub followers: Option<u64>,
    pub aggregate: DailyAggregate,
    /// Item histories that received a new sample.
    pub items_sampled: usize,
    /// `None` when the retention sweep failed; it is retried next poll.
    pub pruned: Option<PruneReport>,
}

impl SnapshotService {
    /// Poll now.
    ///
    /// # Errors
    ///
    /// See [`SnapshotService::poll_at`].
    pub async fn poll(&self) -> Result<Outcome<PollReport>, EngineError> {
        self.poll_at(Utc::now()).await
    }

    /// Poll as of `now`.
    ///
    /// Skips without I/O when no source is configured or another poll or
    /// backfill is running. Every fetch completes before anything is written,
    /// so a failed fetch leaves the store untouched. The sample, aggregate,
    /// item histories and retention deletions are committed in one batch.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Upstream`] when a fetch fails and
    /// [`EngineError::Store`] when writing the sample, aggregate or item
    /// histories fails. Retention failures are logged, not returned.
    pub async fn poll_at(&self, now: DateTime<Utc>) -> Result<Outcome<PollReport>, EngineError> {
        let (source, _running) = match self.begin() {
            Ok(started) => started,
            Err(reason) => {
                tracing::debug!(%reason, "snapshots: poll skipped");
                return Ok(Outcome::Skipped { reason });
            }
        };

        let counters = source.account_counters().await?;
        let items = fetch_items(source, self.config.max_items, None).await?;

        let today = now.date_naive();
        let totals = CumulativeTotals::sum_items(&items);
        let sample = CumulativeSample {
            timestamp: now,
            totals,
            followers: counters.follower_count,
            items_polled: items.len(),
        };

        let mut writer = self.store.writer().await;
        writer
            .append_sample(today, sample, self.config.samples_per_day)
            .await?;
        let aggregate = reconcile(&mut writer, today)
            .await?
            .unwrap_or_else(|| DailyAggregate::empty(today));
        let items_sampled = self.record_item_samples(&mut writer, &items, now).await?;
        let pruned = self.sweep_retention(&mut writer, today).await;
        writer.commit().await?;

        tracing::info!(
            date = %today,
            items = items.len(),
            impressions = totals.impressions,
            delta_impressions = aggregate.delta.impressions,
            items_sampled,
            "snapshots: poll complete"
        );

        Ok(Outcome::Completed(PollReport {
            date: today,
            timestamp: now,
            items_polled: items.len(),
            totals,
            followers: counters.follower_count,
            aggregate,
            items_sampled,
            pruned,
        }))
    }

    async fn record_item_samples(
        &self,
        writer: &mut SnapshotWriter<'_>,
        items: &[SourceItem],
        now: DateTime<Utc>,
    ) -> Result<usize, DbError> {
        let spacing = self.config.item_sample_spacing();
        let mut sampled = 0;

        for item in items {
            let stored = writer.item_history(&item.id).await?;
            let mut history = stored
                .clone()
                .unwrap_or_else(|| ItemMetricHistory::new(item));
            history.refresh(item);

            let sample = ItemSample {
                timestamp: now,
                totals: item.totals,
            };
            if history.record(sample, spacing, self.config.item_history_cap) {
                sampled += 1;
            }
            if stored.as_ref() != Some(&history) {
                writer.put_item_history(&history)?;
            }
        }

        Ok(sampled)
    }

    /// Run the retention sweep on its own, outside a poll.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] on store failure.
    pub async fn prune_expired_at(&self, today: NaiveDate) -> Result<PruneReport, EngineError> {
        let Some(cutoff) = retention_cutoff(today, self.config.retention_days) else {
            return Ok(PruneReport::default());
        };
        let mut writer = self.store.writer().await;
        let report = writer.prune_before(cutoff).await?;
        writer.commit().await?;
        Ok(report)
    }

    /// Best-effort sweep inside a poll; deletions commit with the poll's
    /// other changes and a failed sweep is retried next poll.
    async fn sweep_retention(
        &self,
        writer: &mut SnapshotWriter<'_>,
        today: NaiveDate,
    ) -> Option<PruneReport> {
        let cutoff = retention_cutoff(today, self.config.retention_days)?;
        match writer.prune_before(cutoff).await {
            Ok(report) => {
                if report.total() > 0 {
                    tracing::info!(
                        %cutoff,
                        cumulative_days = report.cumulative_days,
                        daily_aggregates = report.daily_aggregates,
                        item_histories = report.item_histories,
                        "snapshots: pruned expired entries"
                    );
                }
                Some(report)
            }
            Err(e) => {
                tracing::warn!(%cutoff, error = %e, "snapshots: retention sweep failed");
                None
            }
        }
    }
}

/// Oldest date kept: everything strictly before it is deleted.
#[must_use]
pub fn retention_cutoff(today: NaiveDate, retention_days: u32) -> Option<NaiveDate> {
    today.checked_sub_days(Days::new(u64::from(retention_days)))
}
