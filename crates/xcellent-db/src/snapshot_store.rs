//! Typed snapshot store over a [`DocumentStore`].
//!
//! Layout:
//!
//! | Key                  | Document                    |
//! |----------------------|-----------------------------|
//! | `cumulative/<date>`  | `Vec<CumulativeSample>`     |
//! | `daily/<date>`       | `DailyAggregate`            |
//! | `item/<id>`          | `ItemMetricHistory`         |
//!
//! Reads go straight to the backend. Mutations require a [`SnapshotWriter`],
//! which holds the store-wide write lock for as long as it lives, so every
//! read-modify-write is serialized within the process. A writer's changes
//! land in the backend together, in one batch.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use xcellent_core::{
    date_key, parse_date_key, CumulativeSample, DailyAggregate, ItemMetricHistory,
};

use crate::{DbError, DocumentOp, DocumentStore};

const CUMULATIVE_PREFIX: &str = "cumulative/";
const DAILY_PREFIX: &str = "daily/";
const ITEM_PREFIX: &str = "item/";

/// Counts of documents removed by a retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub cumulative_days: usize,
    pub daily_aggregates: usize,
    pub item_histories: usize,
}

impl PruneReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.cumulative_days + self.daily_aggregates + self.item_histories
    }
}

#[derive(Clone)]
pub struct SnapshotStore {
    documents: Arc<dyn DocumentStore>,
    write_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore").finish_non_exhaustive()
    }
}

impl SnapshotStore {
    #[must_use]
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            documents,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// A store over a fresh in-memory backend.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(crate::MemoryDocumentStore::new()))
    }

    /// Wait for exclusive write access.
    pub async fn writer(&self) -> SnapshotWriter<'_> {
        SnapshotWriter {
            store: self,
            staged: BTreeMap::new(),
            _guard: self.write_lock.lock().await,
        }
    }

    /// # Errors
    ///
    /// Returns [`DbError`] if the backend is unreachable.
    pub async fn ping(&self) -> Result<(), DbError> {
        self.documents.ping().await
    }

    /// Samples recorded for `date`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on backend or decoding failure.
    pub async fn samples_for(&self, date: NaiveDate) -> Result<Vec<CumulativeSample>, DbError> {
        Ok(self
            .read(&cumulative_key(date))
            .await?
            .unwrap_or_default())
    }

    /// Every date that has a sample document, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on backend failure.
    pub async fn sample_dates(&self) -> Result<Vec<NaiveDate>, DbError> {
        self.dates_under(CUMULATIVE_PREFIX).await
    }

    /// The last sample of the latest date strictly before `date` that has
    /// any samples.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on backend or decoding failure.
    pub async fn last_sample_before(
        &self,
        date: NaiveDate,
    ) -> Result<Option<CumulativeSample>, DbError> {
        let dates = self.sample_dates().await?;
        for day in dates.into_iter().rev().filter(|d| *d < date) {
            if let Some(last) = self.samples_for(day).await?.pop() {
                return Ok(Some(last));
            }
        }
        Ok(None)
    }

    /// The most recent sample on record.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on backend or decoding failure.
    pub async fn latest_sample(&self) -> Result<Option<CumulativeSample>, DbError> {
        let dates = self.sample_dates().await?;
        for day in dates.into_iter().rev() {
            if let Some(last) = self.samples_for(day).await?.pop() {
                return Ok(Some(last));
            }
        }
        Ok(None)
    }

    /// # Errors
    ///
    /// Returns [`DbError`] on backend or decoding failure.
    pub async fn daily(&self, date: NaiveDate) -> Result<Option<DailyAggregate>, DbError> {
        self.read(&daily_key(date)).await
    }

    /// Aggregates dated within `from..=to`, keyed by date.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on backend or decoding failure.
    pub async fn daily_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, DailyAggregate>, DbError> {
        let mut out = BTreeMap::new();
        for date in self.dates_under(DAILY_PREFIX).await? {
            if date < from || date > to {
                continue;
            }
            if let Some(agg) = self.daily(date).await? {
                out.insert(date, agg);
            }
        }
        Ok(out)
    }

    /// # Errors
    ///
    /// Returns [`DbError`] on backend or decoding failure.
    pub async fn item_history(&self, id: &str) -> Result<Option<ItemMetricHistory>, DbError> {
        self.read(&item_key(id)).await
    }

    /// Every stored item history.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on backend or decoding failure.
    pub async fn item_histories(&self) -> Result<Vec<ItemMetricHistory>, DbError> {
        let keys = self.documents.list_keys_by_prefix(ITEM_PREFIX).await?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(history) = self.read(&key).await? {
                out.push(history);
            }
        }
        Ok(out)
    }

    async fn dates_under(&self, prefix: &str) -> Result<Vec<NaiveDate>, DbError> {
        let mut dates: Vec<NaiveDate> = self
            .documents
            .list_keys_by_prefix(prefix)
            .await?
            .iter()
            .filter_map(|k| k.strip_prefix(prefix).and_then(parse_date_key))
            .collect();
        dates.sort_unstable();
        Ok(dates)
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DbError> {
        match self.documents.get(key).await? {
            Some(value) => decode(key, value).map(Some),
            None => Ok(None),
        }
    }
}

/// Exclusive mutation handle.
///
/// Changes are staged in memory and reach the backend in one
/// [`DocumentStore::apply`] call on [`SnapshotWriter::commit`]. Reads made
/// through the writer see its staged changes; readers of the store do not
/// until the commit. Dropping an uncommitted writer discards its changes and
/// releases the write lock.
pub struct SnapshotWriter<'a> {
    store: &'a SnapshotStore,
    staged: BTreeMap<String, DocumentOp>,
    _guard: MutexGuard<'a, ()>,
}

impl SnapshotWriter<'_> {
    /// Number of documents the next commit will write or delete.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.staged.len()
    }

    /// Today's samples as this writer sees them, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on backend or decoding failure.
    pub async fn samples_for(&self, date: NaiveDate) -> Result<Vec<CumulativeSample>, DbError> {
        Ok(self
            .read(&cumulative_key(date))
            .await?
            .unwrap_or_default())
    }

    /// See [`SnapshotStore::last_sample_before`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on backend or decoding failure.
    pub async fn last_sample_before(
        &self,
        date: NaiveDate,
    ) -> Result<Option<CumulativeSample>, DbError> {
        let dates = self.dates_under(CUMULATIVE_PREFIX).await?;
        for day in dates.into_iter().rev().filter(|d| *d < date) {
            if let Some(last) = self.samples_for(day).await?.pop() {
                return Ok(Some(last));
            }
        }
        Ok(None)
    }

    /// # Errors
    ///
    /// Returns [`DbError`] on backend or decoding failure.
    pub async fn daily(&self, date: NaiveDate) -> Result<Option<DailyAggregate>, DbError> {
        self.read(&daily_key(date)).await
    }

    /// # Errors
    ///
    /// Returns [`DbError`] on backend or decoding failure.
    pub async fn item_history(&self, id: &str) -> Result<Option<ItemMetricHistory>, DbError> {
        self.read(&item_key(id)).await
    }

    /// Append a sample to its day, evicting the oldest beyond `cap`.
    ///
    /// Returns the day's samples after the append, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on backend, decoding or encoding failure.
    pub async fn append_sample(
        &mut self,
        date: NaiveDate,
        sample: CumulativeSample,
        cap: usize,
    ) -> Result<Vec<CumulativeSample>, DbError> {
        let mut samples = self.samples_for(date).await?;
        samples.push(sample);
        if samples.len() > cap {
            let excess = samples.len() - cap;
            samples.drain(..excess);
        }
        self.stage_put(cumulative_key(date), &samples)?;
        Ok(samples)
    }

    /// Overwrite the aggregate for its date.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serde`] if the aggregate cannot be encoded.
    pub fn put_daily(&mut self, aggregate: &DailyAggregate) -> Result<(), DbError> {
        self.stage_put(daily_key(aggregate.date), aggregate)
    }

    /// # Errors
    ///
    /// Returns [`DbError::Serde`] if the history cannot be encoded.
    pub fn put_item_history(&mut self, history: &ItemMetricHistory) -> Result<(), DbError> {
        self.stage_put(item_key(&history.id), history)
    }

    /// Stage deletion of samples and aggregates dated before `cutoff`, and of
    /// item histories whose newest sample predates it.
    ///
    /// Nothing is staged unless every read succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on backend or decoding failure.
    pub async fn prune_before(&mut self, cutoff: NaiveDate) -> Result<PruneReport, DbError> {
        let mut report = PruneReport::default();
        let mut doomed = Vec::new();

        for date in self.dates_under(CUMULATIVE_PREFIX).await? {
            if date < cutoff {
                doomed.push(cumulative_key(date));
                report.cumulative_days += 1;
            }
        }

        for date in self.dates_under(DAILY_PREFIX).await? {
            if date < cutoff {
                doomed.push(daily_key(date));
                report.daily_aggregates += 1;
            }
        }

        for key in self.keys_under(ITEM_PREFIX).await? {
            let Some(history) = self.read::<ItemMetricHistory>(&key).await? else {
                continue;
            };
            let stale = history
                .last_sampled_at()
                .is_some_and(|ts| ts.date_naive() < cutoff);
            if stale {
                doomed.push(key);
                report.item_histories += 1;
            }
        }

        for key in doomed {
            self.staged.insert(key, DocumentOp::Delete);
        }
        Ok(report)
    }

    /// Write every staged change in one backend call.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the backend rejects the batch; none of it is
    /// applied in that case.
    pub async fn commit(self) -> Result<(), DbError> {
        if self.staged.is_empty() {
            return Ok(());
        }
        let batch = self.staged.into_iter().collect();
        self.store.documents.apply(batch).await
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DbError> {
        match self.staged.get(key) {
            Some(DocumentOp::Put(value)) => decode(key, value.clone()).map(Some),
            Some(DocumentOp::Delete) => Ok(None),
            None => self.store.read(key).await,
        }
    }

    /// Stored keys under `prefix` merged with staged ones, ascending.
    async fn keys_under(&self, prefix: &str) -> Result<Vec<String>, DbError> {
        let mut keys: BTreeSet<String> = self
            .store
            .documents
            .list_keys_by_prefix(prefix)
            .await?
            .into_iter()
            .collect();
        for (key, op) in self.staged.range(prefix.to_owned()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match op {
                DocumentOp::Put(_) => keys.insert(key.clone()),
                DocumentOp::Delete => keys.remove(key),
            };
        }
        Ok(keys.into_iter().collect())
    }

    async fn dates_under(&self, prefix: &str) -> Result<Vec<NaiveDate>, DbError> {
        Ok(self
            .keys_under(prefix)
            .await?
            .iter()
            .filter_map(|k| k.strip_prefix(prefix).and_then(parse_date_key))
            .collect())
    }

    fn stage_put<T: Serialize + ?Sized>(&mut self, key: String, value: &T) -> Result<(), DbError> {
        let value = serde_json::to_value(value).map_err(|source| DbError::Serde {
            key: key.clone(),
            source,
        })?;
        self.staged.insert(key, DocumentOp::Put(value));
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: serde_json::Value) -> Result<T, DbError> {
    serde_json::from_value(value).map_err(|source| DbError::Serde {
        key: key.to_owned(),
        source,
    })
}

fn cumulative_key(date: NaiveDate) -> String {
    format!("{CUMULATIVE_PREFIX}{}", date_key(date))
}

fn daily_key(date: NaiveDate) -> String {
    format!("{DAILY_PREFIX}{}", date_key(date))
}

fn item_key(id: &str) -> String {
    format!("{ITEM_PREFIX}{id}")
}
