//! Persisted snapshot records.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::{CumulativeTotals, SourceItem};

/// Cumulative samples kept per calendar day; older ones are evicted first.
pub const SAMPLES_PER_DAY_CAP: usize = 10;

/// Samples kept per item history; older ones are trimmed first.
pub const ITEM_HISTORY_CAP: usize = 200;

/// Minimum spacing between two samples of the same item.
pub const ITEM_SAMPLE_MIN_SPACING_SECS: i64 = 30 * 60;

/// One poll's raw reading: cumulative-to-date totals across all polled items.
///
/// Immutable once written. Samples are only appended and pruned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CumulativeSample {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub totals: CumulativeTotals,
    pub followers: Option<u64>,
    pub items_polled: usize,
}

/// The derived record for one calendar day.
///
/// Delta fields are never negative. `new_followers` of `None` means unknown,
/// which is different from zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub delta: CumulativeTotals,
    pub followers: Option<u64>,
    pub new_followers: Option<i64>,
    /// Set when the record was reconstructed by backfill rather than polled.
    #[serde(default)]
    pub estimated: bool,
}

impl DailyAggregate {
    /// An aggregate with zero deltas and no follower data.
    #[must_use]
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            delta: CumulativeTotals::default(),
            followers: None,
            new_followers: None,
            estimated: false,
        }
    }

    /// Whether backfill may replace this record.
    ///
    /// Only polled records that never observed any impressions qualify; an
    /// estimate is never re-estimated.
    #[must_use]
    pub fn is_backfill_candidate(&self) -> bool {
        self.delta.impressions == 0 && !self.estimated
    }

    /// Whether the day carries usable numbers for a chart.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.delta.impressions > 0 || self.estimated
    }
}

/// One timestamped reading of a single item's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSample {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub totals: CumulativeTotals,
}

/// Rolling per-item sample list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetricHistory {
    pub id: String,
    pub text: String,
    /// Creation time of the item, kept so the posting calendar can be rebuilt
    /// without asking the metrics source.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub samples: Vec<ItemSample>,
}

impl ItemMetricHistory {
    #[must_use]
    pub fn new(item: &SourceItem) -> Self {
        Self {
            id: item.id.clone(),
            text: item.text.clone(),
            created_at: Some(item.created_at),
            samples: Vec::new(),
        }
    }

    /// Timestamp of the newest sample, if any.
    #[must_use]
    pub fn last_sampled_at(&self) -> Option<DateTime<Utc>> {
        self.samples.last().map(|s| s.timestamp)
    }

    /// Append `sample` unless the previous sample is closer than `min_spacing`.
    ///
    /// The list is trimmed from the front to `cap` entries. Returns `true`
    /// when the sample was appended.
    pub fn record(&mut self, sample: ItemSample, min_spacing: Duration, cap: usize) -> bool {
        if let Some(last) = self.last_sampled_at() {
            if sample.timestamp - last < min_spacing {
                return false;
            }
        }

        self.samples.push(sample);
        if self.samples.len() > cap {
            let excess = self.samples.len() - cap;
            self.samples.drain(..excess);
        }
        true
    }

    /// Refresh display fields from a fresh reading of the same item.
    pub fn refresh(&mut self, item: &SourceItem) {
        self.text.clone_from(&item.text);
        self.created_at = Some(item.created_at);
    }
}
