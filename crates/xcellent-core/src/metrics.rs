use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the per-item engagement counters tracked by the snapshot engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Impressions,
    Likes,
    Reposts,
    Replies,
    Bookmarks,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Impressions,
        Metric::Likes,
        Metric::Reposts,
        Metric::Replies,
        Metric::Bookmarks,
    ];

    /// The counters that make up "engagement" (everything except impressions).
    pub const ENGAGEMENT: [Metric; 4] = [
        Metric::Likes,
        Metric::Reposts,
        Metric::Replies,
        Metric::Bookmarks,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Impressions => "impressions",
            Metric::Likes => "likes",
            Metric::Reposts => "reposts",
            Metric::Replies => "replies",
            Metric::Bookmarks => "bookmarks",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of the five engagement counters.
///
/// Used both for cumulative readings (totals-to-date) and for derived daily
/// deltas; the meaning depends on the record that carries it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CumulativeTotals {
    #[serde(default)]
    pub impressions: u64,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub reposts: u64,
    #[serde(default)]
    pub replies: u64,
    #[serde(default)]
    pub bookmarks: u64,
}

impl CumulativeTotals {
    #[must_use]
    pub fn get(&self, metric: Metric) -> u64 {
        match metric {
            Metric::Impressions => self.impressions,
            Metric::Likes => self.likes,
            Metric::Reposts => self.reposts,
            Metric::Replies => self.replies,
            Metric::Bookmarks => self.bookmarks,
        }
    }

    pub fn set(&mut self, metric: Metric, value: u64) {
        match metric {
            Metric::Impressions => self.impressions = value,
            Metric::Likes => self.likes = value,
            Metric::Reposts => self.reposts = value,
            Metric::Replies => self.replies = value,
            Metric::Bookmarks => self.bookmarks = value,
        }
    }

    /// Adds `other` into `self`, saturating at `u64::MAX`.
    pub fn accumulate(&mut self, other: &CumulativeTotals) {
        for metric in Metric::ALL {
            self.set(metric, self.get(metric).saturating_add(other.get(metric)));
        }
    }

    /// Sum of the counters of every item.
    #[must_use]
    pub fn sum_items<'a>(items: impl IntoIterator<Item = &'a SourceItem>) -> Self {
        items
            .into_iter()
            .fold(CumulativeTotals::default(), |mut acc, item| {
                acc.accumulate(&item.totals);
                acc
            })
    }

    /// Likes + reposts + replies + bookmarks.
    #[must_use]
    pub fn engagement(&self) -> u64 {
        Metric::ENGAGEMENT
            .iter()
            .fold(0u64, |acc, m| acc.saturating_add(self.get(*m)))
    }
}

/// Account-level gauges returned by the metrics source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCounters {
    pub follower_count: Option<u64>,
}

/// A post as reported by the metrics source: immutable identity and creation
/// time plus its *current* cumulative counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceItem {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub totals: CumulativeTotals,
}
