//! Query-ready views over the snapshot store.
//!
//! Every view is well-formed on an empty store: days without data are
//! zero-filled and flagged `has_data: false` rather than reported as errors.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use chrono::{Days, Months, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use xcellent_core::{
    CumulativeSample, CumulativeTotals, DailyAggregate, ItemMetricHistory, Metric,
};
use xcellent_source::fetch_items;

use crate::error::EngineError;
use crate::service::SnapshotService;
use crate::streak::{compute_streak, Streak, CALENDAR_WINDOW_MONTHS};

/// Reporting period accepted by the daily series and breakdown views.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    #[default]
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
}

impl Period {
    #[must_use]
    pub fn days(self) -> u32 {
        match self {
            Self::Week => 7,
            Self::Month => 30,
            Self::Quarter => 90,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Week => "7d",
            Self::Month => "30d",
            Self::Quarter => "90d",
        }
    }

    /// Oldest day of the period ending on `today`, inclusive.
    #[must_use]
    pub fn first_day(self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_days(Days::new(u64::from(self.days() - 1)))
            .unwrap_or(NaiveDate::MIN)
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "7d" => Ok(Self::Week),
            "30d" => Ok(Self::Month),
            "90d" => Ok(Self::Quarter),
            other => Err(EngineError::InvalidPeriod(other.to_owned())),
        }
    }
}

/// One day of the daily series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub delta: CumulativeTotals,
    pub followers: Option<u64>,
    pub new_followers: Option<i64>,
    pub has_data: bool,
    pub estimated: bool,
}

impl DailyPoint {
    fn from_aggregate(date: NaiveDate, aggregate: Option<&DailyAggregate>) -> Self {
        match aggregate {
            Some(agg) => Self {
                date,
                delta: agg.delta,
                followers: agg.followers,
                new_followers: agg.new_followers,
                has_data: agg.has_data(),
                estimated: agg.estimated,
            },
            None => Self {
                date,
                delta: CumulativeTotals::default(),
                followers: None,
                new_followers: None,
                has_data: false,
                estimated: false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySeries {
    pub period: Period,
    /// Oldest first, one entry per day of the period.
    pub days: Vec<DailyPoint>,
    pub days_with_data: usize,
    /// `days_with_data / days.len()`, in `0.0..=1.0`.
    pub completeness: f64,
    pub has_data: bool,
    /// Latest cumulative reading, for when the daily chart is too sparse.
    pub cumulative_totals: Option<CumulativeTotals>,
}

/// Lay `aggregates` over every day of `period`, zero-filling the gaps.
#[must_use]
pub fn build_daily_series(
    aggregates: &BTreeMap<NaiveDate, DailyAggregate>,
    period: Period,
    today: NaiveDate,
    latest: Option<&CumulativeSample>,
) -> DailySeries {
    let days: Vec<DailyPoint> = period
        .first_day(today)
        .iter_days()
        .take_while(|d| *d <= today)
        .map(|d| DailyPoint::from_aggregate(d, aggregates.get(&d)))
        .collect();

    let days_with_data = days.iter().filter(|d| d.has_data).count();
    #[allow(clippy::cast_precision_loss)]
    let completeness = if days.is_empty() {
        0.0
    } else {
        days_with_data as f64 / days.len() as f64
    };

    DailySeries {
        period,
        days,
        days_with_data,
        completeness,
        has_data: days_with_data > 0,
        cumulative_totals: latest.map(|s| s.totals),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricBreakdown {
    /// Sum over the whole period.
    pub total: u64,
    /// Second half against first half, rounded. `None` when the first half
    /// is zero.
    pub change_pct: Option<i64>,
    /// Share of total engagement, rounded. `None` for impressions.
    pub share_pct: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngagementBreakdown {
    pub period: Period,
    pub total_engagement: u64,
    pub metrics: BTreeMap<Metric, MetricBreakdown>,
}

fn sum_days(days: &[DailyPoint]) -> CumulativeTotals {
    days.iter().fold(CumulativeTotals::default(), |mut acc, d| {
        acc.accumulate(&d.delta);
        acc
    })
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn change_pct(previous: u64, current: u64) -> Option<i64> {
    if previous == 0 {
        return None;
    }
    let change = (current as f64 - previous as f64) / previous as f64 * 100.0;
    Some(change.round() as i64)
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn share_pct(part: u64, whole: u64) -> u64 {
    if whole == 0 {
        return 0;
    }
    (part as f64 / whole as f64 * 100.0).round() as u64
}

/// Split the days into halves and compare them per metric.
///
/// The first half is `floor(n / 2)` days; on odd lengths the middle day
/// belongs to the second half.
#[must_use]
pub fn build_breakdown(days: &[DailyPoint], period: Period) -> EngagementBreakdown {
    let (first, second) = days.split_at(days.len() / 2);
    let (first, second) = (sum_days(first), sum_days(second));
    let mut total = first;
    total.accumulate(&second);
    let total_engagement = total.engagement();

    let metrics = Metric::ALL
        .iter()
        .map(|&metric| {
            let share = (metric != Metric::Impressions)
                .then(|| share_pct(total.get(metric), total_engagement));
            (
                metric,
                MetricBreakdown {
                    total: total.get(metric),
                    change_pct: change_pct(first.get(metric), second.get(metric)),
                    share_pct: share,
                },
            )
        })
        .collect();

    EngagementBreakdown {
        period,
        total_engagement,
        metrics,
    }
}

impl SnapshotService {
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] on store failure.
    pub async fn daily_series(&self, period: Period) -> Result<DailySeries, EngineError> {
        self.daily_series_at(period, Utc::now().date_naive()).await
    }

    /// Daily series for the `period` ending on `today`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] on store failure.
    pub async fn daily_series_at(
        &self,
        period: Period,
        today: NaiveDate,
    ) -> Result<DailySeries, EngineError> {
        let aggregates = self
            .store
            .daily_range(period.first_day(today), today)
            .await?;
        let latest = self.store.latest_sample().await?;
        Ok(build_daily_series(&aggregates, period, today, latest.as_ref()))
    }

    /// # Errors
    ///
    /// Returns [`EngineError::Store`] on store failure.
    pub async fn engagement_breakdown(
        &self,
        period: Period,
    ) -> Result<EngagementBreakdown, EngineError> {
        self.engagement_breakdown_at(period, Utc::now().date_naive())
            .await
    }

    /// # Errors
    ///
    /// Returns [`EngineError::Store`] on store failure.
    pub async fn engagement_breakdown_at(
        &self,
        period: Period,
        today: NaiveDate,
    ) -> Result<EngagementBreakdown, EngineError> {
        let series = self.daily_series_at(period, today).await?;
        Ok(build_breakdown(&series.days, period))
    }

    /// # Errors
    ///
    /// Returns [`EngineError::Store`] on store failure.
    pub async fn streak(&self) -> Result<Streak, EngineError> {
        self.streak_at(Utc::now().date_naive()).await
    }

    /// Posting streak from cached item creation dates merged with a fresh
    /// fetch when a source is configured.
    ///
    /// Items are merged by id, so an item seen in both places counts once.
    /// A failed fetch degrades to the cache alone.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] when the cache cannot be read.
    pub async fn streak_at(&self, today: NaiveDate) -> Result<Streak, EngineError> {
        let mut created: HashMap<String, NaiveDate> = self
            .store
            .item_histories()
            .await?
            .into_iter()
            .filter_map(|h| h.created_at.map(|ts| (h.id, ts.date_naive())))
            .collect();

        if let Some(source) = self.source.as_deref() {
            let window_start = today
                .checked_sub_months(Months::new(CALENDAR_WINDOW_MONTHS))
                .unwrap_or(NaiveDate::MIN)
                .and_time(NaiveTime::MIN)
                .and_utc();
            match fetch_items(source, self.config.max_items, Some(window_start)).await {
                Ok(items) => {
                    for item in items {
                        created.insert(item.id, item.created_at.date_naive());
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "snapshots: streak fetch failed, using cached items");
                }
            }
        }

        Ok(compute_streak(created.into_values(), today))
    }

    /// # Errors
    ///
    /// Returns [`EngineError::Store`] on store failure.
    pub async fn item_history(&self, id: &str) -> Result<Option<ItemMetricHistory>, EngineError> {
        Ok(self.store.item_history(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn aggregate(d: u32, impressions: u64, likes: u64) -> DailyAggregate {
        let mut agg = DailyAggregate::empty(day(d));
        agg.delta.impressions = impressions;
        agg.delta.likes = likes;
        agg
    }

    #[test]
    fn period_parses_known_values_only() {
        assert_eq!("30d".parse::<Period>().unwrap(), Period::Month);
        assert_eq!(" 90d ".parse::<Period>().unwrap(), Period::Quarter);
        assert!(matches!(
            "14d".parse::<Period>(),
            Err(EngineError::InvalidPeriod(p)) if p == "14d"
        ));
        assert_eq!(Period::default().days(), 7);
    }

    #[test]
    fn series_zero_fills_missing_days() {
        let mut aggregates = BTreeMap::new();
        aggregates.insert(day(5), aggregate(5, 100, 2));

        let series = build_daily_series(&aggregates, Period::Week, day(7), None);
        assert_eq!(series.days.len(), 7);
        assert_eq!(series.days[0].date, day(1));
        assert_eq!(series.days[6].date, day(7));
        assert!(!series.days[0].has_data);
        assert!(series.days[4].has_data);
        assert_eq!(series.days_with_data, 1);
        assert!((series.completeness - 1.0 / 7.0).abs() < f64::EPSILON);
        assert!(series.has_data);
        assert!(series.cumulative_totals.is_none());
    }

    #[test]
    fn series_on_empty_store_is_well_formed() {
        let latest = CumulativeSample {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 7, 9, 0, 0).unwrap(),
            totals: CumulativeTotals {
                impressions: 900,
                ..CumulativeTotals::default()
            },
            followers: Some(10),
            items_polled: 4,
        };
        let series = build_daily_series(&BTreeMap::new(), Period::Month, day(30), Some(&latest));
        assert_eq!(series.days.len(), 30);
        assert_eq!(series.days_with_data, 0);
        assert!(!series.has_data);
        assert_eq!(series.cumulative_totals.map(|t| t.impressions), Some(900));
    }

    #[test]
    fn estimated_zero_day_counts_as_data() {
        let mut estimate = DailyAggregate::empty(day(7));
        estimate.estimated = true;
        let aggregates = BTreeMap::from([(day(7), estimate)]);

        let series = build_daily_series(&aggregates, Period::Week, day(7), None);
        assert!(series.days[6].has_data);
        assert!(series.days[6].estimated);
    }

    #[test]
    fn breakdown_compares_halves() {
        let aggregates = BTreeMap::from([
            (day(1), aggregate(1, 100, 10)),
            (day(2), aggregate(2, 100, 0)),
            (day(5), aggregate(5, 300, 15)),
        ]);
        let series = build_daily_series(&aggregates, Period::Week, day(7), None);
        let breakdown = build_breakdown(&series.days, Period::Week);

        let impressions = breakdown.metrics[&Metric::Impressions];
        assert_eq!(impressions.total, 500);
        assert_eq!(impressions.change_pct, Some(50));
        assert_eq!(impressions.share_pct, None);

        let likes = breakdown.metrics[&Metric::Likes];
        assert_eq!(likes.total, 25);
        assert_eq!(likes.change_pct, Some(50));
        assert_eq!(likes.share_pct, Some(100));

        let reposts = breakdown.metrics[&Metric::Reposts];
        assert_eq!(reposts.change_pct, None);
        assert_eq!(reposts.share_pct, Some(0));
        assert_eq!(breakdown.total_engagement, 25);
    }

    #[test]
    fn breakdown_serializes_metric_keys() {
        let breakdown = build_breakdown(&[], Period::Week);
        let json = serde_json::to_value(&breakdown).unwrap();
        assert_eq!(json["period"], "7d");
        assert_eq!(json["metrics"]["likes"]["total"], 0);
        assert!(json["metrics"]["likes"]["change_pct"].is_null());
    }
}
