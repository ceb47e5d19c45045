//! End-to-end engine behaviour against the in-memory store and a scripted
//! metrics source.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use xcellent_core::{AccountCounters, CumulativeTotals, DailyAggregate, SourceItem};
use xcellent_db::{FileDocumentStore, SnapshotStore};
use xcellent_engine::{EngineConfig, EngineError, Period, SkipReason, SnapshotService};
use xcellent_source::{ItemPage, ListItemsRequest, MetricsSource, SourceError};

/// Serves whatever items and follower count the test last set.
#[derive(Default)]
struct ScriptedSource {
    followers: Mutex<Option<u64>>,
    items: Mutex<Vec<SourceItem>>,
    failing: AtomicBool,
    /// Held by a test to park `account_counters` mid-poll.
    gate: tokio::sync::Mutex<()>,
    requests: Mutex<Vec<ListItemsRequest>>,
}

impl ScriptedSource {
    fn set_items(&self, items: Vec<SourceItem>) {
        *self.items.lock().unwrap() = items;
    }

    fn set_followers(&self, followers: u64) {
        *self.followers.lock().unwrap() = Some(followers);
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn fail_if_scripted(&self) -> Result<(), SourceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Status {
                status: 503,
                message: "Service Unavailable".to_owned(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MetricsSource for ScriptedSource {
    async fn account_counters(&self) -> Result<AccountCounters, SourceError> {
        let _gate = self.gate.lock().await;
        self.fail_if_scripted()?;
        Ok(AccountCounters {
            follower_count: *self.followers.lock().unwrap(),
        })
    }

    async fn list_items(&self, request: &ListItemsRequest) -> Result<ItemPage, SourceError> {
        self.requests.lock().unwrap().push(request.clone());
        self.fail_if_scripted()?;
        let items = self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|i| request.created_after.is_none_or(|after| i.created_at >= after))
            .take(request.max_results)
            .cloned()
            .collect();
        Ok(ItemPage {
            items,
            next_page_token: None,
        })
    }
}

fn harness() -> (SnapshotService, SnapshotStore, Arc<ScriptedSource>) {
    let store = SnapshotStore::in_memory();
    let source = Arc::new(ScriptedSource::default());
    let service = SnapshotService::new(
        store.clone(),
        Some(source.clone() as Arc<dyn MetricsSource>),
        EngineConfig::default(),
    );
    (service, store, source)
}

fn day(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, m, d).unwrap()
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 6, 0, 0).unwrap()
}

fn item(id: &str, created_at: DateTime<Utc>, impressions: u64) -> SourceItem {
    SourceItem {
        id: id.to_owned(),
        text: format!("post {id}"),
        created_at,
        totals: CumulativeTotals {
            impressions,
            likes: impressions / 100,
            ..CumulativeTotals::default()
        },
    }
}

#[tokio::test]
async fn successive_polls_difference_against_the_right_baseline() {
    let (service, store, source) = harness();
    let created = t0() - Duration::days(3);

    source.set_items(vec![item("1", created, 1000)]);
    let first = service.poll_at(t0()).await.unwrap().completed().unwrap();
    assert_eq!(first.aggregate.delta.impressions, 0);
    assert_eq!(first.totals.impressions, 1000);

    source.set_items(vec![item("1", created, 1250)]);
    let second = service
        .poll_at(t0() + Duration::hours(4))
        .await
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(second.aggregate.delta.impressions, 250);

    source.set_items(vec![item("1", created, 1400)]);
    let third = service
        .poll_at(t0() + Duration::hours(28))
        .await
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(third.date, day(5, 11));
    assert_eq!(third.aggregate.delta.impressions, 150);

    assert_eq!(
        store.daily(day(5, 10)).await.unwrap().unwrap().delta.impressions,
        250
    );
    assert_eq!(store.samples_for(day(5, 10)).await.unwrap().len(), 2);
}

#[tokio::test]
async fn decreasing_counters_never_produce_negative_deltas() {
    let (service, store, source) = harness();
    let created = t0() - Duration::days(1);

    for (hour, impressions) in [(0, 500), (2, 450), (4, 700), (6, 100)] {
        source.set_items(vec![item("1", created, impressions)]);
        service
            .poll_at(t0() + Duration::hours(hour))
            .await
            .unwrap();
    }

    let aggregate = store.daily(day(5, 10)).await.unwrap().unwrap();
    assert_eq!(aggregate.delta.impressions, 0);
    assert_eq!(aggregate.delta.likes, 0);
}

#[tokio::test]
async fn empty_poll_is_recorded() {
    let (service, store, _source) = harness();
    let report = service.poll_at(t0()).await.unwrap().completed().unwrap();
    assert_eq!(report.items_polled, 0);
    assert_eq!(report.aggregate.delta, CumulativeTotals::default());
    assert_eq!(store.samples_for(day(5, 10)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_fetch_writes_nothing() {
    let (service, store, source) = harness();
    source.set_items(vec![item("1", t0(), 10)]);
    source.set_failing(true);

    let err = service.poll_at(t0()).await.unwrap_err();
    assert!(matches!(err, EngineError::Upstream(_)));
    assert!(store.sample_dates().await.unwrap().is_empty());
    assert!(store.daily(day(5, 10)).await.unwrap().is_none());
    assert!(store.item_histories().await.unwrap().is_empty());
}

#[tokio::test]
async fn follower_change_is_day_over_day() {
    let (service, _store, source) = harness();

    source.set_followers(500);
    service.poll_at(t0()).await.unwrap();

    source.set_followers(520);
    let report = service
        .poll_at(t0() + Duration::days(1))
        .await
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(report.aggregate.followers, Some(520));
    assert_eq!(report.aggregate.new_followers, Some(20));
}

#[tokio::test]
async fn item_samples_are_rate_limited() {
    let (service, store, source) = harness();
    source.set_items(vec![item("1", t0(), 10)]);

    service.poll_at(t0()).await.unwrap();
    source.set_items(vec![item("1", t0(), 20)]);
    let report = service
        .poll_at(t0() + Duration::minutes(5))
        .await
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(report.items_sampled, 0);

    source.set_items(vec![item("1", t0(), 30)]);
    service
        .poll_at(t0() + Duration::minutes(40))
        .await
        .unwrap();

    let history = store.item_history("1").await.unwrap().unwrap();
    let impressions: Vec<u64> = history.samples.iter().map(|s| s.totals.impressions).collect();
    assert_eq!(impressions, vec![10, 30]);
    assert_eq!(history.created_at, Some(t0()));
}

#[tokio::test]
async fn retention_sweep_removes_entries_past_the_horizon() {
    let (service, store, _source) = harness();
    let today = t0().date_naive();

    let mut writer = store.writer().await;
    let expired = today - Duration::days(366);
    let kept = today - Duration::days(365);
    writer.put_daily(&DailyAggregate::empty(expired)).unwrap();
    writer.put_daily(&DailyAggregate::empty(kept)).unwrap();
    writer.commit().await.unwrap();

    let report = service.poll_at(t0()).await.unwrap().completed().unwrap();
    assert_eq!(report.pruned.map(|p| p.daily_aggregates), Some(1));
    assert!(store.daily(expired).await.unwrap().is_none());
    assert!(store.daily(kept).await.unwrap().is_some());
}

#[tokio::test]
async fn backfill_fills_missing_days_without_clobbering_real_data() {
    let (service, store, source) = harness();
    let today = day(5, 10);

    let mut writer = store.writer().await;
    let mut real = DailyAggregate::empty(day(5, 8));
    real.delta.impressions = 42;
    writer.put_daily(&real).unwrap();

    let mut zero_with_followers = DailyAggregate::empty(day(5, 6));
    zero_with_followers.followers = Some(300);
    zero_with_followers.new_followers = Some(5);
    writer.put_daily(&zero_with_followers).unwrap();
    writer.commit().await.unwrap();

    let at = |d: u32, h: u32| Utc.with_ymd_and_hms(2024, 5, d, h, 0, 0).unwrap();
    source.set_items(vec![
        item("a", at(5, 1), 100),
        item("b", at(5, 23), 50),
        item("c", at(6, 12), 80),
        item("d", at(8, 12), 999),
        item("e", at(10, 1), 7),
    ]);

    let report = service
        .backfill_at(today, 7)
        .await
        .unwrap()
        .completed()
        .unwrap();

    assert_eq!(report.missing_dates.first(), Some(&day(5, 3)));
    assert!(!report.missing_dates.contains(&day(5, 8)));
    assert_eq!(report.filled_dates, vec![day(5, 5), day(5, 6)]);

    let requests = source.requests.lock().unwrap().clone();
    assert_eq!(
        requests[0].created_after,
        Some(Utc.with_ymd_and_hms(2024, 5, 3, 0, 0, 0).unwrap())
    );

    let fifth = store.daily(day(5, 5)).await.unwrap().unwrap();
    assert!(fifth.estimated);
    assert_eq!(fifth.delta.impressions, 150);
    assert_eq!(fifth.followers, None);

    let sixth = store.daily(day(5, 6)).await.unwrap().unwrap();
    assert_eq!(sixth.delta.impressions, 80);
    assert_eq!(sixth.followers, Some(300));
    assert_eq!(sixth.new_followers, Some(5));

    assert_eq!(store.daily(day(5, 8)).await.unwrap().unwrap(), real);
    assert!(store.daily(day(5, 4)).await.unwrap().is_none());
    assert!(store.daily(today).await.unwrap().is_none());

    let again = service
        .backfill_at(today, 7)
        .await
        .unwrap()
        .completed()
        .unwrap();
    assert!(again.filled_dates.is_empty());
    assert_eq!(store.daily(day(5, 5)).await.unwrap().unwrap(), fifth);
}

#[tokio::test]
async fn backfill_retries_days_whose_items_have_no_impressions_yet() {
    let (service, store, source) = harness();
    let today = day(5, 10);
    let created = Utc.with_ymd_and_hms(2024, 5, 8, 12, 0, 0).unwrap();

    let mut unseen = item("a", created, 0);
    unseen.totals.likes = 1;
    source.set_items(vec![unseen]);

    let first = service
        .backfill_at(today, 7)
        .await
        .unwrap()
        .completed()
        .unwrap();
    assert!(first.missing_dates.contains(&day(5, 8)));
    assert!(first.filled_dates.is_empty());
    assert!(store.daily(day(5, 8)).await.unwrap().is_none());

    source.set_items(vec![item("a", created, 500)]);
    let second = service
        .backfill_at(today, 7)
        .await
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(second.filled_dates, vec![day(5, 8)]);

    let eighth = store.daily(day(5, 8)).await.unwrap().unwrap();
    assert!(eighth.estimated);
    assert_eq!(eighth.delta.impressions, 500);
}

#[tokio::test]
async fn failed_backfill_writes_nothing() {
    let (service, store, source) = harness();
    source.set_items(vec![item("a", t0() - Duration::days(2), 100)]);
    source.set_failing(true);

    let err = service.backfill_at(day(5, 10), 7).await.unwrap_err();
    assert!(matches!(err, EngineError::Upstream(_)));
    assert!(store
        .daily_range(day(5, 1), day(5, 10))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn unconfigured_service_skips_everything_but_still_reads() {
    let store = SnapshotStore::in_memory();
    let service = SnapshotService::new(store, None, EngineConfig::default());

    let backfill = service.backfill_at(day(5, 10), 7).await.unwrap();
    assert_eq!(backfill.skip_reason(), Some(SkipReason::NotConfigured));

    let series = service.daily_series_at(Period::Week, day(5, 10)).await.unwrap();
    assert_eq!(series.days.len(), 7);
    assert!(!series.has_data);

    let streak = service.streak_at(day(5, 10)).await.unwrap();
    assert_eq!(streak.current, 0);
}

#[tokio::test]
async fn overlapping_runs_are_skipped_not_queued() {
    let (service, store, source) = harness();

    let gate = source.gate.lock().await;
    let background = {
        let service = service.clone();
        tokio::spawn(async move { service.poll_at(t0()).await })
    };
    while !service.is_busy() {
        tokio::task::yield_now().await;
    }

    let overlapping = service.poll_at(t0()).await.unwrap();
    assert_eq!(overlapping.skip_reason(), Some(SkipReason::AlreadyRunning));
    let backfill = service.backfill_at(day(5, 10), 7).await.unwrap();
    assert_eq!(backfill.skip_reason(), Some(SkipReason::AlreadyRunning));

    drop(gate);
    let finished = background.await.unwrap().unwrap();
    assert!(finished.completed().is_some());
    assert_eq!(store.samples_for(day(5, 10)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn streak_merges_cache_with_fresh_items() {
    let (service, _store, source) = harness();
    let at = |d: u32| Utc.with_ymd_and_hms(2024, 5, d, 12, 0, 0).unwrap();

    source.set_items(vec![item("old", at(8), 10)]);
    service.poll_at(at(8)).await.unwrap();

    source.set_items(vec![item("new", at(9), 10)]);
    let streak = service.streak_at(day(5, 10)).await.unwrap();
    assert_eq!(streak.current, 2);
    assert_eq!(streak.calendar.len(), 2);

    source.set_failing(true);
    let cached_only = service.streak_at(day(5, 10)).await.unwrap();
    assert_eq!(cached_only.current, 0);
    assert_eq!(cached_only.calendar.get(&day(5, 8)), Some(&1));
}

#[tokio::test]
async fn read_model_reflects_polls_and_estimates() {
    let (service, _store, source) = harness();
    let created = t0() - Duration::days(10);

    source.set_items(vec![item("1", created, 1000)]);
    service.poll_at(t0()).await.unwrap();
    source.set_items(vec![item("1", created, 1300)]);
    service
        .poll_at(t0() + Duration::hours(4))
        .await
        .unwrap();

    let series = service.daily_series_at(Period::Week, day(5, 10)).await.unwrap();
    assert_eq!(series.days_with_data, 1);
    assert_eq!(series.days[6].delta.impressions, 300);
    assert_eq!(series.cumulative_totals.map(|t| t.impressions), Some(1300));

    let breakdown = service
        .engagement_breakdown_at(Period::Week, day(5, 10))
        .await
        .unwrap();
    assert_eq!(breakdown.total_engagement, 3);
}

#[tokio::test]
async fn each_poll_rewrites_the_snapshot_file_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let documents = Arc::new(
        FileDocumentStore::open(dir.path().join("snapshots.json"))
            .await
            .expect("open"),
    );
    let store = SnapshotStore::new(documents.clone());

    let today = t0().date_naive();
    let mut writer = store.writer().await;
    writer
        .put_daily(&DailyAggregate::empty(today - Duration::days(400)))
        .unwrap();
    writer.commit().await.unwrap();
    assert_eq!(documents.rewrites(), 1);

    let source = Arc::new(ScriptedSource::default());
    let service = SnapshotService::new(
        store.clone(),
        Some(source.clone() as Arc<dyn MetricsSource>),
        EngineConfig::default(),
    );
    source.set_items(
        (0..50)
            .map(|i| item(&i.to_string(), t0() - Duration::hours(i), 100))
            .collect(),
    );

    let report = service.poll_at(t0()).await.unwrap().completed().unwrap();
    assert_eq!(report.items_sampled, 50);
    assert_eq!(report.pruned.map(|p| p.daily_aggregates), Some(1));
    assert_eq!(documents.rewrites(), 2);

    service
        .poll_at(t0() + Duration::hours(4))
        .await
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(documents.rewrites(), 3);

    assert_eq!(store.samples_for(today).await.unwrap().len(), 2);
    assert_eq!(store.item_histories().await.unwrap().len(), 50);
    assert!(store
        .daily(today - Duration::days(400))
        .await
        .unwrap()
        .is_none());
}
