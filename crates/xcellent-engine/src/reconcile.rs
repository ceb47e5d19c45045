//! Daily delta derivation.
//!
//! Metric deltas difference the current reading against a baseline sample:
//! today's first sample when today already has earlier samples, otherwise the
//! last sample of the latest prior day that has any. Followers use a
//! day-over-day rule instead, since the follower count is a single gauge.

use chrono::NaiveDate;
use xcellent_core::{CumulativeSample, CumulativeTotals, DailyAggregate, Metric};
use xcellent_db::{DbError, SnapshotWriter};

/// Pick the baseline for a reading.
///
/// `today_samples` are the day's samples, oldest first, with the current
/// reading already appended last. `prior_day_last` is the last sample of the
/// latest earlier day on record.
#[must_use]
pub fn select_baseline<'a>(
    today_samples: &'a [CumulativeSample],
    prior_day_last: Option<&'a CumulativeSample>,
) -> Option<&'a CumulativeSample> {
    match today_samples {
        [first, _, ..] => Some(first),
        _ => prior_day_last,
    }
}

/// Per-metric `max(0, current - baseline)`. No baseline means all zeros.
#[must_use]
pub fn compute_delta(
    current: &CumulativeTotals,
    baseline: Option<&CumulativeTotals>,
) -> CumulativeTotals {
    let Some(baseline) = baseline else {
        return CumulativeTotals::default();
    };

    let mut delta = CumulativeTotals::default();
    for metric in Metric::ALL {
        let (now, then) = (current.get(metric), baseline.get(metric));
        if now < then {
            tracing::debug!(
                %metric,
                current = now,
                baseline = then,
                "reconcile: counter went backwards, clamping delta to 0"
            );
        }
        delta.set(metric, now.saturating_sub(then));
    }
    delta
}

/// Day-over-day follower change.
///
/// Falls back to the value already stored for today, then to 0, when either
/// side of the difference is unknown.
#[must_use]
pub fn new_followers(
    current: Option<u64>,
    prior_day: Option<u64>,
    stored_today: Option<i64>,
) -> i64 {
    match (current, prior_day) {
        (Some(now), Some(then)) => to_i64(now) - to_i64(then),
        _ => stored_today.unwrap_or(0),
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Build today's aggregate from the current reading and its context.
#[must_use]
pub fn derive_aggregate(
    today: NaiveDate,
    current: &CumulativeSample,
    baseline: Option<&CumulativeSample>,
    prior_day: Option<&DailyAggregate>,
    existing: Option<&DailyAggregate>,
) -> DailyAggregate {
    let delta = compute_delta(&current.totals, baseline.map(|b| &b.totals));
    let followers = current
        .followers
        .or_else(|| existing.and_then(|e| e.followers));
    let new_followers = new_followers(
        current.followers,
        prior_day.and_then(|p| p.followers),
        existing.and_then(|e| e.new_followers),
    );

    DailyAggregate {
        date: today,
        delta,
        followers,
        new_followers: Some(new_followers),
        estimated: false,
    }
}

/// Recompute today's aggregate from the samples the writer sees and stage it.
///
/// The current reading must already be the last of today's samples. With
/// unchanged store state the result is identical on every call.
///
/// # Errors
///
/// Returns [`DbError`] on store failure.
pub async fn reconcile(
    writer: &mut SnapshotWriter<'_>,
    today: NaiveDate,
) -> Result<Option<DailyAggregate>, DbError> {
    let today_samples = writer.samples_for(today).await?;
    let Some(current) = today_samples.last() else {
        return Ok(None);
    };

    let prior_day_last = match today_samples.len() {
        0 | 1 => writer.last_sample_before(today).await?,
        _ => None,
    };
    let baseline = select_baseline(&today_samples, prior_day_last.as_ref());

    let prior_day = match today.pred_opt() {
        Some(yesterday) => writer.daily(yesterday).await?,
        None => None,
    };
    let existing = writer.daily(today).await?;

    let aggregate = derive_aggregate(
        today,
        current,
        baseline,
        prior_day.as_ref(),
        existing.as_ref(),
    );
    writer.put_daily(&aggregate)?;
    Ok(Some(aggregate))
}
