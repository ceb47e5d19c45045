//! Snapshot command handlers for the CLI.
//!
//! `poll`, `backfill` and `prune` write to the snapshot store; the remaining
//! subcommands are read-only views over it. Every handler can print JSON
//! instead of a table.

use chrono::Utc;
use clap::Subcommand;
use serde::Serialize;
use xcellent_core::Metric;
use xcellent_engine::{Outcome, Period, SnapshotService, MAX_BACKFILL_DAYS};

/// Sub-commands available under `snapshots`.
#[derive(Debug, Subcommand)]
pub enum SnapshotCommands {
    /// Poll the metrics source once and record a sample
    Poll,
    /// Estimate missing days from item creation dates
    Backfill {
        /// Days before today to inspect, 1 to 90 (defaults to the configured lookback)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_BACKFILL_DAYS)))]
        days: Option<u32>,
    },
    /// Show per-day deltas for a period
    Daily {
        /// One of 7d, 30d, 90d
        #[arg(long, default_value = "7d", value_parser = crate::parse_period)]
        period: Period,
    },
    /// Show engagement totals by metric, with change between period halves
    Breakdown {
        /// One of 7d, 30d, 90d
        #[arg(long, default_value = "7d", value_parser = crate::parse_period)]
        period: Period,
    },
    /// Show the current posting streak and recent activity
    Streak {
        /// Number of most recent active days to list
        #[arg(long, default_value = "14")]
        limit: usize,
    },
    /// Show the recorded metric history of one item
    Item {
        /// Item id as reported by the metrics source
        id: String,
    },
    /// Delete snapshot data older than the retention window
    Prune,
}

/// Format an optional value for display, returning `"—"` when `None`.
fn fmt_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "\u{2014}".to_string(), |v| v.to_string())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) async fn dispatch(
    service: &SnapshotService,
    command: SnapshotCommands,
    json: bool,
) -> anyhow::Result<()> {
    match command {
        SnapshotCommands::Poll => run_poll(service, json).await,
        SnapshotCommands::Backfill { days } => run_backfill(service, days, json).await,
        SnapshotCommands::Daily { period } => run_daily(service, period, json).await,
        SnapshotCommands::Breakdown { period } => run_breakdown(service, period, json).await,
        SnapshotCommands::Streak { limit } => run_streak(service, limit, json).await,
        SnapshotCommands::Item { id } => run_item(service, &id, json).await,
        SnapshotCommands::Prune => run_prune(service, json).await,
    }
}

/// Run one poll and print what it recorded.
///
/// A skipped poll (no credentials, or another run in flight) is reported and
/// is not an error.
///
/// # Errors
///
/// Returns an error if the metrics source or the snapshot store fails.
pub(crate) async fn run_poll(service: &SnapshotService, json: bool) -> anyhow::Result<()> {
    let outcome = service.poll().await?;
    if json {
        return print_json(&outcome);
    }

    match outcome {
        Outcome::Completed(report) => {
            println!(
                "polled {} items at {}",
                report.items_polled,
                report.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!("{:<14}{:>14}{:>14}", "METRIC", "CUMULATIVE", "TODAY");
            for metric in Metric::ALL {
                println!(
                    "{:<14}{:>14}{:>14}",
                    metric.as_str(),
                    report.totals.get(metric),
                    report.aggregate.delta.get(metric)
                );
            }
            println!(
                "followers: {}  new today: {}",
                fmt_opt(report.followers),
                fmt_opt(report.aggregate.new_followers)
            );
            println!("item histories sampled: {}", report.items_sampled);
            if let Some(pruned) = report.pruned.filter(|p| p.total() > 0) {
                println!("pruned {} expired documents", pruned.total());
            }
        }
        Outcome::Skipped { reason } => println!("poll skipped: {reason}"),
    }
    Ok(())
}

/// Estimate missing days in the lookback window.
///
/// # Errors
///
/// Returns an error if the window falls outside `1..=MAX_BACKFILL_DAYS`, or if
/// the metrics source or the snapshot store fails.
pub(crate) async fn run_backfill(
    service: &SnapshotService,
    days: Option<u32>,
    json: bool,
) -> anyhow::Result<()> {
    let days = days.unwrap_or(service.config().backfill_lookback_days);
    anyhow::ensure!(
        (1..=MAX_BACKFILL_DAYS).contains(&days),
        "backfill window must be between 1 and {MAX_BACKFILL_DAYS} days, got {days}"
    );

    let outcome = service.backfill_at(Utc::now().date_naive(), days).await?;
    if json {
        return print_json(&outcome);
    }

    match outcome {
        Outcome::Completed(report) if report.missing_dates.is_empty() => {
            println!("no missing days in the last {days} days");
        }
        Outcome::Completed(report) => {
            println!(
                "fetched {} items; filled {} of {} missing days",
                report.items_fetched,
                report.filled_dates.len(),
                report.missing_dates.len()
            );
            for date in &report.missing_dates {
                let status = if report.filled_dates.contains(date) {
                    "estimated"
                } else {
                    "not filled"
                };
                println!("  {date}  {status}");
            }
        }
        Outcome::Skipped { reason } => println!("backfill skipped: {reason}"),
    }
    Ok(())
}

/// Print the daily series for `period`.
///
/// # Errors
///
/// Returns an error if the snapshot store cannot be read.
pub(crate) async fn run_daily(
    service: &SnapshotService,
    period: Period,
    json: bool,
) -> anyhow::Result<()> {
    let series = service.daily_series(period).await?;
    if json {
        return print_json(&series);
    }

    if !series.has_data {
        println!("no snapshot data for the last {period}; run `snapshots poll` first");
        return Ok(());
    }

    println!(
        "{:<12}{:>12}{:>8}{:>9}{:>9}{:>11}{:>11}{:>9}",
        "DATE", "IMPRESSIONS", "LIKES", "REPOSTS", "REPLIES", "BOOKMARKS", "FOLLOWERS", "NEW"
    );
    for day in &series.days {
        let marker = if day.estimated { "*" } else { "" };
        println!(
            "{:<12}{:>12}{:>8}{:>9}{:>9}{:>11}{:>11}{:>9}{marker}",
            day.date.to_string(),
            day.delta.impressions,
            day.delta.likes,
            day.delta.reposts,
            day.delta.replies,
            day.delta.bookmarks,
            fmt_opt(day.followers),
            fmt_opt(day.new_followers),
        );
    }
    println!(
        "{} of {} days with data ({:.0}% complete); * = estimated",
        series.days_with_data,
        series.days.len(),
        series.completeness * 100.0
    );
    Ok(())
}

/// Print per-metric totals and half-over-half change for `period`.
///
/// # Errors
///
/// Returns an error if the snapshot store cannot be read.
pub(crate) async fn run_breakdown(
    service: &SnapshotService,
    period: Period,
    json: bool,
) -> anyhow::Result<()> {
    let breakdown = service.engagement_breakdown(period).await?;
    if json {
        return print_json(&breakdown);
    }

    println!("{:<14}{:>12}{:>10}{:>8}", "METRIC", "TOTAL", "CHANGE", "SHARE");
    for (metric, row) in &breakdown.metrics {
        println!(
            "{:<14}{:>12}{:>10}{:>8}",
            metric.as_str(),
            row.total,
            fmt_opt(row.change_pct.map(|pct| format!("{pct:+}%"))),
            fmt_opt(row.share_pct.map(|pct| format!("{pct}%"))),
        );
    }
    println!("total engagement over {period}: {}", breakdown.total_engagement);
    Ok(())
}

/// Print the current streak and the most recent active days.
///
/// # Errors
///
/// Returns an error if the snapshot store cannot be read. A failed fetch from
/// the metrics source falls back to cached item dates.
pub(crate) async fn run_streak(
    service: &SnapshotService,
    limit: usize,
    json: bool,
) -> anyhow::Result<()> {
    let streak = service.streak().await?;
    if json {
        return print_json(&streak);
    }

    let unit = if streak.current == 1 { "day" } else { "days" };
    println!("current streak: {} {unit}", streak.current);
    if streak.calendar.is_empty() {
        println!("no posts in the calendar window");
        return Ok(());
    }

    println!("{:<12}{:>6}", "DATE", "POSTS");
    for (date, count) in streak.calendar.iter().rev().take(limit) {
        println!("{:<12}{count:>6}", date.to_string());
    }
    Ok(())
}

/// Print the sample history of one item.
///
/// # Errors
///
/// Returns an error if the item has no recorded history or the snapshot store
/// cannot be read.
pub(crate) async fn run_item(service: &SnapshotService, id: &str, json: bool) -> anyhow::Result<()> {
    let Some(history) = service.item_history(id).await? else {
        anyhow::bail!("no history for item {id}; it is recorded on the next poll");
    };
    if json {
        return print_json(&history);
    }

    println!("item {}: {}", history.id, history.text);
    println!(
        "created: {}",
        fmt_opt(history.created_at.map(|at| at.format("%Y-%m-%d %H:%M UTC")))
    );
    println!(
        "{:<22}{:>12}{:>8}{:>9}{:>9}{:>11}",
        "SAMPLED", "IMPRESSIONS", "LIKES", "REPOSTS", "REPLIES", "BOOKMARKS"
    );
    for sample in &history.samples {
        println!(
            "{:<22}{:>12}{:>8}{:>9}{:>9}{:>11}",
            sample.timestamp.format("%Y-%m-%d %H:%M").to_string(),
            sample.totals.impressions,
            sample.totals.likes,
            sample.totals.reposts,
            sample.totals.replies,
            sample.totals.bookmarks,
        );
    }
    Ok(())
}

/// Apply the retention window without polling.
///
/// # Errors
///
/// Returns an error if the snapshot store cannot be written.
pub(crate) async fn run_prune(service: &SnapshotService, json: bool) -> anyhow::Result<()> {
    let report = service.prune_expired_at(Utc::now().date_naive()).await?;
    if json {
        return print_json(&report);
    }

    tracing::info!(removed = report.total(), "retention sweep complete");
    println!(
        "removed {} sample days, {} daily aggregates, {} item histories",
        report.cumulative_days, report.daily_aggregates, report.item_histories
    );
    Ok(())
}
