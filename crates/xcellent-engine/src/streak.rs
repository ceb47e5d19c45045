//! Posting streak and calendar heatmap.

use std::collections::BTreeMap;

use chrono::{Months, NaiveDate};
use serde::Serialize;

/// Trailing window of the calendar, in months.
pub const CALENDAR_WINDOW_MONTHS: u32 = 6;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Streak {
    /// Consecutive posting days ending today, or yesterday if today has no
    /// post yet.
    pub current: u32,
    /// Items created per day within the trailing window.
    pub calendar: BTreeMap<NaiveDate, u32>,
}

/// Count items per creation day and walk back from today.
///
/// Dates outside `today - 6 months ..= today` are ignored. A missing post
/// today does not break the streak as long as yesterday has one.
#[must_use]
pub fn compute_streak(dates: impl IntoIterator<Item = NaiveDate>, today: NaiveDate) -> Streak {
    let window_start = today
        .checked_sub_months(Months::new(CALENDAR_WINDOW_MONTHS))
        .unwrap_or(NaiveDate::MIN);

    let mut calendar: BTreeMap<NaiveDate, u32> = BTreeMap::new();
    for date in dates {
        if date >= window_start && date <= today {
            *calendar.entry(date).or_default() += 1;
        }
    }

    let posted = |d: NaiveDate| calendar.get(&d).is_some_and(|n| *n > 0);

    let start = if posted(today) {
        Some(today)
    } else {
        today.pred_opt().filter(|y| posted(*y))
    };

    let mut current = 0;
    let mut cursor = start;
    while let Some(date) = cursor.filter(|d| posted(*d)) {
        current += 1;
        cursor = date.pred_opt();
    }

    Streak { current, calendar }
}
