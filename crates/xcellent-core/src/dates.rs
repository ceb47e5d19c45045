//! Calendar-day keys.
//!
//! Every date is a UTC calendar day rendered as `YYYY-MM-DD`. That format
//! sorts lexicographically in chronological order, which the store relies on
//! when it lists keys and scans them backwards.

use chrono::NaiveDate;

const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// Render a calendar day as its sortable `YYYY-MM-DD` key.
#[must_use]
pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD` key back into a calendar day.
///
/// Returns `None` for anything that is not a valid date key.
#[must_use]
pub fn parse_date_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, DATE_KEY_FORMAT).ok()
}
