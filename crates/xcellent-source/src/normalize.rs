//! Conversion of X API payloads into domain types.

use xcellent_core::{AccountCounters, CumulativeTotals, SourceItem};

use crate::types::{Tweet, UserResponse};

/// Convert a tweet into a [`SourceItem`].
///
/// Returns `None` when the payload lacks `created_at`: such an item cannot
/// be placed on a calendar day.
#[must_use]
pub fn normalize_tweet(tweet: Tweet) -> Option<SourceItem> {
    let Some(created_at) = tweet.created_at else {
        tracing::debug!(id = %tweet.id, "source: dropping tweet without created_at");
        return None;
    };
    let m = tweet.public_metrics;
    Some(SourceItem {
        id: tweet.id,
        text: tweet.text,
        created_at,
        totals: CumulativeTotals {
            impressions: m.impression_count,
            likes: m.like_count,
            reposts: m.retweet_count,
            replies: m.reply_count,
            bookmarks: m.bookmark_count,
        },
    })
}

/// Extract account gauges from a user lookup.
#[must_use]
pub fn normalize_user(response: UserResponse) -> AccountCounters {
    AccountCounters {
        follower_count: response
            .data
            .and_then(|u| u.public_metrics)
            .and_then(|m| m.followers_count),
    }
}
