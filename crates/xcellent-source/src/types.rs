//! X API v2 response types.
//!
//! Only the fields the snapshot engine reads are modelled; everything else in
//! the payload is ignored.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// `GET /users/{id}/tweets` response.
#[derive(Debug, Deserialize)]
pub struct TweetsResponse {
    /// Absent when the timeline page is empty.
    #[serde(default)]
    pub data: Vec<Tweet>,
    #[serde(default)]
    pub meta: Option<TweetsMeta>,
}

#[derive(Debug, Deserialize)]
pub struct TweetsMeta {
    #[serde(default)]
    pub next_token: Option<String>,
    #[serde(default)]
    pub result_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct Tweet {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub public_metrics: TweetPublicMetrics,
}

#[derive(Debug, Default, Deserialize)]
pub struct TweetPublicMetrics {
    #[serde(default)]
    pub impression_count: u64,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub retweet_count: u64,
    #[serde(default)]
    pub reply_count: u64,
    #[serde(default)]
    pub bookmark_count: u64,
}

/// `GET /users/by/username/{username}` response.
#[derive(Debug, Deserialize)]
pub struct UserResponse {
    #[serde(default)]
    pub data: Option<User>,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub public_metrics: Option<UserPublicMetrics>,
}

#[derive(Debug, Deserialize)]
pub struct UserPublicMetrics {
    #[serde(default)]
    pub followers_count: Option<u64>,
}

/// Error body returned alongside non-2xx statuses.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}
