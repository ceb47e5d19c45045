//! HTTP client for the X API v2.
//!
//! Wraps `reqwest` with bearer authentication, a per-request timeout and
//! typed response deserialization. Non-2xx responses surface as
//! [`SourceError::Status`] carrying the API's own `detail`/`title` message.

use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use xcellent_core::{AccountCounters, AppConfig, SourceCredentials};

use crate::error::SourceError;
use crate::normalize::{normalize_tweet, normalize_user};
use crate::source::{ItemPage, ListItemsRequest, MetricsSource};
use crate::types::{ApiErrorBody, TweetsResponse, UserResponse};

const DEFAULT_BASE_URL: &str = "https://api.x.com/2";

/// The API rejects `max_results` outside this range.
const MIN_PAGE_RESULTS: usize = 5;
const MAX_PAGE_RESULTS: usize = 100;

/// Client for the X API v2 user and timeline endpoints.
///
/// Use [`XApiClient::new`] for production or [`XApiClient::with_base_url`]
/// to point at a mock server in tests.
pub struct XApiClient {
    client: Client,
    credentials: SourceCredentials,
    base_url: Url,
}

impl std::fmt::Debug for XApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XApiClient")
            .field("credentials", &self.credentials)
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl XApiClient {
    /// Creates a new client pointed at the production API.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(credentials: SourceCredentials, timeout_secs: u64) -> Result<Self, SourceError> {
        Self::with_base_url(credentials, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a new client with a custom base URL.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`SourceError::InvalidBaseUrl`] if
    /// `base_url` cannot carry path segments.
    pub fn with_base_url(
        credentials: SourceCredentials,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.min(10)))
            .user_agent("xcellent/0.1 (snapshot-poller)")
            .build()?;

        let invalid = |reason: String| SourceError::InvalidBaseUrl {
            url: base_url.to_owned(),
            reason,
        };
        let base_url = Url::parse(base_url.trim_end_matches('/')).map_err(|e| invalid(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid("URL cannot carry a path".to_owned()));
        }

        Ok(Self {
            client,
            credentials,
            base_url,
        })
    }

    /// Builds the client described by the application config.
    ///
    /// Returns `Ok(None)` when no credentials are configured.
    ///
    /// # Errors
    ///
    /// See [`XApiClient::with_base_url`].
    pub fn from_app_config(config: &AppConfig) -> Result<Option<Self>, SourceError> {
        config
            .source
            .clone()
            .map(|credentials| {
                Self::with_base_url(
                    credentials,
                    config.source_timeout_secs,
                    &config.source_base_url,
                )
            })
            .transpose()
    }

    /// Builds `base/segments...?params` with every segment and value encoded.
    fn endpoint(&self, segments: &[&str], params: &[(&str, String)]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }
        url
    }

    fn timeline_params(request: &ListItemsRequest) -> Vec<(&'static str, String)> {
        let max_results = request
            .max_results
            .clamp(MIN_PAGE_RESULTS, MAX_PAGE_RESULTS);
        let mut params = vec![
            ("max_results", max_results.to_string()),
            ("tweet.fields", "public_metrics,created_at,text".to_owned()),
            ("exclude", "retweets,replies".to_owned()),
        ];
        if let Some(after) = request.created_after {
            params.push((
                "start_time",
                after.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }
        if let Some(token) = &request.page_token {
            params.push(("pagination_token", token.clone()));
        }
        params
    }

    /// Sends an authenticated GET and decodes the JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] on network failure or timeout,
    /// [`SourceError::Status`] on a non-2xx status, or
    /// [`SourceError::Deserialize`] if the body does not match `T`.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, SourceError> {
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&self.credentials.bearer_token)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let parsed: ApiErrorBody = serde_json::from_str(&body).unwrap_or_default();
            let message = parsed
                .detail
                .or(parsed.title)
                .unwrap_or_else(|| format!("X API error {}", status.as_u16()));
            return Err(SourceError::Status {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|source| SourceError::Deserialize {
            context: url.path().to_owned(),
            source,
        })
    }
}

#[async_trait]
impl MetricsSource for XApiClient {
    async fn account_counters(&self) -> Result<AccountCounters, SourceError> {
        let url = self.endpoint(
            &["users", "by", "username", self.credentials.username.as_str()],
            &[("user.fields", "public_metrics".to_owned())],
        );
        let response: UserResponse = self.get_json(url).await?;
        Ok(normalize_user(response))
    }

    async fn list_items(&self, request: &ListItemsRequest) -> Result<ItemPage, SourceError> {
        let url = self.endpoint(
            &["users", self.credentials.user_id.as_str(), "tweets"],
            &Self::timeline_params(request),
        );
        let response: TweetsResponse = self.get_json(url).await?;

        let mut items: Vec<_> = response
            .data
            .into_iter()
            .filter_map(normalize_tweet)
            .collect();
        items.truncate(request.max_results);

        Ok(ItemPage {
            items,
            next_page_token: response.meta.and_then(|m| m.next_token),
        })
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
