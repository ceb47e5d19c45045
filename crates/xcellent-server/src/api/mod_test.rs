use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::Request;
use chrono::{TimeZone, Utc};
use tower::ServiceExt;
use xcellent_core::{AccountCounters, CumulativeTotals, SourceItem};
use xcellent_db::SnapshotStore;
use xcellent_engine::EngineConfig;
use xcellent_source::{ItemPage, ListItemsRequest, MetricsSource, SourceError};

use super::*;

struct FixedSource {
    fail: bool,
}

#[async_trait]
impl MetricsSource for FixedSource {
    async fn account_counters(&self) -> Result<AccountCounters, SourceError> {
        if self.fail {
            return Err(SourceError::Status {
                status: 402,
                message: "no credits left".to_owned(),
            });
        }
        Ok(AccountCounters {
            follower_count: Some(99),
        })
    }

    async fn list_items(&self, _request: &ListItemsRequest) -> Result<ItemPage, SourceError> {
        if self.fail {
            return Err(SourceError::Status {
                status: 402,
                message: "no credits left".to_owned(),
            });
        }
        Ok(ItemPage {
            items: vec![SourceItem {
                id: "1".to_owned(),
                text: "hello".to_owned(),
                created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
                totals: CumulativeTotals {
                    impressions: 120,
                    likes: 3,
                    ..CumulativeTotals::default()
                },
            }],
            next_page_token: None,
        })
    }
}

fn service(source: Option<FixedSource>) -> SnapshotService {
    SnapshotService::new(
        SnapshotStore::in_memory(),
        source.map(|s| Arc::new(s) as Arc<dyn MetricsSource>),
        EngineConfig::default(),
    )
}

fn app(service: SnapshotService) -> Router {
    build_app(
        AppState { service },
        AuthState::disabled(),
        default_rate_limit_state(),
    )
}

async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json = serde_json::from_slice(&body).expect("json parse");
    (status, json)
}

#[test]
fn api_error_codes_map_to_statuses() {
    let cases = [
        ("validation_error", StatusCode::BAD_REQUEST),
        ("not_found", StatusCode::NOT_FOUND),
        ("upstream_error", StatusCode::BAD_GATEWAY),
        ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (code, status) in cases {
        let response = ApiError::new("req-1", code, "message").into_response();
        assert_eq!(response.status(), status, "code {code}");
    }
}

#[tokio::test]
async fn health_reports_store_and_echoes_request_id() {
    let response = app(service(None))
        .oneshot(
            Request::builder()
                .uri("/api/v1/health")
                .header("x-request-id", "req-abc")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "req-abc");

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["data"]["store"], "ok");
    assert_eq!(json["data"]["source_configured"], false);
    assert_eq!(json["meta"]["request_id"], "req-abc");
}

#[tokio::test]
async fn daily_series_on_empty_store_is_zero_filled() {
    let (status, json) = send(app(service(None)), "GET", "/api/v1/snapshots/daily?period=30d").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["period"], "30d");
    assert_eq!(json["data"]["days"].as_array().map(Vec::len), Some(30));
    assert_eq!(json["data"]["has_data"], false);
    assert_eq!(json["data"]["days_with_data"], 0);
    assert!(json["data"]["cumulative_totals"].is_null());
}

#[tokio::test]
async fn unknown_period_is_rejected() {
    let (status, json) = send(app(service(None)), "GET", "/api/v1/snapshots/breakdown?period=14d").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");
}

#[tokio::test]
async fn poll_without_credentials_reports_skip() {
    let (status, json) = send(app(service(None)), "POST", "/api/v1/snapshots/poll").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "skipped");
    assert_eq!(json["data"]["reason"], "not_configured");
}

#[tokio::test]
async fn poll_then_read_item_history() {
    let svc = service(Some(FixedSource { fail: false }));

    let (status, json) = send(app(svc.clone()), "POST", "/api/v1/snapshots/poll").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "completed");
    assert_eq!(json["data"]["items_polled"], 1);
    assert_eq!(json["data"]["totals"]["impressions"], 120);

    let (status, json) = send(app(svc.clone()), "GET", "/api/v1/snapshots/items/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["text"], "hello");
    assert_eq!(json["data"]["samples"].as_array().map(Vec::len), Some(1));

    let (status, json) = send(app(svc), "GET", "/api/v1/snapshots/items/404").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "not_found");
}

#[tokio::test]
async fn upstream_failure_surfaces_as_bad_gateway() {
    let svc = service(Some(FixedSource { fail: true }));
    let (status, json) = send(app(svc), "POST", "/api/v1/snapshots/backfill").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"]["code"], "upstream_error");
    assert!(json["error"]["message"]
        .as_str()
        .is_some_and(|m| m.contains("no credits left")));
}

#[tokio::test]
async fn backfill_window_is_validated() {
    let (status, json) = send(app(service(None)), "POST", "/api/v1/snapshots/backfill?days=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");
}

#[tokio::test]
async fn streak_falls_back_to_cache_when_fetch_fails() {
    let svc = service(Some(FixedSource { fail: true }));
    let (status, json) = send(app(svc), "GET", "/api/v1/snapshots/streak").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["current"], 0);
}

#[tokio::test]
async fn protected_routes_require_bearer_token() {
    let auth = AuthState::from_keys("secret", false).expect("auth");
    let app = build_app(
        AppState {
            service: service(None),
        },
        auth,
        default_rate_limit_state(),
    );

    let (status, json) = send(app.clone(), "GET", "/api/v1/snapshots/streak").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"]["code"], "unauthorized");
    assert!(json["meta"]["request_id"].as_str().is_some_and(|id| !id.is_empty()));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/snapshots/streak")
                .header("authorization", "Bearer secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, _) = send(app, "GET", "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn rate_limit_rejects_excess_requests() {
    let app = build_app(
        AppState {
            service: service(None),
        },
        AuthState::disabled(),
        RateLimitState::new(1, Duration::from_secs(60)),
    );

    let (status, _) = send(app.clone(), "GET", "/api/v1/snapshots/streak").await;
    assert_eq!(status, StatusCode::OK);
    let (status, json) = send(app, "GET", "/api/v1/snapshots/streak").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["error"]["code"], "rate_limited");
}
