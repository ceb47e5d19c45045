use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use xcellent_core::ItemMetricHistory;
use xcellent_engine::{
    BackfillReport, DailySeries, EngagementBreakdown, Outcome, Period, PollReport, Streak,
    MAX_BACKFILL_DAYS,
};

use crate::middleware::RequestId;

use super::{map_engine_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct PeriodQuery {
    pub period: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct BackfillQuery {
    pub days: Option<u32>,
}

fn parse_period(req_id: &RequestId, raw: Option<&str>) -> Result<Period, ApiError> {
    raw.map_or(Ok(Period::default()), |s| s.parse::<Period>())
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))
}

pub(super) async fn daily_series(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<ApiResponse<DailySeries>>, ApiError> {
    let period = parse_period(&req_id, query.period.as_deref())?;
    let series = state
        .service
        .daily_series(period)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(req_id.0, series))
}

pub(super) async fn engagement_breakdown(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<ApiResponse<EngagementBreakdown>>, ApiError> {
    let period = parse_period(&req_id, query.period.as_deref())?;
    let breakdown = state
        .service
        .engagement_breakdown(period)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(req_id.0, breakdown))
}

pub(super) async fn streak(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Streak>>, ApiError> {
    let streak = state
        .service
        .streak()
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(req_id.0, streak))
}

pub(super) async fn item_history(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(item_id): Path<String>,
) -> Result<Json<ApiResponse<ItemMetricHistory>>, ApiError> {
    let history = state
        .service
        .item_history(&item_id)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?
        .ok_or_else(|| {
            ApiError::new(
                req_id.0.clone(),
                "not_found",
                format!("no history for item {item_id}"),
            )
        })?;
    Ok(ApiResponse::new(req_id.0, history))
}

pub(super) async fn trigger_poll(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Outcome<PollReport>>>, ApiError> {
    let outcome = state
        .service
        .poll()
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(req_id.0, outcome))
}

pub(super) async fn trigger_backfill(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<BackfillQuery>,
) -> Result<Json<ApiResponse<Outcome<BackfillReport>>>, ApiError> {
    let days = match query.days {
        None => state.service.config().backfill_lookback_days,
        Some(days @ 1..=MAX_BACKFILL_DAYS) => days,
        Some(_) => {
            return Err(ApiError::new(
                req_id.0,
                "validation_error",
                format!("days must be between 1 and {MAX_BACKFILL_DAYS}"),
            ));
        }
    };
    let outcome = state
        .service
        .backfill_at(Utc::now().date_naive(), days)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(req_id.0, outcome))
}
