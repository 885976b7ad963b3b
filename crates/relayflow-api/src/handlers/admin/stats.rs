//! Admin stats and log endpoints

use crate::auth::{ApiError, AppState};
use crate::handlers::logs::{clamp_paging, LogsPage};
use axum::extract::{Query, State};
use axum::Json;
use chrono::NaiveDate;
use relayflow_common::types::TenantId;
use relayflow_core::stats::{Overview, PeriodStats, RelayStats, TenantDetailStats, TenantStats,
    TrendData};
use relayflow_storage::models::SendLogQuery;
use relayflow_storage::{DbSendLogRepository, SendLogRepository};
use serde::Deserialize;
use std::sync::Arc;

/// GET /api/admin/stats
pub async fn overview(State(state): State<Arc<AppState>>) -> Result<Json<Overview>, ApiError> {
    Ok(Json(state.stats.overview().await?))
}

#[derive(Debug, Deserialize)]
pub struct PeriodParams {
    #[serde(rename = "type")]
    pub period: Option<String>,
}

/// GET /api/admin/stats/period?type=today|week|month|all
pub async fn period(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PeriodParams>,
) -> Result<Json<PeriodStats>, ApiError> {
    let period = params.period.as_deref().unwrap_or("today");
    Ok(Json(state.stats.period(period).await?))
}

/// GET /api/admin/key-stats
pub async fn key_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TenantStats>>, ApiError> {
    Ok(Json(state.stats.tenant_stats().await?))
}

/// GET /api/admin/key-stats-detail
pub async fn key_stats_detail(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TenantDetailStats>>, ApiError> {
    Ok(Json(state.stats.tenant_details().await?))
}

/// GET /api/admin/smtp-stats
pub async fn smtp_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RelayStats>>, ApiError> {
    Ok(Json(state.stats.relay_stats().await?))
}

#[derive(Debug, Deserialize)]
pub struct TrendParams {
    pub start: String,
    pub end: String,
    pub key_id: Option<TenantId>,
}

/// GET /api/admin/trend?start&end&key_id
pub async fn trend(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrendParams>,
) -> Result<Json<TrendData>, ApiError> {
    let start = NaiveDate::parse_from_str(&params.start, "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request("invalid start date"))?;
    let end = NaiveDate::parse_from_str(&params.end, "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request("invalid end date"))?;
    if end < start {
        return Err(ApiError::bad_request("end date precedes start date"));
    }

    let tenant_id = params.key_id.filter(|id| *id > 0);
    Ok(Json(state.stats.trend(start, end, tenant_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct AdminLogsParams {
    pub key_id: Option<TenantId>,
    pub status: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// GET /api/admin/logs
pub async fn logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AdminLogsParams>,
) -> Result<Json<LogsPage>, ApiError> {
    let (page, page_size) = clamp_paging(params.page, params.page_size);

    let query = SendLogQuery {
        tenant_id: params.key_id.filter(|id| *id > 0),
        status: params.status.filter(|s| !s.is_empty()),
        ..Default::default()
    };

    let (data, total) = DbSendLogRepository::new(state.db.clone())
        .page(&query, page, page_size)
        .await?;

    Ok(Json(LogsPage {
        total,
        page,
        page_size,
        data,
    }))
}
