//! Caller-scoped send log pages

use crate::auth::{ApiError, AppState, AuthTenant};
use axum::extract::{Query, State};
use axum::{Extension, Json};
use relayflow_storage::models::{SendLog, SendLogQuery};
use relayflow_storage::{DbSendLogRepository, SendLogRepository};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct LogsParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LogsPage {
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub data: Vec<SendLog>,
}

pub fn clamp_paging(page: Option<i64>, page_size: Option<i64>) -> (i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let page_size = match page_size.unwrap_or(50) {
        size if size < 1 => 50,
        size if size > 100 => 50,
        size => size,
    };
    (page, page_size)
}

/// GET /api/v1/logs
pub async fn get_logs(
    State(state): State<Arc<AppState>>,
    Extension(AuthTenant(auth)): Extension<AuthTenant>,
    Query(params): Query<LogsParams>,
) -> Result<Json<LogsPage>, ApiError> {
    let (page, page_size) = clamp_paging(params.page, params.page_size);

    let query = SendLogQuery {
        tenant_id: Some(auth.id),
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

#[cfg(test)]
mod tests {
    use super::clamp_paging;

    #[test]
    fn paging_is_clamped_to_sane_bounds() {
        assert_eq!(clamp_paging(None, None), (1, 50));
        assert_eq!(clamp_paging(Some(0), Some(0)), (1, 50));
        assert_eq!(clamp_paging(Some(-3), Some(500)), (1, 50));
        assert_eq!(clamp_paging(Some(2), Some(25)), (2, 25));
    }
}
