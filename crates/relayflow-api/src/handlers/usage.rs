//! Caller-scoped usage aggregates

use crate::auth::{ApiError, AppState, AuthTenant};
use axum::extract::State;
use axum::{Extension, Json};
use relayflow_core::stats::TenantDetailStats;
use relayflow_storage::{DbTenantRepository, TenantRepository};
use std::sync::Arc;

/// GET /api/v1/usage
pub async fn get_usage(
    State(state): State<Arc<AppState>>,
    Extension(AuthTenant(auth)): Extension<AuthTenant>,
) -> Result<Json<TenantDetailStats>, ApiError> {
    let tenant = DbTenantRepository::new(state.db.clone())
        .get(auth.id)
        .await?
        .ok_or_else(|| ApiError::not_found("tenant not found"))?;

    Ok(Json(state.stats.tenant_detail(&tenant).await?))
}
