//! Caller-scoped quota view

use crate::auth::{ApiError, AppState, AuthTenant};
use axum::extract::State;
use axum::{Extension, Json};
use relayflow_core::quota::WindowUsage;
use relayflow_storage::{DbTenantRepository, TenantRepository};
use std::collections::BTreeMap;
use std::sync::Arc;

/// GET /api/v1/quota
pub async fn get_quota(
    State(state): State<Arc<AppState>>,
    Extension(AuthTenant(auth)): Extension<AuthTenant>,
) -> Result<Json<BTreeMap<&'static str, WindowUsage>>, ApiError> {
    let tenant = DbTenantRepository::new(state.db.clone())
        .get(auth.id)
        .await?
        .ok_or_else(|| ApiError::not_found("tenant not found"))?;

    Ok(Json(state.quota.remaining(&tenant).await?))
}
