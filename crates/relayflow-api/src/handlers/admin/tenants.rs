//! Tenant (API key) administration

use crate::auth::{random_token, ApiError, AppState};
use crate::handlers::admin::Message;
use axum::extract::{Path, State};
use axum::Json;
use relayflow_common::types::{tenant_status, TenantId};
use relayflow_core::quota::{ResetScope, WindowUsage};
use relayflow_storage::models::{CreateTenant, Tenant, UpdateTenant};
use relayflow_storage::{DbPlanRepository, DbTenantRepository, PlanRepository, TenantRepository};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

fn repo(state: &AppState) -> DbTenantRepository {
    DbTenantRepository::new(state.db.clone())
}

async fn fetch(state: &AppState, id: TenantId) -> Result<Tenant, ApiError> {
    repo(state)
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("tenant not found"))
}

/// GET /api/admin/keys
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Tenant>>, ApiError> {
    Ok(Json(repo(&state).list().await?))
}

/// POST /api/admin/keys
///
/// Generates the opaque secret. A plan-backed tenant copies the plan's
/// per-window limits; a custom tenant keeps the limits from the body.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(mut input): Json<CreateTenant>,
) -> Result<Json<Tenant>, ApiError> {
    if input.name.is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }

    if !input.is_custom {
        if let Some(plan_id) = input.plan_id {
            let plan = DbPlanRepository::new(state.db.clone())
                .get(plan_id)
                .await?
                .ok_or_else(|| ApiError::not_found("plan not found"))?;
            input.minute_limit = plan.minute_limit;
            input.daily_limit = plan.daily_limit;
            input.weekly_limit = plan.weekly_limit;
            input.monthly_limit = plan.monthly_limit;
        }
    } else {
        input.plan_id = None;
    }

    let secret = format!("rf_{}", random_token(32));
    let tenant = repo(&state).create(&secret, input).await?;
    Ok(Json(tenant))
}

/// PUT /api/admin/keys/:id
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TenantId>,
    Json(mut input): Json<UpdateTenant>,
) -> Result<Json<Tenant>, ApiError> {
    let existing = fetch(&state, id).await?;

    // switching to a plan re-applies that plan's window limits
    if input.is_custom != Some(true) {
        if let Some(plan_id) = input.plan_id {
            let plan = DbPlanRepository::new(state.db.clone())
                .get(plan_id)
                .await?
                .ok_or_else(|| ApiError::not_found("plan not found"))?;
            input.minute_limit = Some(plan.minute_limit);
            input.daily_limit = Some(plan.daily_limit);
            input.weekly_limit = Some(plan.weekly_limit);
            input.monthly_limit = Some(plan.monthly_limit);
        }
    }

    repo(&state).update(id, input).await?;
    state.quota.invalidate(&existing.secret).await?;

    Ok(Json(fetch(&state, id).await?))
}

/// DELETE /api/admin/keys/:id
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TenantId>,
) -> Result<Json<Message>, ApiError> {
    let existing = fetch(&state, id).await?;
    repo(&state).delete(id).await?;
    state.quota.invalidate(&existing.secret).await?;
    Ok(Json(Message::new("tenant deleted")))
}

#[derive(Debug, Deserialize)]
pub struct BatchIds {
    pub ids: Vec<TenantId>,
}

/// POST /api/admin/keys/batch-delete
pub async fn batch_delete(
    State(state): State<Arc<AppState>>,
    Json(input): Json<BatchIds>,
) -> Result<Json<Message>, ApiError> {
    if input.ids.is_empty() {
        return Err(ApiError::bad_request("ids must not be empty"));
    }

    let repo = repo(&state);
    for id in &input.ids {
        if let Some(tenant) = repo.get(*id).await? {
            state.quota.invalidate(&tenant.secret).await?;
        }
    }
    let deleted = repo.delete_many(&input.ids).await?;
    Ok(Json(Message::new(format!("{} tenant(s) deleted", deleted))))
}

#[derive(Debug, Deserialize)]
pub struct BatchStatus {
    pub ids: Vec<TenantId>,
    pub status: String,
}

/// POST /api/admin/keys/batch-status
pub async fn batch_status(
    State(state): State<Arc<AppState>>,
    Json(input): Json<BatchStatus>,
) -> Result<Json<Message>, ApiError> {
    if !matches!(
        input.status.as_str(),
        tenant_status::ACTIVE | tenant_status::DISABLED
    ) {
        return Err(ApiError::bad_request("invalid status"));
    }

    let repo = repo(&state);
    let updated = repo.set_status_many(&input.ids, &input.status).await?;
    for id in &input.ids {
        if let Some(tenant) = repo.get(*id).await? {
            state.quota.invalidate(&tenant.secret).await?;
        }
    }
    Ok(Json(Message::new(format!("{} tenant(s) updated", updated))))
}

/// GET /api/admin/keys/:id/quota
pub async fn get_quota(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TenantId>,
) -> Result<Json<BTreeMap<&'static str, WindowUsage>>, ApiError> {
    let tenant = fetch(&state, id).await?;
    Ok(Json(state.quota.remaining(&tenant).await?))
}

#[derive(Debug, Deserialize)]
pub struct ResetQuotaRequest {
    pub quota_type: String,
}

/// POST /api/admin/keys/:id/reset-quota
pub async fn reset_quota(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TenantId>,
    Json(input): Json<ResetQuotaRequest>,
) -> Result<Json<Message>, ApiError> {
    fetch(&state, id).await?;
    let scope = ResetScope::parse(&input.quota_type).ok_or_else(|| {
        ApiError::bad_request(format!("invalid quota type: {}", input.quota_type))
    })?;
    state.quota.reset(id, scope).await?;
    Ok(Json(Message::new("quota reset")))
}

#[derive(Debug, Deserialize)]
pub struct AdjustQuotaRequest {
    pub minute_limit: Option<i64>,
    pub daily_limit: Option<i64>,
    pub weekly_limit: Option<i64>,
    pub monthly_limit: Option<i64>,
    pub total_limit: Option<i64>,
}

/// POST /api/admin/keys/:id/adjust-quota
///
/// Partial limit update; negative values are ignored
pub async fn adjust_quota(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TenantId>,
    Json(input): Json<AdjustQuotaRequest>,
) -> Result<Json<Tenant>, ApiError> {
    let existing = fetch(&state, id).await?;

    let non_negative = |limit: Option<i64>| limit.filter(|v| *v >= 0);
    let update = UpdateTenant {
        minute_limit: non_negative(input.minute_limit),
        daily_limit: non_negative(input.daily_limit),
        weekly_limit: non_negative(input.weekly_limit),
        monthly_limit: non_negative(input.monthly_limit),
        total_limit: non_negative(input.total_limit),
        ..Default::default()
    };

    repo(&state).update(id, update).await?;
    state.quota.invalidate(&existing.secret).await?;

    Ok(Json(fetch(&state, id).await?))
}
