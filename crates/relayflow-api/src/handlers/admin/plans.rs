//! Plan administration

use crate::auth::{ApiError, AppState};
use crate::handlers::admin::Message;
use axum::extract::{Path, State};
use axum::Json;
use relayflow_common::types::PlanId;
use relayflow_storage::models::{Plan, PlanInput};
use relayflow_storage::{DbPlanRepository, PlanRepository};
use std::sync::Arc;

fn repo(state: &AppState) -> DbPlanRepository {
    DbPlanRepository::new(state.db.clone())
}

/// GET /api/admin/plans
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Plan>>, ApiError> {
    Ok(Json(repo(&state).list(false).await?))
}

/// POST /api/admin/plans
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(input): Json<PlanInput>,
) -> Result<Json<Plan>, ApiError> {
    if input.code.is_empty() || input.name.is_empty() {
        return Err(ApiError::bad_request("code and name are required"));
    }
    Ok(Json(repo(&state).create(input).await?))
}

/// PUT /api/admin/plans/:id
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<PlanId>,
    Json(input): Json<PlanInput>,
) -> Result<Json<Message>, ApiError> {
    let repo = repo(&state);
    repo.get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("plan not found"))?;
    repo.update(id, input).await?;
    Ok(Json(Message::new("plan updated")))
}

/// DELETE /api/admin/plans/:id
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<PlanId>,
) -> Result<Json<Message>, ApiError> {
    let repo = repo(&state);
    repo.get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("plan not found"))?;

    let referenced = repo.tenants_using(id).await?;
    if referenced > 0 {
        return Err(ApiError::bad_request(format!(
            "plan is referenced by {} tenant(s)",
            referenced
        )));
    }

    repo.delete(id).await?;
    Ok(Json(Message::new("plan deleted")))
}

/// PUT /api/admin/plans/:id/toggle
pub async fn toggle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<PlanId>,
) -> Result<Json<Message>, ApiError> {
    let repo = repo(&state);
    let plan = repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("plan not found"))?;
    repo.set_active(id, !plan.is_active).await?;
    Ok(Json(Message::new(if plan.is_active {
        "plan disabled"
    } else {
        "plan enabled"
    })))
}
