//! Unauthenticated public endpoints

use crate::auth::{ApiError, AppState};
use axum::extract::State;
use axum::Json;
use relayflow_storage::models::Plan;
use relayflow_storage::{DbPlanRepository, PlanRepository};
use std::sync::Arc;

/// GET /api/public/plans
pub async fn list_plans(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Plan>>, ApiError> {
    let plans = DbPlanRepository::new(state.db.clone()).list(true).await?;
    Ok(Json(plans))
}
