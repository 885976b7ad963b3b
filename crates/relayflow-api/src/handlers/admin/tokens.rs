//! Admin token administration

use crate::auth::{random_token, ApiError, AppState};
use crate::handlers::admin::Message;
use axum::extract::{Path, State};
use axum::Json;
use relayflow_storage::models::AdminToken;
use relayflow_storage::{AdminTokenRepository, DbAdminTokenRepository};
use serde::Deserialize;
use std::sync::Arc;

fn repo(state: &AppState) -> DbAdminTokenRepository {
    DbAdminTokenRepository::new(state.db.clone())
}

/// GET /api/admin/admin-tokens
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<AdminToken>>, ApiError> {
    Ok(Json(repo(&state).list().await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// POST /api/admin/admin-tokens
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateTokenRequest>,
) -> Result<Json<AdminToken>, ApiError> {
    if input.name.is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    let token = format!("rfa_{}", random_token(40));
    Ok(Json(
        repo(&state)
            .create(&token, &input.name, &input.description)
            .await?,
    ))
}

/// DELETE /api/admin/admin-tokens/:id
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Message>, ApiError> {
    repo(&state).delete(id).await?;
    Ok(Json(Message::new("token deleted")))
}

/// PUT /api/admin/admin-tokens/:id/toggle
pub async fn toggle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Message>, ApiError> {
    let repo = repo(&state);
    let token = repo
        .list()
        .await?
        .into_iter()
        .find(|t| t.id == id)
        .ok_or_else(|| ApiError::not_found("token not found"))?;
    repo.set_active(id, !token.is_active).await?;
    Ok(Json(Message::new(if token.is_active {
        "token disabled"
    } else {
        "token enabled"
    })))
}
