//! SMTP relay administration

use crate::auth::{ApiError, AppState};
use crate::handlers::admin::Message;
use axum::extract::{Path, State};
use axum::Json;
use relayflow_common::types::{relay_status, RelayId};
use relayflow_storage::models::{CreateRelay, RelayHealthUpdate, SmtpRelay, UpdateRelay};
use relayflow_storage::{DbSmtpRelayRepository, SmtpRelayRepository};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn repo(state: &AppState) -> DbSmtpRelayRepository {
    DbSmtpRelayRepository::new(state.db.clone())
}

async fn fetch(state: &AppState, id: RelayId) -> Result<SmtpRelay, ApiError> {
    repo(state)
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("relay not found"))
}

/// GET /api/admin/smtp-configs
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<SmtpRelay>>, ApiError> {
    Ok(Json(repo(&state).list().await?))
}

/// POST /api/admin/smtp-configs
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateRelay>,
) -> Result<Json<SmtpRelay>, ApiError> {
    if input.host.is_empty() || input.from_email.is_empty() {
        return Err(ApiError::bad_request("host and from_email are required"));
    }
    if input.max_per_hour <= 0 {
        return Err(ApiError::bad_request("max_per_hour must be positive"));
    }
    Ok(Json(repo(&state).create(input).await?))
}

/// PUT /api/admin/smtp-configs/:id
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RelayId>,
    Json(input): Json<UpdateRelay>,
) -> Result<Json<SmtpRelay>, ApiError> {
    fetch(&state, id).await?;
    repo(&state).update(id, input).await?;
    Ok(Json(fetch(&state, id).await?))
}

/// DELETE /api/admin/smtp-configs/:id
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RelayId>,
) -> Result<Json<Message>, ApiError> {
    fetch(&state, id).await?;
    repo(&state).delete(id).await?;
    Ok(Json(Message::new("relay deleted")))
}

#[derive(Debug, Deserialize)]
pub struct BatchImport {
    pub configs: Vec<CreateRelay>,
}

/// POST /api/admin/smtp-configs/batch-import
pub async fn batch_import(
    State(state): State<Arc<AppState>>,
    Json(input): Json<BatchImport>,
) -> Result<Json<Message>, ApiError> {
    if input.configs.is_empty() {
        return Err(ApiError::bad_request("configs must not be empty"));
    }

    let repo = repo(&state);
    let mut imported = 0;
    for config in input.configs {
        if config.host.is_empty() || config.from_email.is_empty() || config.max_per_hour <= 0 {
            continue;
        }
        repo.create(config).await?;
        imported += 1;
    }
    Ok(Json(Message::new(format!("{} relay(s) imported", imported))))
}

#[derive(Debug, Deserialize)]
pub struct BatchIds {
    pub ids: Vec<RelayId>,
}

/// POST /api/admin/smtp-configs/batch-delete
pub async fn batch_delete(
    State(state): State<Arc<AppState>>,
    Json(input): Json<BatchIds>,
) -> Result<Json<Message>, ApiError> {
    if input.ids.is_empty() {
        return Err(ApiError::bad_request("ids must not be empty"));
    }
    let deleted = repo(&state).delete_many(&input.ids).await?;
    Ok(Json(Message::new(format!("{} relay(s) deleted", deleted))))
}

#[derive(Debug, Deserialize)]
pub struct BatchStatus {
    pub ids: Vec<RelayId>,
    pub status: String,
}

/// POST /api/admin/smtp-configs/batch-status
pub async fn batch_status(
    State(state): State<Arc<AppState>>,
    Json(input): Json<BatchStatus>,
) -> Result<Json<Message>, ApiError> {
    if !matches!(
        input.status.as_str(),
        relay_status::ACTIVE | relay_status::PAUSED
    ) {
        return Err(ApiError::bad_request("invalid status"));
    }
    let updated = repo(&state)
        .set_status_many(&input.ids, &input.status)
        .await?;
    Ok(Json(Message::new(format!("{} relay(s) updated", updated))))
}

#[derive(Debug, Serialize)]
pub struct TestResult {
    pub id: RelayId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /api/admin/smtp-configs/:id/test
///
/// Probes the relay now; the outcome is reported in the body, the
/// request itself succeeds either way.
pub async fn test(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RelayId>,
) -> Result<Json<TestResult>, ApiError> {
    let relay = fetch(&state, id).await?;
    let result = state.probe.probe(&relay).await;
    Ok(Json(TestResult {
        id,
        name: Some(relay.name),
        success: result.is_ok(),
        error: result.err().map(|e| e.to_string()),
    }))
}

/// POST /api/admin/smtp-configs/batch-test
pub async fn batch_test(
    State(state): State<Arc<AppState>>,
    Json(input): Json<BatchIds>,
) -> Result<Json<Vec<TestResult>>, ApiError> {
    let repo = repo(&state);
    let mut results = Vec::with_capacity(input.ids.len());
    for id in input.ids {
        match repo.get(id).await? {
            Some(relay) => {
                let result = state.probe.probe(&relay).await;
                results.push(TestResult {
                    id,
                    name: Some(relay.name),
                    success: result.is_ok(),
                    error: result.err().map(|e| e.to_string()),
                });
            }
            None => results.push(TestResult {
                id,
                name: None,
                success: false,
                error: Some("relay not found".to_string()),
            }),
        }
    }
    Ok(Json(results))
}

/// POST /api/admin/smtp-configs/:id/pause
pub async fn pause(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RelayId>,
) -> Result<Json<Message>, ApiError> {
    fetch(&state, id).await?;
    repo(&state).set_status(id, relay_status::PAUSED).await?;
    Ok(Json(Message::new("relay paused")))
}

/// POST /api/admin/smtp-configs/:id/resume
///
/// Manual resume clears the failure state like a successful recovery
/// probe would
pub async fn resume(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RelayId>,
) -> Result<Json<Message>, ApiError> {
    let relay = fetch(&state, id).await?;
    repo(&state)
        .save_health(
            id,
            RelayHealthUpdate {
                status: relay_status::ACTIVE.to_string(),
                failure_count: 0,
                last_failed_at: None,
                last_checked_at: relay.last_checked_at,
                auto_recover_at: None,
            },
        )
        .await?;
    Ok(Json(Message::new("relay resumed")))
}

/// POST /api/admin/smtp-configs/:id/reset-quota
pub async fn reset_quota(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RelayId>,
) -> Result<Json<Message>, ApiError> {
    fetch(&state, id).await?;
    state.balancer.reset_counters(id).await?;
    Ok(Json(Message::new("relay counters reset")))
}

#[derive(Debug, Serialize)]
pub struct RelayHealth {
    pub id: RelayId,
    pub name: String,
    pub status: String,
    pub failure_count: i32,
    pub last_failed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_checked_at: Option<chrono::DateTime<chrono::Utc>>,
    pub auto_recover_at: Option<chrono::DateTime<chrono::Utc>>,
    pub hour_count: i64,
    pub hour_limit: i64,
    pub day_count: i64,
    pub day_limit: i64,
}

/// GET /api/admin/smtp-configs/:id/health
pub async fn health(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RelayId>,
) -> Result<Json<RelayHealth>, ApiError> {
    let relay = fetch(&state, id).await?;
    let (hour_count, day_count) = state.balancer.current_usage(id).await?;
    Ok(Json(RelayHealth {
        id: relay.id,
        name: relay.name,
        status: relay.status,
        failure_count: relay.failure_count,
        last_failed_at: relay.last_failed_at,
        last_checked_at: relay.last_checked_at,
        auto_recover_at: relay.auto_recover_at,
        hour_count,
        hour_limit: relay.max_per_hour,
        day_count,
        day_limit: relay.max_per_day,
    }))
}
