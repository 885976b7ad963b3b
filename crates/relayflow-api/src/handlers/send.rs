//! Email submission handler

use crate::auth::{ApiError, AppState, AuthTenant};
use axum::extract::State;
use axum::{Extension, Json};
use relayflow_core::quota::QuotaDecision;
use relayflow_core::EmailTask;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Request body for submitting an email
#[derive(Debug, Deserialize)]
pub struct SendEmailRequest {
    pub to: Vec<String>,
    pub subject: String,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Response after a task is queued
#[derive(Debug, Serialize)]
pub struct SendEmailResponse {
    pub message: String,
    pub count: usize,
}

/// POST /api/v1/send
///
/// Validates the submission, runs the quota pre-check, and enqueues one
/// task. Delivery happens asynchronously; a 200 here only means the
/// task was accepted.
pub async fn send_email(
    State(state): State<Arc<AppState>>,
    Extension(AuthTenant(tenant)): Extension<AuthTenant>,
    Json(input): Json<SendEmailRequest>,
) -> Result<Json<SendEmailResponse>, ApiError> {
    if input.to.is_empty() {
        return Err(ApiError::bad_request("at least one recipient is required"));
    }
    if input.subject.is_empty() {
        return Err(ApiError::bad_request("subject is required"));
    }

    let task = EmailTask {
        tenant_id: tenant.id,
        to: input.to,
        subject: input.subject,
        html: input.html,
        text: input.text,
    };
    if !task.has_body() {
        return Err(ApiError::bad_request(
            "either html or text body is required",
        ));
    }

    if let QuotaDecision::Denied { reason, .. } = state.quota.can_send(&tenant).await? {
        return Err(ApiError::too_many_requests(reason));
    }

    state.queue.push(&task).await?;

    Ok(Json(SendEmailResponse {
        message: "queued for delivery".to_string(),
        count: task.to.len(),
    }))
}
