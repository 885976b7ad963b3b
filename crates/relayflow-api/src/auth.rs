//! Application state, error mapping and the two auth middlewares

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use relayflow_common::config::AdminConfig;
use relayflow_core::keys;
use relayflow_core::{LoadBalancer, QuotaEngine, RelayProbe, StatsService, TaskQueue};
use relayflow_core::quota::CachedTenant;
use relayflow_storage::{AdminTokenRepository, DatabasePool, DbAdminTokenRepository, KvStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, warn};

/// Name of the admin session cookie
pub const SESSION_COOKIE: &str = "relayflow_session";

/// Application state shared across handlers
pub struct AppState {
    pub db: DatabasePool,
    pub kv: Arc<dyn KvStore>,
    pub quota: Arc<QuotaEngine>,
    pub queue: Arc<TaskQueue>,
    pub stats: Arc<StatsService>,
    pub balancer: Arc<LoadBalancer>,
    pub probe: Arc<dyn RelayProbe>,
    pub admin: AdminConfig,
}

/// JSON error body returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Error type handlers return; renders as `{"error": "..."}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<relayflow_common::Error> for ApiError {
    fn from(err: relayflow_common::Error) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %err, "Request failed");
        }
        Self::new(status, err.to_string())
    }
}

/// Authenticated tenant context stored in request extensions
#[derive(Debug, Clone)]
pub struct AuthTenant(pub CachedTenant);

/// Tenant authentication middleware for `/api/v1`
pub async fn tenant_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let secret = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::unauthorized("missing API key"))?
        .to_string();

    let tenant = state
        .quota
        .authenticate(&secret)
        .await?
        .ok_or_else(|| {
            warn!("Rejected unknown API key");
            ApiError::unauthorized("invalid API key")
        })?;

    if !tenant.is_active() {
        return Err(ApiError::forbidden("API key is disabled"));
    }

    request.extensions_mut().insert(AuthTenant(tenant));
    Ok(next.run(request).await)
}

/// Admin authentication middleware for `/api/admin`
///
/// Accepts an `X-Admin-Token` header backed by the `admin_tokens` table,
/// or the KV-backed session cookie issued by the login endpoint.
pub async fn admin_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(token) = request
        .headers()
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        let repo = DbAdminTokenRepository::new(state.db.clone());
        if let Some(row) = repo.find_active(token).await? {
            let touch_repo = DbAdminTokenRepository::new(state.db.clone());
            tokio::spawn(async move {
                if let Err(e) = touch_repo.touch_last_used(row.id).await {
                    error!(error = %e, "Failed to update admin token last_used_at");
                }
            });
            return Ok(next.run(request).await);
        }
    }

    let jar = CookieJar::from_headers(request.headers());
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if state
            .kv
            .get_string(&keys::session(cookie.value()))
            .await?
            .is_some()
        {
            return Ok(next.run(request).await);
        }
    }

    Err(ApiError::unauthorized("admin authentication required"))
}

/// Random alphanumeric token, used for API secrets, admin tokens and
/// session ids
pub fn random_token(len: usize) -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_tokens_are_unique_and_sized() {
        let a = random_token(32);
        let b = random_token(32);
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
