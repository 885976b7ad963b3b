//! Admin login and logout

use crate::auth::{random_token, ApiError, AppState, SESSION_COOKIE};
use crate::handlers::admin::Message;
use axum::extract::State;
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use relayflow_core::keys;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Admin sessions live for a week; the KV TTL is the source of truth
const SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// POST /admin/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(input): Json<LoginRequest>,
) -> Result<(CookieJar, Json<Message>), ApiError> {
    if input.username != state.admin.username || input.password != state.admin.password {
        warn!("Rejected admin login attempt");
        return Err(ApiError::unauthorized("invalid username or password"));
    }

    let session_id = random_token(48);
    state
        .kv
        .set_string(&keys::session(&session_id), "1", Some(SESSION_TTL))
        .await?;

    info!("Admin session opened");
    let cookie = Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .build();

    Ok((jar.add(cookie), Json(Message::new("login successful"))))
}

/// POST /admin/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<Message>), ApiError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.kv.delete(&keys::session(cookie.value())).await?;
    }

    let jar = jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/").build());
    Ok((jar, Json(Message::new("logged out"))))
}
