//! Router assembly

use crate::auth::{admin_auth, tenant_auth, AppState};
use crate::handlers::{admin, logs, public, quota, send, usage};
use axum::routing::{delete, get, post, put};
use axum::{middleware, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the full application router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Public routes (no auth)
    let public_routes = Router::new().route("/plans", get(public::list_plans));

    // Tenant-facing v1 API
    let tenant_routes = Router::new()
        .route("/send", post(send::send_email))
        .route("/quota", get(quota::get_quota))
        .route("/usage", get(usage::get_usage))
        .route("/logs", get(logs::get_logs))
        .layer(middleware::from_fn_with_state(state.clone(), tenant_auth));

    // Admin API
    let admin_routes = Router::new()
        .route("/plans", get(admin::plans::list).post(admin::plans::create))
        .route(
            "/plans/:id",
            put(admin::plans::update).delete(admin::plans::delete),
        )
        .route("/plans/:id/toggle", put(admin::plans::toggle))
        .route(
            "/keys",
            get(admin::tenants::list).post(admin::tenants::create),
        )
        .route(
            "/keys/:id",
            put(admin::tenants::update).delete(admin::tenants::delete),
        )
        .route("/keys/:id/quota", get(admin::tenants::get_quota))
        .route("/keys/:id/reset-quota", post(admin::tenants::reset_quota))
        .route("/keys/:id/adjust-quota", post(admin::tenants::adjust_quota))
        .route("/keys/batch-delete", post(admin::tenants::batch_delete))
        .route("/keys/batch-status", post(admin::tenants::batch_status))
        .route(
            "/smtp-configs",
            get(admin::relays::list).post(admin::relays::create),
        )
        .route(
            "/smtp-configs/:id",
            put(admin::relays::update).delete(admin::relays::delete),
        )
        .route(
            "/smtp-configs/batch-import",
            post(admin::relays::batch_import),
        )
        .route(
            "/smtp-configs/batch-delete",
            post(admin::relays::batch_delete),
        )
        .route(
            "/smtp-configs/batch-status",
            post(admin::relays::batch_status),
        )
        .route("/smtp-configs/batch-test", post(admin::relays::batch_test))
        .route("/smtp-configs/:id/test", post(admin::relays::test))
        .route("/smtp-configs/:id/pause", post(admin::relays::pause))
        .route("/smtp-configs/:id/resume", post(admin::relays::resume))
        .route(
            "/smtp-configs/:id/reset-quota",
            post(admin::relays::reset_quota),
        )
        .route("/smtp-configs/:id/health", get(admin::relays::health))
        .route("/stats", get(admin::stats::overview))
        .route("/stats/period", get(admin::stats::period))
        .route("/key-stats", get(admin::stats::key_stats))
        .route("/key-stats-detail", get(admin::stats::key_stats_detail))
        .route("/smtp-stats", get(admin::stats::smtp_stats))
        .route("/trend", get(admin::stats::trend))
        .route("/logs", get(admin::stats::logs))
        .route(
            "/admin-tokens",
            get(admin::tokens::list).post(admin::tokens::create),
        )
        .route("/admin-tokens/:id", delete(admin::tokens::delete))
        .route("/admin-tokens/:id/toggle", put(admin::tokens::toggle))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth));

    Router::new()
        .nest("/api/public", public_routes)
        .nest("/api/v1", tenant_routes)
        .nest("/api/admin", admin_routes)
        .route("/admin/login", post(admin::auth::login))
        .route("/admin/logout", post(admin::auth::logout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
