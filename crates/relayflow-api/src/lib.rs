//! HTTP surface: tenant-facing v1 API and the admin API

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::AppState;
pub use routes::create_router;
