//! Repository traits and their sqlx implementations

pub mod admin_tokens;
pub mod plans;
pub mod relays;
pub mod send_logs;
pub mod tenants;
pub mod usage_stats;
