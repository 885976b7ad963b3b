//! Storage layer: PostgreSQL repositories and the KV/counter store

pub mod db;
pub mod kv;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use kv::{KvStore, MemoryStore, RedisStore};
pub use repository::admin_tokens::{AdminTokenRepository, DbAdminTokenRepository};
pub use repository::plans::{DbPlanRepository, PlanRepository};
pub use repository::relays::{DbSmtpRelayRepository, SmtpRelayRepository};
pub use repository::send_logs::{DbSendLogRepository, SendLogRepository};
pub use repository::tenants::{DbTenantRepository, TenantRepository};
pub use repository::usage_stats::{DbUsageStatsRepository, UsageStatsRepository};
