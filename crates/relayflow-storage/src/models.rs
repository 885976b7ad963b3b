//! Database models

use chrono::{DateTime, NaiveDate, Utc};
use relayflow_common::types::{PlanId, RelayId, TenantId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A named preset of per-window limits assignable to tenants
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub code: String,
    pub name: String,
    pub description: String,
    /// Per-window limits; 0 means unlimited
    pub minute_limit: i64,
    pub daily_limit: i64,
    pub weekly_limit: i64,
    pub monthly_limit: i64,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating or updating a plan
#[derive(Debug, Clone, Deserialize)]
pub struct PlanInput {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub minute_limit: i64,
    #[serde(default)]
    pub daily_limit: i64,
    #[serde(default)]
    pub weekly_limit: i64,
    #[serde(default)]
    pub monthly_limit: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub sort_order: i32,
}

fn default_true() -> bool {
    true
}

/// An identified API client with quota limits
///
/// When `plan_id` is set and `is_custom` is false the four per-window
/// limits mirror the plan's; a custom tenant has no plan reference.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    /// Opaque API secret presented in `X-API-Key`
    pub secret: String,
    pub name: String,
    pub plan_id: Option<PlanId>,
    pub is_custom: bool,
    pub minute_limit: i64,
    pub daily_limit: i64,
    pub weekly_limit: i64,
    pub monthly_limit: i64,
    /// Lifetime cap; 0 means unlimited
    pub total_limit: i64,
    pub total_used: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a tenant
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTenant {
    pub name: String,
    pub plan_id: Option<PlanId>,
    #[serde(default)]
    pub is_custom: bool,
    #[serde(default)]
    pub minute_limit: i64,
    #[serde(default)]
    pub daily_limit: i64,
    #[serde(default)]
    pub weekly_limit: i64,
    #[serde(default)]
    pub monthly_limit: i64,
    #[serde(default)]
    pub total_limit: i64,
}

/// Partial update for a tenant; `None` fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTenant {
    pub name: Option<String>,
    pub plan_id: Option<PlanId>,
    pub is_custom: Option<bool>,
    pub minute_limit: Option<i64>,
    pub daily_limit: Option<i64>,
    pub weekly_limit: Option<i64>,
    pub monthly_limit: Option<i64>,
    pub total_limit: Option<i64>,
    pub status: Option<String>,
}

/// An upstream SMTP server with credentials and fan-out caps
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SmtpRelay {
    pub id: RelayId,
    pub name: String,
    pub host: String,
    pub port: i32,
    pub username: String,
    pub password: String,
    /// `plain` or `xoauth2`
    pub auth_method: String,
    /// `ssl`, `tls`/`starttls` or `none`
    pub encryption: String,
    pub from_email: String,
    pub from_name: String,
    pub max_per_hour: i64,
    /// Daily cap; 0 means unlimited
    pub max_per_day: i64,
    /// Higher priority relays are preferred
    pub priority: i32,
    pub status: String,
    pub failure_count: i32,
    pub last_failed_at: Option<DateTime<Utc>>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub auto_recover_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a relay
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRelay {
    pub name: String,
    pub host: String,
    pub port: i32,
    pub username: String,
    pub password: String,
    #[serde(default = "default_auth_method")]
    pub auth_method: String,
    #[serde(default = "default_encryption")]
    pub encryption: String,
    pub from_email: String,
    #[serde(default)]
    pub from_name: String,
    #[serde(default = "default_max_per_hour")]
    pub max_per_hour: i64,
    #[serde(default)]
    pub max_per_day: i64,
    #[serde(default = "default_priority")]
    pub priority: i32,
}

fn default_auth_method() -> String {
    "plain".to_string()
}

fn default_encryption() -> String {
    "starttls".to_string()
}

fn default_max_per_hour() -> i64 {
    100
}

fn default_priority() -> i32 {
    1
}

/// Partial update for a relay; `None` fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRelay {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<i32>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub auth_method: Option<String>,
    pub encryption: Option<String>,
    pub from_email: Option<String>,
    pub from_name: Option<String>,
    pub max_per_hour: Option<i64>,
    pub max_per_day: Option<i64>,
    pub priority: Option<i32>,
    pub status: Option<String>,
}

/// Health-state columns updated by the health controller
#[derive(Debug, Clone)]
pub struct RelayHealthUpdate {
    pub status: String,
    pub failure_count: i32,
    pub last_failed_at: Option<DateTime<Utc>>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub auto_recover_at: Option<DateTime<Utc>>,
}

/// Append-only per-recipient delivery record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SendLog {
    pub id: i64,
    pub tenant_id: TenantId,
    pub recipient: String,
    pub subject: String,
    pub status: String,
    pub error_msg: Option<String>,
    /// 0 when no relay accepted the message
    pub relay_id: RelayId,
    pub created_at: DateTime<Utc>,
}

/// Input for appending a send log row
#[derive(Debug, Clone)]
pub struct NewSendLog {
    pub tenant_id: TenantId,
    pub recipient: String,
    pub subject: String,
    pub status: String,
    pub error_msg: Option<String>,
    pub relay_id: RelayId,
}

/// Filter for send log queries; `None` fields are not constrained
#[derive(Debug, Clone, Default)]
pub struct SendLogQuery {
    pub tenant_id: Option<TenantId>,
    pub relay_id: Option<RelayId>,
    pub status: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Durable daily rollup reconciled from hot counters
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UsageStats {
    pub id: i64,
    pub tenant_id: TenantId,
    pub date: NaiveDate,
    pub sent_count: i64,
    pub failed_count: i64,
    pub updated_at: DateTime<Utc>,
}

/// Token granting access to the admin API
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AdminToken {
    pub id: i64,
    pub token: String,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
