//! Quota engine
//!
//! Multi-window rate limiting: a read-only pre-check before a task is
//! accepted and an atomic consume after each recipient-level SMTP success.
//! The pre-check and the consume race by design; limits are soft against
//! concurrent submissions at the boundary, never against accounting.

use crate::keys;
use chrono::{Local, NaiveTime};
use relayflow_common::types::{tenant_status, QuotaWindow, TenantId};
use relayflow_common::{Error, Result};
use relayflow_storage::models::Tenant;
use relayflow_storage::{KvStore, TenantRepository};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const MINUTE_TTL: Duration = Duration::from_secs(60);
const DAILY_TTL: Duration = Duration::from_secs(48 * 60 * 60);
const WEEKLY_TTL: Duration = Duration::from_secs(8 * 24 * 60 * 60);
const MONTHLY_TTL: Duration = Duration::from_secs(32 * 24 * 60 * 60);

/// TTL of the cached tenant view
pub const TENANT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Tenant view cached under `apikey:<secret>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedTenant {
    pub id: TenantId,
    pub name: String,
    pub minute_limit: i64,
    pub daily_limit: i64,
    pub weekly_limit: i64,
    pub monthly_limit: i64,
    pub total_limit: i64,
    pub status: String,
}

impl From<&Tenant> for CachedTenant {
    fn from(tenant: &Tenant) -> Self {
        Self {
            id: tenant.id,
            name: tenant.name.clone(),
            minute_limit: tenant.minute_limit,
            daily_limit: tenant.daily_limit,
            weekly_limit: tenant.weekly_limit,
            monthly_limit: tenant.monthly_limit,
            total_limit: tenant.total_limit,
            status: tenant.status.clone(),
        }
    }
}

impl CachedTenant {
    pub fn is_active(&self) -> bool {
        self.status == tenant_status::ACTIVE
    }

    fn limit_for(&self, window: QuotaWindow) -> i64 {
        match window {
            QuotaWindow::Minute => self.minute_limit,
            QuotaWindow::Daily => self.daily_limit,
            QuotaWindow::Weekly => self.weekly_limit,
            QuotaWindow::Monthly => self.monthly_limit,
            QuotaWindow::Total => self.total_limit,
        }
    }
}

/// Outcome of a pre-check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed,
    Denied { window: QuotaWindow, reason: String },
}

/// Per-window usage view for the quota endpoints
#[derive(Debug, Clone, Serialize)]
pub struct WindowUsage {
    pub limit: i64,
    pub used: i64,
    pub remaining: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_in: Option<i64>,
}

/// Which counters an admin reset clears
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetScope {
    Window(QuotaWindow),
    All,
}

impl ResetScope {
    pub fn parse(s: &str) -> Option<Self> {
        if s == "all" {
            Some(ResetScope::All)
        } else {
            QuotaWindow::parse(s).map(ResetScope::Window)
        }
    }
}

/// Multi-window quota gate backed by hot counters
pub struct QuotaEngine {
    kv: Arc<dyn KvStore>,
    tenants: Arc<dyn TenantRepository>,
}

impl QuotaEngine {
    pub fn new(kv: Arc<dyn KvStore>, tenants: Arc<dyn TenantRepository>) -> Self {
        Self { kv, tenants }
    }

    fn window_key(&self, window: QuotaWindow, tenant_id: TenantId) -> String {
        let today = keys::today();
        match window {
            QuotaWindow::Minute => keys::minute(tenant_id),
            QuotaWindow::Daily => keys::daily(tenant_id, today),
            QuotaWindow::Weekly => keys::weekly(tenant_id, today),
            QuotaWindow::Monthly => keys::monthly(tenant_id, today),
            QuotaWindow::Total => keys::total(tenant_id),
        }
    }

    /// Pre-check every non-zero window limit in minute → day → week →
    /// month → total order. The first exhausted window wins. Does not
    /// touch any counter.
    pub async fn can_send(&self, tenant: &CachedTenant) -> Result<QuotaDecision> {
        for window in QuotaWindow::ALL {
            let limit = tenant.limit_for(window);
            if limit <= 0 {
                continue;
            }
            let count = self
                .kv
                .get_i64(&self.window_key(window, tenant.id))
                .await?
                .unwrap_or(0);
            if count >= limit {
                debug!(
                    tenant_id = tenant.id,
                    window = %window,
                    count,
                    limit,
                    "Quota pre-check denied"
                );
                return Ok(QuotaDecision::Denied {
                    window,
                    reason: denial_reason(window, limit),
                });
            }
        }
        Ok(QuotaDecision::Allowed)
    }

    /// Consume one unit from every window after a recipient-level SMTP
    /// success. Each counter gets its TTL on first increment; the total
    /// counter never expires.
    pub async fn consume(&self, tenant_id: TenantId) -> Result<()> {
        let today = keys::today();
        self.kv
            .incr(&keys::minute(tenant_id), Some(MINUTE_TTL))
            .await?;
        self.kv
            .incr(&keys::daily(tenant_id, today), Some(DAILY_TTL))
            .await?;
        self.kv
            .incr(&keys::weekly(tenant_id, today), Some(WEEKLY_TTL))
            .await?;
        self.kv
            .incr(&keys::monthly(tenant_id, today), Some(MONTHLY_TTL))
            .await?;
        self.kv.incr(&keys::total(tenant_id), None).await?;
        Ok(())
    }

    /// Resolve an API secret to a tenant view, via the 5-minute cache
    pub async fn authenticate(&self, secret: &str) -> Result<Option<CachedTenant>> {
        let cache_key = keys::apikey(secret);
        if let Some(cached) = self.kv.get_string(&cache_key).await? {
            if let Ok(tenant) = serde_json::from_str::<CachedTenant>(&cached) {
                return Ok(Some(tenant));
            }
        }

        let Some(tenant) = self.tenants.get_by_secret(secret).await? else {
            return Ok(None);
        };

        let cached = CachedTenant::from(&tenant);
        let payload = serde_json::to_string(&cached)
            .map_err(|e| Error::Internal(format!("Failed to encode tenant cache: {}", e)))?;
        self.kv
            .set_string(&cache_key, &payload, Some(TENANT_CACHE_TTL))
            .await?;

        Ok(Some(cached))
    }

    /// Drop the cached view after any durable mutation of the tenant
    pub async fn invalidate(&self, secret: &str) -> Result<()> {
        self.kv.delete(&keys::apikey(secret)).await
    }

    /// Per-window usage for every window with a non-zero limit
    pub async fn remaining(&self, tenant: &Tenant) -> Result<BTreeMap<&'static str, WindowUsage>> {
        let mut view = BTreeMap::new();
        let cached = CachedTenant::from(tenant);

        for window in QuotaWindow::ALL {
            let limit = cached.limit_for(window);
            if limit <= 0 {
                continue;
            }
            let key = self.window_key(window, tenant.id);
            let used = self.kv.get_i64(&key).await?.unwrap_or(0);

            let (reset_at, reset_in) = match window {
                QuotaWindow::Minute => {
                    let ttl = self.kv.ttl(&key).await?;
                    (None, ttl.map(|t| t.as_secs() as i64))
                }
                QuotaWindow::Daily => {
                    let reset = next_midnight();
                    let reset_in = (reset - Local::now().naive_local()).num_seconds();
                    (
                        Some(reset.format("%Y-%m-%d %H:%M:%S").to_string()),
                        Some(reset_in),
                    )
                }
                _ => (None, None),
            };

            view.insert(
                window.as_str(),
                WindowUsage {
                    limit,
                    used,
                    remaining: (limit - used).max(0),
                    reset_at,
                    reset_in,
                },
            );
        }

        Ok(view)
    }

    /// Delete quota counters; `All` clears every window in one pipelined
    /// call
    pub async fn reset(&self, tenant_id: TenantId, scope: ResetScope) -> Result<()> {
        match scope {
            ResetScope::Window(window) => self.kv.delete(&self.window_key(window, tenant_id)).await,
            ResetScope::All => {
                let keys: Vec<String> = QuotaWindow::ALL
                    .iter()
                    .map(|w| self.window_key(*w, tenant_id))
                    .collect();
                self.kv.delete_many(&keys).await
            }
        }
    }
}

fn next_midnight() -> chrono::NaiveDateTime {
    (keys::today() + chrono::Days::new(1)).and_time(NaiveTime::MIN)
}

fn denial_reason(window: QuotaWindow, limit: i64) -> String {
    match window {
        QuotaWindow::Minute => {
            format!("minute limit exceeded ({}), resets in 1 minute", limit)
        }
        QuotaWindow::Daily => format!(
            "daily limit exceeded ({}), resets at {}",
            limit,
            next_midnight().format("%Y-%m-%d %H:%M:%S")
        ),
        QuotaWindow::Weekly => format!(
            "weekly limit exceeded ({}), resets Monday at 00:00",
            limit
        ),
        QuotaWindow::Monthly => format!(
            "monthly limit exceeded ({}), resets on the 1st at 00:00",
            limit
        ),
        QuotaWindow::Total => format!("total limit exceeded ({})", limit),
    }
}
