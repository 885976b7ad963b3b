//! In-memory repository doubles for pipeline tests

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use relayflow_common::types::{relay_status, tenant_status, RelayId, TenantId};
use relayflow_common::Result;
use relayflow_storage::models::{
    CreateRelay, CreateTenant, NewSendLog, RelayHealthUpdate, SendLog, SendLogQuery, SmtpRelay,
    Tenant, UpdateRelay, UpdateTenant, UsageStats,
};
use relayflow_storage::{
    SendLogRepository, SmtpRelayRepository, TenantRepository, UsageStatsRepository,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn tenant_fixture(id: TenantId) -> Tenant {
    let now = Utc::now();
    Tenant {
        id,
        secret: format!("rf_secret_{}", id),
        name: format!("tenant-{}", id),
        plan_id: None,
        is_custom: true,
        minute_limit: 0,
        daily_limit: 0,
        weekly_limit: 0,
        monthly_limit: 0,
        total_limit: 0,
        total_used: 0,
        status: tenant_status::ACTIVE.to_string(),
        created_at: now,
        updated_at: now,
    }
}

pub fn relay_fixture(id: RelayId, priority: i32, max_per_hour: i64) -> SmtpRelay {
    let now = Utc::now();
    SmtpRelay {
        id,
        name: format!("relay-{}", id),
        host: format!("smtp{}.example.com", id),
        port: 587,
        username: "mailer".to_string(),
        password: "secret".to_string(),
        auth_method: "plain".to_string(),
        encryption: "starttls".to_string(),
        from_email: "noreply@example.com".to_string(),
        from_name: String::new(),
        max_per_hour,
        max_per_day: 0,
        priority,
        status: relay_status::ACTIVE.to_string(),
        failure_count: 0,
        last_failed_at: None,
        last_checked_at: None,
        auto_recover_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// Tenant repository backed by a map, counting durable lookups
pub struct MemTenantRepo {
    tenants: Mutex<HashMap<TenantId, Tenant>>,
    lookups: AtomicUsize,
}

impl MemTenantRepo {
    pub fn new(tenants: Vec<Tenant>) -> Self {
        Self {
            tenants: Mutex::new(tenants.into_iter().map(|t| (t.id, t)).collect()),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn set_minute_limit(&self, id: TenantId, limit: i64) {
        if let Some(tenant) = self.tenants.lock().unwrap().get_mut(&id) {
            tenant.minute_limit = limit;
        }
    }

    pub fn total_used(&self, id: TenantId) -> i64 {
        self.tenants
            .lock()
            .unwrap()
            .get(&id)
            .map(|t| t.total_used)
            .unwrap_or(0)
    }
}

#[async_trait]
impl TenantRepository for MemTenantRepo {
    async fn create(&self, secret: &str, input: CreateTenant) -> Result<Tenant> {
        let mut tenants = self.tenants.lock().unwrap();
        let id = tenants.keys().max().copied().unwrap_or(0) + 1;
        let mut tenant = tenant_fixture(id);
        tenant.secret = secret.to_string();
        tenant.name = input.name;
        tenants.insert(id, tenant.clone());
        Ok(tenant)
    }

    async fn get(&self, id: TenantId) -> Result<Option<Tenant>> {
        Ok(self.tenants.lock().unwrap().get(&id).cloned())
    }

    async fn get_by_secret(&self, secret: &str) -> Result<Option<Tenant>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .tenants
            .lock()
            .unwrap()
            .values()
            .find(|t| t.secret == secret)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Tenant>> {
        Ok(self.tenants.lock().unwrap().values().cloned().collect())
    }

    async fn update(&self, id: TenantId, input: UpdateTenant) -> Result<()> {
        if let Some(tenant) = self.tenants.lock().unwrap().get_mut(&id) {
            if let Some(name) = input.name {
                tenant.name = name;
            }
            if let Some(limit) = input.minute_limit {
                tenant.minute_limit = limit;
            }
            if let Some(status) = input.status {
                tenant.status = status;
            }
        }
        Ok(())
    }

    async fn delete(&self, id: TenantId) -> Result<()> {
        self.tenants.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn delete_many(&self, ids: &[TenantId]) -> Result<u64> {
        let mut tenants = self.tenants.lock().unwrap();
        let before = tenants.len();
        for id in ids {
            tenants.remove(id);
        }
        Ok((before - tenants.len()) as u64)
    }

    async fn set_status_many(&self, ids: &[TenantId], status: &str) -> Result<u64> {
        let mut tenants = self.tenants.lock().unwrap();
        let mut updated = 0;
        for id in ids {
            if let Some(tenant) = tenants.get_mut(id) {
                tenant.status = status.to_string();
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn increment_total_used(&self, id: TenantId) -> Result<()> {
        if let Some(tenant) = self.tenants.lock().unwrap().get_mut(&id) {
            tenant.total_used += 1;
        }
        Ok(())
    }
}

/// Relay repository backed by a vector
pub struct MemRelayRepo {
    relays: Mutex<Vec<SmtpRelay>>,
}

impl MemRelayRepo {
    pub fn new(relays: Vec<SmtpRelay>) -> Self {
        Self {
            relays: Mutex::new(relays),
        }
    }

    pub fn snapshot(&self, id: RelayId) -> Option<SmtpRelay> {
        self.relays
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }
}

#[async_trait]
impl SmtpRelayRepository for MemRelayRepo {
    async fn create(&self, _input: CreateRelay) -> Result<SmtpRelay> {
        unimplemented!("not used by pipeline tests")
    }

    async fn get(&self, id: RelayId) -> Result<Option<SmtpRelay>> {
        Ok(self.snapshot(id))
    }

    async fn list(&self) -> Result<Vec<SmtpRelay>> {
        let mut relays = self.relays.lock().unwrap().clone();
        relays.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(relays)
    }

    async fn list_active(&self) -> Result<Vec<SmtpRelay>> {
        let mut relays: Vec<SmtpRelay> = self
            .relays
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.status == relay_status::ACTIVE)
            .cloned()
            .collect();
        relays.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(relays)
    }

    async fn update(&self, _id: RelayId, _input: UpdateRelay) -> Result<()> {
        unimplemented!("not used by pipeline tests")
    }

    async fn delete(&self, id: RelayId) -> Result<()> {
        self.relays.lock().unwrap().retain(|r| r.id != id);
        Ok(())
    }

    async fn delete_many(&self, ids: &[RelayId]) -> Result<u64> {
        let mut relays = self.relays.lock().unwrap();
        let before = relays.len();
        relays.retain(|r| !ids.contains(&r.id));
        Ok((before - relays.len()) as u64)
    }

    async fn set_status_many(&self, ids: &[RelayId], status: &str) -> Result<u64> {
        let mut relays = self.relays.lock().unwrap();
        let mut updated = 0;
        for relay in relays.iter_mut() {
            if ids.contains(&relay.id) {
                relay.status = status.to_string();
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn set_status(&self, id: RelayId, status: &str) -> Result<()> {
        if let Some(relay) = self.relays.lock().unwrap().iter_mut().find(|r| r.id == id) {
            relay.status = status.to_string();
        }
        Ok(())
    }

    async fn save_health(&self, id: RelayId, update: RelayHealthUpdate) -> Result<()> {
        if let Some(relay) = self.relays.lock().unwrap().iter_mut().find(|r| r.id == id) {
            relay.status = update.status;
            relay.failure_count = update.failure_count;
            relay.last_failed_at = update.last_failed_at;
            relay.last_checked_at = update.last_checked_at;
            relay.auto_recover_at = update.auto_recover_at;
        }
        Ok(())
    }
}

/// Send log repository backed by a vector
#[derive(Default)]
pub struct MemSendLogRepo {
    logs: Mutex<Vec<SendLog>>,
}

impl MemSendLogRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<SendLog> {
        self.logs.lock().unwrap().clone()
    }
}

fn matches(log: &SendLog, query: &SendLogQuery) -> bool {
    query.tenant_id.map(|t| log.tenant_id == t).unwrap_or(true)
        && query.relay_id.map(|r| log.relay_id == r).unwrap_or(true)
        && query
            .status
            .as_ref()
            .map(|s| &log.status == s)
            .unwrap_or(true)
        && query.from.map(|f| log.created_at >= f).unwrap_or(true)
        && query.until.map(|u| log.created_at < u).unwrap_or(true)
}

#[async_trait]
impl SendLogRepository for MemSendLogRepo {
    async fn append(&self, log: NewSendLog) -> Result<()> {
        let mut logs = self.logs.lock().unwrap();
        let id = logs.len() as i64 + 1;
        logs.push(SendLog {
            id,
            tenant_id: log.tenant_id,
            recipient: log.recipient,
            subject: log.subject,
            status: log.status,
            error_msg: log.error_msg,
            relay_id: log.relay_id,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn count(&self, query: &SendLogQuery) -> Result<i64> {
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| matches(log, query))
            .count() as i64)
    }

    async fn page(
        &self,
        query: &SendLogQuery,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<SendLog>, i64)> {
        let logs = self.logs.lock().unwrap();
        let mut selected: Vec<SendLog> = logs
            .iter()
            .filter(|log| matches(log, query))
            .cloned()
            .collect();
        selected.reverse();
        let total = selected.len() as i64;
        let start = ((page - 1) * page_size) as usize;
        let page_rows = selected
            .into_iter()
            .skip(start)
            .take(page_size as usize)
            .collect();
        Ok((page_rows, total))
    }
}

/// Usage rollup repository backed by a map
#[derive(Default)]
pub struct MemUsageRepo {
    rows: Mutex<HashMap<(TenantId, NaiveDate), (i64, i64)>>,
}

impl MemUsageRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(&self, tenant_id: TenantId, date: NaiveDate) -> Option<(i64, i64)> {
        self.rows.lock().unwrap().get(&(tenant_id, date)).copied()
    }
}

#[async_trait]
impl UsageStatsRepository for MemUsageRepo {
    async fn upsert_absolute(
        &self,
        tenant_id: TenantId,
        date: NaiveDate,
        sent_count: Option<i64>,
        failed_count: Option<i64>,
    ) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let entry = rows.entry((tenant_id, date)).or_insert((0, 0));
        if let Some(sent) = sent_count {
            entry.0 = sent;
        }
        if let Some(failed) = failed_count {
            entry.1 = failed;
        }
        Ok(())
    }

    async fn get(&self, tenant_id: TenantId, date: NaiveDate) -> Result<Option<UsageStats>> {
        Ok(self.row(tenant_id, date).map(|(sent, failed)| UsageStats {
            id: 0,
            tenant_id,
            date,
            sent_count: sent,
            failed_count: failed,
            updated_at: Utc::now(),
        }))
    }

    async fn range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        tenant_id: Option<TenantId>,
    ) -> Result<Vec<UsageStats>> {
        let rows = self.rows.lock().unwrap();
        let mut stats: Vec<UsageStats> = rows
            .iter()
            .filter(|((tenant, date), _)| {
                *date >= start && *date < end && tenant_id.map(|t| *tenant == t).unwrap_or(true)
            })
            .map(|((tenant, date), (sent, failed))| UsageStats {
                id: 0,
                tenant_id: *tenant,
                date: *date,
                sent_count: *sent,
                failed_count: *failed,
                updated_at: Utc::now(),
            })
            .collect();
        stats.sort_by_key(|s| s.date);
        Ok(stats)
    }
}
