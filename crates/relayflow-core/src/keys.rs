//! Hot counter key formats
//!
//! Every key in the KV store is minted here so the TTL table and the key
//! shapes stay in one place. Windowed keys embed the local date: windows
//! reset at local-time boundaries.

use chrono::{DateTime, Datelike, Local, NaiveDate};
use relayflow_common::types::{RelayId, TenantId};

/// FIFO list holding pending email tasks
pub const EMAIL_QUEUE: &str = "email_queue";

/// Per-minute usage counter, expires via TTL
pub fn minute(tenant_id: TenantId) -> String {
    format!("minute:{}", tenant_id)
}

/// Per-day usage counter
pub fn daily(tenant_id: TenantId, date: NaiveDate) -> String {
    format!("daily:{}:{}", tenant_id, date.format("%Y-%m-%d"))
}

/// Per-ISO-week usage counter
pub fn weekly(tenant_id: TenantId, date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("week:{}:{}-W{:02}", tenant_id, week.year(), week.week())
}

/// Per-month usage counter
pub fn monthly(tenant_id: TenantId, date: NaiveDate) -> String {
    format!("month:{}:{}", tenant_id, date.format("%Y-%m"))
}

/// Lifetime usage counter, never expires
pub fn total(tenant_id: TenantId) -> String {
    format!("total:{}", tenant_id)
}

/// Per-relay hourly fan-out counter
pub fn smtp_hour(relay_id: RelayId, at: DateTime<Local>) -> String {
    format!("smtp_hour:{}:{}", relay_id, at.format("%Y-%m-%d-%H"))
}

/// Per-relay daily fan-out counter
pub fn smtp_day(relay_id: RelayId, date: NaiveDate) -> String {
    format!("smtp_day:{}:{}", relay_id, date.format("%Y-%m-%d"))
}

/// Hot stats counter reconciled into the daily rollup;
/// `kind` is `sent` or `failed`
pub fn stats(kind: &str, tenant_id: TenantId, date: NaiveDate) -> String {
    format!("stats:{}:{}:{}", kind, tenant_id, date.format("%Y-%m-%d"))
}

/// SCAN pattern covering both stats counters for one date
pub fn stats_pattern(date: NaiveDate) -> String {
    format!("stats:*:*:{}", date.format("%Y-%m-%d"))
}

/// Parse a stats key back into `(kind, tenant_id, date)`
pub fn parse_stats_key(key: &str) -> Option<(&str, TenantId, NaiveDate)> {
    let mut parts = key.split(':');
    if parts.next() != Some("stats") {
        return None;
    }
    let kind = parts.next()?;
    let tenant_id: TenantId = parts.next()?.parse().ok()?;
    let date = NaiveDate::parse_from_str(parts.next()?, "%Y-%m-%d").ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((kind, tenant_id, date))
}

/// Cached tenant lookup by API secret
pub fn apikey(secret: &str) -> String {
    format!("apikey:{}", secret)
}

/// Admin dashboard session
pub fn session(id: &str) -> String {
    format!("session:{}", id)
}

/// Current local date, the day boundary for all windowed keys
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}
