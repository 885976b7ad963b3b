//! Stats counters, the reconciler, and the query-side aggregations
//!
//! Successes and failures bump hot per-day counters; a periodic
//! reconciler copies them into the durable `usage_stats` rollup as
//! absolute values. The hot counters stay in place and keep counting
//! until the date ages out, so the flush is idempotent. Query-side
//! "today" numbers prefer the freshest of the hot counter and the
//! rollup; history comes from the rollup and the send logs.

use crate::keys;
use chrono::{DateTime, Datelike, Days, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone, Utc};
use relayflow_common::types::{send_status, RelayId, TenantId};
use relayflow_common::Result;
use relayflow_storage::models::{SendLogQuery, Tenant};
use relayflow_storage::{
    KvStore, SendLogRepository, SmtpRelayRepository, TenantRepository, UsageStatsRepository,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// How often hot counters are flushed into the rollup
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// Overall gateway totals
#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub total_success: i64,
    pub total_failed: i64,
    pub total_count: i64,
    pub today_success: i64,
    pub today_failed: i64,
    pub today_total: i64,
}

/// Success/failure totals for one period
#[derive(Debug, Clone, Serialize)]
pub struct PeriodStats {
    pub total: i64,
    pub success: i64,
    pub failed: i64,
    pub success_rate: f64,
}

/// Per-tenant summary row
#[derive(Debug, Clone, Serialize)]
pub struct TenantStats {
    pub tenant_id: TenantId,
    pub tenant_name: String,
    pub today_sent: i64,
    pub today_failed: i64,
    pub total_sent: i64,
    pub total_failed: i64,
    pub total_used: i64,
}

/// One window row in the per-tenant detail view
#[derive(Debug, Clone, Serialize)]
pub struct LimitInfo {
    pub limit: i64,
    pub used: i64,
    pub percent: f64,
}

/// Per-tenant detail row with window utilisation
#[derive(Debug, Clone, Serialize)]
pub struct TenantDetailStats {
    pub tenant_id: TenantId,
    pub name: String,
    pub limits: BTreeMap<&'static str, LimitInfo>,
    pub today_success: i64,
    pub today_failed: i64,
    pub week_total: i64,
    pub month_total: i64,
    pub total_used: i64,
}

/// Per-relay utilisation row
#[derive(Debug, Clone, Serialize)]
pub struct RelayStats {
    pub relay_id: RelayId,
    pub name: String,
    pub current_used: i64,
    pub hourly_limit: i64,
    pub usage_percent: f64,
    pub capacity: &'static str,
    pub today_sent: i64,
    pub today_failed: i64,
    pub status: String,
}

/// Day-by-day series for the trend chart
#[derive(Debug, Clone, Serialize)]
pub struct TrendData {
    pub labels: Vec<String>,
    pub success: Vec<i64>,
    pub failed: Vec<i64>,
}

/// Hot counter writer, reconciler, and stats reader
pub struct StatsService {
    kv: Arc<dyn KvStore>,
    usage: Arc<dyn UsageStatsRepository>,
    send_logs: Arc<dyn SendLogRepository>,
    tenants: Arc<dyn TenantRepository>,
    relays: Arc<dyn SmtpRelayRepository>,
}

impl StatsService {
    pub fn new(
        kv: Arc<dyn KvStore>,
        usage: Arc<dyn UsageStatsRepository>,
        send_logs: Arc<dyn SendLogRepository>,
        tenants: Arc<dyn TenantRepository>,
        relays: Arc<dyn SmtpRelayRepository>,
    ) -> Self {
        Self {
            kv,
            usage,
            send_logs,
            tenants,
            relays,
        }
    }

    /// Count one delivered recipient
    pub async fn record_sent(&self, tenant_id: TenantId) -> Result<()> {
        self.kv
            .incr(&keys::stats("sent", tenant_id, keys::today()), None)
            .await?;
        Ok(())
    }

    /// Count one terminally failed recipient
    pub async fn record_failed(&self, tenant_id: TenantId) -> Result<()> {
        self.kv
            .incr(&keys::stats("failed", tenant_id, keys::today()), None)
            .await?;
        Ok(())
    }

    /// Run the reconciler until the shutdown flag flips. Flush errors
    /// are logged and the next tick tries again; nothing is retried
    /// eagerly.
    pub async fn run_reconciler(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Stats reconciler started");
        let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.flush().await {
                        error!(error = %e, "Stats flush failed");
                    }
                }
            }
        }
        info!("Stats reconciler stopped");
    }

    /// Flush today's and yesterday's hot counters into the rollup
    pub async fn flush(&self) -> Result<()> {
        let today = keys::today();
        self.flush_date(today).await?;
        if let Some(yesterday) = today.checked_sub_days(Days::new(1)) {
            self.flush_date(yesterday).await?;
        }
        Ok(())
    }

    /// Copy one date's hot counters into the rollup as absolute totals.
    /// The hot counters are left untouched.
    pub async fn flush_date(&self, date: NaiveDate) -> Result<()> {
        let mut per_tenant: HashMap<TenantId, (Option<i64>, Option<i64>)> = HashMap::new();

        for key in self.kv.scan_keys(&keys::stats_pattern(date)).await? {
            let Some((kind, tenant_id, key_date)) = keys::parse_stats_key(&key) else {
                warn!(key, "Skipping malformed stats key");
                continue;
            };
            if key_date != date {
                continue;
            }
            let count = self.kv.get_i64(&key).await?.unwrap_or(0);
            if count == 0 {
                continue;
            }
            let entry = per_tenant.entry(tenant_id).or_default();
            match kind {
                "sent" => entry.0 = Some(count),
                "failed" => entry.1 = Some(count),
                _ => {}
            }
        }

        for (tenant_id, (sent, failed)) in per_tenant {
            self.usage
                .upsert_absolute(tenant_id, date, sent, failed)
                .await?;
        }

        Ok(())
    }

    /// Freshest of the hot counter and the rollup for one tenant today
    async fn today_counts(&self, tenant_id: TenantId) -> Result<(i64, i64)> {
        let today = keys::today();
        let hot_sent = self
            .kv
            .get_i64(&keys::stats("sent", tenant_id, today))
            .await?
            .unwrap_or(0);
        let hot_failed = self
            .kv
            .get_i64(&keys::stats("failed", tenant_id, today))
            .await?
            .unwrap_or(0);

        let rollup = self.usage.get(tenant_id, today).await?;
        let (rolled_sent, rolled_failed) = rollup
            .map(|r| (r.sent_count, r.failed_count))
            .unwrap_or((0, 0));

        Ok((hot_sent.max(rolled_sent), hot_failed.max(rolled_failed)))
    }

    /// Today's totals across all tenants
    async fn today_totals(&self) -> Result<(i64, i64)> {
        let today = keys::today();
        let mut per_tenant: HashMap<TenantId, (i64, i64)> = HashMap::new();

        for key in self.kv.scan_keys(&keys::stats_pattern(today)).await? {
            let Some((kind, tenant_id, _)) = keys::parse_stats_key(&key) else {
                continue;
            };
            let count = self.kv.get_i64(&key).await?.unwrap_or(0);
            let entry = per_tenant.entry(tenant_id).or_default();
            match kind {
                "sent" => entry.0 = count,
                "failed" => entry.1 = count,
                _ => {}
            }
        }
        for rollup in self.usage.range(today, today + Days::new(1), None).await? {
            let entry = per_tenant.entry(rollup.tenant_id).or_default();
            entry.0 = entry.0.max(rollup.sent_count);
            entry.1 = entry.1.max(rollup.failed_count);
        }

        Ok(per_tenant
            .values()
            .fold((0, 0), |acc, (s, f)| (acc.0 + s, acc.1 + f)))
    }

    /// Overall totals for the dashboard landing page
    pub async fn overview(&self) -> Result<Overview> {
        let total_success = self
            .send_logs
            .count(&status_query(send_status::SUCCESS))
            .await?;
        let total_failed = self
            .send_logs
            .count(&status_query(send_status::FAILED))
            .await?;
        let (today_success, today_failed) = self.today_totals().await?;

        Ok(Overview {
            total_success,
            total_failed,
            total_count: total_success + total_failed,
            today_success,
            today_failed,
            today_total: today_success + today_failed,
        })
    }

    /// Totals for `today`, `week`, `month` or `all`
    pub async fn period(&self, period: &str) -> Result<PeriodStats> {
        let (success, failed) = match period {
            "today" => self.today_totals().await?,
            "week" => {
                let from = day_start_utc(week_start(keys::today()));
                self.range_totals(Some(from)).await?
            }
            "month" => {
                let from = day_start_utc(month_start(keys::today()));
                self.range_totals(Some(from)).await?
            }
            "all" => self.range_totals(None).await?,
            _ => self.today_totals().await?,
        };

        let total = success + failed;
        let success_rate = if total > 0 {
            success as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Ok(PeriodStats {
            total,
            success,
            failed,
            success_rate,
        })
    }

    async fn range_totals(&self, from: Option<DateTime<Utc>>) -> Result<(i64, i64)> {
        let mut success_query = status_query(send_status::SUCCESS);
        success_query.from = from;
        let mut failed_query = status_query(send_status::FAILED);
        failed_query.from = from;

        Ok((
            self.send_logs.count(&success_query).await?,
            self.send_logs.count(&failed_query).await?,
        ))
    }

    /// Per-tenant summary table
    pub async fn tenant_stats(&self) -> Result<Vec<TenantStats>> {
        let mut rows = Vec::new();
        for tenant in self.tenants.list().await? {
            let (today_sent, today_failed) = self.today_counts(tenant.id).await?;

            let total_sent = self
                .send_logs
                .count(&tenant_status_query(tenant.id, send_status::SUCCESS))
                .await?;
            let total_failed = self
                .send_logs
                .count(&tenant_status_query(tenant.id, send_status::FAILED))
                .await?;

            rows.push(TenantStats {
                tenant_id: tenant.id,
                tenant_name: tenant.name.clone(),
                today_sent,
                today_failed,
                total_sent,
                total_failed,
                total_used: tenant.total_used,
            });
        }
        Ok(rows)
    }

    /// Detail view for a single tenant
    pub async fn tenant_detail(&self, tenant: &Tenant) -> Result<TenantDetailStats> {
        let today = keys::today();
        let (today_success, today_failed) = self.today_counts(tenant.id).await?;

        let week_total = self
            .send_logs
            .count(&SendLogQuery {
                tenant_id: Some(tenant.id),
                from: Some(day_start_utc(week_start(today))),
                ..Default::default()
            })
            .await?;
        let month_total = self
            .send_logs
            .count(&SendLogQuery {
                tenant_id: Some(tenant.id),
                from: Some(day_start_utc(month_start(today))),
                ..Default::default()
            })
            .await?;

        let mut limits = BTreeMap::new();
        for (name, limit, key) in [
            ("minute", tenant.minute_limit, keys::minute(tenant.id)),
            ("daily", tenant.daily_limit, keys::daily(tenant.id, today)),
            ("weekly", tenant.weekly_limit, keys::weekly(tenant.id, today)),
            (
                "monthly",
                tenant.monthly_limit,
                keys::monthly(tenant.id, today),
            ),
            ("total", tenant.total_limit, keys::total(tenant.id)),
        ] {
            if limit <= 0 {
                continue;
            }
            let used = self.kv.get_i64(&key).await?.unwrap_or(0);
            limits.insert(
                name,
                LimitInfo {
                    limit,
                    used,
                    percent: used as f64 / limit as f64 * 100.0,
                },
            );
        }

        Ok(TenantDetailStats {
            tenant_id: tenant.id,
            name: tenant.name.clone(),
            limits,
            today_success,
            today_failed,
            week_total,
            month_total,
            total_used: tenant.total_used,
        })
    }

    /// Detail rows for every tenant
    pub async fn tenant_details(&self) -> Result<Vec<TenantDetailStats>> {
        let mut rows = Vec::new();
        for tenant in self.tenants.list().await? {
            rows.push(self.tenant_detail(&tenant).await?);
        }
        Ok(rows)
    }

    /// Per-relay utilisation table
    pub async fn relay_stats(&self) -> Result<Vec<RelayStats>> {
        let today_from = day_start_utc(keys::today());
        let mut rows = Vec::new();

        for relay in self.relays.list().await? {
            let current_used = self
                .kv
                .get_i64(&keys::smtp_hour(relay.id, Local::now()))
                .await?
                .unwrap_or(0);
            let usage_percent = if relay.max_per_hour > 0 {
                current_used as f64 / relay.max_per_hour as f64 * 100.0
            } else {
                0.0
            };
            let capacity = if usage_percent >= 100.0 {
                "full"
            } else if usage_percent >= 90.0 {
                "near_limit"
            } else {
                "normal"
            };

            let today_sent = self
                .send_logs
                .count(&SendLogQuery {
                    relay_id: Some(relay.id),
                    status: Some(send_status::SUCCESS.to_string()),
                    from: Some(today_from),
                    ..Default::default()
                })
                .await?;
            let today_failed = self
                .send_logs
                .count(&SendLogQuery {
                    relay_id: Some(relay.id),
                    status: Some(send_status::FAILED.to_string()),
                    from: Some(today_from),
                    ..Default::default()
                })
                .await?;

            rows.push(RelayStats {
                relay_id: relay.id,
                name: relay.name.clone(),
                current_used,
                hourly_limit: relay.max_per_hour,
                usage_percent,
                capacity,
                today_sent,
                today_failed,
                status: relay.status.clone(),
            });
        }
        Ok(rows)
    }

    /// Day-by-day trend from the rollup, inclusive of both endpoints.
    /// Days without a rollup row are filled with zeroes.
    pub async fn trend(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        tenant_id: Option<TenantId>,
    ) -> Result<TrendData> {
        let rollups = self
            .usage
            .range(start, end + Days::new(1), tenant_id)
            .await?;

        let mut per_day: HashMap<NaiveDate, (i64, i64)> = HashMap::new();
        for rollup in rollups {
            let entry = per_day.entry(rollup.date).or_default();
            entry.0 += rollup.sent_count;
            entry.1 += rollup.failed_count;
        }

        let mut trend = TrendData {
            labels: Vec::new(),
            success: Vec::new(),
            failed: Vec::new(),
        };
        let mut day = start;
        while day <= end {
            let (sent, failed) = per_day.get(&day).copied().unwrap_or((0, 0));
            trend.labels.push(day.format("%Y-%m-%d").to_string());
            trend.success.push(sent);
            trend.failed.push(failed);
            day = day + Days::new(1);
        }
        Ok(trend)
    }
}

fn status_query(status: &str) -> SendLogQuery {
    SendLogQuery {
        status: Some(status.to_string()),
        ..Default::default()
    }
}

fn tenant_status_query(tenant_id: TenantId, status: &str) -> SendLogQuery {
    SendLogQuery {
        tenant_id: Some(tenant_id),
        status: Some(status.to_string()),
        ..Default::default()
    }
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Days::new(date.weekday().num_days_from_monday() as u64)
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Local midnight of a date as a UTC instant
fn day_start_utc(date: NaiveDate) -> DateTime<Utc> {
    let naive: NaiveDateTime = date.and_time(NaiveTime::MIN);
    match naive.and_local_timezone(Local) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        LocalResult::None => Utc.from_utc_datetime(&naive),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{relay_fixture, tenant_fixture, MemRelayRepo, MemSendLogRepo,
        MemTenantRepo, MemUsageRepo};
    use relayflow_storage::MemoryStore;

    struct Fixture {
        stats: StatsService,
        kv: Arc<MemoryStore>,
        usage: Arc<MemUsageRepo>,
    }

    fn fixture() -> Fixture {
        let kv = Arc::new(MemoryStore::new());
        let usage = Arc::new(MemUsageRepo::new());
        let stats = StatsService::new(
            kv.clone(),
            usage.clone(),
            Arc::new(MemSendLogRepo::new()),
            Arc::new(MemTenantRepo::new(vec![tenant_fixture(1)])),
            Arc::new(MemRelayRepo::new(vec![relay_fixture(1, 10, 100)])),
        );
        Fixture { stats, kv, usage }
    }

    #[tokio::test]
    async fn flush_copies_hot_counters_as_absolute_totals() {
        let f = fixture();
        let today = keys::today();

        for _ in 0..3 {
            f.stats.record_sent(1).await.unwrap();
        }
        f.stats.record_failed(1).await.unwrap();

        f.stats.flush_date(today).await.unwrap();

        assert_eq!(f.usage.row(1, today), Some((3, 1)));
    }

    #[tokio::test]
    async fn flush_is_idempotent() {
        let f = fixture();
        let today = keys::today();

        f.stats.record_sent(1).await.unwrap();
        f.stats.record_sent(1).await.unwrap();

        f.stats.flush_date(today).await.unwrap();
        f.stats.flush_date(today).await.unwrap();

        assert_eq!(f.usage.row(1, today), Some((2, 0)));
    }

    #[tokio::test]
    async fn flush_overwrites_with_newer_absolute_values() {
        let f = fixture();
        let today = keys::today();

        f.stats.record_sent(1).await.unwrap();
        f.stats.flush_date(today).await.unwrap();
        assert_eq!(f.usage.row(1, today), Some((1, 0)));

        f.stats.record_sent(1).await.unwrap();
        f.stats.flush_date(today).await.unwrap();
        assert_eq!(f.usage.row(1, today), Some((2, 0)));
    }

    #[tokio::test]
    async fn flush_keeps_the_hot_counters() {
        let f = fixture();
        let today = keys::today();

        f.stats.record_sent(1).await.unwrap();
        f.stats.flush_date(today).await.unwrap();

        assert_eq!(
            f.kv.get_i64(&keys::stats("sent", 1, today)).await.unwrap(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn sent_only_flush_preserves_the_failed_rollup() {
        let f = fixture();
        let today = keys::today();
        f.usage
            .upsert_absolute(1, today, Some(5), Some(4))
            .await
            .unwrap();

        f.stats.record_sent(1).await.unwrap();
        for _ in 0..5 {
            f.stats.record_sent(1).await.unwrap();
        }
        f.stats.flush_date(today).await.unwrap();

        assert_eq!(f.usage.row(1, today), Some((6, 4)));
    }

    #[tokio::test]
    async fn overview_unions_hot_counters_for_today() {
        let f = fixture();

        f.stats.record_sent(1).await.unwrap();
        f.stats.record_sent(1).await.unwrap();
        f.stats.record_failed(1).await.unwrap();

        let overview = f.stats.overview().await.unwrap();
        assert_eq!(overview.today_success, 2);
        assert_eq!(overview.today_failed, 1);
        assert_eq!(overview.today_total, 3);
    }

    #[tokio::test]
    async fn period_today_computes_a_success_rate() {
        let f = fixture();
        for _ in 0..3 {
            f.stats.record_sent(1).await.unwrap();
        }
        f.stats.record_failed(1).await.unwrap();

        let period = f.stats.period("today").await.unwrap();
        assert_eq!(period.total, 4);
        assert_eq!(period.success, 3);
        assert!((period.success_rate - 75.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn trend_fills_missing_days_with_zeroes() {
        let f = fixture();
        let start = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2030, 1, 3).unwrap();
        f.usage
            .upsert_absolute(1, start, Some(7), Some(1))
            .await
            .unwrap();

        let trend = f.stats.trend(start, end, None).await.unwrap();
        assert_eq!(trend.labels, vec!["2030-01-01", "2030-01-02", "2030-01-03"]);
        assert_eq!(trend.success, vec![7, 0, 0]);
        assert_eq!(trend.failed, vec![1, 0, 0]);
    }

    #[tokio::test]
    async fn tenant_detail_reports_window_utilisation() {
        let kv = Arc::new(MemoryStore::new());
        let usage = Arc::new(MemUsageRepo::new());
        let mut tenant = tenant_fixture(1);
        tenant.minute_limit = 10;
        tenant.daily_limit = 100;
        let stats = StatsService::new(
            kv.clone(),
            usage,
            Arc::new(MemSendLogRepo::new()),
            Arc::new(MemTenantRepo::new(vec![tenant.clone()])),
            Arc::new(MemRelayRepo::new(vec![])),
        );

        kv.incr(&keys::minute(1), None).await.unwrap();
        kv.incr(&keys::minute(1), None).await.unwrap();

        let detail = stats.tenant_detail(&tenant).await.unwrap();
        let minute = &detail.limits["minute"];
        assert_eq!(minute.limit, 10);
        assert_eq!(minute.used, 2);
        assert!((minute.percent - 20.0).abs() < f64::EPSILON);
        assert!(!detail.limits.contains_key("total"));
    }
}
