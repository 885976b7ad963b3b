//! Usage rollup repository

use crate::db::DatabasePool;
use crate::models::UsageStats;
use async_trait::async_trait;
use chrono::NaiveDate;
use relayflow_common::types::TenantId;
use relayflow_common::{Error, Result};

/// Usage rollup repository trait
#[async_trait]
pub trait UsageStatsRepository: Send + Sync {
    /// Upsert a daily rollup with absolute counts. `None` leaves the
    /// stored count untouched, so a flush carrying only one of the two
    /// counters does not zero the other.
    async fn upsert_absolute(
        &self,
        tenant_id: TenantId,
        date: NaiveDate,
        sent_count: Option<i64>,
        failed_count: Option<i64>,
    ) -> Result<()>;

    async fn get(&self, tenant_id: TenantId, date: NaiveDate) -> Result<Option<UsageStats>>;

    /// Rollups in `[start, end)`, optionally scoped to one tenant,
    /// ordered by date ascending
    async fn range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        tenant_id: Option<TenantId>,
    ) -> Result<Vec<UsageStats>>;
}

/// Database usage rollup repository
pub struct DbUsageStatsRepository {
    pool: DatabasePool,
}

impl DbUsageStatsRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageStatsRepository for DbUsageStatsRepository {
    async fn upsert_absolute(
        &self,
        tenant_id: TenantId,
        date: NaiveDate,
        sent_count: Option<i64>,
        failed_count: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO usage_stats (tenant_id, date, sent_count, failed_count)
            VALUES ($1, $2, COALESCE($3, 0), COALESCE($4, 0))
            ON CONFLICT (tenant_id, date) DO UPDATE
            SET sent_count = COALESCE($3, usage_stats.sent_count),
                failed_count = COALESCE($4, usage_stats.failed_count),
                updated_at = NOW()
            "#,
        )
        .bind(tenant_id)
        .bind(date)
        .bind(sent_count)
        .bind(failed_count)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, tenant_id: TenantId, date: NaiveDate) -> Result<Option<UsageStats>> {
        sqlx::query_as::<_, UsageStats>(
            "SELECT * FROM usage_stats WHERE tenant_id = $1 AND date = $2",
        )
        .bind(tenant_id)
        .bind(date)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        tenant_id: Option<TenantId>,
    ) -> Result<Vec<UsageStats>> {
        match tenant_id {
            Some(tenant_id) => sqlx::query_as::<_, UsageStats>(
                r#"
                SELECT * FROM usage_stats
                WHERE date >= $1 AND date < $2 AND tenant_id = $3
                ORDER BY date ASC
                "#,
            )
            .bind(start)
            .bind(end)
            .bind(tenant_id)
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string())),
            None => sqlx::query_as::<_, UsageStats>(
                "SELECT * FROM usage_stats WHERE date >= $1 AND date < $2 ORDER BY date ASC",
            )
            .bind(start)
            .bind(end)
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string())),
        }
    }
}
