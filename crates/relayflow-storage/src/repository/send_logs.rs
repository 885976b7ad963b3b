//! Send log repository

use crate::db::DatabasePool;
use crate::models::{NewSendLog, SendLog, SendLogQuery};
use async_trait::async_trait;
use relayflow_common::{Error, Result};
use sqlx::QueryBuilder;

/// Send log repository trait
#[async_trait]
pub trait SendLogRepository: Send + Sync {
    /// Append one per-recipient delivery record
    async fn append(&self, log: NewSendLog) -> Result<()>;

    /// Count rows matching the filter
    async fn count(&self, query: &SendLogQuery) -> Result<i64>;

    /// Page through rows matching the filter, newest first.
    /// Returns the page and the total matching count.
    async fn page(
        &self,
        query: &SendLogQuery,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<SendLog>, i64)>;
}

fn push_filter(builder: &mut QueryBuilder<'_, sqlx::Postgres>, query: &SendLogQuery) {
    builder.push(" WHERE 1 = 1");
    if let Some(tenant_id) = query.tenant_id {
        builder.push(" AND tenant_id = ").push_bind(tenant_id);
    }
    if let Some(relay_id) = query.relay_id {
        builder.push(" AND relay_id = ").push_bind(relay_id);
    }
    if let Some(status) = &query.status {
        builder.push(" AND status = ").push_bind(status.clone());
    }
    if let Some(from) = query.from {
        builder.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(until) = query.until {
        builder.push(" AND created_at < ").push_bind(until);
    }
}

/// Database send log repository
pub struct DbSendLogRepository {
    pool: DatabasePool,
}

impl DbSendLogRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SendLogRepository for DbSendLogRepository {
    async fn append(&self, log: NewSendLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO send_logs (tenant_id, recipient, subject, status, error_msg, relay_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(log.tenant_id)
        .bind(&log.recipient)
        .bind(&log.subject)
        .bind(&log.status)
        .bind(&log.error_msg)
        .bind(log.relay_id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn count(&self, query: &SendLogQuery) -> Result<i64> {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM send_logs");
        push_filter(&mut builder, query);

        let row: (i64,) = builder
            .build_query_as()
            .fetch_one(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row.0)
    }

    async fn page(
        &self,
        query: &SendLogQuery,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<SendLog>, i64)> {
        let total = self.count(query).await?;

        let mut builder = QueryBuilder::new("SELECT * FROM send_logs");
        push_filter(&mut builder, query);
        builder.push(" ORDER BY created_at DESC");
        builder.push(" LIMIT ").push_bind(page_size);
        builder.push(" OFFSET ").push_bind((page - 1) * page_size);

        let logs = builder
            .build_query_as::<SendLog>()
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok((logs, total))
    }
}
