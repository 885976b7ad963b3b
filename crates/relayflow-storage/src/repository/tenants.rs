//! Tenant (API key) repository

use crate::db::DatabasePool;
use crate::models::{CreateTenant, Tenant, UpdateTenant};
use async_trait::async_trait;
use relayflow_common::types::TenantId;
use relayflow_common::{Error, Result};

/// Tenant repository trait
#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn create(&self, secret: &str, input: CreateTenant) -> Result<Tenant>;
    async fn get(&self, id: TenantId) -> Result<Option<Tenant>>;
    async fn get_by_secret(&self, secret: &str) -> Result<Option<Tenant>>;
    async fn list(&self) -> Result<Vec<Tenant>>;
    async fn update(&self, id: TenantId, input: UpdateTenant) -> Result<()>;
    async fn delete(&self, id: TenantId) -> Result<()>;
    async fn delete_many(&self, ids: &[TenantId]) -> Result<u64>;
    async fn set_status_many(&self, ids: &[TenantId], status: &str) -> Result<u64>;
    /// Bump the durable lifetime counter after a recipient-level success
    async fn increment_total_used(&self, id: TenantId) -> Result<()>;
}

/// Database tenant repository
pub struct DbTenantRepository {
    pool: DatabasePool,
}

impl DbTenantRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantRepository for DbTenantRepository {
    async fn create(&self, secret: &str, input: CreateTenant) -> Result<Tenant> {
        sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants (secret, name, plan_id, is_custom, minute_limit, daily_limit,
                                 weekly_limit, monthly_limit, total_limit)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(secret)
        .bind(&input.name)
        .bind(input.plan_id)
        .bind(input.is_custom)
        .bind(input.minute_limit)
        .bind(input.daily_limit)
        .bind(input.weekly_limit)
        .bind(input.monthly_limit)
        .bind(input.total_limit)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: TenantId) -> Result<Option<Tenant>> {
        sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get_by_secret(&self, secret: &str) -> Result<Option<Tenant>> {
        sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE secret = $1")
            .bind(secret)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list(&self) -> Result<Vec<Tenant>> {
        sqlx::query_as::<_, Tenant>("SELECT * FROM tenants ORDER BY created_at DESC")
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn update(&self, id: TenantId, input: UpdateTenant) -> Result<()> {
        let mut builder = sqlx::QueryBuilder::new("UPDATE tenants SET updated_at = NOW()");

        if let Some(name) = &input.name {
            builder.push(", name = ").push_bind(name);
        }
        if input.is_custom == Some(true) {
            // A custom tenant carries its own limits and no plan reference
            builder.push(", is_custom = TRUE, plan_id = NULL");
        } else if let Some(plan_id) = input.plan_id {
            builder
                .push(", is_custom = FALSE, plan_id = ")
                .push_bind(plan_id);
        }
        if let Some(limit) = input.minute_limit {
            builder.push(", minute_limit = ").push_bind(limit);
        }
        if let Some(limit) = input.daily_limit {
            builder.push(", daily_limit = ").push_bind(limit);
        }
        if let Some(limit) = input.weekly_limit {
            builder.push(", weekly_limit = ").push_bind(limit);
        }
        if let Some(limit) = input.monthly_limit {
            builder.push(", monthly_limit = ").push_bind(limit);
        }
        if let Some(limit) = input.total_limit {
            builder.push(", total_limit = ").push_bind(limit);
        }
        if let Some(status) = &input.status {
            builder.push(", status = ").push_bind(status);
        }

        builder.push(" WHERE id = ").push_bind(id);
        builder
            .build()
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, id: TenantId) -> Result<()> {
        sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_many(&self, ids: &[TenantId]) -> Result<u64> {
        let result = sqlx::query("DELETE FROM tenants WHERE id = ANY($1)")
            .bind(ids)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn set_status_many(&self, ids: &[TenantId], status: &str) -> Result<u64> {
        let result =
            sqlx::query("UPDATE tenants SET status = $2, updated_at = NOW() WHERE id = ANY($1)")
                .bind(ids)
                .bind(status)
                .execute(self.pool.pool())
                .await
                .map_err(|e| Error::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn increment_total_used(&self, id: TenantId) -> Result<()> {
        sqlx::query("UPDATE tenants SET total_used = total_used + 1 WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}
