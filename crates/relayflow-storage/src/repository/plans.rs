//! Plan repository

use crate::db::DatabasePool;
use crate::models::{Plan, PlanInput};
use async_trait::async_trait;
use relayflow_common::types::PlanId;
use relayflow_common::{Error, Result};

/// Plan repository trait
#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn list(&self, active_only: bool) -> Result<Vec<Plan>>;
    async fn get(&self, id: PlanId) -> Result<Option<Plan>>;
    async fn count(&self) -> Result<i64>;
    async fn create(&self, input: PlanInput) -> Result<Plan>;
    async fn update(&self, id: PlanId, input: PlanInput) -> Result<()>;
    async fn set_active(&self, id: PlanId, active: bool) -> Result<()>;
    async fn delete(&self, id: PlanId) -> Result<()>;
    /// Number of tenants referencing this plan
    async fn tenants_using(&self, id: PlanId) -> Result<i64>;
}

/// Database plan repository
pub struct DbPlanRepository {
    pool: DatabasePool,
}

impl DbPlanRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlanRepository for DbPlanRepository {
    async fn list(&self, active_only: bool) -> Result<Vec<Plan>> {
        let sql = if active_only {
            "SELECT * FROM plans WHERE is_active = TRUE ORDER BY sort_order ASC"
        } else {
            "SELECT * FROM plans ORDER BY sort_order ASC"
        };
        sqlx::query_as::<_, Plan>(sql)
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: PlanId) -> Result<Option<Plan>> {
        sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM plans")
            .fetch_one(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row.0)
    }

    async fn create(&self, input: PlanInput) -> Result<Plan> {
        sqlx::query_as::<_, Plan>(
            r#"
            INSERT INTO plans (code, name, description, minute_limit, daily_limit,
                               weekly_limit, monthly_limit, is_active, sort_order)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(&input.code)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.minute_limit)
        .bind(input.daily_limit)
        .bind(input.weekly_limit)
        .bind(input.monthly_limit)
        .bind(input.is_active)
        .bind(input.sort_order)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn update(&self, id: PlanId, input: PlanInput) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE plans
            SET code = $2, name = $3, description = $4, minute_limit = $5,
                daily_limit = $6, weekly_limit = $7, monthly_limit = $8,
                is_active = $9, sort_order = $10, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&input.code)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.minute_limit)
        .bind(input.daily_limit)
        .bind(input.weekly_limit)
        .bind(input.monthly_limit)
        .bind(input.is_active)
        .bind(input.sort_order)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn set_active(&self, id: PlanId, active: bool) -> Result<()> {
        sqlx::query("UPDATE plans SET is_active = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, id: PlanId) -> Result<()> {
        sqlx::query("DELETE FROM plans WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn tenants_using(&self, id: PlanId) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tenants WHERE plan_id = $1")
            .bind(id)
            .fetch_one(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row.0)
    }
}
