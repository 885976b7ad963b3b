//! Admin token repository

use crate::db::DatabasePool;
use crate::models::AdminToken;
use async_trait::async_trait;
use relayflow_common::{Error, Result};

/// Admin token repository trait
#[async_trait]
pub trait AdminTokenRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<AdminToken>>;
    async fn create(&self, token: &str, name: &str, description: &str) -> Result<AdminToken>;
    async fn delete(&self, id: i64) -> Result<()>;
    async fn set_active(&self, id: i64, active: bool) -> Result<()>;
    /// Look up an active token by its value
    async fn find_active(&self, token: &str) -> Result<Option<AdminToken>>;
    async fn touch_last_used(&self, id: i64) -> Result<()>;
}

/// Database admin token repository
pub struct DbAdminTokenRepository {
    pool: DatabasePool,
}

impl DbAdminTokenRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AdminTokenRepository for DbAdminTokenRepository {
    async fn list(&self) -> Result<Vec<AdminToken>> {
        sqlx::query_as::<_, AdminToken>("SELECT * FROM admin_tokens ORDER BY created_at DESC")
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn create(&self, token: &str, name: &str, description: &str) -> Result<AdminToken> {
        sqlx::query_as::<_, AdminToken>(
            r#"
            INSERT INTO admin_tokens (token, name, description)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(token)
        .bind(name)
        .bind(description)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM admin_tokens WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<()> {
        sqlx::query("UPDATE admin_tokens SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn find_active(&self, token: &str) -> Result<Option<AdminToken>> {
        sqlx::query_as::<_, AdminToken>(
            "SELECT * FROM admin_tokens WHERE token = $1 AND is_active = TRUE",
        )
        .bind(token)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn touch_last_used(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE admin_tokens SET last_used_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}
