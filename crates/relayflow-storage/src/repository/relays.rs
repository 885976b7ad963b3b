//! SMTP relay repository

use crate::db::DatabasePool;
use crate::models::{CreateRelay, RelayHealthUpdate, SmtpRelay, UpdateRelay};
use async_trait::async_trait;
use relayflow_common::types::RelayId;
use relayflow_common::{Error, Result};

/// SMTP relay repository trait
#[async_trait]
pub trait SmtpRelayRepository: Send + Sync {
    async fn create(&self, input: CreateRelay) -> Result<SmtpRelay>;
    async fn get(&self, id: RelayId) -> Result<Option<SmtpRelay>>;
    /// All relays, highest priority first
    async fn list(&self) -> Result<Vec<SmtpRelay>>;
    /// Relays eligible for selection, highest priority first
    async fn list_active(&self) -> Result<Vec<SmtpRelay>>;
    async fn update(&self, id: RelayId, input: UpdateRelay) -> Result<()>;
    async fn delete(&self, id: RelayId) -> Result<()>;
    async fn delete_many(&self, ids: &[RelayId]) -> Result<u64>;
    async fn set_status_many(&self, ids: &[RelayId], status: &str) -> Result<u64>;
    async fn set_status(&self, id: RelayId, status: &str) -> Result<()>;
    /// Overwrite the health-state columns owned by the health controller
    async fn save_health(&self, id: RelayId, update: RelayHealthUpdate) -> Result<()>;
}

/// Database SMTP relay repository
pub struct DbSmtpRelayRepository {
    pool: DatabasePool,
}

impl DbSmtpRelayRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SmtpRelayRepository for DbSmtpRelayRepository {
    async fn create(&self, input: CreateRelay) -> Result<SmtpRelay> {
        sqlx::query_as::<_, SmtpRelay>(
            r#"
            INSERT INTO smtp_relays (name, host, port, username, password, auth_method,
                                     encryption, from_email, from_name, max_per_hour,
                                     max_per_day, priority)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(&input.host)
        .bind(input.port)
        .bind(&input.username)
        .bind(&input.password)
        .bind(&input.auth_method)
        .bind(&input.encryption)
        .bind(&input.from_email)
        .bind(&input.from_name)
        .bind(input.max_per_hour)
        .bind(input.max_per_day)
        .bind(input.priority)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: RelayId) -> Result<Option<SmtpRelay>> {
        sqlx::query_as::<_, SmtpRelay>("SELECT * FROM smtp_relays WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list(&self) -> Result<Vec<SmtpRelay>> {
        sqlx::query_as::<_, SmtpRelay>(
            "SELECT * FROM smtp_relays ORDER BY priority DESC, created_at DESC",
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_active(&self) -> Result<Vec<SmtpRelay>> {
        sqlx::query_as::<_, SmtpRelay>(
            "SELECT * FROM smtp_relays WHERE status = 'active' ORDER BY priority DESC",
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn update(&self, id: RelayId, input: UpdateRelay) -> Result<()> {
        let mut builder = sqlx::QueryBuilder::new("UPDATE smtp_relays SET updated_at = NOW()");

        if let Some(name) = &input.name {
            builder.push(", name = ").push_bind(name);
        }
        if let Some(host) = &input.host {
            builder.push(", host = ").push_bind(host);
        }
        if let Some(port) = input.port {
            builder.push(", port = ").push_bind(port);
        }
        if let Some(username) = &input.username {
            builder.push(", username = ").push_bind(username);
        }
        if let Some(password) = &input.password {
            builder.push(", password = ").push_bind(password);
        }
        if let Some(auth_method) = &input.auth_method {
            builder.push(", auth_method = ").push_bind(auth_method);
        }
        if let Some(encryption) = &input.encryption {
            builder.push(", encryption = ").push_bind(encryption);
        }
        if let Some(from_email) = &input.from_email {
            builder.push(", from_email = ").push_bind(from_email);
        }
        if let Some(from_name) = &input.from_name {
            builder.push(", from_name = ").push_bind(from_name);
        }
        if let Some(max_per_hour) = input.max_per_hour {
            builder.push(", max_per_hour = ").push_bind(max_per_hour);
        }
        if let Some(max_per_day) = input.max_per_day {
            builder.push(", max_per_day = ").push_bind(max_per_day);
        }
        if let Some(priority) = input.priority {
            builder.push(", priority = ").push_bind(priority);
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

    async fn delete(&self, id: RelayId) -> Result<()> {
        sqlx::query("DELETE FROM smtp_relays WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_many(&self, ids: &[RelayId]) -> Result<u64> {
        let result = sqlx::query("DELETE FROM smtp_relays WHERE id = ANY($1)")
            .bind(ids)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn set_status_many(&self, ids: &[RelayId], status: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE smtp_relays SET status = $2, updated_at = NOW() WHERE id = ANY($1)",
        )
        .bind(ids)
        .bind(status)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn set_status(&self, id: RelayId, status: &str) -> Result<()> {
        sqlx::query("UPDATE smtp_relays SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn save_health(&self, id: RelayId, update: RelayHealthUpdate) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE smtp_relays
            SET status = $2, failure_count = $3, last_failed_at = $4,
                last_checked_at = $5, auto_recover_at = $6, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&update.status)
        .bind(update.failure_count)
        .bind(update.last_failed_at)
        .bind(update.last_checked_at)
        .bind(update.auto_recover_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}
