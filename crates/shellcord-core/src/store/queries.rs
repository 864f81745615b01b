use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::{DurableSession, SessionStore, SqliteStore};
use crate::credentials::SecretString;
use crate::error::{Error, Result};
use crate::hosts::{HostDirectory, HostRecord, HostSummary};

#[derive(FromRow)]
struct HostRow {
    owner_id: String,
    hostname: String,
    address: String,
    port: Option<i64>,
    username: String,
    password: Option<String>,
    key_material: Option<String>,
    updated_at: DateTime<Utc>,
}

impl HostRow {
    fn into_record(self) -> HostRecord {
        HostRecord {
            owner_id: self.owner_id,
            hostname: self.hostname,
            address: self.address,
            port: self.port.and_then(|p| u16::try_from(p).ok()),
            username: self.username,
            password: self.password.map(SecretString::new),
            key_material: self.key_material.map(SecretString::new),
        }
    }
}

#[async_trait]
impl HostDirectory for SqliteStore {
    async fn get_host(&self, owner_id: &str, hostname: &str) -> Result<Option<HostRecord>> {
        let row: Option<HostRow> =
            sqlx::query_as("SELECT * FROM hosts WHERE owner_id = ? AND hostname = ?")
                .bind(owner_id)
                .bind(hostname)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(HostRow::into_record))
    }

    async fn upsert_host(&self, record: &HostRecord) -> Result<()> {
        // Reject records that could never connect
        record.target()?;

        sqlx::query(
            r#"
            INSERT INTO hosts (
                owner_id, hostname, address, port, username, password, key_material, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(owner_id, hostname) DO UPDATE SET
                address = excluded.address,
                port = excluded.port,
                username = excluded.username,
                password = excluded.password,
                key_material = excluded.key_material,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.owner_id)
        .bind(&record.hostname)
        .bind(&record.address)
        .bind(record.port.map(i64::from))
        .bind(&record.username)
        .bind(record.password.as_ref().map(|s| s.expose().to_string()))
        .bind(record.key_material.as_ref().map(|s| s.expose().to_string()))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_host(&self, owner_id: &str, hostname: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM hosts WHERE owner_id = ? AND hostname = ?")
            .bind(owner_id)
            .bind(hostname)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::HostNotFound(hostname.to_string()));
        }

        Ok(())
    }

    async fn list_hosts(&self, owner_id: &str) -> Result<Vec<HostSummary>> {
        let rows: Vec<HostRow> =
            sqlx::query_as("SELECT * FROM hosts WHERE owner_id = ? ORDER BY hostname ASC")
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let updated_at = row.updated_at;
                let mut summary = row.into_record().summary();
                summary.updated_at = Some(updated_at);
                summary
            })
            .collect())
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn upsert_active(&self, session: &DurableSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO live_terminals (channel_id, owner_id, hostname, is_active, created_at)
            VALUES (?, ?, ?, TRUE, ?)
            ON CONFLICT(channel_id) DO UPDATE SET
                owner_id = excluded.owner_id,
                hostname = excluded.hostname,
                is_active = TRUE,
                created_at = excluded.created_at
            "#,
        )
        .bind(&session.channel_id)
        .bind(&session.owner_id)
        .bind(&session.hostname)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<DurableSession>> {
        let rows = sqlx::query_as(
            "SELECT * FROM live_terminals WHERE is_active = TRUE ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn set_active(&self, channel_id: &str, active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE live_terminals SET is_active = ? WHERE channel_id = ?")
            .bind(active)
            .bind(channel_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::SessionNotFound(channel_id.to_string()));
        }

        Ok(())
    }

    async fn delete(&self, channel_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM live_terminals WHERE channel_id = ?")
            .bind(channel_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn latest_inactive(&self, channel_id: &str) -> Result<Option<DurableSession>> {
        let row = sqlx::query_as(
            r#"
            SELECT * FROM live_terminals
            WHERE channel_id = ? AND is_active = FALSE
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
