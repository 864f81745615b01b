//! Durable storage using SQLite
//!
//! Two tables back the engine:
//! - `hosts`: host records per owner, read by [`HostDirectory`]
//! - `live_terminals`: one row per persistent terminal, read by [`SessionStore`]
//!   at startup to restore sessions that were active when the process stopped

mod migrations;
mod queries;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, FromRow, Pool, Sqlite};
use std::path::Path;

use crate::error::{Error, Result};

/// Durable row describing a persistent terminal session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DurableSession {
    /// Channel the session is bound to (primary key)
    pub channel_id: String,
    /// Controller of the session
    pub owner_id: String,
    /// Host alias
    pub hostname: String,
    /// Whether the session should be running
    pub is_active: bool,
    /// When the row was first written
    pub created_at: DateTime<Utc>,
}

impl DurableSession {
    /// A new active row
    #[must_use]
    pub fn active(
        channel_id: impl Into<String>,
        owner_id: impl Into<String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            owner_id: owner_id.into(),
            hostname: hostname.into(),
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// Persistence of terminal session metadata
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace the row for `session.channel_id`, marking it active
    async fn upsert_active(&self, session: &DurableSession) -> Result<()>;

    /// All rows with `is_active` set
    async fn list_active(&self) -> Result<Vec<DurableSession>>;

    /// Flip the active flag of a row
    async fn set_active(&self, channel_id: &str, active: bool) -> Result<()>;

    /// Delete the row for a channel
    async fn delete(&self, channel_id: &str) -> Result<()>;

    /// The newest inactive row for a channel
    async fn latest_inactive(&self, channel_id: &str) -> Result<Option<DurableSession>>;
}

/// SQLite-backed host directory and session store
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pub(super) pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and run migrations
    pub async fn from_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Internal(format!("Failed to create directory: {}", e)))?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory database, for tests and dry runs
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }
}
