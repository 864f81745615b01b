use super::SqliteStore;
use crate::error::Result;

impl SqliteStore {
    /// Run database migrations
    pub(super) async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hosts (
                owner_id TEXT NOT NULL,
                hostname TEXT NOT NULL,
                address TEXT NOT NULL,
                port INTEGER,
                username TEXT NOT NULL,
                password TEXT,
                key_material TEXT,
                updated_at TIMESTAMP NOT NULL,
                PRIMARY KEY (owner_id, hostname)
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS live_terminals (
                channel_id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                hostname TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_live_terminals_active ON live_terminals(is_active)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
