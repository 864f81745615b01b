//! Bot initialization and run loop

use super::config::AppConfig;
use anyhow::{bail, Context, Result};
use shellcord_channels::DiscordAdapter;
use shellcord_core::{SessionManager, SqliteStore, SshConnector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// How long running sessions get to wind down on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Run the bot until the gateway stops or Ctrl+C is received
pub async fn run(config: AppConfig) -> Result<()> {
    info!(
        idle_timeout_secs = config.engine.idle_timeout_secs,
        reconnect_attempts = config.engine.reconnect_attempts,
        "Configuration loaded"
    );

    if !config.discord.has_token() {
        bail!("Discord bot token is not configured. Set DISCORD_BOT_TOKEN or [discord].bot_token");
    }

    let db_path = config.database_path();
    let store = Arc::new(
        SqliteStore::from_path(&db_path)
            .await
            .context("Failed to initialize SQLite store")?,
    );
    info!("SQLite store initialized at {}", db_path.display());

    let connector = Arc::new(SshConnector::from_config(&config.engine));
    let adapter = Arc::new(DiscordAdapter::new(config.discord.clone()));

    let manager = SessionManager::new(
        config.engine.clone(),
        connector,
        store.clone(),
        store,
        adapter.clone(),
    );
    info!("Session manager initialized");

    let mut client = adapter
        .connect(manager.clone())
        .await
        .context("Failed to build Discord client")?;
    let shard_manager = client.shard_manager.clone();

    match manager.recover_terminals().await {
        Ok(report) => {
            for (channel_id, reason) in &report.failed {
                warn!(channel_id = %channel_id, reason = %reason, "Terminal not restored");
            }
        }
        Err(e) => error!(error = %e, "Failed to read persisted terminals"),
    }

    tokio::select! {
        result = DiscordAdapter::start(&mut client) => {
            if let Err(e) = result {
                error!(error = %e, "Discord gateway stopped");
            }
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
        }
    }

    manager.shutdown(SHUTDOWN_GRACE).await;
    shard_manager.shutdown_all().await;
    info!("Shellcord stopped");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_requires_token() {
        let err = run(AppConfig::default()).await.unwrap_err();
        assert!(err.to_string().contains("token"));
    }
}
