//! Session Lifecycle Manager
//!
//! Entry point for everything a chat front end can ask of the engine:
//! starting commands and terminals, routing controller actions, restoring
//! terminals after a restart and shutting down. Controller checks happen
//! here; actions from anyone else are ignored rather than reported.

mod registry;


pub use registry::{SessionEntry, SessionKind, SessionRegistry, SessionState, SessionSummary};

pub(crate) use registry::{Control, Registration};

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::connection::{Connector, ExecOutput};
use crate::context::EngineContext;
use crate::display::DisplaySurface;
use crate::error::{format_error_for_chat, Error, Result};
use crate::hosts::{resolve_target, HostDirectory};
use crate::oneshot::{self, CommandHandle, CommandRequest, OneShotCommand};
use crate::store::{DurableSession, SessionStore};
use crate::terminal::{self, control, TerminalCommand, TerminalHandle, NOTICE_INPUT_DROPPED};

/// Notice posted to a channel whose terminal was restored at startup
pub const NOTICE_RESTORED: &str = "Terminal session restored after bot restart.";

/// How long stop and pause wait for the session to wind down
const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// What happened to a controller action
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dispatch {
    /// Handed to the session
    Delivered,
    /// Sender is not the controller, or the input was empty
    Ignored,
    /// Session is reconnecting; the input was discarded
    Dropped,
    /// No live session of the expected kind
    Unbound,
}

/// Terminals handled by [`SessionManager::recover_terminals`]
#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Channels whose terminal is running again
    pub restored: Vec<TerminalHandle>,
    /// Channels that could not be restored, with the reason
    pub failed: Vec<(String, String)>,
}

/// Owns the session registry and starts session tasks
#[derive(Clone)]
pub struct SessionManager {
    ctx: EngineContext,
}

impl SessionManager {
    /// Create a manager with an empty registry
    pub fn new(
        config: EngineConfig,
        connector: Arc<dyn Connector>,
        hosts: Arc<dyn HostDirectory>,
        store: Arc<dyn SessionStore>,
        display: Arc<dyn DisplaySurface>,
    ) -> Self {
        Self::with_registry(
            config,
            connector,
            hosts,
            store,
            display,
            Arc::new(SessionRegistry::new()),
        )
    }

    /// Create a manager around an existing registry
    pub fn with_registry(
        config: EngineConfig,
        connector: Arc<dyn Connector>,
        hosts: Arc<dyn HostDirectory>,
        store: Arc<dyn SessionStore>,
        display: Arc<dyn DisplaySurface>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            ctx: EngineContext {
                config: Arc::new(config),
                connector,
                hosts,
                store,
                display,
                registry,
            },
        }
    }

    /// The live session registry
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.ctx.registry
    }

    /// Engine settings
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    /// Start a one-shot command.
    ///
    /// Returns once the command is running and its live status is posted.
    /// Connection failures are returned here and nowhere else.
    pub async fn start_command(&self, request: CommandRequest) -> Result<CommandHandle> {
        oneshot::launch(&self.ctx, request).await
    }

    /// Route a controller action to a one-shot command
    pub async fn oneshot_control(
        &self,
        session_id: &str,
        actor_id: &str,
        action: OneShotCommand,
    ) -> Dispatch {
        let Some(entry) = self.ctx.registry.get(session_id).await else {
            return Dispatch::Unbound;
        };
        let Control::OneShot(tx) = &entry.control else {
            return Dispatch::Unbound;
        };
        if !entry.is_controller(actor_id) {
            debug!(
                session_id = %session_id,
                actor = %actor_id,
                "Ignoring action from non-controller"
            );
            return Dispatch::Ignored;
        }
        if !entry.state().is_live() {
            return Dispatch::Unbound;
        }

        match tx.send(action) {
            Ok(()) => Dispatch::Delivered,
            Err(_) => Dispatch::Unbound,
        }
    }

    /// Run a command to completion and return its collected output
    pub async fn exec(&self, owner_id: &str, hostname: &str, command: &str) -> Result<ExecOutput> {
        let target = resolve_target(self.ctx.hosts.as_ref(), owner_id, hostname).await?;
        let mut connection = self.ctx.connector.connect(&target).await?;
        let output = connection.exec(command).await;
        connection.close().await;
        output
    }

    /// Start a terminal bound to `channel_id`
    pub async fn start_terminal(
        &self,
        channel_id: &str,
        controller_id: &str,
        hostname: &str,
    ) -> Result<TerminalHandle> {
        let registration = Registration::terminal(channel_id, controller_id, hostname);
        self.ctx.registry.register(registration.entry.clone()).await?;

        let row = DurableSession::active(channel_id, controller_id, hostname);
        if let Err(e) = self.ctx.store.upsert_active(&row).await {
            self.ctx.registry.retire(channel_id).await;
            return Err(e);
        }

        terminal::launch(&self.ctx, registration).await
    }

    /// Restart the most recent inactive terminal of a channel under a new controller
    pub async fn restart_terminal(
        &self,
        channel_id: &str,
        controller_id: &str,
    ) -> Result<TerminalHandle> {
        if self.ctx.registry.contains(channel_id).await {
            return Err(Error::SessionExists(channel_id.to_string()));
        }
        let previous = self
            .ctx
            .store
            .latest_inactive(channel_id)
            .await?
            .ok_or_else(|| Error::NoInactiveSession(channel_id.to_string()))?;

        info!(
            channel_id = %channel_id,
            host = %previous.hostname,
            previous_owner = %previous.owner_id,
            "Restarting terminal"
        );
        self.start_terminal(channel_id, controller_id, &previous.hostname)
            .await
    }

    /// Send controller input to the terminal bound to `channel_id`
    pub async fn terminal_input(&self, channel_id: &str, author_id: &str, text: &str) -> Dispatch {
        let Some(entry) = self.ctx.registry.get(channel_id).await else {
            return Dispatch::Unbound;
        };
        let Control::Terminal(tx) = &entry.control else {
            return Dispatch::Unbound;
        };
        if !entry.is_controller(author_id) {
            return Dispatch::Ignored;
        }
        let text = text.trim();
        if text.is_empty() {
            return Dispatch::Ignored;
        }

        if matches!(
            entry.state(),
            SessionState::Terminal(terminal::TerminalState::Disconnected)
                | SessionState::Terminal(terminal::TerminalState::Reconnecting)
        ) {
            if let Err(e) = self.ctx.display.send_notice(channel_id, NOTICE_INPUT_DROPPED).await {
                warn!(channel_id = %channel_id, error = %e, "Failed to send notice");
            }
            return Dispatch::Dropped;
        }

        match tx.send(TerminalCommand::Input(control::translate_input(text))) {
            Ok(()) => Dispatch::Delivered,
            Err(_) => Dispatch::Unbound,
        }
    }

    /// Stop a terminal and delete its durable row
    pub async fn stop_terminal(&self, channel_id: &str, actor_id: &str) -> Result<Dispatch> {
        self.end_terminal(channel_id, actor_id, TerminalCommand::Stop)
            .await
    }

    /// Pause a terminal, keeping its durable row for a later restart
    pub async fn pause_terminal(&self, channel_id: &str, actor_id: &str) -> Result<Dispatch> {
        self.end_terminal(channel_id, actor_id, TerminalCommand::Pause)
            .await
    }

    async fn end_terminal(
        &self,
        channel_id: &str,
        actor_id: &str,
        command: TerminalCommand,
    ) -> Result<Dispatch> {
        let mut entry = self
            .ctx
            .registry
            .get(channel_id)
            .await
            .filter(|e| e.kind == SessionKind::Terminal)
            .ok_or_else(|| Error::SessionNotFound(channel_id.to_string()))?;
        if !entry.is_controller(actor_id) {
            return Ok(Dispatch::Ignored);
        }
        let Control::Terminal(tx) = &entry.control else {
            return Ok(Dispatch::Unbound);
        };

        if tx.send(command).is_err() {
            return Ok(Dispatch::Unbound);
        }
        entry.cancel.cancel();

        if tokio::time::timeout(SETTLE_TIMEOUT, entry.settled()).await.is_err() {
            warn!(channel_id = %channel_id, "Terminal did not settle in time");
        }
        Ok(Dispatch::Delivered)
    }

    /// Restart every terminal whose durable row is still active
    pub async fn recover_terminals(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();

        for row in self.ctx.store.list_active().await? {
            let registration =
                Registration::terminal(&row.channel_id, &row.owner_id, &row.hostname);
            if let Err(e) = self.ctx.registry.register(registration.entry.clone()).await {
                debug!(channel_id = %row.channel_id, error = %e, "Terminal already running");
                continue;
            }

            match terminal::launch(&self.ctx, registration).await {
                Ok(handle) => {
                    self.notice(&row.channel_id, NOTICE_RESTORED).await;
                    report.restored.push(handle);
                }
                Err(e) => {
                    self.notice(
                        &row.channel_id,
                        &format!(
                            "Failed to restore terminal session: {}",
                            format_error_for_chat(&e)
                        ),
                    )
                    .await;
                    report.failed.push((row.channel_id.clone(), e.to_string()));
                }
            }
        }

        info!(
            restored = report.restored.len(),
            failed = report.failed.len(),
            "Terminal recovery finished"
        );
        Ok(report)
    }

    /// Summaries of every live session
    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        self.ctx.registry.summaries().await
    }

    /// Ask every session to wind down and wait up to `grace` for them.
    ///
    /// Terminal rows stay active so the next start restores them.
    pub async fn shutdown(&self, grace: Duration) {
        let entries = self.ctx.registry.entries().await;
        info!(sessions = entries.len(), "Shutting down sessions");

        for entry in &entries {
            // A closed channel means the task already finished
            match &entry.control {
                Control::OneShot(tx) => {
                    let _ = tx.send(OneShotCommand::Finish);
                }
                Control::Terminal(tx) => {
                    let _ = tx.send(TerminalCommand::Shutdown);
                }
            }
            entry.cancel.cancel();
        }

        let drained = tokio::time::timeout(grace, async {
            while !self.ctx.registry.is_empty().await {
                tokio::time::sleep(self.ctx.config.poll_interval()).await;
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = self.ctx.registry.len().await,
                "Sessions still running after shutdown grace period"
            );
        }
    }

    async fn notice(&self, channel_id: &str, text: &str) {
        if let Err(e) = self.ctx.display.send_notice(channel_id, text).await {
            warn!(channel_id = %channel_id, error = %e, "Failed to send notice");
        }
    }
}
