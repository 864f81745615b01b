//! Terminal session task

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::{transition, TerminalEffect, TerminalEvent, TerminalState};
use super::{TerminalCommand, TerminalHandle, TerminalLink, TerminalReport, SHELL_SETUP};
use crate::buffer::{chunk, RollingBuffer};
use crate::connection::PtyRequest;
use crate::context::EngineContext;
use crate::display::{TranscriptArtifact, TERMINAL_TRANSCRIPT_FILE};
use crate::error::{format_error_for_chat, Error, Result};
use crate::hosts::resolve_target;
use crate::reconnect::{ReconnectFlag, ReconnectOutcome, ReconnectSupervisor};
use crate::sanitize::{sanitize, OutputSanitizer};
use crate::session_manager::{Registration, SessionState};

/// Connect, open an interactive shell and run the setup lines
pub(crate) async fn establish(
    ctx: &EngineContext,
    owner_id: &str,
    hostname: &str,
) -> Result<TerminalLink> {
    let target = resolve_target(ctx.hosts.as_ref(), owner_id, hostname).await?;
    let mut connection = ctx.connector.connect(&target).await?;

    let pty = PtyRequest::xterm(ctx.config.pty_cols, ctx.config.pty_rows);
    let shell = match connection.open_shell(&pty).await {
        Ok(shell) => shell,
        Err(e) => {
            connection.close().await;
            return Err(e);
        }
    };

    let mut link = TerminalLink { connection, shell };
    for line in SHELL_SETUP {
        if let Err(e) = link.shell.write(format!("{}\n", line).as_bytes()).await {
            link.close().await;
            return Err(e);
        }
    }
    Ok(link)
}

/// Connect a registered terminal and spawn its task.
///
/// On failure the durable row is marked inactive, the session is
/// unregistered and the error is returned.
pub(crate) async fn launch(
    ctx: &EngineContext,
    registration: Registration<TerminalCommand>,
) -> Result<TerminalHandle> {
    let Registration {
        entry,
        commands,
        state,
        cancel,
    } = registration;

    let mut session = TerminalSession {
        ctx: ctx.clone(),
        channel_id: entry.session_id.clone(),
        owner_id: entry.controller_id.clone(),
        hostname: entry.hostname.clone(),
        state: TerminalState::Connecting,
        states: vec![TerminalState::Connecting],
        link: None,
        commands,
        state_tx: state,
        cancel,
        reconnecting: ReconnectFlag::new(),
        sanitizer: OutputSanitizer::new(),
        pending: String::new(),
        buffer: RollingBuffer::with_chars(ctx.config.window_chars),
        reconnects: 0,
    };

    match establish(ctx, &session.owner_id, &session.hostname).await {
        Ok(link) => {
            session.link = Some(link);
            session.apply(TerminalEvent::Connected).await;
        }
        Err(e) => {
            warn!(
                channel_id = %session.channel_id,
                host = %session.hostname,
                error = %e,
                "Terminal failed to start"
            );
            session
                .apply(TerminalEvent::ConnectFailed(e.to_string()))
                .await;
            return Err(e);
        }
    }

    info!(
        channel_id = %session.channel_id,
        host = %session.hostname,
        "Terminal session started"
    );

    let channel_id = session.channel_id.clone();
    let task = tokio::spawn(session.run());
    Ok(TerminalHandle { channel_id, task })
}

struct TerminalSession {
    ctx: EngineContext,
    channel_id: String,
    owner_id: String,
    hostname: String,
    state: TerminalState,
    states: Vec<TerminalState>,
    link: Option<TerminalLink>,
    commands: mpsc::UnboundedReceiver<TerminalCommand>,
    state_tx: watch::Sender<SessionState>,
    cancel: CancellationToken,
    reconnecting: ReconnectFlag,
    sanitizer: OutputSanitizer,
    pending: String,
    buffer: RollingBuffer,
    reconnects: u32,
}

impl TerminalSession {
    async fn run(mut self) -> TerminalReport {
        let poll = self.ctx.config.poll_interval();

        while self.state.is_live() {
            while let Ok(command) = self.commands.try_recv() {
                self.apply(command.into_event()).await;
                if !self.state.is_live() {
                    break;
                }
            }
            if !self.state.is_live() {
                break;
            }
            if self.cancel.is_cancelled() {
                self.apply(TerminalEvent::Shutdown).await;
                break;
            }

            match self.pump_output() {
                Ok(()) => self.flush_if_ready().await,
                Err(reason) => {
                    self.flush().await;
                    self.apply(TerminalEvent::TransportLost(reason)).await;
                }
            }
            if !self.state.is_live() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(poll) => {}
                _ = self.cancel.cancelled() => {}
            }
        }

        info!(
            channel_id = %self.channel_id,
            state = ?self.state,
            reconnects = self.reconnects,
            "Terminal session ended"
        );

        TerminalReport {
            channel_id: self.channel_id,
            states: self.states,
            reconnects: self.reconnects,
            transcript: self.buffer.take_transcript(),
        }
    }

    /// Read everything ready on the shell; `Err` once the shell is gone
    fn pump_output(&mut self) -> std::result::Result<(), String> {
        let max = self.ctx.config.read_chunk;
        let Some(link) = self.link.as_mut() else {
            return Err("no open shell".to_string());
        };

        let mut text = String::new();
        while link.shell.stdout_ready() {
            let bytes = link.shell.read_stdout(max);
            if bytes.is_empty() {
                break;
            }
            text.push_str(&self.sanitizer.feed(&bytes));
        }
        while link.shell.stderr_ready() {
            let bytes = link.shell.read_stderr(max);
            if bytes.is_empty() {
                break;
            }
            text.push_str(&self.sanitizer.feed(&bytes));
        }
        let closed = link.shell.is_closed() || link.shell.exit_status().is_some();

        self.pending.push_str(&text);
        if closed {
            return Err("remote shell closed".to_string());
        }
        Ok(())
    }

    async fn flush_if_ready(&mut self) {
        if self.pending.contains('\n')
            || self.pending.chars().count() > self.ctx.config.flush_threshold
        {
            self.flush().await;
        }
    }

    async fn flush(&mut self) {
        let cleaned = sanitize(&std::mem::take(&mut self.pending));
        if cleaned.is_empty() {
            return;
        }

        for line in cleaned.lines() {
            self.buffer.append(line);
        }
        for piece in chunk(&cleaned, self.ctx.config.message_ceiling) {
            if piece.trim().is_empty() {
                continue;
            }
            if let Err(e) = self.ctx.display.send_text(&self.channel_id, piece).await {
                warn!(channel_id = %self.channel_id, error = %e, "Failed to send output");
            }
        }
    }

    async fn apply(&mut self, event: TerminalEvent) {
        let mut next = Some(event);
        while let Some(event) = next.take() {
            let t = transition(self.state, event);
            self.enter(t.next);
            for effect in t.effects {
                if let Some(follow_up) = self.perform(effect).await {
                    next = Some(follow_up);
                }
            }
        }
    }

    fn enter(&mut self, state: TerminalState) {
        if state == self.state {
            return;
        }
        debug!(channel_id = %self.channel_id, from = ?self.state, to = ?state, "State change");
        self.state = state;
        self.states.push(state);
        self.state_tx.send_replace(SessionState::Terminal(state));
    }

    async fn perform(&mut self, effect: TerminalEffect) -> Option<TerminalEvent> {
        match effect {
            TerminalEffect::Write(bytes) => {
                let link = self.link.as_mut()?;
                if let Err(e) = link.shell.write(&bytes).await {
                    return Some(TerminalEvent::TransportLost(e.to_string()));
                }
            }
            TerminalEffect::Notify(text) => self.notify(&text).await,
            TerminalEffect::BeginReconnect => return Some(TerminalEvent::ReconnectStarted),
            TerminalEffect::AttemptReconnect => return Some(self.reconnect().await),
            TerminalEffect::CloseConnection => {
                if let Some(mut link) = self.link.take() {
                    link.close().await;
                }
            }
            TerminalEffect::MarkInactive => {
                if let Err(e) = self.ctx.store.set_active(&self.channel_id, false).await {
                    warn!(
                        channel_id = %self.channel_id,
                        error = %e,
                        "Failed to mark session inactive"
                    );
                }
            }
            TerminalEffect::DeleteRow => {
                if let Err(e) = self.ctx.store.delete(&self.channel_id).await {
                    warn!(
                        channel_id = %self.channel_id,
                        error = %e,
                        "Failed to delete session row"
                    );
                }
            }
            TerminalEffect::DeliverTranscript => self.deliver_transcript().await,
            TerminalEffect::Unregister => {
                self.ctx.registry.retire(&self.channel_id).await;
            }
        }
        None
    }

    async fn reconnect(&mut self) -> TerminalEvent {
        let stale = self.link.take();
        let supervisor = ReconnectSupervisor::new(
            &self.ctx,
            &self.channel_id,
            &self.owner_id,
            &self.hostname,
            &self.cancel,
            &self.reconnecting,
        );

        match supervisor.run(stale).await {
            ReconnectOutcome::Restored { link, .. } => {
                self.link = Some(link);
                self.sanitizer = OutputSanitizer::new();
                self.reconnects += 1;
                TerminalEvent::Reconnected
            }
            ReconnectOutcome::Exhausted { attempts, last_error } => {
                warn!(
                    channel_id = %self.channel_id,
                    attempts,
                    error = ?last_error.as_ref().map(|e| e.to_string()),
                    "Reconnection exhausted"
                );
                let mut notice = format_error_for_chat(&Error::ReconnectExhausted {
                    host: self.hostname.clone(),
                    attempts,
                });
                if let Some(e) = last_error {
                    notice.push_str(&format!("\nLast error: {}", e));
                }
                TerminalEvent::ReconnectExhausted(notice)
            }
            ReconnectOutcome::Aborted | ReconnectOutcome::AlreadyRunning => {
                TerminalEvent::ReconnectAborted
            }
        }
    }

    async fn notify(&self, text: &str) {
        if let Err(e) = self.ctx.display.send_notice(&self.channel_id, text).await {
            warn!(channel_id = %self.channel_id, error = %e, "Failed to send notice");
        }
    }

    async fn deliver_transcript(&mut self) {
        self.flush().await;
        if self.buffer.transcript().is_empty() {
            return;
        }
        let artifact = TranscriptArtifact::from_lines(
            TERMINAL_TRANSCRIPT_FILE,
            format!("Terminal session transcript for host '{}'", self.hostname),
            self.buffer.transcript(),
        );
        if let Err(e) = self
            .ctx
            .display
            .send_transcript(&self.channel_id, &artifact)
            .await
        {
            warn!(channel_id = %self.channel_id, error = %e, "Failed to deliver transcript");
        }
    }
}
