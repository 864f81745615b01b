//! One-shot session task

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::state::{transition, OneShotEffect, OneShotEvent, OneShotState};
use super::{CommandHandle, CommandRequest, OneShotCommand, OneShotReport, INTERRUPT};
use crate::buffer::RollingBuffer;
use crate::connection::{PtyRequest, RemoteConnection, RemoteShell};
use crate::context::EngineContext;
use crate::display::{
    LiveStatus, StatusPhase, TranscriptArtifact, COMMAND_TRANSCRIPT_FILE,
};
use crate::error::{format_error_for_chat, Error, Result};
use crate::hosts::resolve_target;
use crate::sanitize::OutputSanitizer;
use crate::session_manager::{Registration, SessionState};

/// Register, connect and spawn a one-shot session.
///
/// Connection failures are returned to the caller after the session has been
/// finalized and unregistered.
pub(crate) async fn launch(ctx: &EngineContext, request: CommandRequest) -> Result<CommandHandle> {
    let session_id = Uuid::new_v4().to_string();
    let Registration {
        entry,
        commands,
        state,
        cancel,
    } = Registration::one_shot(
        &session_id,
        &request.controller_id,
        &request.hostname,
        &request.command,
    );
    ctx.registry.register(entry).await?;

    let (connection, shell) = match open_command(ctx, &request).await {
        Ok(link) => link,
        Err(e) => {
            let t = transition(OneShotState::Starting, OneShotEvent::ConnectFailed(e.to_string()));
            for effect in t.effects {
                if effect == OneShotEffect::Unregister {
                    ctx.registry.retire(&session_id).await;
                }
            }
            state.send_replace(SessionState::OneShot(t.next));
            warn!(
                session_id = %session_id,
                host = %request.hostname,
                error = %e,
                "Command failed to start"
            );
            return Err(e);
        }
    };

    let mut session = OneShotSession {
        buffer: RollingBuffer::with_lines(ctx.config.window_lines),
        ctx: ctx.clone(),
        session_id: session_id.clone(),
        request,
        state: OneShotState::Starting,
        states: vec![OneShotState::Starting],
        settled: None,
        connection,
        shell,
        commands,
        state_tx: state,
        cancel,
        sanitizer: OutputSanitizer::without_banner(),
        pending_line: String::new(),
        message_id: None,
        last_activity: Instant::now(),
        last_refresh: Instant::now(),
        dirty: false,
        exit_status: None,
        failure: None,
    };
    session.apply(OneShotEvent::Connected).await;
    session.publish(StatusPhase::Executing, true, None).await;

    info!(
        session_id = %session_id,
        host = %session.request.hostname,
        continuous = session.request.continuous,
        "Command started"
    );

    let task = tokio::spawn(session.run());
    Ok(CommandHandle { session_id, task })
}

async fn open_command(
    ctx: &EngineContext,
    request: &CommandRequest,
) -> Result<(Box<dyn RemoteConnection>, Box<dyn RemoteShell>)> {
    let target =
        resolve_target(ctx.hosts.as_ref(), &request.controller_id, &request.hostname).await?;
    let mut connection = ctx.connector.connect(&target).await?;
    let pty = PtyRequest::xterm(ctx.config.pty_cols, ctx.config.pty_rows);
    match connection.open_command(&request.command, &pty).await {
        Ok(shell) => Ok((connection, shell)),
        Err(e) => {
            connection.close().await;
            Err(e)
        }
    }
}

struct OneShotSession {
    ctx: EngineContext,
    session_id: String,
    request: CommandRequest,
    state: OneShotState,
    states: Vec<OneShotState>,
    settled: Option<OneShotState>,
    connection: Box<dyn RemoteConnection>,
    shell: Box<dyn RemoteShell>,
    commands: mpsc::UnboundedReceiver<OneShotCommand>,
    state_tx: watch::Sender<SessionState>,
    cancel: CancellationToken,
    sanitizer: OutputSanitizer,
    pending_line: String,
    buffer: RollingBuffer,
    message_id: Option<String>,
    last_activity: Instant,
    last_refresh: Instant,
    dirty: bool,
    exit_status: Option<u32>,
    failure: Option<String>,
}

impl OneShotSession {
    async fn run(mut self) -> OneShotReport {
        let poll = self.ctx.config.poll_interval();

        loop {
            self.drain_commands().await;
            if !self.state.is_live() {
                break;
            }
            if self.cancel.is_cancelled() {
                self.apply(OneShotEvent::Finish).await;
                break;
            }

            self.pump_output();

            if self.remote_finished() {
                let event = match self.shell.exit_status() {
                    Some(code) => {
                        self.exit_status = Some(code);
                        OneShotEvent::RemoteExited
                    }
                    None => OneShotEvent::Failed(
                        Error::RemoteExecFailure {
                            host: self.request.hostname.clone(),
                            reason: "channel closed without exit status".to_string(),
                        }
                        .to_string(),
                    ),
                };
                self.apply(event).await;
            } else if self.idle_elapsed() {
                self.apply(OneShotEvent::IdleElapsed).await;
            }
            if !self.state.is_live() {
                break;
            }

            self.refresh_display().await;

            tokio::select! {
                _ = tokio::time::sleep(poll) => {}
                _ = self.cancel.cancelled() => {}
            }
        }

        if self.state != OneShotState::Finalized {
            self.apply(OneShotEvent::Finalize).await;
        }

        info!(
            session_id = %self.session_id,
            outcome = ?self.settled,
            exit_status = ?self.exit_status,
            lines = self.buffer.transcript().len(),
            "Command finalized"
        );

        OneShotReport {
            session_id: self.session_id,
            outcome: self.settled.unwrap_or(OneShotState::Finalized),
            states: self.states,
            exit_status: self.exit_status,
            failure: self.failure,
            transcript: self.buffer.take_transcript(),
        }
    }

    async fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            let event = match command {
                OneShotCommand::Input(line) => {
                    self.last_activity = Instant::now();
                    OneShotEvent::Input(line)
                }
                OneShotCommand::Interrupt => OneShotEvent::Interrupt,
                OneShotCommand::Finish => OneShotEvent::Finish,
            };
            self.apply(event).await;
        }
    }

    fn pump_output(&mut self) {
        let max = self.ctx.config.read_chunk;
        let mut saw_output = false;

        while self.shell.stdout_ready() {
            let bytes = self.shell.read_stdout(max);
            if bytes.is_empty() {
                break;
            }
            self.absorb(&bytes);
            saw_output = true;
        }
        while self.shell.stderr_ready() {
            let bytes = self.shell.read_stderr(max);
            if bytes.is_empty() {
                break;
            }
            self.absorb(&bytes);
            saw_output = true;
        }

        if saw_output {
            self.last_activity = Instant::now();
            self.dirty = true;
        }
    }

    fn absorb(&mut self, bytes: &[u8]) {
        let text = self.sanitizer.feed(bytes);
        self.pending_line.push_str(&text);
        while let Some(end) = self.pending_line.find('\n') {
            let line: String = self.pending_line.drain(..=end).collect();
            self.push_line(&line);
        }
    }

    fn push_line(&mut self, line: &str) {
        let line = line.trim_end();
        if !line.trim().is_empty() {
            self.buffer.append(line);
        }
    }

    fn flush_pending(&mut self) {
        let rest = std::mem::take(&mut self.pending_line);
        self.push_line(&rest);
    }

    fn remote_finished(&mut self) -> bool {
        !self.shell.stdout_ready()
            && !self.shell.stderr_ready()
            && (self.shell.exit_status().is_some() || self.shell.is_closed())
    }

    fn idle_elapsed(&self) -> bool {
        !self.request.continuous && self.last_activity.elapsed() >= self.ctx.config.idle_timeout()
    }

    async fn apply(&mut self, event: OneShotEvent) {
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

    fn enter(&mut self, state: OneShotState) {
        if state == self.state {
            return;
        }
        debug!(session_id = %self.session_id, from = ?self.state, to = ?state, "State change");
        self.state = state;
        self.states.push(state);
        if matches!(
            state,
            OneShotState::Completed | OneShotState::Cancelled | OneShotState::TimedOut
        ) {
            self.settled = Some(state);
        }
        self.state_tx.send_replace(SessionState::OneShot(state));
    }

    async fn perform(&mut self, effect: OneShotEffect) -> Option<OneShotEvent> {
        match effect {
            OneShotEffect::WriteInput(line) => {
                let data = format!("{}\n", line);
                if let Err(e) = self.shell.write(data.as_bytes()).await {
                    return Some(OneShotEvent::Failed(e.to_string()));
                }
            }
            OneShotEffect::SendInterrupt => {
                if let Err(e) = self.shell.write(INTERRUPT).await {
                    warn!(session_id = %self.session_id, error = %e, "Failed to send interrupt");
                }
            }
            OneShotEffect::Unregister => {
                self.ctx.registry.retire(&self.session_id).await;
            }
            OneShotEffect::CloseConnection => {
                self.shell.close().await;
                self.connection.close().await;
            }
            OneShotEffect::ReportFailure(reason) => {
                warn!(session_id = %self.session_id, reason = %reason, "Command failed");
                self.flush_pending();
                self.buffer.append(format!("error: {}", reason));
                self.failure = Some(reason);
            }
            OneShotEffect::PublishFinal => {
                self.flush_pending();
                let phase = self.settled.map_or(StatusPhase::Failed, |s| s.phase());
                let note = self.final_note(phase);
                self.publish(phase, false, note).await;
            }
            OneShotEffect::DeliverTranscript => self.deliver_transcript().await,
        }
        None
    }

    fn final_note(&self, phase: StatusPhase) -> Option<String> {
        match phase {
            StatusPhase::Completed => self.exit_status.map(|code| format!("Exit status: {}", code)),
            StatusPhase::Cancelled => Some("Command cancelled by controller.".to_string()),
            StatusPhase::TimedOut => Some(format_error_for_chat(&Error::IdleTimeout {
                session_id: self.session_id.clone(),
                secs: self.ctx.config.idle_timeout_secs,
            })),
            StatusPhase::Failed => self.failure.clone(),
            StatusPhase::Executing => None,
        }
    }

    async fn refresh_display(&mut self) {
        if !self.dirty || self.last_refresh.elapsed() < self.ctx.config.display_refresh() {
            return;
        }
        self.publish(StatusPhase::Executing, true, None).await;
    }

    async fn publish(&mut self, phase: StatusPhase, controls_enabled: bool, note: Option<String>) {
        // A prompt without a line break must be visible while it waits for input
        let partial = self.pending_line.trim_end();
        let rendered = self
            .buffer
            .render_with_tail(self.ctx.config.status_ceiling, partial);
        let status = LiveStatus {
            session_id: self.session_id.clone(),
            hostname: self.request.hostname.clone(),
            command: self.request.command.clone(),
            output: rendered.text,
            truncated: rendered.truncated,
            phase,
            controls_enabled,
            note,
        };

        let display = self.ctx.display.clone();
        let channel = &self.request.channel_id;
        let result = match self.message_id.clone() {
            Some(message_id) => display.update_status(channel, &message_id, &status).await,
            None => match display.post_status(channel, &status).await {
                Ok(message_id) => {
                    self.message_id = Some(message_id);
                    Ok(())
                }
                Err(e) => Err(e),
            },
        };

        if let Err(e) = result {
            warn!(session_id = %self.session_id, error = %e, "Failed to update live status");
        }
        self.dirty = false;
        self.last_refresh = Instant::now();
    }

    async fn deliver_transcript(&mut self) {
        let caption = format!(
            "Full output of `{}` on host '{}'",
            self.request.command, self.request.hostname
        );
        let artifact = TranscriptArtifact::from_lines(
            COMMAND_TRANSCRIPT_FILE,
            caption,
            self.buffer.transcript(),
        );
        if let Err(e) = self
            .ctx
            .display
            .send_transcript(&self.request.channel_id, &artifact)
            .await
        {
            warn!(session_id = %self.session_id, error = %e, "Failed to deliver transcript");
        }
    }
}
