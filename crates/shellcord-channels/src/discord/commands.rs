use shellcord_core::{
    format_error_for_chat, CommandRequest, Dispatch, OneShotCommand, Result as EngineResult,
    SessionKind, SessionManager, SessionState, SessionSummary,
};
use tracing::{debug, error};

/// Custom id prefix of one-shot control buttons
pub const CONTROL_PREFIX: &str = "exec:";
/// Custom id prefix of the send-input modal
pub const INPUT_MODAL_PREFIX: &str = "exec_input:";
/// Custom id of the text field inside the send-input modal
pub const INPUT_FIELD_ID: &str = "input_text";

/// A button on a live status message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    /// Send Ctrl+C
    Interrupt,
    /// Open the send-input modal
    Input,
    /// Stop streaming and finalize
    Finish,
}

impl ControlAction {
    /// Every control, in button order
    pub const ALL: [ControlAction; 3] = [
        ControlAction::Interrupt,
        ControlAction::Input,
        ControlAction::Finish,
    ];

    fn as_str(self) -> &'static str {
        match self {
            ControlAction::Interrupt => "interrupt",
            ControlAction::Input => "input",
            ControlAction::Finish => "finish",
        }
    }

    /// Button label
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            ControlAction::Interrupt => "Ctrl + C",
            ControlAction::Input => "Send Input",
            ControlAction::Finish => "Finish",
        }
    }

    /// Button custom id for a session
    #[must_use]
    pub fn custom_id(self, session_id: &str) -> String {
        format!("{}{}:{}", CONTROL_PREFIX, session_id, self.as_str())
    }

    /// Split a button custom id into session id and action
    #[must_use]
    pub fn parse(custom_id: &str) -> Option<(&str, ControlAction)> {
        let rest = custom_id.strip_prefix(CONTROL_PREFIX)?;
        let (session_id, action) = rest.rsplit_once(':')?;
        if session_id.is_empty() {
            return None;
        }
        let action = Self::ALL.into_iter().find(|a| a.as_str() == action)?;
        Some((session_id, action))
    }
}

/// Custom id of the send-input modal for a session
#[must_use]
pub fn input_modal_id(session_id: &str) -> String {
    format!("{}{}", INPUT_MODAL_PREFIX, session_id)
}

/// Session id addressed by a send-input modal
#[must_use]
pub fn parse_input_modal_id(custom_id: &str) -> Option<&str> {
    custom_id
        .strip_prefix(INPUT_MODAL_PREFIX)
        .filter(|id| !id.is_empty())
}

/// Discord Slash Command Handlers
#[derive(Clone)]
pub struct DiscordCommands {
    manager: SessionManager,
}

impl DiscordCommands {
    /// Wrap a session manager
    pub fn new(manager: SessionManager) -> Self {
        Self { manager }
    }

    /// `/execute`
    pub async fn handle_execute(
        &self,
        channel_id: &str,
        user_id: &str,
        hostname: &str,
        command: &str,
        continuous: bool,
    ) -> String {
        if command.trim().is_empty() {
            return "Please provide a command.".to_string();
        }

        let request = CommandRequest {
            channel_id: channel_id.to_string(),
            controller_id: user_id.to_string(),
            hostname: hostname.to_string(),
            command: command.to_string(),
            continuous,
        };

        match self.manager.start_command(request).await {
            Ok(handle) => {
                let session_id = handle.session_id.clone();
                tokio::spawn(async move {
                    match handle.task.await {
                        Ok(report) => debug!(
                            session_id = %report.session_id,
                            outcome = ?report.outcome,
                            "Command session joined"
                        ),
                        Err(e) => error!(error = %e, "Command session task failed"),
                    }
                });
                format!(
                    "Running `{}` on host '{}' (session `{}`).",
                    command, hostname, session_id
                )
            }
            Err(e) => format_error_for_chat(&e),
        }
    }

    /// `/terminal start`
    pub async fn handle_terminal_start(
        &self,
        channel_id: &str,
        user_id: &str,
        hostname: &str,
    ) -> String {
        match self
            .manager
            .start_terminal(channel_id, user_id, hostname)
            .await
        {
            Ok(_) => format!(
                "Terminal session started on host '{}' in <#{}>. \
                 Your messages there are sent to the shell.",
                hostname, channel_id
            ),
            Err(e) => format_error_for_chat(&e),
        }
    }

    /// `/terminal stop`
    pub async fn handle_terminal_stop(&self, channel_id: &str, user_id: &str) -> String {
        end_reply(
            "stopped",
            self.manager.stop_terminal(channel_id, user_id).await,
        )
    }

    /// `/terminal pause`
    pub async fn handle_terminal_pause(&self, channel_id: &str, user_id: &str) -> String {
        end_reply(
            "paused; use `/terminal restart` to resume it",
            self.manager.pause_terminal(channel_id, user_id).await,
        )
    }

    /// `/terminal restart`
    pub async fn handle_terminal_restart(&self, channel_id: &str, user_id: &str) -> String {
        match self.manager.restart_terminal(channel_id, user_id).await {
            Ok(handle) => {
                let host = self
                    .manager
                    .registry()
                    .get(&handle.channel_id)
                    .await
                    .map(|e| e.hostname)
                    .unwrap_or_default();
                format!(
                    "Terminal session restarted on host '{}' in <#{}>.",
                    host, channel_id
                )
            }
            Err(e) => format_error_for_chat(&e),
        }
    }

    /// `/terminal list`
    pub async fn handle_terminal_list(&self) -> String {
        format_session_list(&self.manager.list_sessions().await)
    }

    /// A button press or modal submission on a live status message
    pub async fn handle_control(
        &self,
        session_id: &str,
        user_id: &str,
        action: OneShotCommand,
    ) -> Dispatch {
        self.manager
            .oneshot_control(session_id, user_id, action)
            .await
    }

    /// A plain message in a channel that may host a terminal
    pub async fn handle_message(&self, channel_id: &str, user_id: &str, text: &str) -> Dispatch {
        self.manager.terminal_input(channel_id, user_id, text).await
    }
}

fn end_reply(verb: &str, result: EngineResult<Dispatch>) -> String {
    match result {
        Ok(Dispatch::Delivered) => format!("Terminal session {}.", verb),
        Ok(Dispatch::Ignored) => "Only the controller of this terminal can do that.".to_string(),
        Ok(_) => "No terminal session is running in this channel.".to_string(),
        Err(e) => format_error_for_chat(&e),
    }
}

fn state_label(state: SessionState) -> String {
    let label = match state {
        SessionState::OneShot(s) => format!("{:?}", s),
        SessionState::Terminal(s) => format!("{:?}", s),
    };
    label.to_lowercase()
}

/// Render live sessions for `/terminal list`
#[must_use]
pub fn format_session_list(sessions: &[SessionSummary]) -> String {
    if sessions.is_empty() {
        return "No active sessions.".to_string();
    }

    let mut out = format!("**Active sessions ({}):**", sessions.len());
    for s in sessions {
        let line = match s.kind {
            SessionKind::Terminal => format!(
                "\n• Terminal on `{}` in <#{}>, controller <@{}>, {}",
                s.hostname,
                s.session_id,
                s.controller_id,
                state_label(s.state)
            ),
            SessionKind::OneShot => format!(
                "\n• `{}` on `{}`, controller <@{}>, {}",
                s.command.as_deref().unwrap_or(""),
                s.hostname,
                s.controller_id,
                state_label(s.state)
            ),
        };
        out.push_str(&line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shellcord_core::{OneShotState, TerminalState};

    #[test]
    fn test_control_custom_ids() {
        let sid = "550e8400-e29b-41d4-a716-446655440000";
        for action in ControlAction::ALL {
            let id = action.custom_id(sid);
            assert_eq!(ControlAction::parse(&id), Some((sid, action)));
        }
        assert_eq!(
            ControlAction::Interrupt.custom_id("s1"),
            "exec:s1:interrupt"
        );
    }

    #[test]
    fn test_control_custom_id_rejects_unknown() {
        assert!(ControlAction::parse("exec:s1:reboot").is_none());
        assert!(ControlAction::parse("exec::finish").is_none());
        assert!(ControlAction::parse("approve:s1").is_none());
        assert!(ControlAction::parse("exec:s1").is_none());
    }

    #[test]
    fn test_input_modal_id() {
        assert_eq!(parse_input_modal_id(&input_modal_id("s1")), Some("s1"));
        assert!(parse_input_modal_id("exec_input:").is_none());
        assert!(parse_input_modal_id("exec:s1:input").is_none());
    }

    #[test]
    fn test_end_reply() {
        assert_eq!(
            end_reply("stopped", Ok(Dispatch::Delivered)),
            "Terminal session stopped."
        );
        assert!(end_reply("stopped", Ok(Dispatch::Ignored)).contains("controller"));
        assert!(
            end_reply("stopped", Err(shellcord_core::Error::SessionNotFound("1".into())))
                .contains("no longer running")
        );
    }

    #[test]
    fn test_format_session_list() {
        assert_eq!(format_session_list(&[]), "No active sessions.");

        let sessions = vec![
            SessionSummary {
                session_id: "111".to_string(),
                kind: SessionKind::Terminal,
                controller_id: "42".to_string(),
                hostname: "web1".to_string(),
                command: None,
                state: SessionState::Terminal(TerminalState::Reconnecting),
                started_at: Utc::now(),
            },
            SessionSummary {
                session_id: "abc".to_string(),
                kind: SessionKind::OneShot,
                controller_id: "7".to_string(),
                hostname: "db".to_string(),
                command: Some("uptime".to_string()),
                state: SessionState::OneShot(OneShotState::Running),
                started_at: Utc::now(),
            },
        ];
        let text = format_session_list(&sessions);
        assert!(text.starts_with("**Active sessions (2):**"));
        assert!(text.contains("Terminal on `web1` in <#111>, controller <@42>, reconnecting"));
        assert!(text.contains("`uptime` on `db`, controller <@7>, running"));
    }
}
