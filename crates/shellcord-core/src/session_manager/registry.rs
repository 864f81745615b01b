//! Registry of live sessions
//!
//! The only cross-task mutable structure in the engine. Every insert and
//! removal happens under one lock; lookups hand out clones, so a caller never
//! mutates through a stale view.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::oneshot::{OneShotCommand, OneShotState};
use crate::terminal::{TerminalCommand, TerminalState};

/// Kind of session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// A single command streamed to a live status message
    OneShot,
    /// A channel-bound interactive shell
    Terminal,
}

/// Current state of a session, published by its task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// One-shot command state
    OneShot(OneShotState),
    /// Persistent terminal state
    Terminal(TerminalState),
}

impl SessionState {
    /// Whether the session still accepts controller actions
    #[must_use]
    pub fn is_live(&self) -> bool {
        match self {
            SessionState::OneShot(state) => state.is_live(),
            SessionState::Terminal(state) => state.is_live(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Control {
    OneShot(mpsc::UnboundedSender<OneShotCommand>),
    Terminal(mpsc::UnboundedSender<TerminalCommand>),
}

/// A registered session as seen from outside its task
#[derive(Debug, Clone)]
pub struct SessionEntry {
    /// Session identifier (channel id for terminals)
    pub session_id: String,
    /// Kind of session
    pub kind: SessionKind,
    /// Only this user may drive the session
    pub controller_id: String,
    /// Host alias
    pub hostname: String,
    /// One-shot command text
    pub command: Option<String>,
    /// When the session was registered
    pub started_at: DateTime<Utc>,
    pub(crate) control: Control,
    pub(crate) cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
}

impl SessionEntry {
    /// Latest published state
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Whether `actor` is the controller
    #[must_use]
    pub fn is_controller(&self, actor: &str) -> bool {
        self.controller_id == actor
    }

    /// Wait until the session leaves its live states
    pub async fn settled(&mut self) -> SessionState {
        let settled = match self.state.wait_for(|s| !s.is_live()).await {
            Ok(state) => Some(*state),
            // Sender dropped: the task is gone
            Err(_) => None,
        };
        settled.unwrap_or_else(|| *self.state.borrow())
    }

    /// Summary for listings
    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            kind: self.kind,
            controller_id: self.controller_id.clone(),
            hostname: self.hostname.clone(),
            command: self.command.clone(),
            state: self.state(),
            started_at: self.started_at,
        }
    }
}

/// Pieces handed to the task that drives a newly registered session
pub(crate) struct Registration<C> {
    pub entry: SessionEntry,
    pub commands: mpsc::UnboundedReceiver<C>,
    pub state: watch::Sender<SessionState>,
    pub cancel: CancellationToken,
}

impl Registration<OneShotCommand> {
    pub(crate) fn one_shot(
        session_id: &str,
        controller_id: &str,
        hostname: &str,
        command: &str,
    ) -> Self {
        let (tx, commands) = mpsc::unbounded_channel();
        Self::build(
            session_id,
            SessionKind::OneShot,
            controller_id,
            hostname,
            Some(command.to_string()),
            Control::OneShot(tx),
            SessionState::OneShot(OneShotState::Starting),
            commands,
        )
    }
}

impl Registration<TerminalCommand> {
    pub(crate) fn terminal(channel_id: &str, controller_id: &str, hostname: &str) -> Self {
        let (tx, commands) = mpsc::unbounded_channel();
        Self::build(
            channel_id,
            SessionKind::Terminal,
            controller_id,
            hostname,
            None,
            Control::Terminal(tx),
            SessionState::Terminal(TerminalState::Connecting),
            commands,
        )
    }
}

impl<C> Registration<C> {
    #[allow(clippy::too_many_arguments)]
    fn build(
        session_id: &str,
        kind: SessionKind,
        controller_id: &str,
        hostname: &str,
        command: Option<String>,
        control: Control,
        initial: SessionState,
        commands: mpsc::UnboundedReceiver<C>,
    ) -> Self {
        let (state, state_rx) = watch::channel(initial);
        let cancel = CancellationToken::new();
        let entry = SessionEntry {
            session_id: session_id.to_string(),
            kind,
            controller_id: controller_id.to_string(),
            hostname: hostname.to_string(),
            command,
            started_at: Utc::now(),
            control,
            cancel: cancel.clone(),
            state: state_rx,
        };
        Self {
            entry,
            commands,
            state,
            cancel,
        }
    }
}

/// Session summary for listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session identifier
    pub session_id: String,
    /// Kind of session
    pub kind: SessionKind,
    /// Controller
    pub controller_id: String,
    /// Host alias
    pub hostname: String,
    /// One-shot command text
    pub command: Option<String>,
    /// Latest state
    pub state: SessionState,
    /// Registration time
    pub started_at: DateTime<Utc>,
}

/// Map of live sessions keyed by session id
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `entry`, failing if its id is already taken
    pub async fn register(&self, entry: SessionEntry) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&entry.session_id) {
            return Err(Error::SessionExists(entry.session_id));
        }
        debug!(session_id = %entry.session_id, kind = ?entry.kind, "Session registered");
        sessions.insert(entry.session_id.clone(), entry);
        Ok(())
    }

    /// Remove a session, returning its entry if it was present
    pub async fn retire(&self, session_id: &str) -> Option<SessionEntry> {
        let removed = self.sessions.lock().await.remove(session_id);
        if removed.is_some() {
            debug!(session_id = %session_id, "Session retired");
        }
        removed
    }

    /// Snapshot of one entry
    pub async fn get(&self, session_id: &str) -> Option<SessionEntry> {
        self.sessions.lock().await.get(session_id).cloned()
    }

    /// Whether a session is registered under `session_id`
    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.lock().await.contains_key(session_id)
    }

    /// Snapshot of every entry
    pub async fn entries(&self) -> Vec<SessionEntry> {
        self.sessions.lock().await.values().cloned().collect()
    }

    /// Summaries of every session, oldest first
    pub async fn summaries(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<_> = self
            .sessions
            .lock()
            .await
            .values()
            .map(SessionEntry::summary)
            .collect();
        summaries.sort_by_key(|s| s.started_at);
        summaries
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether no sessions are live
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
