//! Persistent terminal sessions
//!
//! A terminal is bound to a chat channel. Its controller's messages are
//! written to an interactive remote shell and the shell's output is posted
//! back in chunks. When the transport drops, the reconnection supervisor
//! rebuilds the shell before the session is given up.
//!
//! Each terminal has a durable row so sessions that were active when the
//! process stopped can be restored on the next start.

pub mod control;
mod session;
mod state;

pub use state::{
    transition, TerminalEffect, TerminalEvent, TerminalState, NOTICE_CONNECTION_LOST,
    NOTICE_INPUT_DROPPED, NOTICE_RECONNECTED,
};

pub(crate) use session::{establish, launch};

use tokio::task::JoinHandle;

use crate::connection::{RemoteConnection, RemoteShell};

/// Lines written to a fresh shell before it is handed to the controller
pub const SHELL_SETUP: &[&str] = &["export TERM=xterm", "set +o vi", "stty -echo"];

/// Actions delivered to a terminal task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCommand {
    /// Bytes to write
    Input(Vec<u8>),
    /// End the session and delete its durable row
    Stop,
    /// End the session, keeping its row for a later restart
    Pause,
    /// Process shutdown; the row stays active for restore
    Shutdown,
}

impl TerminalCommand {
    fn into_event(self) -> TerminalEvent {
        match self {
            TerminalCommand::Input(bytes) => TerminalEvent::Input(bytes),
            TerminalCommand::Stop => TerminalEvent::Stop,
            TerminalCommand::Pause => TerminalEvent::Pause,
            TerminalCommand::Shutdown => TerminalEvent::Shutdown,
        }
    }
}

/// Final account of a terminal session
#[derive(Debug, Clone)]
pub struct TerminalReport {
    /// Channel the terminal was bound to
    pub channel_id: String,
    /// Every state entered, in order
    pub states: Vec<TerminalState>,
    /// Successful reconnections
    pub reconnects: u32,
    /// Full transcript
    pub transcript: Vec<String>,
}

impl TerminalReport {
    /// State the terminal ended in
    #[must_use]
    pub fn final_state(&self) -> TerminalState {
        self.states
            .last()
            .copied()
            .unwrap_or(TerminalState::Connecting)
    }
}

/// A started terminal
#[derive(Debug)]
pub struct TerminalHandle {
    /// Channel the terminal is bound to
    pub channel_id: String,
    /// Resolves when the terminal ends
    pub task: JoinHandle<TerminalReport>,
}

/// An open shell and the connection that carries it
pub struct TerminalLink {
    pub(crate) connection: Box<dyn RemoteConnection>,
    pub(crate) shell: Box<dyn RemoteShell>,
}

impl TerminalLink {
    /// Close shell and connection, ignoring errors
    pub async fn close(&mut self) {
        self.shell.close().await;
        self.connection.close().await;
    }
}

impl std::fmt::Debug for TerminalLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalLink").finish_non_exhaustive()
    }
}
