//! One-shot command sessions
//!
//! A one-shot session runs a single command on a PTY-backed channel, streams
//! its sanitized output into a live status message, and delivers the full
//! transcript when it settles.
//!
//! ```text
//! STARTING ──connected──▶ RUNNING ──exit────────▶ COMPLETED ──┐
//!    │                      ├──interrupt────────▶ CANCELLED ──┤
//!    │                      ├──idle─────────────▶ TIMED_OUT ──┤ finalize
//!    │                      └──failed──────────┐              │
//!    └──failed─────────────────────────────────┴─▶ FINALIZED ◀─┘
//! ```

mod session;
mod state;

pub use state::{transition, OneShotEffect, OneShotEvent, OneShotState};

pub(crate) use session::launch;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

/// Interrupt byte (Ctrl+C)
pub const INTERRUPT: &[u8] = b"\x03";

/// Request to run a command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Channel the live status is posted to
    pub channel_id: String,
    /// User who issued the command and controls it
    pub controller_id: String,
    /// Host alias
    pub hostname: String,
    /// Command line
    pub command: String,
    /// Disable the idle timeout
    #[serde(default)]
    pub continuous: bool,
}

/// Controller actions on a running command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OneShotCommand {
    /// Send a line of input
    Input(String),
    /// Send Ctrl+C and cancel
    Interrupt,
    /// Stop streaming and finalize
    Finish,
}

/// Final account of a one-shot session
#[derive(Debug, Clone)]
pub struct OneShotReport {
    /// Session identifier
    pub session_id: String,
    /// State the command settled in before finalization
    pub outcome: OneShotState,
    /// Every state entered, in order
    pub states: Vec<OneShotState>,
    /// Exit status reported by the remote
    pub exit_status: Option<u32>,
    /// Failure that ended the session early
    pub failure: Option<String>,
    /// Full transcript
    pub transcript: Vec<String>,
}

/// A started command
#[derive(Debug)]
pub struct CommandHandle {
    /// Session identifier, used to address controller actions
    pub session_id: String,
    /// Resolves when the session is finalized
    pub task: JoinHandle<OneShotReport>,
}
