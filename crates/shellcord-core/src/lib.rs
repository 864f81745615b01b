//! Shellcord Core - Remote Interactive Session Engine
//!
//! This crate runs remote shell sessions on behalf of chat users:
//! - One-shot commands: stream a single command's output into a live status
//!   message, with interrupt/input/finish controls and an idle timeout
//! - Persistent terminals: channel-bound interactive shells with automatic
//!   reconnection and restore after a restart
//! - Output sanitization, bounded display windows and transcript delivery
//! - Host directory and durable session rows in SQLite

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod buffer;
pub mod config;
pub mod connection;
pub mod context;
pub mod credentials;
pub mod display;
pub mod error;
pub mod hosts;
pub mod machine;
pub mod oneshot;
pub mod reconnect;
pub mod sanitize;
pub mod session_manager;
pub mod store;
pub mod terminal;

#[cfg(test)]
pub(crate) mod testing;

pub use buffer::{chunk, RenderedWindow, RollingBuffer, WindowCapacity};
pub use config::EngineConfig;
pub use connection::{
    Connector, ExecOutput, HostTarget, PtyRequest, RemoteConnection, RemoteShell, SshConnector,
};
pub use credentials::{Credential, SecretString};
pub use display::{DisplaySurface, LiveStatus, StatusPhase, TranscriptArtifact};
pub use error::{format_error_for_chat, format_error_for_cli, Error, Result, UserFriendlyError};
pub use hosts::{HostDirectory, HostRecord, HostSummary};
pub use oneshot::{CommandHandle, CommandRequest, OneShotCommand, OneShotReport, OneShotState};
pub use sanitize::{sanitize, OutputSanitizer};
pub use session_manager::{
    Dispatch, RecoveryReport, SessionKind, SessionManager, SessionState, SessionSummary,
};
pub use store::{DurableSession, SessionStore, SqliteStore};
pub use terminal::{TerminalHandle, TerminalReport, TerminalState};
