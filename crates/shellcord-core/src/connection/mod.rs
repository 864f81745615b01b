//! Remote shell connections
//!
//! The engine talks to remote hosts through three traits:
//! - [`Connector`] turns a [`HostTarget`] into an authenticated [`RemoteConnection`]
//! - [`RemoteConnection`] opens PTY-backed shells or runs a single command
//! - [`RemoteShell`] is a non-blocking byte pipe to one remote channel
//!
//! [`SshConnector`] is the production implementation.

mod ssh;

pub use ssh::SshConnector;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::credentials::Credential;
use crate::error::{Error, Result};

/// Default SSH port
pub const DEFAULT_PORT: u16 = 22;

/// Everything needed to open an authenticated connection
#[derive(Debug, Clone)]
pub struct HostTarget {
    /// Alias the controller refers to the host by
    pub hostname: String,
    /// Network address
    pub address: String,
    /// Port
    pub port: u16,
    /// Login name
    pub username: String,
    /// Password or key material
    pub credential: Credential,
}

/// Pseudo-terminal settings for an opened shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyRequest {
    /// TERM value
    pub term: String,
    /// Width in columns
    pub cols: u32,
    /// Height in rows
    pub rows: u32,
}

impl PtyRequest {
    /// An xterm PTY of the given size
    #[must_use]
    pub fn xterm(cols: u32, rows: u32) -> Self {
        Self {
            term: "xterm".to_string(),
            cols,
            rows,
        }
    }
}

impl Default for PtyRequest {
    fn default() -> Self {
        Self::xterm(80, 24)
    }
}

/// Collected result of a command run to completion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    /// Standard output, lossily decoded
    pub stdout: String,
    /// Standard error, lossily decoded
    pub stderr: String,
    /// Exit status, if the remote reported one
    pub exit_status: Option<u32>,
}

impl ExecOutput {
    /// Whether the command exited with status zero
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }

    /// Convert a non-zero or missing exit status into an error
    pub fn into_result(self, host: &str) -> Result<Self> {
        match self.exit_status {
            Some(0) => Ok(self),
            Some(code) => Err(Error::RemoteExecFailure {
                host: host.to_string(),
                reason: format!("exit status {}: {}", code, self.stderr.trim()),
            }),
            None => Err(Error::RemoteExecFailure {
                host: host.to_string(),
                reason: "channel closed without exit status".to_string(),
            }),
        }
    }
}

/// Opens authenticated connections
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect and authenticate, or fail with a classified error
    ///
    /// Fails with `CredentialMissing`, `AuthFailure`, `NetworkUnreachable`
    /// or `ConnectTimeout`. Key material is parsed in memory and never touches disk.
    async fn connect(&self, target: &HostTarget) -> Result<Box<dyn RemoteConnection>>;
}

/// An authenticated connection owned by exactly one session
#[async_trait]
pub trait RemoteConnection: Send + Sync {
    /// Open a PTY-backed interactive shell
    async fn open_shell(&mut self, pty: &PtyRequest) -> Result<Box<dyn RemoteShell>>;

    /// Start `command` on a PTY-backed channel and return it for streaming
    async fn open_command(&mut self, command: &str, pty: &PtyRequest)
        -> Result<Box<dyn RemoteShell>>;

    /// Run `command` to completion and collect its output
    async fn exec(&mut self, command: &str) -> Result<ExecOutput>;

    /// Close the connection. Errors are swallowed; closing twice is a no-op.
    async fn close(&mut self);
}

/// A single remote channel with non-blocking readiness checks
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Whether stdout bytes can be read without waiting
    fn stdout_ready(&mut self) -> bool;

    /// Whether stderr bytes can be read without waiting
    fn stderr_ready(&mut self) -> bool;

    /// Read up to `max` ready stdout bytes; empty when nothing is ready
    fn read_stdout(&mut self, max: usize) -> Vec<u8>;

    /// Read up to `max` ready stderr bytes; empty when nothing is ready
    fn read_stderr(&mut self, max: usize) -> Vec<u8>;

    /// Exit status, once the remote has reported one
    fn exit_status(&mut self) -> Option<u32>;

    /// Whether the remote side has closed the channel
    fn is_closed(&mut self) -> bool;

    /// Write bytes to the remote stdin
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Close the channel. Errors are swallowed.
    async fn close(&mut self);
}
