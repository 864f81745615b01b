//! Error types for shellcord-core
//!
//! This module provides the engine's error taxonomy and user-friendly error formatting.

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Host record has neither a password nor key material
    #[error("no credentials configured for host '{host}'")]
    CredentialMissing {
        /// Host alias
        host: String,
    },

    /// Remote rejected the credentials, or the key material is unusable
    #[error("authentication failed for '{host}': {reason}")]
    AuthFailure {
        /// Host alias
        host: String,
        /// Detailed message
        reason: String,
    },

    /// Host could not be reached
    #[error("network unreachable for '{host}': {reason}")]
    NetworkUnreachable {
        /// Host alias
        host: String,
        /// Detailed message
        reason: String,
    },

    /// Connection did not complete within the configured timeout
    #[error("connection to '{host}' timed out after {secs}s")]
    ConnectTimeout {
        /// Host alias
        host: String,
        /// Timeout that elapsed
        secs: u64,
    },

    /// Remote command or channel failed mid-session
    #[error("remote execution failed on '{host}': {reason}")]
    RemoteExecFailure {
        /// Host alias
        host: String,
        /// Detailed message
        reason: String,
    },

    /// One-shot session saw no output or input for too long
    #[error("session {session_id} was idle for {secs}s")]
    IdleTimeout {
        /// Session identifier
        session_id: String,
        /// Idle window that elapsed
        secs: u64,
    },

    /// Every reconnection attempt failed
    #[error("reconnection to '{host}' failed after {attempts} attempts")]
    ReconnectExhausted {
        /// Host alias
        host: String,
        /// Number of attempts made
        attempts: u32,
    },

    /// No host record for this owner and alias
    #[error("host not found: {0}")]
    HostNotFound(String),

    /// No live session under this identifier
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A live session already occupies this identifier
    #[error("session already active: {0}")]
    SessionExists(String),

    /// Restart requested but nothing inactive is recorded for the channel
    #[error("no inactive session recorded for channel {0}")]
    NoInactiveSession(String),

    /// Display surface rejected an update
    #[error("display error: {0}")]
    Display(String),

    /// Transport-level failure outside connection setup
    #[error("transport error: {0}")]
    Transport(String),

    /// Durable store failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Internal error (I/O, serialization, etc.)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Trait for user-friendly error messages
///
/// Provides human-readable error messages and suggestions for fixing.
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get a suggestion for how to fix the error
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for Error {
    fn user_message(&self) -> String {
        match self {
            Error::CredentialMissing { host } => {
                format!("🔑 Host '{}' has no password or key configured.", host)
            }
            Error::AuthFailure { host, reason } => {
                format!("🔑 Authentication to '{}' failed: {}", host, reason)
            }
            Error::NetworkUnreachable { host, .. } => {
                format!("🌐 Could not reach host '{}'.", host)
            }
            Error::ConnectTimeout { host, secs } => {
                format!("⏳ Connection to '{}' timed out after {} seconds.", host, secs)
            }
            Error::RemoteExecFailure { host, reason } => {
                format!("⚡ Remote execution on '{}' failed: {}", host, reason)
            }
            Error::IdleTimeout { secs, .. } => {
                format!(
                    "⏱️ Command terminated due to lack of activity for {} seconds.",
                    secs
                )
            }
            Error::ReconnectExhausted { host, attempts } => format!(
                "🔌 All {} reconnection attempts to '{}' failed. \
                 Terminal session has been terminated.",
                attempts, host
            ),
            Error::HostNotFound(host) => format!("🔍 No host named '{}' is configured.", host),
            Error::SessionNotFound(_) => "🔍 That session is no longer running.".to_string(),
            Error::SessionExists(_) => {
                "📟 A terminal session is already running in this channel.".to_string()
            }
            Error::NoInactiveSession(_) => {
                "📟 No inactive terminal session found for this channel.".to_string()
            }
            Error::Display(msg) => format!("🖥️ Display error: {}", msg),
            Error::Transport(msg) => format!("🔌 Transport error: {}", msg),
            Error::Database(e) => format!("💾 Database error: {}", e),
            Error::Internal(msg) => format!("❌ Internal error: {}", msg),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            Error::CredentialMissing { host } | Error::HostNotFound(host) => Some(format!(
                "💡 Run `shellcord host add {}` with a password or identity file.",
                host
            )),
            Error::AuthFailure { .. } => {
                Some(
                    "💡 Check the username, password or identity file for this host."
                        .to_string(),
                )
            }
            Error::NetworkUnreachable { .. } | Error::ConnectTimeout { .. } => {
                Some("💡 Check the host address, port and firewall settings.".to_string())
            }
            Error::IdleTimeout { .. } => {
                Some("💡 Run the command with `continuous: true` to stop timeouts.".to_string())
            }
            Error::SessionExists(_) => {
                Some("💡 Stop the running session before starting a new one.".to_string())
            }
            Error::NoInactiveSession(_) => {
                Some("💡 Start a new session with `/terminal start`.".to_string())
            }
            _ => None,
        }
    }
}

/// Format an error for display in the CLI
pub fn format_error_for_cli(error: &Error) -> String {
    let mut output = String::new();

    output.push_str(&error.user_message());
    output.push('\n');

    if let Some(suggestion) = error.suggestion() {
        output.push('\n');
        output.push_str(&suggestion);
        output.push('\n');
    }

    output
}

/// Format an error for display in a chat message
pub fn format_error_for_chat(error: &Error) -> String {
    let mut output = error.user_message();

    if let Some(suggestion) = error.suggestion() {
        output.push_str("\n\n");
        output.push_str(&suggestion);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failure_message() {
        let error = Error::AuthFailure {
            host: "web1".to_string(),
            reason: "permission denied".to_string(),
        };

        let msg = error.user_message();
        assert!(msg.contains("web1"));
        assert!(msg.contains("permission denied"));
        assert!(error.suggestion().unwrap().contains("identity file"));
    }

    #[test]
    fn test_idle_timeout_message() {
        let error = Error::IdleTimeout {
            session_id: "abc".to_string(),
            secs: 120,
        };

        let msg = error.user_message();
        assert!(msg.contains("120 seconds"));
        assert!(error.suggestion().unwrap().contains("continuous"));
    }

    #[test]
    fn test_host_not_found_suggests_cli() {
        let error = Error::HostNotFound("db".to_string());

        let suggestion = error.suggestion().unwrap();
        assert!(suggestion.contains("shellcord host add db"));
    }

    #[test]
    fn test_format_error_for_cli() {
        let error = Error::ConnectTimeout {
            host: "web1".to_string(),
            secs: 10,
        };

        let output = format_error_for_cli(&error);
        assert!(output.contains("10 seconds"));
        assert!(output.contains("firewall"));
    }

    #[test]
    fn test_format_error_for_chat() {
        let error = Error::ReconnectExhausted {
            host: "web1".to_string(),
            attempts: 3,
        };

        let output = format_error_for_chat(&error);
        assert!(output.contains("All 3 reconnection attempts to 'web1' failed"));
        assert!(!output.contains("💡"));
    }
}
