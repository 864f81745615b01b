//! Display surface abstraction
//!
//! Sessions render through a [`DisplaySurface`]: a live status message that is
//! edited in place for one-shot commands, plain text messages for persistent
//! terminals, and a file attachment carrying the full transcript.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Transcript attachment name for one-shot commands
pub const COMMAND_TRANSCRIPT_FILE: &str = "command_output.txt";
/// Transcript attachment name for persistent terminals
pub const TERMINAL_TRANSCRIPT_FILE: &str = "terminal_session.txt";

/// Lifecycle phase shown on a live status message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPhase {
    /// Command is running
    Executing,
    /// Command exited
    Completed,
    /// Controller interrupted or finished the command
    Cancelled,
    /// Command was stopped for inactivity
    TimedOut,
    /// Command failed mid-session
    Failed,
}

impl StatusPhase {
    /// Verb used in the status title
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            StatusPhase::Executing => "Executing",
            StatusPhase::Completed => "Completed",
            StatusPhase::Cancelled => "Cancelled",
            StatusPhase::TimedOut => "Timed Out",
            StatusPhase::Failed => "Failed",
        }
    }
}

/// Live status of a one-shot command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveStatus {
    /// Session identifier; controls are keyed on it
    pub session_id: String,
    /// Host alias
    pub hostname: String,
    /// Command being run
    pub command: String,
    /// Rendered output window
    pub output: String,
    /// Whether older output was dropped to fit
    pub truncated: bool,
    /// Current phase
    pub phase: StatusPhase,
    /// Whether interrupt/input/finish controls are offered
    pub controls_enabled: bool,
    /// Extra line shown under the output (exit status, timeout notice)
    pub note: Option<String>,
}

/// Full transcript delivered when a session ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptArtifact {
    /// Attachment file name
    pub filename: String,
    /// Message sent alongside the attachment
    pub caption: String,
    /// Transcript lines joined with `\n`
    pub body: String,
}

impl TranscriptArtifact {
    /// Build an artifact from transcript lines
    #[must_use]
    pub fn from_lines(filename: &str, caption: impl Into<String>, lines: &[String]) -> Self {
        Self {
            filename: filename.to_string(),
            caption: caption.into(),
            body: lines.join("\n"),
        }
    }
}

/// Where session output is rendered
#[async_trait]
pub trait DisplaySurface: Send + Sync {
    /// Post a new live status message, returning its message id
    async fn post_status(&self, channel_id: &str, status: &LiveStatus) -> Result<String>;

    /// Replace the contents of a live status message
    async fn update_status(
        &self,
        channel_id: &str,
        message_id: &str,
        status: &LiveStatus,
    ) -> Result<()>;

    /// Send a block of terminal text
    async fn send_text(&self, channel_id: &str, text: &str) -> Result<()>;

    /// Send a plain notice (reconnect progress, restore messages)
    async fn send_notice(&self, channel_id: &str, text: &str) -> Result<()>;

    /// Deliver a transcript attachment
    async fn send_transcript(&self, channel_id: &str, artifact: &TranscriptArtifact) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_labels() {
        assert_eq!(StatusPhase::Executing.label(), "Executing");
        assert_eq!(StatusPhase::TimedOut.label(), "Timed Out");
    }

    #[test]
    fn test_artifact_from_lines() {
        let lines = vec!["a".to_string(), "b".to_string()];
        let artifact = TranscriptArtifact::from_lines(COMMAND_TRANSCRIPT_FILE, "done", &lines);
        assert_eq!(artifact.body, "a\nb");
        assert_eq!(artifact.filename, "command_output.txt");
    }
}
