//! Engine configuration
//!
//! Timing, buffering and display limits shared by every session. Values are
//! deserialized from the `[engine]` table of the application config.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Session engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Output polling cadence in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Minimum gap between live display refreshes in milliseconds
    #[serde(default = "default_display_refresh_ms")]
    pub display_refresh_ms: u64,
    /// One-shot sessions time out after this many idle seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Connect plus authenticate must finish within this many seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Reconnection attempts before a terminal session is terminated
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    /// Wait between failed reconnection attempts in seconds
    #[serde(default = "default_reconnect_backoff_secs")]
    pub reconnect_backoff_secs: u64,
    /// One-shot display window, in lines
    #[serde(default = "default_window_lines")]
    pub window_lines: usize,
    /// Persistent terminal window, in characters
    #[serde(default = "default_window_chars")]
    pub window_chars: usize,
    /// Persistent output is flushed once this many characters are pending
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
    /// Largest text message sent to the display surface
    #[serde(default = "default_message_ceiling")]
    pub message_ceiling: usize,
    /// Largest output block in a live status message
    #[serde(default = "default_status_ceiling")]
    pub status_ceiling: usize,
    /// Bytes requested per read from the remote channel
    #[serde(default = "default_read_chunk")]
    pub read_chunk: usize,
    /// PTY width in columns
    #[serde(default = "default_pty_cols")]
    pub pty_cols: u32,
    /// PTY height in rows
    #[serde(default = "default_pty_rows")]
    pub pty_rows: u32,
}

impl EngineConfig {
    /// Output polling cadence
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Minimum gap between display refreshes
    #[must_use]
    pub fn display_refresh(&self) -> Duration {
        Duration::from_millis(self.display_refresh_ms)
    }

    /// One-shot idle timeout
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Connect timeout
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Backoff between reconnection attempts
    #[must_use]
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            display_refresh_ms: default_display_refresh_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_backoff_secs: default_reconnect_backoff_secs(),
            window_lines: default_window_lines(),
            window_chars: default_window_chars(),
            flush_threshold: default_flush_threshold(),
            message_ceiling: default_message_ceiling(),
            status_ceiling: default_status_ceiling(),
            read_chunk: default_read_chunk(),
            pty_cols: default_pty_cols(),
            pty_rows: default_pty_rows(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    100
}
fn default_display_refresh_ms() -> u64 {
    1000
}
fn default_idle_timeout_secs() -> u64 {
    120
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_reconnect_attempts() -> u32 {
    3
}
fn default_reconnect_backoff_secs() -> u64 {
    2
}
fn default_window_lines() -> usize {
    50
}
fn default_window_chars() -> usize {
    4000
}
fn default_flush_threshold() -> usize {
    1500
}
fn default_message_ceiling() -> usize {
    1900
}
fn default_status_ceiling() -> usize {
    3800
}
fn default_read_chunk() -> usize {
    4096
}
fn default_pty_cols() -> u32 {
    80
}
fn default_pty_rows() -> u32 {
    24
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.idle_timeout(), Duration::from_secs(120));
        assert_eq!(config.reconnect_attempts, 3);
        assert_eq!(config.reconnect_backoff(), Duration::from_secs(2));
        assert_eq!(config.window_lines, 50);
        assert_eq!(config.message_ceiling, 1900);
        assert_eq!(config.status_ceiling, 3800);
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"idle_timeout_secs": 30, "pty_cols": 120}"#).unwrap();
        assert_eq!(config.idle_timeout_secs, 30);
        assert_eq!(config.pty_cols, 120);
        assert_eq!(config.read_chunk, 4096);
    }
}
