//! Reconnection supervisor for persistent terminals
//!
//! Runs a bounded number of attempts to rebuild a lost shell. Each attempt
//! closes the stale handle, re-resolves the host (credentials may have
//! changed), reconnects and replays the shell setup. Failed attempts are
//! reported to the channel and followed by a fixed backoff. Cancellation
//! aborts the supervisor between and during attempts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::error::Error;
use crate::terminal::{self, TerminalLink};

/// How many times to retry and how long to wait between tries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts before giving up
    pub attempts: u32,
    /// Wait after each failed attempt except the last
    pub backoff: Duration,
}

impl From<&EngineConfig> for ReconnectPolicy {
    fn from(config: &EngineConfig) -> Self {
        Self {
            attempts: config.reconnect_attempts,
            backoff: config.reconnect_backoff(),
        }
    }
}

/// Marks a session as reconnecting; at most one supervisor holds it
#[derive(Debug, Clone, Default)]
pub struct ReconnectFlag(Arc<AtomicBool>);

impl ReconnectFlag {
    /// Create an unset flag
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag, returning a guard that clears it, or `None` if already set
    pub fn try_acquire(&self) -> Option<ReconnectGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ReconnectGuard(self.0.clone()))
    }
}

/// Clears the reconnecting flag when dropped
#[derive(Debug)]
pub struct ReconnectGuard(Arc<AtomicBool>);

impl Drop for ReconnectGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// How a supervisor run ended
#[derive(Debug)]
pub enum ReconnectOutcome {
    /// A fresh shell is ready
    Restored {
        /// The new link
        link: TerminalLink,
        /// Attempt that succeeded, starting at 1
        attempt: u32,
    },
    /// Every attempt failed
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Error from the last attempt
        last_error: Option<Error>,
    },
    /// Cancelled before success
    Aborted,
    /// Another supervisor already holds the flag
    AlreadyRunning,
}

/// Rebuilds the shell of one terminal session
pub struct ReconnectSupervisor<'a> {
    ctx: &'a EngineContext,
    channel_id: &'a str,
    owner_id: &'a str,
    hostname: &'a str,
    policy: ReconnectPolicy,
    cancel: &'a CancellationToken,
    flag: &'a ReconnectFlag,
}

impl<'a> ReconnectSupervisor<'a> {
    /// Create a supervisor for the terminal bound to `channel_id`
    pub fn new(
        ctx: &'a EngineContext,
        channel_id: &'a str,
        owner_id: &'a str,
        hostname: &'a str,
        cancel: &'a CancellationToken,
        flag: &'a ReconnectFlag,
    ) -> Self {
        Self {
            ctx,
            channel_id,
            owner_id,
            hostname,
            policy: ReconnectPolicy::from(ctx.config.as_ref()),
            cancel,
            flag,
        }
    }

    /// Run attempts until one succeeds, all fail, or the token is cancelled
    pub async fn run(&self, mut stale: Option<TerminalLink>) -> ReconnectOutcome {
        let Some(_guard) = self.flag.try_acquire() else {
            return ReconnectOutcome::AlreadyRunning;
        };

        let mut last_error = None;
        let mut attempts = 0;

        while attempts < self.policy.attempts {
            if self.cancel.is_cancelled() {
                return ReconnectOutcome::Aborted;
            }
            attempts += 1;

            if let Some(mut link) = stale.take() {
                link.close().await;
            }

            let result = tokio::select! {
                result = terminal::establish(self.ctx, self.owner_id, self.hostname) => result,
                _ = self.cancel.cancelled() => return ReconnectOutcome::Aborted,
            };

            match result {
                Ok(link) => {
                    info!(
                        channel_id = %self.channel_id,
                        host = %self.hostname,
                        attempt = attempts,
                        "Terminal reconnected"
                    );
                    return ReconnectOutcome::Restored {
                        link,
                        attempt: attempts,
                    };
                }
                Err(e) => {
                    warn!(
                        channel_id = %self.channel_id,
                        host = %self.hostname,
                        attempt = attempts,
                        error = %e,
                        "Reconnection attempt failed"
                    );
                    self.notify(&format!("Reconnection attempt {} failed: {}", attempts, e))
                        .await;

                    let fatal = matches!(
                        e,
                        Error::HostNotFound(_) | Error::CredentialMissing { .. }
                    );
                    last_error = Some(e);
                    if fatal {
                        break;
                    }
                }
            }

            if attempts < self.policy.attempts {
                tokio::select! {
                    _ = tokio::time::sleep(self.policy.backoff) => {}
                    _ = self.cancel.cancelled() => return ReconnectOutcome::Aborted,
                }
            }
        }

        ReconnectOutcome::Exhausted {
            attempts,
            last_error,
        }
    }

    async fn notify(&self, text: &str) {
        if let Err(e) = self.ctx.display.send_notice(self.channel_id, text).await {
            warn!(channel_id = %self.channel_id, error = %e, "Failed to send notice");
        }
    }
}
