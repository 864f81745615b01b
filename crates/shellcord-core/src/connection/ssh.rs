//! SSH transport built on russh

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::key::{KeyPair, PublicKey};
use tracing::{debug, info};

use super::{ExecOutput, HostTarget, PtyRequest, RemoteConnection, RemoteShell};
use crate::config::EngineConfig;
use crate::credentials::{Credential, SecretString};
use crate::error::{Error, Result};

/// Accepts every server key the first time it is seen
struct AcceptHostKey;

#[async_trait]
impl client::Handler for AcceptHostKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

enum Auth<'a> {
    Password(&'a SecretString),
    Key(KeyPair),
}

/// Opens SSH connections with password or private-key authentication
#[derive(Debug, Clone)]
pub struct SshConnector {
    connect_timeout: Duration,
}

impl SshConnector {
    /// Create a connector
    #[must_use]
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Create a connector from engine settings
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.connect_timeout())
    }

    /// Parse OpenSSH or PEM key material in memory
    fn load_key(host: &str, material: &SecretString) -> Result<KeyPair> {
        russh_keys::decode_secret_key(material.expose(), None).map_err(|e| Error::AuthFailure {
            host: host.to_string(),
            reason: format!("unusable private key: {}", e),
        })
    }

    async fn handshake(&self, target: &HostTarget, auth: Auth<'_>) -> Result<SshConnection> {
        let config = Arc::new(client::Config::default());
        let addr = (target.address.as_str(), target.port);

        let mut handle = client::connect(config, addr, AcceptHostKey)
            .await
            .map_err(|e| Error::NetworkUnreachable {
                host: target.hostname.clone(),
                reason: e.to_string(),
            })?;

        let accepted = match auth {
            Auth::Password(password) => {
                handle
                    .authenticate_password(target.username.as_str(), password.expose())
                    .await
            }
            Auth::Key(key) => {
                handle
                    .authenticate_publickey(target.username.as_str(), Arc::new(key))
                    .await
            }
        }
        .map_err(|e| Error::AuthFailure {
            host: target.hostname.clone(),
            reason: e.to_string(),
        })?;

        if !accepted {
            let _ = handle
                .disconnect(Disconnect::ByApplication, "", "en")
                .await;
            return Err(Error::AuthFailure {
                host: target.hostname.clone(),
                reason: format!(
                    "{} rejected for user {}",
                    target.credential.method(),
                    target.username
                ),
            });
        }

        Ok(SshConnection {
            handle,
            hostname: target.hostname.clone(),
            closed: false,
        })
    }
}

#[async_trait]
impl super::Connector for SshConnector {
    async fn connect(&self, target: &HostTarget) -> Result<Box<dyn RemoteConnection>> {
        let auth = match &target.credential {
            Credential::Password(password) => Auth::Password(password),
            Credential::KeyMaterial(material) => {
                Auth::Key(Self::load_key(&target.hostname, material)?)
            }
        };

        debug!(
            host = %target.hostname,
            address = %target.address,
            port = target.port,
            method = target.credential.method(),
            "Connecting"
        );

        let connection = tokio::time::timeout(self.connect_timeout, self.handshake(target, auth))
            .await
            .map_err(|_| Error::ConnectTimeout {
                host: target.hostname.clone(),
                secs: self.connect_timeout.as_secs(),
            })??;

        info!(host = %target.hostname, user = %target.username, "SSH connection established");
        Ok(Box::new(connection))
    }
}

struct SshConnection {
    handle: Handle<AcceptHostKey>,
    hostname: String,
    closed: bool,
}

impl SshConnection {
    fn failure(&self, e: russh::Error) -> Error {
        Error::RemoteExecFailure {
            host: self.hostname.clone(),
            reason: e.to_string(),
        }
    }

    async fn pty_channel(&mut self, pty: &PtyRequest) -> Result<Channel<Msg>> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| self.failure(e))?;
        channel
            .request_pty(false, &pty.term, pty.cols, pty.rows, 0, 0, &[])
            .await
            .map_err(|e| self.failure(e))?;
        Ok(channel)
    }
}

#[async_trait]
impl RemoteConnection for SshConnection {
    async fn open_shell(&mut self, pty: &PtyRequest) -> Result<Box<dyn RemoteShell>> {
        let channel = self.pty_channel(pty).await?;
        channel
            .request_shell(false)
            .await
            .map_err(|e| self.failure(e))?;
        Ok(Box::new(SshShell::new(channel)))
    }

    async fn open_command(
        &mut self,
        command: &str,
        pty: &PtyRequest,
    ) -> Result<Box<dyn RemoteShell>> {
        let channel = self.pty_channel(pty).await?;
        channel
            .exec(false, command)
            .await
            .map_err(|e| self.failure(e))?;
        Ok(Box::new(SshShell::new(channel)))
    }

    async fn exec(&mut self, command: &str) -> Result<ExecOutput> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| self.failure(e))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| self.failure(e))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext: 1 } => stderr.extend_from_slice(&data),
                ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_status,
        })
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            debug!(host = %self.hostname, error = %e, "Disconnect failed");
        }
    }
}

/// A russh channel drained into local buffers without blocking
struct SshShell {
    channel: Channel<Msg>,
    stdout: VecDeque<u8>,
    stderr: VecDeque<u8>,
    exit_status: Option<u32>,
    closed: bool,
}

impl SshShell {
    fn new(channel: Channel<Msg>) -> Self {
        Self {
            channel,
            stdout: VecDeque::new(),
            stderr: VecDeque::new(),
            exit_status: None,
            closed: false,
        }
    }

    /// Move every message already delivered to the channel into the buffers
    fn pump(&mut self) {
        while !self.closed {
            match self.channel.wait().now_or_never() {
                None => break,
                Some(None) => self.closed = true,
                Some(Some(msg)) => match msg {
                    ChannelMsg::Data { data } => self.stdout.extend(data.iter()),
                    ChannelMsg::ExtendedData { data, ext: 1 } => self.stderr.extend(data.iter()),
                    ChannelMsg::ExitStatus { exit_status } => self.exit_status = Some(exit_status),
                    ChannelMsg::Close => self.closed = true,
                    _ => {}
                },
            }
        }
    }
}

fn drain(buf: &mut VecDeque<u8>, max: usize) -> Vec<u8> {
    let n = buf.len().min(max);
    buf.drain(..n).collect()
}

#[async_trait]
impl RemoteShell for SshShell {
    fn stdout_ready(&mut self) -> bool {
        self.pump();
        !self.stdout.is_empty()
    }

    fn stderr_ready(&mut self) -> bool {
        self.pump();
        !self.stderr.is_empty()
    }

    fn read_stdout(&mut self, max: usize) -> Vec<u8> {
        self.pump();
        drain(&mut self.stdout, max)
    }

    fn read_stderr(&mut self, max: usize) -> Vec<u8> {
        self.pump();
        drain(&mut self.stderr, max)
    }

    fn exit_status(&mut self) -> Option<u32> {
        self.pump();
        self.exit_status
    }

    fn is_closed(&mut self) -> bool {
        self.pump();
        self.closed
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.channel
            .data(data)
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.channel.eof().await;
        let _ = self.channel.close().await;
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connector;

    fn key_target() -> HostTarget {
        HostTarget {
            hostname: "web1".to_string(),
            address: "127.0.0.1".to_string(),
            port: 22,
            username: "deploy".to_string(),
            credential: Credential::KeyMaterial(SecretString::new("not a private key")),
        }
    }

    #[tokio::test]
    async fn test_unusable_key_is_auth_failure() {
        let connector = SshConnector::new(Duration::from_secs(1));

        let err = match connector.connect(&key_target()).await {
            Ok(_) => panic!("connect should fail"),
            Err(e) => e,
        };

        assert!(matches!(err, Error::AuthFailure { ref host, .. } if host == "web1"));
        assert!(!err.to_string().contains("not a private key"));
    }

    #[test]
    fn test_drain_respects_max() {
        let mut buf: VecDeque<u8> = b"hello world".iter().copied().collect();
        assert_eq!(drain(&mut buf, 5), b"hello");
        assert_eq!(drain(&mut buf, 100), b" world");
        assert!(drain(&mut buf, 4).is_empty());
    }
}
