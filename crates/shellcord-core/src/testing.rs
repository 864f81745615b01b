//! Scripted remote hosts and a recording display for engine tests

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::EngineConfig;
use crate::connection::{
    Connector, ExecOutput, HostTarget, PtyRequest, RemoteConnection, RemoteShell,
};
use crate::credentials::SecretString;
use crate::display::{DisplaySurface, LiveStatus, TranscriptArtifact};
use crate::error::{Error, Result};
use crate::hosts::{HostRecord, MockHostDirectory};
use crate::session_manager::SessionManager;
use crate::store::{DurableSession, SessionStore};

/// How a scripted connect attempt fails
#[derive(Debug, Clone, Copy)]
pub(crate) enum ConnectFailure {
    Auth,
    Network,
    Timeout,
}

impl ConnectFailure {
    fn into_error(self, host: &str) -> Error {
        match self {
            ConnectFailure::Auth => Error::AuthFailure {
                host: host.to_string(),
                reason: "permission denied".to_string(),
            },
            ConnectFailure::Network => Error::NetworkUnreachable {
                host: host.to_string(),
                reason: "connection refused".to_string(),
            },
            ConnectFailure::Timeout => Error::ConnectTimeout {
                host: host.to_string(),
                secs: 10,
            },
        }
    }
}

/// Behaviour of one opened channel
#[derive(Debug, Clone, Default)]
pub(crate) struct ShellScript {
    /// Chunks returned by successive reads
    pub output: VecDeque<Vec<u8>>,
    /// Exit status reported once output is drained
    pub exit_status: Option<u32>,
    /// Channel reports closed once output is drained
    pub close_after_output: bool,
    /// Every write fails
    pub fail_writes: bool,
}

impl ShellScript {
    /// Stays open and silent
    pub fn idle() -> Self {
        Self::default()
    }

    /// Prints `chunks`, then exits with `code`
    pub fn exits(chunks: &[&str], code: u32) -> Self {
        Self {
            output: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
            exit_status: Some(code),
            ..Self::default()
        }
    }

    /// Prints `chunks`, then drops the channel
    pub fn drops(chunks: &[&str]) -> Self {
        Self {
            output: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
            close_after_output: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    connect_plan: VecDeque<Option<ConnectFailure>>,
    shells: VecDeque<ShellScript>,
    writes: Vec<Vec<u8>>,
    connects: usize,
    closed_connections: usize,
}

/// A connector whose hosts follow a script
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeRemote {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next connect; unqueued connects succeed
    pub fn plan_connect(&self, failure: Option<ConnectFailure>) -> &Self {
        self.state.lock().unwrap().connect_plan.push_back(failure);
        self
    }

    /// Queue the script for the next opened channel; unqueued channels are idle
    pub fn plan_shell(&self, script: ShellScript) -> &Self {
        self.state.lock().unwrap().shells.push_back(script);
        self
    }

    /// Every write, lossily decoded
    pub fn writes(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .writes
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    /// Connect attempts so far
    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    /// Connections closed so far
    pub fn closed_connections(&self) -> usize {
        self.state.lock().unwrap().closed_connections
    }
}

#[async_trait]
impl Connector for FakeRemote {
    async fn connect(&self, target: &HostTarget) -> Result<Box<dyn RemoteConnection>> {
        let mut state = self.state.lock().unwrap();
        state.connects += 1;
        if let Some(Some(failure)) = state.connect_plan.pop_front() {
            return Err(failure.into_error(&target.hostname));
        }
        Ok(Box::new(FakeConnection {
            state: self.state.clone(),
            closed: false,
        }))
    }
}

struct FakeConnection {
    state: Arc<Mutex<FakeState>>,
    closed: bool,
}

impl FakeConnection {
    fn next_shell(&self) -> Box<dyn RemoteShell> {
        let script = self
            .state
            .lock()
            .unwrap()
            .shells
            .pop_front()
            .unwrap_or_default();
        Box::new(FakeShell {
            state: self.state.clone(),
            script,
            closed: false,
        })
    }
}

#[async_trait]
impl RemoteConnection for FakeConnection {
    async fn open_shell(&mut self, _pty: &PtyRequest) -> Result<Box<dyn RemoteShell>> {
        Ok(self.next_shell())
    }

    async fn open_command(
        &mut self,
        _command: &str,
        _pty: &PtyRequest,
    ) -> Result<Box<dyn RemoteShell>> {
        Ok(self.next_shell())
    }

    async fn exec(&mut self, _command: &str) -> Result<ExecOutput> {
        let script = self
            .state
            .lock()
            .unwrap()
            .shells
            .pop_front()
            .unwrap_or_default();
        let stdout: Vec<u8> = script.output.into_iter().flatten().collect();
        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::new(),
            exit_status: script.exit_status,
        })
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.lock().unwrap().closed_connections += 1;
        }
    }
}

struct FakeShell {
    state: Arc<Mutex<FakeState>>,
    script: ShellScript,
    closed: bool,
}

#[async_trait]
impl RemoteShell for FakeShell {
    fn stdout_ready(&mut self) -> bool {
        !self.script.output.is_empty()
    }

    fn stderr_ready(&mut self) -> bool {
        false
    }

    fn read_stdout(&mut self, max: usize) -> Vec<u8> {
        let Some(mut chunk) = self.script.output.pop_front() else {
            return Vec::new();
        };
        if chunk.len() > max {
            let rest = chunk.split_off(max);
            self.script.output.push_front(rest);
        }
        chunk
    }

    fn read_stderr(&mut self, _max: usize) -> Vec<u8> {
        Vec::new()
    }

    fn exit_status(&mut self) -> Option<u32> {
        if self.script.output.is_empty() {
            self.script.exit_status
        } else {
            None
        }
    }

    fn is_closed(&mut self) -> bool {
        self.closed || (self.script.output.is_empty() && self.script.close_after_output)
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.script.fail_writes || self.closed {
            return Err(Error::Transport("broken pipe".to_string()));
        }
        self.state.lock().unwrap().writes.push(data.to_vec());
        Ok(())
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

/// Something a session showed to the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DisplayEvent {
    Posted(LiveStatus),
    Updated(LiveStatus),
    Text(String),
    Notice(String),
    Transcript(TranscriptArtifact),
}

/// Display surface that records every call
#[derive(Debug, Default)]
pub(crate) struct RecordingDisplay {
    events: Mutex<Vec<(String, DisplayEvent)>>,
}

impl RecordingDisplay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<DisplayEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DisplayEvent::Text(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn notices(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DisplayEvent::Notice(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn transcripts(&self) -> Vec<TranscriptArtifact> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DisplayEvent::Transcript(artifact) => Some(artifact),
                _ => None,
            })
            .collect()
    }

    pub fn last_status(&self) -> Option<LiveStatus> {
        self.events().into_iter().rev().find_map(|e| match e {
            DisplayEvent::Posted(status) | DisplayEvent::Updated(status) => Some(status),
            _ => None,
        })
    }

    fn record(&self, channel_id: &str, event: DisplayEvent) {
        self.events
            .lock()
            .unwrap()
            .push((channel_id.to_string(), event));
    }
}

#[async_trait]
impl DisplaySurface for RecordingDisplay {
    async fn post_status(&self, channel_id: &str, status: &LiveStatus) -> Result<String> {
        self.record(channel_id, DisplayEvent::Posted(status.clone()));
        Ok(format!("msg-{}", status.session_id))
    }

    async fn update_status(
        &self,
        channel_id: &str,
        _message_id: &str,
        status: &LiveStatus,
    ) -> Result<()> {
        self.record(channel_id, DisplayEvent::Updated(status.clone()));
        Ok(())
    }

    async fn send_text(&self, channel_id: &str, text: &str) -> Result<()> {
        self.record(channel_id, DisplayEvent::Text(text.to_string()));
        Ok(())
    }

    async fn send_notice(&self, channel_id: &str, text: &str) -> Result<()> {
        self.record(channel_id, DisplayEvent::Notice(text.to_string()));
        Ok(())
    }

    async fn send_transcript(&self, channel_id: &str, artifact: &TranscriptArtifact) -> Result<()> {
        self.record(channel_id, DisplayEvent::Transcript(artifact.clone()));
        Ok(())
    }
}

/// Session rows kept in a map, one per channel
#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    rows: Mutex<HashMap<String, DurableSession>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_rows(rows: Vec<DurableSession>) -> Arc<Self> {
        let store = Self::default();
        {
            let mut map = store.rows.lock().unwrap();
            for row in rows {
                map.insert(row.channel_id.clone(), row);
            }
        }
        Arc::new(store)
    }

    pub fn row(&self, channel_id: &str) -> Option<DurableSession> {
        self.rows.lock().unwrap().get(channel_id).cloned()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn upsert_active(&self, session: &DurableSession) -> Result<()> {
        let mut row = session.clone();
        row.is_active = true;
        self.rows
            .lock()
            .unwrap()
            .insert(row.channel_id.clone(), row);
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<DurableSession>> {
        let mut rows: Vec<_> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.is_active)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));
        Ok(rows)
    }

    async fn set_active(&self, channel_id: &str, active: bool) -> Result<()> {
        match self.rows.lock().unwrap().get_mut(channel_id) {
            Some(row) => {
                row.is_active = active;
                Ok(())
            }
            None => Err(Error::SessionNotFound(channel_id.to_string())),
        }
    }

    async fn delete(&self, channel_id: &str) -> Result<()> {
        self.rows.lock().unwrap().remove(channel_id);
        Ok(())
    }

    async fn latest_inactive(&self, channel_id: &str) -> Result<Option<DurableSession>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(channel_id)
            .filter(|r| !r.is_active)
            .cloned())
    }
}

/// A password host record
pub(crate) fn host_record(owner_id: &str, hostname: &str) -> HostRecord {
    HostRecord {
        owner_id: owner_id.to_string(),
        hostname: hostname.to_string(),
        address: "10.0.0.5".to_string(),
        port: None,
        username: "deploy".to_string(),
        password: Some(SecretString::new("pw")),
        key_material: None,
    }
}

/// Host directory that knows every alias except `ghost`
pub(crate) fn known_hosts() -> MockHostDirectory {
    let mut hosts = MockHostDirectory::new();
    hosts.expect_get_host().returning(|owner, name| {
        if name == "ghost" {
            Ok(None)
        } else {
            Ok(Some(host_record(owner, name)))
        }
    });
    hosts
}

/// A manager over the given fakes with default timings
pub(crate) fn manager(
    remote: &FakeRemote,
    store: Arc<dyn SessionStore>,
    display: &Arc<RecordingDisplay>,
) -> SessionManager {
    SessionManager::new(
        EngineConfig::default(),
        Arc::new(remote.clone()),
        Arc::new(known_hosts()),
        store,
        display.clone(),
    )
}
