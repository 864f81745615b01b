//! Persistent terminal state machine

use serde::{Deserialize, Serialize};

use crate::machine::Transition;

/// Notice sent when the transport drops
pub const NOTICE_CONNECTION_LOST: &str = "Connection lost. Attempting to reconnect...";
/// Notice sent when a reconnection succeeds
pub const NOTICE_RECONNECTED: &str = "Reconnected successfully.";
/// Notice sent when input arrives while the connection is being restored
pub const NOTICE_INPUT_DROPPED: &str =
    "Connection is being re-established; input was not sent.";

/// Lifecycle of a channel-bound terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    /// Opening the connection and running shell setup
    Connecting,
    /// Forwarding input and output
    Active,
    /// Transport lost, reconnection not yet started
    Disconnected,
    /// Reconnection attempts in progress
    Reconnecting,
    /// Ended by stop, connect failure or exhausted reconnection
    Terminated,
    /// Ended by pause or process shutdown; may be restarted or restored
    Closed,
}

impl TerminalState {
    /// Whether the terminal is still running
    #[must_use]
    pub fn is_live(&self) -> bool {
        !matches!(self, TerminalState::Terminated | TerminalState::Closed)
    }
}

/// Inputs to the terminal machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    /// Shell is open and set up
    Connected,
    /// Initial connection failed
    ConnectFailed(String),
    /// Controller input, already translated to bytes
    Input(Vec<u8>),
    /// Read or write failed, or the remote closed the shell
    TransportLost(String),
    /// Reconnection supervisor is starting
    ReconnectStarted,
    /// Reconnection produced a fresh shell
    Reconnected,
    /// Every reconnection attempt failed; carries the notice for the channel
    ReconnectExhausted(String),
    /// Reconnection was cancelled by stop, pause or shutdown
    ReconnectAborted,
    /// Controller stopped the session
    Stop,
    /// Controller paused the session
    Pause,
    /// Process is shutting down
    Shutdown,
}

/// Work the terminal task performs after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEffect {
    /// Write bytes to the remote shell
    Write(Vec<u8>),
    /// Tell the channel something
    Notify(String),
    /// Hand off to the reconnection supervisor
    BeginReconnect,
    /// Run reconnection attempts
    AttemptReconnect,
    /// Close the remote shell and connection
    CloseConnection,
    /// Mark the durable row inactive
    MarkInactive,
    /// Delete the durable row
    DeleteRow,
    /// Deliver the transcript attachment
    DeliverTranscript,
    /// Remove the session from the registry
    Unregister,
}

/// Apply `event` to `state`.
///
/// Events that make no sense in the current state leave it unchanged.
pub fn transition(
    state: TerminalState,
    event: TerminalEvent,
) -> Transition<TerminalState, TerminalEffect> {
    use TerminalEffect as Fx;
    use TerminalEvent as Ev;
    use TerminalState as St;

    match (state, event) {
        (St::Connecting, Ev::Connected) => Transition::to(St::Active, vec![]),
        (St::Connecting, Ev::ConnectFailed(_)) => {
            Transition::to(St::Terminated, vec![Fx::MarkInactive, Fx::Unregister])
        }

        (St::Active, Ev::Input(bytes)) => Transition::to(St::Active, vec![Fx::Write(bytes)]),
        (St::Disconnected | St::Reconnecting, Ev::Input(_)) => {
            Transition::to(state, vec![Fx::Notify(NOTICE_INPUT_DROPPED.to_string())])
        }

        (St::Active, Ev::TransportLost(_)) => Transition::to(
            St::Disconnected,
            vec![
                Fx::Notify(NOTICE_CONNECTION_LOST.to_string()),
                Fx::BeginReconnect,
            ],
        ),
        (St::Disconnected, Ev::ReconnectStarted) => {
            Transition::to(St::Reconnecting, vec![Fx::AttemptReconnect])
        }
        (St::Reconnecting, Ev::Reconnected) => {
            Transition::to(St::Active, vec![Fx::Notify(NOTICE_RECONNECTED.to_string())])
        }
        (St::Reconnecting, Ev::ReconnectExhausted(notice)) => Transition::to(
            St::Terminated,
            vec![
                Fx::Unregister,
                Fx::Notify(notice),
                Fx::CloseConnection,
                Fx::MarkInactive,
                Fx::DeliverTranscript,
            ],
        ),

        (St::Connecting | St::Active | St::Disconnected | St::Reconnecting, Ev::Stop) => {
            Transition::to(
                St::Terminated,
                vec![
                    Fx::Unregister,
                    Fx::CloseConnection,
                    Fx::DeleteRow,
                    Fx::DeliverTranscript,
                ],
            )
        }
        (St::Connecting | St::Active | St::Disconnected | St::Reconnecting, Ev::Pause) => {
            Transition::to(
                St::Closed,
                vec![
                    Fx::Unregister,
                    Fx::CloseConnection,
                    Fx::MarkInactive,
                    Fx::DeliverTranscript,
                ],
            )
        }
        (St::Connecting | St::Active | St::Disconnected | St::Reconnecting, Ev::Shutdown) => {
            Transition::to(St::Closed, vec![Fx::Unregister, Fx::CloseConnection])
        }

        (state, _) => Transition::stay(state),
    }
}
