//! One-shot command state machine

use serde::{Deserialize, Serialize};

use crate::display::StatusPhase;
use crate::machine::Transition;

/// Lifecycle of a one-shot command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OneShotState {
    /// Connecting and launching the command
    Starting,
    /// Streaming output
    Running,
    /// Remote command exited
    Completed,
    /// Controller interrupted or finished
    Cancelled,
    /// No activity within the idle timeout
    TimedOut,
    /// Connection closed, transcript delivered, session unregistered
    Finalized,
}

impl OneShotState {
    /// Whether the command is still live
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, OneShotState::Starting | OneShotState::Running)
    }

    /// Phase to display for a settled state
    #[must_use]
    pub fn phase(&self) -> StatusPhase {
        match self {
            OneShotState::Starting | OneShotState::Running => StatusPhase::Executing,
            OneShotState::Completed => StatusPhase::Completed,
            OneShotState::Cancelled => StatusPhase::Cancelled,
            OneShotState::TimedOut => StatusPhase::TimedOut,
            OneShotState::Finalized => StatusPhase::Failed,
        }
    }
}

/// Inputs to the one-shot machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OneShotEvent {
    /// Connection and command channel are up
    Connected,
    /// Connection could not be established
    ConnectFailed(String),
    /// Controller typed a line of input
    Input(String),
    /// Controller pressed interrupt
    Interrupt,
    /// Controller pressed finish
    Finish,
    /// Idle timeout elapsed
    IdleElapsed,
    /// Remote reported an exit status
    RemoteExited,
    /// Transport or channel failure while running
    Failed(String),
    /// Settled state is ready to be torn down
    Finalize,
}

/// Work the session task performs after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OneShotEffect {
    /// Write a line (newline appended) to the remote
    WriteInput(String),
    /// Write the interrupt byte to the remote
    SendInterrupt,
    /// Remove the session from the registry
    Unregister,
    /// Close the remote channel and connection
    CloseConnection,
    /// Push the final status to the display
    PublishFinal,
    /// Deliver the transcript attachment
    DeliverTranscript,
    /// Tell the controller what went wrong
    ReportFailure(String),
}

/// Apply `event` to `state`.
///
/// Events that make no sense in the current state leave it unchanged.
pub fn transition(
    state: OneShotState,
    event: OneShotEvent,
) -> Transition<OneShotState, OneShotEffect> {
    use OneShotEffect as Fx;
    use OneShotEvent as Ev;
    use OneShotState as St;

    match (state, event) {
        (St::Starting, Ev::Connected) => Transition::to(St::Running, vec![]),
        (St::Starting, Ev::ConnectFailed(reason)) => {
            Transition::to(St::Finalized, vec![Fx::Unregister, Fx::ReportFailure(reason)])
        }

        (St::Running, Ev::Input(line)) => Transition::to(St::Running, vec![Fx::WriteInput(line)]),
        (St::Running, Ev::Interrupt) => Transition::to(St::Cancelled, vec![Fx::SendInterrupt]),
        (St::Running, Ev::Finish) => Transition::to(St::Cancelled, vec![]),
        (St::Running, Ev::IdleElapsed) => Transition::to(St::TimedOut, vec![]),
        (St::Running, Ev::RemoteExited) => Transition::to(St::Completed, vec![]),
        (St::Running, Ev::Failed(reason)) => Transition::to(
            St::Finalized,
            vec![
                Fx::Unregister,
                Fx::CloseConnection,
                Fx::ReportFailure(reason),
                Fx::PublishFinal,
                Fx::DeliverTranscript,
            ],
        ),

        (St::Completed | St::Cancelled | St::TimedOut, Ev::Finalize) => Transition::to(
            St::Finalized,
            vec![
                Fx::Unregister,
                Fx::CloseConnection,
                Fx::PublishFinal,
                Fx::DeliverTranscript,
            ],
        ),

        (state, _) => Transition::stay(state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let t = transition(OneShotState::Starting, OneShotEvent::Connected);
        assert_eq!(t.next, OneShotState::Running);

        let t = transition(t.next, OneShotEvent::RemoteExited);
        assert_eq!(t.next, OneShotState::Completed);
        assert!(t.effects.is_empty());

        let t = transition(t.next, OneShotEvent::Finalize);
        assert_eq!(t.next, OneShotState::Finalized);
        assert_eq!(t.effects[0], OneShotEffect::Unregister);
        assert!(t.effects.contains(&OneShotEffect::DeliverTranscript));
    }

    #[test]
    fn test_idle_goes_through_timed_out() {
        let t = transition(OneShotState::Running, OneShotEvent::IdleElapsed);
        assert_eq!(t.next, OneShotState::TimedOut);

        let t = transition(t.next, OneShotEvent::Finalize);
        assert_eq!(t.next, OneShotState::Finalized);
    }

    #[test]
    fn test_interrupt_sends_control_byte() {
        let t = transition(OneShotState::Running, OneShotEvent::Interrupt);
        assert_eq!(t.next, OneShotState::Cancelled);
        assert_eq!(t.effects, vec![OneShotEffect::SendInterrupt]);

        let t = transition(OneShotState::Running, OneShotEvent::Finish);
        assert_eq!(t.next, OneShotState::Cancelled);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn test_connect_failure_reports_once() {
        let t = transition(
            OneShotState::Starting,
            OneShotEvent::ConnectFailed("refused".to_string()),
        );
        assert_eq!(t.next, OneShotState::Finalized);
        let reports = t
            .effects
            .iter()
            .filter(|e| matches!(e, OneShotEffect::ReportFailure(_)))
            .count();
        assert_eq!(reports, 1);
        assert!(!t.effects.contains(&OneShotEffect::DeliverTranscript));
    }

    #[test]
    fn test_settled_states_ignore_controls() {
        for state in [
            OneShotState::Completed,
            OneShotState::Cancelled,
            OneShotState::TimedOut,
            OneShotState::Finalized,
        ] {
            for event in [
                OneShotEvent::Input("ls".to_string()),
                OneShotEvent::Interrupt,
                OneShotEvent::Finish,
                OneShotEvent::IdleElapsed,
            ] {
                let t = transition(state, event);
                assert_eq!(t.next, state);
                assert!(t.effects.is_empty());
            }
        }
    }

    #[test]
    fn test_finalized_is_terminal() {
        let t = transition(OneShotState::Finalized, OneShotEvent::Finalize);
        assert_eq!(t.next, OneShotState::Finalized);
        assert!(t.effects.is_empty());
    }
}
