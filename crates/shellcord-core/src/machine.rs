//! Shared shape of the session state machines

/// Result of feeding one event to a state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition<S, E> {
    /// State after the event
    pub next: S,
    /// Effects for the owning task to perform, in order
    pub effects: Vec<E>,
}

impl<S, E> Transition<S, E> {
    /// Move to `next` and perform `effects`
    pub fn to(next: S, effects: Vec<E>) -> Self {
        Self { next, effects }
    }

    /// Remain in `state` with no effects
    pub fn stay(state: S) -> Self {
        Self {
            next: state,
            effects: Vec::new(),
        }
    }
}
