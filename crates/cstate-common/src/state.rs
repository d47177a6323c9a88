//! Lifecycle state machine for the latency guard.
//!
//! UNACQUIRED → ACQUIRED → RELEASED, and RELEASED → ACQUIRED again, so a
//! guard can be cycled any number of times. Repeating an operation in the
//! state it already produced is a no-op, not a transition.

use crate::error::{QosError, QosResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// States of a latency constraint handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardState {
    /// No handle has been opened yet.
    #[default]
    Unacquired,
    /// The device is open and the latency target has been written.
    Acquired,
    /// The handle was closed; normal power management is back.
    Released,
}

impl fmt::Display for GuardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unacquired => write!(f, "UNACQUIRED"),
            Self::Acquired => write!(f, "ACQUIRED"),
            Self::Released => write!(f, "RELEASED"),
        }
    }
}

impl GuardState {
    /// Check if a transition to `target` is valid from the current state.
    #[must_use]
    pub fn can_transition_to(&self, target: GuardState) -> bool {
        use GuardState::{Acquired, Released, Unacquired};

        matches!(
            (self, target),
            (Unacquired, Acquired) | (Acquired, Released) | (Released, Acquired)
        )
    }

    /// Attempt to transition to `target`, returning error if invalid.
    pub fn transition_to(&mut self, target: GuardState) -> QosResult<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(QosError::InvalidStateTransition {
                from: self.to_string(),
                to: target.to_string(),
            })
        }
    }

    /// Returns true while a handle is open.
    #[must_use]
    pub fn is_held(&self) -> bool {
        matches!(self, Self::Acquired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unacquired() {
        assert_eq!(GuardState::default(), GuardState::Unacquired);
        assert!(!GuardState::default().is_held());
    }

    #[test]
    fn test_acquire_release_cycle() {
        let mut state = GuardState::Unacquired;
        state.transition_to(GuardState::Acquired).unwrap();
        assert!(state.is_held());
        state.transition_to(GuardState::Released).unwrap();
        assert!(!state.is_held());
        state.transition_to(GuardState::Acquired).unwrap();
        assert!(state.is_held());
    }

    #[test]
    fn test_invalid_transitions() {
        let mut state = GuardState::Unacquired;
        let err = state.transition_to(GuardState::Released).unwrap_err();
        assert!(matches!(err, QosError::InvalidStateTransition { .. }));
        assert_eq!(state, GuardState::Unacquired);

        assert!(!GuardState::Acquired.can_transition_to(GuardState::Acquired));
        assert!(!GuardState::Acquired.can_transition_to(GuardState::Unacquired));
        assert!(!GuardState::Released.can_transition_to(GuardState::Released));
    }

    #[test]
    fn test_display() {
        assert_eq!(GuardState::Acquired.to_string(), "ACQUIRED");
        assert_eq!(GuardState::Released.to_string(), "RELEASED");
    }
}
