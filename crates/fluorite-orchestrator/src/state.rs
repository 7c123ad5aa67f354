//! Orchestrator lifecycle
//!
//! Pure transition function with no I/O:
//!
//! ```text
//! Uninitialized --initialize--> Ready --shutdown--> Stopped
//! ```
//!
//! `Stopped` is terminal. Invalid transitions return an error and leave the
//! caller's state untouched.

use fluorite_core::{FluoriteError, Result};
use std::fmt;

/// Lifecycle state of a [`DashboardOrchestrator`](crate::DashboardOrchestrator)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrchestratorState {
    #[default]
    Uninitialized,
    Ready,
    Stopped,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Ready => write!(f, "ready"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Initialize,
    Shutdown,
}

/// Next state for `event`, or the error the caller should see
pub fn transition(state: OrchestratorState, event: Lifecycle) -> Result<OrchestratorState> {
    use OrchestratorState::*;

    match (state, event) {
        (Uninitialized, Lifecycle::Initialize) => Ok(Ready),
        (Ready, Lifecycle::Initialize) => Err(FluoriteError::Orchestrator(
            "orchestrator is already initialized".to_string(),
        )),
        (Stopped, Lifecycle::Initialize) => Err(FluoriteError::OrchestratorStopped),

        // Shutting down twice, or before initialize, is a no-op
        (_, Lifecycle::Shutdown) => Ok(Stopped),
    }
}

impl OrchestratorState {
    /// Guard for operations that need a running orchestrator
    pub fn ensure_ready(self) -> Result<()> {
        match self {
            Self::Ready => Ok(()),
            Self::Uninitialized => Err(FluoriteError::OrchestratorNotInitialized),
            Self::Stopped => Err(FluoriteError::OrchestratorStopped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let state = OrchestratorState::default();
        let state = transition(state, Lifecycle::Initialize).unwrap();
        assert_eq!(state, OrchestratorState::Ready);
        assert!(state.ensure_ready().is_ok());

        let state = transition(state, Lifecycle::Shutdown).unwrap();
        assert_eq!(state, OrchestratorState::Stopped);
    }

    #[test]
    fn test_double_initialize() {
        let err = transition(OrchestratorState::Ready, Lifecycle::Initialize).unwrap_err();
        assert_eq!(err.kind(), "orchestrator");
    }

    #[test]
    fn test_stopped_is_terminal() {
        let err = transition(OrchestratorState::Stopped, Lifecycle::Initialize).unwrap_err();
        assert!(matches!(err, FluoriteError::OrchestratorStopped));
        assert_eq!(
            transition(OrchestratorState::Stopped, Lifecycle::Shutdown).unwrap(),
            OrchestratorState::Stopped
        );
    }

    #[test]
    fn test_guard_before_initialize() {
        let err = OrchestratorState::Uninitialized.ensure_ready().unwrap_err();
        assert!(matches!(err, FluoriteError::OrchestratorNotInitialized));
        let err = OrchestratorState::Stopped.ensure_ready().unwrap_err();
        assert!(matches!(err, FluoriteError::OrchestratorStopped));
    }
}
