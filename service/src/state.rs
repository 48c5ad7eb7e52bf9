//! Service state definitions.

use serde::{Deserialize, Serialize};

/// Service operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Waiting for the next trigger.
    Idle,
    /// A run is executing.
    Running,
    /// Stop requested; the current run, if any, finishes first.
    ShuttingDown,
    /// The scheduler loop has exited.
    Stopped,
}

impl ServiceState {
    /// Check if new runs may start.
    pub fn accepts_runs(&self) -> bool {
        matches!(self, ServiceState::Idle | ServiceState::Running)
    }

    /// Check if the service is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServiceState::Stopped)
    }
}
