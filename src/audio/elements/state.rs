use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-element lifecycle state
///
/// Owned and mutated only by the element; the orchestrator issues
/// start/stop commands that the element's state machine interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementState {
    /// Native resources not created; the element cannot process
    Unavailable,
    /// Resource or configuration setup in progress (e.g. stream probing)
    Preparing,
    Starting,
    /// The only state in which the element moves data
    Running,
    Pausing,
    Paused,
    Resuming,
    Stopping,
    /// Configuration retained, transient runtime resources released
    Stopped,
}

impl ElementState {
    pub const ALL: [ElementState; 9] = [
        ElementState::Unavailable,
        ElementState::Preparing,
        ElementState::Starting,
        ElementState::Running,
        ElementState::Pausing,
        ElementState::Paused,
        ElementState::Resuming,
        ElementState::Stopping,
        ElementState::Stopped,
    ];

    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: ElementState) -> bool {
        use ElementState::*;

        match (*self, target) {
            (a, b) if a == b => true,

            (Unavailable, Preparing | Starting) => true,

            // Probe failure falls back to Unavailable
            (Preparing, Starting | Stopping | Stopped | Unavailable) => true,

            // Creation or activation failure
            (Starting, Running | Stopping | Stopped | Unavailable) => true,

            (Running, Stopping | Pausing) => true,

            (Pausing, Paused | Running) => true,
            (Paused, Resuming | Stopping) => true,
            (Resuming, Running | Paused) => true,

            (Stopping, Stopped) => true,

            // Restart, re-probe, or resource release
            (Stopped, Starting | Preparing | Unavailable) => true,

            _ => false,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ElementState::Unavailable => "UNAVAILABLE",
            ElementState::Preparing => "PREPARING",
            ElementState::Starting => "STARTING",
            ElementState::Running => "RUNNING",
            ElementState::Pausing => "PAUSING",
            ElementState::Paused => "PAUSED",
            ElementState::Resuming => "RESUMING",
            ElementState::Stopping => "STOPPING",
            ElementState::Stopped => "STOPPED",
        }
    }

    /// `start()` is a no-op from these states
    pub fn is_started(&self) -> bool {
        matches!(self, ElementState::Starting | ElementState::Running)
    }

    /// `stop()` is a no-op from these states
    pub fn is_stopped(&self) -> bool {
        matches!(self, ElementState::Unavailable | ElementState::Stopped)
    }
}

impl fmt::Display for ElementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_path_is_valid() {
        assert!(ElementState::Unavailable.can_transition_to(ElementState::Preparing));
        assert!(ElementState::Preparing.can_transition_to(ElementState::Starting));
        assert!(ElementState::Starting.can_transition_to(ElementState::Running));
        assert!(ElementState::Stopped.can_transition_to(ElementState::Starting));
    }

    #[test]
    fn test_pause_cycle_is_valid() {
        assert!(ElementState::Running.can_transition_to(ElementState::Pausing));
        assert!(ElementState::Pausing.can_transition_to(ElementState::Paused));
        assert!(ElementState::Paused.can_transition_to(ElementState::Resuming));
        assert!(ElementState::Resuming.can_transition_to(ElementState::Running));
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        assert!(!ElementState::Stopped.can_transition_to(ElementState::Running));
        assert!(!ElementState::Unavailable.can_transition_to(ElementState::Running));
        assert!(!ElementState::Stopping.can_transition_to(ElementState::Running));
        assert!(!ElementState::Paused.can_transition_to(ElementState::Running));
    }

    #[test]
    fn test_self_transitions_allowed() {
        for state in ElementState::ALL {
            assert!(state.can_transition_to(state));
        }
    }
}
