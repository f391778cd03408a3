use serde::{Deserialize, Serialize};
use std::fmt;

use crate::audio::elements::ElementState;

/// Pipeline-wide state, derived from the element states and never stored
/// independently of them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    Unavailable,
    /// Also reported while any element is PREPARING
    Starting,
    Running,
    Pausing,
    Paused,
    Resuming,
    Stopping,
    Stopped,
}

impl PipelineState {
    /// Higher rank wins when element states disagree
    fn rank(&self) -> u8 {
        match self {
            PipelineState::Unavailable => 7,
            PipelineState::Starting => 6,
            PipelineState::Stopping => 5,
            PipelineState::Pausing => 4,
            PipelineState::Resuming => 3,
            PipelineState::Paused => 2,
            PipelineState::Running => 1,
            PipelineState::Stopped => 0,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PipelineState::Unavailable => "UNAVAILABLE",
            PipelineState::Starting => "STARTING",
            PipelineState::Running => "RUNNING",
            PipelineState::Pausing => "PAUSING",
            PipelineState::Paused => "PAUSED",
            PipelineState::Resuming => "RESUMING",
            PipelineState::Stopping => "STOPPING",
            PipelineState::Stopped => "STOPPED",
        }
    }
}

impl From<ElementState> for PipelineState {
    fn from(state: ElementState) -> Self {
        match state {
            ElementState::Unavailable => PipelineState::Unavailable,
            // Setup in progress anywhere reads as the pipeline starting
            ElementState::Preparing | ElementState::Starting => PipelineState::Starting,
            ElementState::Running => PipelineState::Running,
            ElementState::Pausing => PipelineState::Pausing,
            ElementState::Paused => PipelineState::Paused,
            ElementState::Resuming => PipelineState::Resuming,
            ElementState::Stopping => PipelineState::Stopping,
            ElementState::Stopped => PipelineState::Stopped,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Reduce element states to the pipeline state: the highest-precedence
/// state present wins.
///
/// Precedence: UNAVAILABLE > STARTING (element PREPARING included) > STOPPING > PAUSING >
/// RESUMING > PAUSED > RUNNING > STOPPED. A pipeline with no elements is
/// UNAVAILABLE.
pub fn reduce_states(states: &[ElementState]) -> PipelineState {
    states
        .iter()
        .map(|s| PipelineState::from(*s))
        .max_by_key(|s| s.rank())
        .unwrap_or(PipelineState::Unavailable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pipeline_is_unavailable() {
        assert_eq!(reduce_states(&[]), PipelineState::Unavailable);
    }

    #[test]
    fn test_all_running_is_running() {
        let states = [ElementState::Running; 3];
        assert_eq!(reduce_states(&states), PipelineState::Running);
    }

    #[test]
    fn test_preparing_reads_as_starting() {
        let states = [ElementState::Running, ElementState::Preparing];
        assert_eq!(reduce_states(&states), PipelineState::Starting);
    }

    #[test]
    fn test_unavailable_dominates() {
        let states = [
            ElementState::Stopping,
            ElementState::Unavailable,
            ElementState::Starting,
        ];
        assert_eq!(reduce_states(&states), PipelineState::Unavailable);
    }

    #[test]
    fn test_pausing_beats_resuming() {
        let states = [ElementState::Resuming, ElementState::Pausing];
        assert_eq!(reduce_states(&states), PipelineState::Pausing);
    }

    #[test]
    fn test_partial_stop_is_running() {
        let states = [ElementState::Stopped, ElementState::Running];
        assert_eq!(reduce_states(&states), PipelineState::Running);
    }
}
