use serde::{Deserialize, Serialize};

use super::state::PipelineState;
use crate::audio::elements::ElementId;
use crate::audio::negotiation::SettingsRequest;

/// Notifications published to pipeline subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    StateChanged {
        previous: PipelineState,
        current: PipelineState,
    },
    /// A negotiation completed
    SettingsApplied {
        settled: SettingsRequest,
        rounds: u32,
        failed_elements: Vec<String>,
    },
    /// Reported by a source's streaming stage (stall, decode error)
    PlaybackIssue { element: ElementId, reason: String },
    StreamFinished { element: ElementId },
}
