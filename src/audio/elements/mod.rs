// Pipeline elements
//
// Each element wraps one native stage and runs its own lifecycle state
// machine. Elements come in three kinds (source, process, sink) behind one
// small polymorphic interface; capabilities such as probing or format
// conversion are expressed as trait methods rather than subclassing.

pub mod http_source;
pub mod lifecycle;
pub mod process;
pub mod sinks;
pub mod sources;
pub mod state;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

pub use http_source::{HttpStreamSource, SourcePhase};
pub use lifecycle::ElementCore;
pub use process::{Equalizer, Resampler, EQUALIZER_BIT_DEPTH, RESAMPLER_OUTPUT_BIT_DEPTH};
pub use sinks::{I2sWriter, PcmSink};
pub use sources::{I2sReader, PcmSource};
pub use state::ElementState;

use super::errors::{ElementError, StageError};
use super::negotiation::SettingsRequest;
use super::types::{AudioFormat, PipelineConfig, StageConfig};
use super::validation::validate_format;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Source,
    Process,
    Sink,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::Source => "SOURCE",
            ElementKind::Process => "PROCESS",
            ElementKind::Sink => "SINK",
        };
        write!(f, "{}", name)
    }
}

/// Index of an element in its pipeline's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementId(pub usize);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which half of a settings request describes the format at an element's input.
///
/// Elements upstream of any format-converting element see the source-side
/// fields; elements after a converter see the `final_*` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatSide {
    Source,
    Final,
}

/// Status reported by an element outside of start/stop/negotiation calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementEvent {
    StateChanged(ElementState),
    PlaybackIssue(String),
    StreamFinished,
}

/// One stage of the pipeline
#[async_trait]
pub trait PipelineElement: Any + Send {
    fn core(&self) -> &ElementCore;

    fn core_mut(&mut self) -> &mut ElementCore;

    /// Configuration the native stage is (or will be) created with
    fn stage_config(&self) -> StageConfig;

    /// Format accepted at the input; `None` for sources
    fn input_format(&self) -> Option<AudioFormat>;

    /// Format produced at the output; `None` for sinks
    fn output_format(&self) -> Option<AudioFormat>;

    /// React to a settings request.
    ///
    /// The element adopts whatever concrete fields change its configuration
    /// (stopping a running stage before touching it) and may amend the
    /// request in place to advertise a constraint of its own.
    async fn on_settings_request(
        &mut self,
        request: &mut SettingsRequest,
        side: FormatSide,
    ) -> Result<(), ElementError>;

    /// Return to a configuration previously reported by `stage_config`,
    /// used to undo an abandoned negotiation
    async fn restore_stage_config(&mut self, config: &StageConfig) -> Result<(), ElementError>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn kind(&self) -> ElementKind {
        self.core().kind()
    }

    fn state(&self) -> ElementState {
        self.core().state()
    }

    /// Whether the element can be started and move data
    fn is_ready(&self) -> bool {
        self.core().has_stage()
    }

    /// Format-converting elements split the request into source/final halves
    fn converts_format(&self) -> bool {
        false
    }

    fn apply_pipeline_config(&mut self, config: &PipelineConfig) {
        self.core_mut().set_stop_timeout(config.stop_timeout());
    }

    async fn start(&mut self) -> Result<(), ElementError> {
        let config = self.stage_config();
        self.core_mut().start(&config).await
    }

    async fn stop(&mut self) -> Result<(), ElementError> {
        self.core_mut().stop().await
    }

    async fn pause(&mut self) -> Result<(), ElementError> {
        self.core_mut().pause().await
    }

    async fn resume(&mut self) -> Result<(), ElementError> {
        self.core_mut().resume().await
    }

    /// Settings change this element wants to originate (e.g. a source that
    /// discovered its stream format). Taken once by the orchestrator.
    fn take_settings_request(&mut self) -> Option<SettingsRequest> {
        None
    }

    /// Drain events from the element's native stage
    fn poll_events(&mut self) -> Vec<ElementEvent> {
        Vec::new()
    }

    fn release(&mut self) {
        self.core_mut().release();
    }
}

/// Log the originator of a request the way every element does before
/// reconfiguring
pub(crate) fn log_request_origin(element: &str, request: &SettingsRequest) {
    match request.requested_by {
        Some(id) => tracing::debug!("{}: received request from element {}", element, id),
        None => tracing::debug!("{}: request has no originating element", element),
    }
}

/// Format an element ends up with after adopting the concrete fields of
/// `request` for its side; unspecified fields keep the current value
pub(crate) fn adopt_format(
    current: &AudioFormat,
    request: &SettingsRequest,
    side: FormatSide,
) -> AudioFormat {
    AudioFormat {
        sample_rate: request.sampling_rate_for(side).unwrap_or(current.sample_rate),
        channels: request.channels_for(side).unwrap_or(current.channels),
        bit_depth: request.bit_depth_for(side).unwrap_or(current.bit_depth),
    }
}

/// Restore a pass-through stage currently running `current`. Returns the
/// format now in effect.
pub(crate) async fn restore_passthrough(
    core: &mut ElementCore,
    current: AudioFormat,
    config: &StageConfig,
) -> Result<AudioFormat, ElementError> {
    if config.input == current {
        return Ok(current);
    }
    core.reconfigure(config).await?;
    Ok(config.input)
}

pub(crate) fn check_format(element: &str, format: &AudioFormat) -> Result<(), ElementError> {
    validate_format(format)
        .map_err(|e| ElementError::stage(element, StageError::Rejected(e.to_string())))
}
