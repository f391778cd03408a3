// Audio module - element pipeline core for the ADF audio stack
//
// - types: audio formats, stage and pipeline configuration
// - validation: bounds checks for configuration and formats
// - errors: typed errors for stages, elements, negotiation and pipelines
// - stage: the native stage boundary
// - elements: element lifecycle and the concrete elements
// - negotiation: settings requests and the bounded broadcast
// - pipeline: orchestration and derived pipeline state
// - microphone: capture pipeline facade

pub mod elements;
pub mod errors;
pub mod microphone;
pub mod negotiation;
pub mod pipeline;
pub mod stage;
pub mod types;
pub mod validation;

// Re-export commonly used types for easier imports
pub use types::{
    AudioFormat, EqualizerConfig, I2sConfig, PcmStreamConfig, PipelineConfig,
    PipelineConfigFactory, ResamplerConfig, StageConfig,
};

pub use errors::{ElementError, NegotiationError, PipelineError, StageError};

pub use stage::{NativeStage, StageEvent, StageHandle, StopAck, StreamBackend};

pub use elements::{
    ElementCore, ElementEvent, ElementId, ElementKind, ElementState, Equalizer, FormatSide,
    HttpStreamSource, I2sReader, I2sWriter, PcmSink, PcmSource, PipelineElement, Resampler,
    SourcePhase, EQUALIZER_BIT_DEPTH, RESAMPLER_OUTPUT_BIT_DEPTH,
};

pub use negotiation::{NegotiationOutcome, SettingsField, SettingsRequest};

pub use pipeline::{Pipeline, PipelineEvent, PipelineState};

pub use microphone::{Microphone, MicrophoneState};
