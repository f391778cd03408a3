pub mod audio;
pub mod log;

// Re-export the pipeline surface for firmware glue and tests
pub use audio::{
    AudioFormat, ElementId, ElementKind, ElementState, Equalizer, HttpStreamSource, I2sReader,
    I2sWriter, Microphone, MicrophoneState, NativeStage, PcmSink, PcmSource, Pipeline,
    PipelineConfig, PipelineConfigFactory, PipelineElement, PipelineError, PipelineEvent,
    PipelineState, Resampler, SettingsRequest, StageConfig, StageError, StageEvent,
    StreamBackend,
};
