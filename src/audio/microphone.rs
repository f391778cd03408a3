// Microphone facade over a capture pipeline
//
// I2S capture -> resampler -> PCM sink. Callers see a four-state
// microphone and read 16-bit samples from the sink's ring buffer.

use rtrb::Producer;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::elements::{ElementId, I2sReader, PcmSink, Resampler};
use super::errors::Result;
use super::pipeline::{Pipeline, PipelineState};
use super::stage::NativeStage;
use super::types::{
    AudioFormat, I2sConfig, PcmStreamConfig, PipelineConfig, PipelineConfigFactory,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MicrophoneState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl MicrophoneState {
    /// Map a pipeline state; `None` means "keep the current value"
    pub fn from_pipeline(state: PipelineState) -> Option<Self> {
        match state {
            PipelineState::Starting => Some(MicrophoneState::Starting),
            PipelineState::Running => Some(MicrophoneState::Running),
            PipelineState::Stopping => Some(MicrophoneState::Stopping),
            PipelineState::Unavailable | PipelineState::Stopped | PipelineState::Paused => {
                Some(MicrophoneState::Stopped)
            }
            PipelineState::Pausing | PipelineState::Resuming => None,
        }
    }
}

pub struct Microphone {
    pipeline: Pipeline,
    sink: ElementId,
    state: MicrophoneState,
}

impl Microphone {
    /// Wrap a pipeline whose element `sink` is a [`PcmSink`]
    pub fn new(mut pipeline: Pipeline, sink: ElementId) -> Result<Self> {
        pipeline.element_mut::<PcmSink>(sink)?;
        Ok(Self {
            pipeline,
            sink,
            state: MicrophoneState::Stopped,
        })
    }

    /// Assemble the standard capture chain producing 16 kHz mono.
    ///
    /// Returns the producer half of the sink's ring buffer for the native
    /// sink stage to write into.
    pub fn with_stages(
        reader: Box<dyn NativeStage>,
        resampler: Box<dyn NativeStage>,
        sink: Box<dyn NativeStage>,
    ) -> Result<(Self, Producer<u8>)> {
        Self::with_config(
            PipelineConfigFactory::create_microphone_config(),
            reader,
            resampler,
            sink,
        )
    }

    pub fn with_config(
        config: PipelineConfig,
        reader: Box<dyn NativeStage>,
        resampler: Box<dyn NativeStage>,
        sink: Box<dyn NativeStage>,
    ) -> Result<(Self, Producer<u8>)> {
        let resampler_config = PipelineConfigFactory::create_voice_resampler_config();
        let sink_config = PcmStreamConfig {
            format: AudioFormat::new(
                resampler_config.dst_rate,
                resampler_config.dst_channels,
                16,
            ),
            ..Default::default()
        };

        let mut pipeline = Pipeline::new(config)?;
        pipeline.add_element(Box::new(I2sReader::new(
            "i2s_reader",
            &I2sConfig::default(),
            reader,
        )))?;
        pipeline.add_element(Box::new(Resampler::new(
            "resampler",
            &resampler_config,
            resampler,
        )))?;
        let (pcm_sink, producer) = PcmSink::new("pcm_sink", &sink_config, sink);
        let sink_id = pipeline.add_element(Box::new(pcm_sink))?;

        Ok((Self::new(pipeline, sink_id)?, producer))
    }

    pub async fn start(&mut self) -> Result<()> {
        info!("🎤 MICROPHONE: start");
        self.state = MicrophoneState::Starting;
        let started = self.pipeline.start().await;
        self.refresh();
        started
    }

    pub async fn stop(&mut self) -> Result<()> {
        info!("🎤 MICROPHONE: stop");
        self.state = MicrophoneState::Stopping;
        let stopped = self.pipeline.stop().await;
        self.refresh();
        stopped
    }

    /// Read up to `buffer.len()` little-endian 16-bit samples; returns the
    /// number of samples copied
    pub fn read(&mut self, buffer: &mut [i16]) -> Result<usize> {
        let sink = self.pipeline.element_mut::<PcmSink>(self.sink)?;

        // Whole samples only; a trailing odd byte stays buffered
        let wanted = sink.available().min(buffer.len() * 2) & !1;
        let mut bytes = vec![0u8; wanted];
        let read = sink.stream_read(&mut bytes);
        if read < wanted {
            debug!("MICROPHONE: short read, {} of {} bytes", read, wanted);
        }

        for (sample, pair) in buffer.iter_mut().zip(bytes[..read].chunks_exact(2)) {
            *sample = i16::from_le_bytes([pair[0], pair[1]]);
        }
        Ok(read / 2)
    }

    /// Follow a pipeline state change
    pub fn on_pipeline_state_change(&mut self, state: PipelineState) {
        if state == PipelineState::Paused {
            info!("🎤 MICROPHONE: pipeline paused");
        }
        if let Some(next) = MicrophoneState::from_pipeline(state) {
            self.state = next;
        }
    }

    fn refresh(&mut self) {
        let state = self.pipeline.state();
        self.on_pipeline_state_change(state);
    }

    pub fn state(&self) -> MicrophoneState {
        self.state
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }
}
