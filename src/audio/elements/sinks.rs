// Output elements

use async_trait::async_trait;
use rtrb::{Consumer, Producer, RingBuffer};
use std::any::Any;
use tracing::{debug, info};

use super::{
    adopt_format, check_format, log_request_origin, restore_passthrough, ElementCore,
    ElementKind, FormatSide, PipelineElement,
};
use crate::audio::errors::ElementError;
use crate::audio::negotiation::SettingsRequest;
use crate::audio::stage::NativeStage;
use crate::audio::types::{AudioFormat, I2sConfig, PcmStreamConfig, StageConfig};

/// I2S playback sink
pub struct I2sWriter {
    core: ElementCore,
    format: AudioFormat,
    supported_bit_depths: Vec<u16>,
}

impl I2sWriter {
    pub fn new(name: impl Into<String>, config: &I2sConfig, stage: Box<dyn NativeStage>) -> Self {
        let mut supported_bit_depths = config.supported_bit_depths.clone();
        supported_bit_depths.sort_unstable();
        supported_bit_depths.dedup();

        Self {
            core: ElementCore::new(name, ElementKind::Sink, stage),
            format: config.format,
            supported_bit_depths,
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Smallest supported depth that can hold `bits`, else the widest one
    fn nearest_supported(&self, bits: u16) -> Option<u16> {
        if self.supported_bit_depths.is_empty() || self.supported_bit_depths.contains(&bits) {
            return None;
        }
        self.supported_bit_depths
            .iter()
            .copied()
            .find(|depth| *depth >= bits)
            .or_else(|| self.supported_bit_depths.last().copied())
    }
}

#[async_trait]
impl PipelineElement for I2sWriter {
    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }

    fn stage_config(&self) -> StageConfig {
        StageConfig::passthrough(self.format)
    }

    fn input_format(&self) -> Option<AudioFormat> {
        Some(self.format)
    }

    fn output_format(&self) -> Option<AudioFormat> {
        None
    }

    async fn on_settings_request(
        &mut self,
        request: &mut SettingsRequest,
        side: FormatSide,
    ) -> Result<(), ElementError> {
        if let Some(bits) = request.bit_depth_for(side) {
            if let Some(depth) = self.nearest_supported(bits) {
                info!(
                    "✏️ I2S_WRITER: {}: {}-bit unsupported, amending to {}-bit",
                    self.core.name(),
                    bits,
                    depth
                );
                request.set_bit_depth_for(side, depth);
            }
        }

        let candidate = adopt_format(&self.format, request, side);
        if candidate != self.format {
            check_format(self.core.name(), &candidate)?;
            log_request_origin(self.core.name(), request);
            self.core.reconfigure(&StageConfig::passthrough(candidate)).await?;
            self.format = candidate;
            info!("🎚️ I2S_WRITER: {}: new settings: {}", self.core.name(), candidate);
        }

        debug!("I2S_WRITER: {}: current settings: {}", self.core.name(), self.format);
        Ok(())
    }

    async fn restore_stage_config(&mut self, config: &StageConfig) -> Result<(), ElementError> {
        self.format = restore_passthrough(&mut self.core, self.format, config).await?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Sink the application reads PCM bytes from
pub struct PcmSink {
    core: ElementCore,
    format: AudioFormat,
    consumer: Consumer<u8>,
}

impl PcmSink {
    /// Build the sink and the producer half the native stage writes into
    pub fn new(
        name: impl Into<String>,
        config: &PcmStreamConfig,
        stage: Box<dyn NativeStage>,
    ) -> (Self, Producer<u8>) {
        let (producer, consumer) = RingBuffer::new(config.capacity_bytes);
        let sink = Self {
            core: ElementCore::new(name, ElementKind::Sink, stage),
            format: config.format,
            consumer,
        };
        (sink, producer)
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Copy out whatever is buffered, up to `buffer.len()` bytes
    pub fn stream_read(&mut self, buffer: &mut [u8]) -> usize {
        let mut read = 0;
        for slot in buffer.iter_mut() {
            match self.consumer.pop() {
                Ok(byte) => {
                    *slot = byte;
                    read += 1;
                }
                Err(_) => break,
            }
        }
        read
    }

    pub fn available(&self) -> usize {
        self.consumer.slots()
    }
}

#[async_trait]
impl PipelineElement for PcmSink {
    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }

    fn stage_config(&self) -> StageConfig {
        StageConfig::passthrough(self.format)
    }

    fn input_format(&self) -> Option<AudioFormat> {
        Some(self.format)
    }

    fn output_format(&self) -> Option<AudioFormat> {
        None
    }

    async fn on_settings_request(
        &mut self,
        request: &mut SettingsRequest,
        side: FormatSide,
    ) -> Result<(), ElementError> {
        let candidate = adopt_format(&self.format, request, side);
        if candidate != self.format {
            check_format(self.core.name(), &candidate)?;
            log_request_origin(self.core.name(), request);
            self.core.reconfigure(&StageConfig::passthrough(candidate)).await?;
            self.format = candidate;
            info!("🎚️ PCM_SINK: {}: new settings: {}", self.core.name(), candidate);
        }
        Ok(())
    }

    async fn restore_stage_config(&mut self, config: &StageConfig) -> Result<(), ElementError> {
        self.format = restore_passthrough(&mut self.core, self.format, config).await?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
