// Input elements with a format known up front
//
// PcmSource: the application pushes PCM bytes through a lock-free ring
// whose consumer half is owned by the native raw-stream stage.
// I2sReader: hardware capture.

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

/// Adopt the source-side fields of a request, reconfiguring the stage if
/// the format changed. Returns the format now in effect.
async fn adopt_source_settings(
    core: &mut ElementCore,
    current: AudioFormat,
    request: &SettingsRequest,
    side: FormatSide,
) -> Result<AudioFormat, ElementError> {
    let candidate = adopt_format(&current, request, side);
    if candidate == current {
        return Ok(current);
    }

    check_format(core.name(), &candidate)?;
    log_request_origin(core.name(), request);
    core.reconfigure(&StageConfig::passthrough(candidate)).await?;
    info!("🎚️ {}: new settings: {}", core.name(), candidate);
    Ok(candidate)
}

/// Raw PCM source fed by the application
pub struct PcmSource {
    core: ElementCore,
    format: AudioFormat,
    producer: Producer<u8>,
    capacity: usize,
}

impl PcmSource {
    /// Build the source and the consumer half the native stage reads from
    pub fn new(
        name: impl Into<String>,
        config: &PcmStreamConfig,
        stage: Box<dyn NativeStage>,
    ) -> (Self, Consumer<u8>) {
        let (producer, consumer) = RingBuffer::new(config.capacity_bytes);
        let source = Self {
            core: ElementCore::new(name, ElementKind::Source, stage),
            format: config.format,
            producer,
            capacity: config.capacity_bytes,
        };
        (source, consumer)
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Write as many bytes as currently fit; returns the number written
    pub fn stream_write(&mut self, data: &[u8]) -> usize {
        let mut written = 0;
        for byte in data {
            if self.producer.push(*byte).is_err() {
                break;
            }
            written += 1;
        }
        if written < data.len() {
            debug!(
                "{}: ring full, accepted {} of {} bytes",
                self.core.name(),
                written,
                data.len()
            );
        }
        written
    }

    /// Whether the native stage still has unread bytes
    pub fn has_buffered_data(&self) -> bool {
        self.producer.slots() < self.capacity
    }
}

#[async_trait]
impl PipelineElement for PcmSource {
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
        None
    }

    fn output_format(&self) -> Option<AudioFormat> {
        Some(self.format)
    }

    async fn on_settings_request(
        &mut self,
        request: &mut SettingsRequest,
        side: FormatSide,
    ) -> Result<(), ElementError> {
        self.format = adopt_source_settings(&mut self.core, self.format, request, side).await?;
        debug!("{}: current settings: {}", self.core.name(), self.format);
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

/// I2S capture source
pub struct I2sReader {
    core: ElementCore,
    format: AudioFormat,
}

impl I2sReader {
    pub fn new(name: impl Into<String>, config: &I2sConfig, stage: Box<dyn NativeStage>) -> Self {
        Self {
            core: ElementCore::new(name, ElementKind::Source, stage),
            format: config.format,
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }
}

#[async_trait]
impl PipelineElement for I2sReader {
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
        None
    }

    fn output_format(&self) -> Option<AudioFormat> {
        Some(self.format)
    }

    async fn on_settings_request(
        &mut self,
        request: &mut SettingsRequest,
        side: FormatSide,
    ) -> Result<(), ElementError> {
        self.format = adopt_source_settings(&mut self.core, self.format, request, side).await?;
        debug!("{}: current settings: {}", self.core.name(), self.format);
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
