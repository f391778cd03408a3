// Processing elements between sources and sinks

use async_trait::async_trait;
use std::any::Any;
use tracing::{debug, info, warn};

use super::{
    check_format, log_request_origin, ElementCore, ElementKind, FormatSide, PipelineElement,
};
use crate::audio::errors::{ElementError, StageError};
use crate::audio::negotiation::SettingsRequest;
use crate::audio::stage::NativeStage;
use crate::audio::types::{
    AudioFormat, EqualizerConfig, ResamplerConfig, StageConfig, DEFAULT_EQ_GAIN_DB,
    EQUALIZER_BANDS,
};
use crate::audio::validation::validate_eq_band;

/// The native resampler always emits 16-bit samples
pub const RESAMPLER_OUTPUT_BIT_DEPTH: u16 = 16;

/// Sample-rate and channel-count converter.
///
/// The input side follows the source-side fields of a request, the output
/// side follows the `final_*` fields. Any other output bit depth is amended
/// back to 16.
pub struct Resampler {
    core: ElementCore,
    src: AudioFormat,
    dst_rate: u32,
    dst_channels: u16,
}

impl Resampler {
    pub fn new(name: impl Into<String>, config: &ResamplerConfig, stage: Box<dyn NativeStage>) -> Self {
        Self {
            core: ElementCore::new(name, ElementKind::Process, stage),
            src: AudioFormat::new(config.src_rate, config.src_channels, config.src_bit_depth),
            dst_rate: config.dst_rate,
            dst_channels: config.dst_channels,
        }
    }

    fn dst(&self) -> AudioFormat {
        AudioFormat::new(self.dst_rate, self.dst_channels, RESAMPLER_OUTPUT_BIT_DEPTH)
    }
}

#[async_trait]
impl PipelineElement for Resampler {
    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }

    fn stage_config(&self) -> StageConfig {
        StageConfig::new(self.src, self.dst())
    }

    fn input_format(&self) -> Option<AudioFormat> {
        Some(self.src)
    }

    fn output_format(&self) -> Option<AudioFormat> {
        Some(self.dst())
    }

    fn converts_format(&self) -> bool {
        true
    }

    async fn on_settings_request(
        &mut self,
        request: &mut SettingsRequest,
        _side: FormatSide,
    ) -> Result<(), ElementError> {
        let src = AudioFormat {
            sample_rate: request.sampling_rate.unwrap_or(self.src.sample_rate),
            channels: request.number_of_channels.unwrap_or(self.src.channels),
            bit_depth: request.bit_depth.unwrap_or(self.src.bit_depth),
        };
        let dst_rate = request.final_sampling_rate.unwrap_or(self.dst_rate);
        let dst_channels = request.final_number_of_channels.unwrap_or(self.dst_channels);

        if let Some(bits) = request.final_bit_depth {
            if bits != RESAMPLER_OUTPUT_BIT_DEPTH {
                info!(
                    "✏️ RESAMPLER: {}: output is always {}-bit, amending requested {}-bit",
                    self.core.name(),
                    RESAMPLER_OUTPUT_BIT_DEPTH,
                    bits
                );
                request.bit_depth = Some(RESAMPLER_OUTPUT_BIT_DEPTH);
                request.final_bit_depth = Some(RESAMPLER_OUTPUT_BIT_DEPTH);
            }
        }

        if src != self.src || dst_rate != self.dst_rate || dst_channels != self.dst_channels {
            let dst = AudioFormat::new(dst_rate, dst_channels, RESAMPLER_OUTPUT_BIT_DEPTH);
            check_format(self.core.name(), &src)?;
            check_format(self.core.name(), &dst)?;

            log_request_origin(self.core.name(), request);
            let config = StageConfig::new(src, dst);
            self.core.reconfigure(&config).await?;

            self.src = src;
            self.dst_rate = dst_rate;
            self.dst_channels = dst_channels;
            info!("🎚️ RESAMPLER: {}: new settings: {}", self.core.name(), config);
        }

        debug!(
            "RESAMPLER: {}: current settings: {}",
            self.core.name(),
            self.stage_config()
        );
        Ok(())
    }

    async fn restore_stage_config(&mut self, config: &StageConfig) -> Result<(), ElementError> {
        if *config == self.stage_config() {
            return Ok(());
        }
        self.core.reconfigure(config).await?;
        self.src = config.input;
        self.dst_rate = config.output.sample_rate;
        self.dst_channels = config.output.channels;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The native equalizer only processes 16-bit samples
pub const EQUALIZER_BIT_DEPTH: u16 = 16;

/// Ten-band equalizer; format pass-through at a fixed 16-bit depth
pub struct Equalizer {
    core: ElementCore,
    sample_rate: u32,
    channels: u16,
    band_gains: [i32; EQUALIZER_BANDS],
}

impl Equalizer {
    pub fn new(name: impl Into<String>, config: &EqualizerConfig, stage: Box<dyn NativeStage>) -> Self {
        let mut band_gains = [DEFAULT_EQ_GAIN_DB; EQUALIZER_BANDS];
        for (slot, gain) in band_gains.iter_mut().zip(config.band_gains.iter()) {
            *slot = *gain;
        }

        Self {
            core: ElementCore::new(name, ElementKind::Process, stage),
            sample_rate: config.sample_rate,
            channels: config.channels,
            band_gains,
        }
    }

    fn format(&self) -> AudioFormat {
        AudioFormat::new(self.sample_rate, self.channels, EQUALIZER_BIT_DEPTH)
    }

    pub fn band_gain(&self, index: usize) -> Option<i32> {
        self.band_gains.get(index).copied()
    }

    /// Set one band's gain. Applied to a created stage immediately, without
    /// a restart; otherwise picked up when the stage is created.
    pub fn set_eq(&mut self, index: usize, gain_db: i32) -> Result<(), ElementError> {
        validate_eq_band(index, gain_db)
            .map_err(|e| ElementError::stage(self.core.name(), StageError::Rejected(e.to_string())))?;

        self.band_gains[index] = gain_db;
        if self.core.resources_created() {
            debug!(
                "EQUALIZER: {}: band {} -> {} dB",
                self.core.name(),
                index,
                gain_db
            );
            self.core.with_stage(|stage| stage.set_band_gain(index, gain_db))?;
        }
        Ok(())
    }

    fn apply_all_gains(&mut self) {
        let gains = self.band_gains;
        for (index, gain) in gains.iter().enumerate() {
            if let Err(e) = self.core.with_stage(|stage| stage.set_band_gain(index, *gain)) {
                warn!("⚠️ EQUALIZER: failed to apply band {}: {}", index, e);
            }
        }
    }
}

#[async_trait]
impl PipelineElement for Equalizer {
    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }

    fn stage_config(&self) -> StageConfig {
        StageConfig::passthrough(self.format())
    }

    fn input_format(&self) -> Option<AudioFormat> {
        Some(self.format())
    }

    fn output_format(&self) -> Option<AudioFormat> {
        Some(self.format())
    }

    async fn start(&mut self) -> Result<(), ElementError> {
        let newly_created = !self.core.resources_created();
        let config = self.stage_config();
        self.core.start(&config).await?;
        if newly_created {
            self.apply_all_gains();
        }
        Ok(())
    }

    async fn on_settings_request(
        &mut self,
        request: &mut SettingsRequest,
        side: FormatSide,
    ) -> Result<(), ElementError> {
        if let Some(bits) = request.bit_depth_for(side) {
            if bits != EQUALIZER_BIT_DEPTH {
                info!(
                    "✏️ EQUALIZER: {}: only {}-bit is supported, amending requested {}-bit",
                    self.core.name(),
                    EQUALIZER_BIT_DEPTH,
                    bits
                );
                request.set_bit_depth_for(side, EQUALIZER_BIT_DEPTH);
            }
        }

        let sample_rate = request.sampling_rate_for(side).unwrap_or(self.sample_rate);
        let channels = request.channels_for(side).unwrap_or(self.channels);

        if sample_rate != self.sample_rate || channels != self.channels {
            let candidate = AudioFormat::new(sample_rate, channels, EQUALIZER_BIT_DEPTH);
            check_format(self.core.name(), &candidate)?;

            log_request_origin(self.core.name(), request);
            self.core.reconfigure(&StageConfig::passthrough(candidate)).await?;
            self.sample_rate = sample_rate;
            self.channels = channels;
            info!(
                "🎚️ EQUALIZER: {}: new settings: rate={}, ch={}",
                self.core.name(),
                sample_rate,
                channels
            );
        }

        debug!(
            "EQUALIZER: {}: current settings: rate={}, ch={}",
            self.core.name(),
            self.sample_rate,
            self.channels
        );
        Ok(())
    }

    async fn restore_stage_config(&mut self, config: &StageConfig) -> Result<(), ElementError> {
        if config.input == self.format() {
            return Ok(());
        }
        self.core.reconfigure(config).await?;
        self.sample_rate = config.input.sample_rate;
        self.channels = config.input.channels;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
