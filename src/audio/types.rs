// Core data types and configuration structures for the pipeline core
//
// Concrete audio formats, the per-stage configuration handed to native
// stages, and the serde-backed configuration for pipelines and elements.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::validation::validate_config;

pub const DEFAULT_SAMPLE_RATE: u32 = 16000;
pub const DEFAULT_CHANNELS: u16 = 2;
pub const DEFAULT_BIT_DEPTH: u16 = 16;

/// Number of equalizer bands the native equalizer exposes
pub const EQUALIZER_BANDS: usize = 10;
/// Native equalizer default gain per band (dB)
pub const DEFAULT_EQ_GAIN_DB: i32 = -13;

/// A fully specified audio format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
}

impl AudioFormat {
    pub const fn new(sample_rate: u32, channels: u16, bit_depth: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bit_depth,
        }
    }

    /// Bytes per interleaved frame
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * (self.bit_depth as usize / 8)
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE, DEFAULT_CHANNELS, DEFAULT_BIT_DEPTH)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rate: {}, ch: {}, bits: {}",
            self.sample_rate, self.channels, self.bit_depth
        )
    }
}

/// Configuration handed to a native stage on creation and reconfiguration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageConfig {
    pub input: AudioFormat,
    pub output: AudioFormat,
}

impl StageConfig {
    pub fn new(input: AudioFormat, output: AudioFormat) -> Self {
        Self { input, output }
    }

    /// Stage whose output format equals its input format
    pub fn passthrough(format: AudioFormat) -> Self {
        Self {
            input: format,
            output: format,
        }
    }
}

impl fmt::Display for StageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SRC: {}, DST: {}", self.input, self.output)
    }
}

/// Pipeline-wide configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub name: String,
    /// Upper bound on waiting for a native stage to acknowledge stop
    pub stop_timeout_ms: u64,
    /// Upper bound on the probe phase of stream sources
    pub probe_timeout_ms: u64,
    /// Broadcast rounds allowed per `request_settings` call
    pub max_negotiation_rounds: u32,
    /// Capacity of the pipeline event broadcast channel
    pub event_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "pipeline".to_string(),
            stop_timeout_ms: 2000,
            probe_timeout_ms: 5000,
            max_negotiation_rounds: 4,
            event_capacity: 64,
        }
    }
}

impl PipelineConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Parse and validate a JSON configuration document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PipelineConfig =
            serde_json::from_str(json).context("Failed to parse pipeline configuration")?;
        validate_config(&config)
            .with_context(|| format!("Invalid configuration for pipeline '{}'", config.name))?;
        Ok(config)
    }
}

/// Resampler element configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResamplerConfig {
    pub src_rate: u32,
    pub src_channels: u16,
    pub src_bit_depth: u16,
    pub dst_rate: u32,
    pub dst_channels: u16,
}

impl Default for ResamplerConfig {
    fn default() -> Self {
        Self {
            src_rate: DEFAULT_SAMPLE_RATE,
            src_channels: DEFAULT_CHANNELS,
            src_bit_depth: DEFAULT_BIT_DEPTH,
            dst_rate: DEFAULT_SAMPLE_RATE,
            dst_channels: DEFAULT_CHANNELS,
        }
    }
}

/// Equalizer element configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqualizerConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub band_gains: Vec<i32>,
}

impl Default for EqualizerConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            band_gains: vec![DEFAULT_EQ_GAIN_DB; EQUALIZER_BANDS],
        }
    }
}

/// Raw PCM stream element configuration (application-fed source, readable sink)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcmStreamConfig {
    pub format: AudioFormat,
    pub capacity_bytes: usize,
}

impl Default for PcmStreamConfig {
    fn default() -> Self {
        Self {
            format: AudioFormat::default(),
            capacity_bytes: 8192,
        }
    }
}

/// I2S reader/writer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct I2sConfig {
    pub format: AudioFormat,
    /// Bit depths the codec accepts; empty means "any"
    pub supported_bit_depths: Vec<u16>,
}

impl Default for I2sConfig {
    fn default() -> Self {
        Self {
            format: AudioFormat::default(),
            supported_bit_depths: vec![16, 24, 32],
        }
    }
}

/// Audio configuration presets for common device roles
pub struct PipelineConfigFactory;

impl PipelineConfigFactory {
    /// Voice capture: short stop bound so the microphone can toggle quickly
    pub fn create_microphone_config() -> PipelineConfig {
        PipelineConfig {
            name: "microphone".to_string(),
            stop_timeout_ms: 500,
            ..Default::default()
        }
    }

    /// Network playback: generous probe bound for slow stream servers
    pub fn create_media_player_config() -> PipelineConfig {
        PipelineConfig {
            name: "media_player".to_string(),
            probe_timeout_ms: 8000,
            ..Default::default()
        }
    }

    /// Resampler preset producing 16 kHz mono for speech processing
    pub fn create_voice_resampler_config() -> ResamplerConfig {
        ResamplerConfig {
            dst_rate: 16000,
            dst_channels: 1,
            ..Default::default()
        }
    }
}
