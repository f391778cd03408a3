// Configuration validation for pipelines and elements
//
// Bounds checks applied when configuration is loaded and when elements are
// assembled, so misconfiguration surfaces before any native stage exists.

use anyhow::Result;

use super::types::{AudioFormat, PipelineConfig, EQUALIZER_BANDS};

const SUPPORTED_BIT_DEPTHS: [u16; 4] = [8, 16, 24, 32];

/// Validate pipeline configuration bounds
pub fn validate_config(config: &PipelineConfig) -> Result<()> {
    if config.name.trim().is_empty() {
        return Err(anyhow::anyhow!("Pipeline name cannot be empty"));
    }

    if config.stop_timeout_ms == 0 || config.stop_timeout_ms > 60_000 {
        return Err(anyhow::anyhow!(
            "Invalid stop timeout: {} ms (must be 1-60000 ms)",
            config.stop_timeout_ms
        ));
    }

    if config.probe_timeout_ms == 0 || config.probe_timeout_ms > 60_000 {
        return Err(anyhow::anyhow!(
            "Invalid probe timeout: {} ms (must be 1-60000 ms)",
            config.probe_timeout_ms
        ));
    }

    // A single amendment needs the original round plus one re-broadcast
    if config.max_negotiation_rounds < 2 || config.max_negotiation_rounds > 16 {
        return Err(anyhow::anyhow!(
            "Invalid max negotiation rounds: {} (must be 2-16)",
            config.max_negotiation_rounds
        ));
    }

    if config.event_capacity == 0 || config.event_capacity > 4096 {
        return Err(anyhow::anyhow!(
            "Invalid event capacity: {} (must be 1-4096)",
            config.event_capacity
        ));
    }

    Ok(())
}

/// Validate a concrete audio format against what the native stages accept
pub fn validate_format(format: &AudioFormat) -> Result<()> {
    if format.sample_rate < 8000 || format.sample_rate > 192_000 {
        return Err(anyhow::anyhow!(
            "Invalid sample rate: {} (must be 8000-192000 Hz)",
            format.sample_rate
        ));
    }

    if format.channels < 1 || format.channels > 8 {
        return Err(anyhow::anyhow!(
            "Invalid channel count: {} (must be 1-8 channels)",
            format.channels
        ));
    }

    if !SUPPORTED_BIT_DEPTHS.contains(&format.bit_depth) {
        return Err(anyhow::anyhow!(
            "Invalid bit depth: {} (must be one of {:?})",
            format.bit_depth,
            SUPPORTED_BIT_DEPTHS
        ));
    }

    Ok(())
}

/// Validate an element name used in logs and lookups
pub fn validate_element_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow::anyhow!("Element name cannot be empty"));
    }
    if name.len() > 64 {
        return Err(anyhow::anyhow!(
            "Element name too long: maximum 64 characters allowed, got {}",
            name.len()
        ));
    }
    if !name.chars().all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | ' ')) {
        return Err(anyhow::anyhow!(
            "Element name '{}' contains invalid characters",
            name
        ));
    }
    Ok(())
}

/// Validate an equalizer band index and gain
pub fn validate_eq_band(index: usize, gain_db: i32) -> Result<()> {
    if index >= EQUALIZER_BANDS {
        return Err(anyhow::anyhow!(
            "Equalizer band {} out of range (0-{})",
            index,
            EQUALIZER_BANDS - 1
        ));
    }
    if !(-13..=13).contains(&gain_db) {
        return Err(anyhow::anyhow!(
            "Equalizer gain {} dB out of range (-13 to 13 dB)",
            gain_db
        ));
    }
    Ok(())
}
