use serde::{Deserialize, Serialize};
use std::fmt;

use crate::audio::elements::{ElementId, FormatSide};
use crate::audio::types::AudioFormat;

/// A negotiation message advertising a desired audio format.
///
/// `None` in any field means "no opinion": the receiving element keeps its
/// current value. `requested_by` names the element that last amended the
/// request; it is informational and never owns anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_channels: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_depth: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_sampling_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_number_of_channels: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_bit_depth: Option<u16>,
    #[serde(skip)]
    pub requested_by: Option<ElementId>,
}

/// One negotiable field of a [`SettingsRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettingsField {
    SamplingRate,
    NumberOfChannels,
    BitDepth,
    FinalSamplingRate,
    FinalNumberOfChannels,
    FinalBitDepth,
}

impl SettingsField {
    pub const ALL: [SettingsField; 6] = [
        SettingsField::SamplingRate,
        SettingsField::NumberOfChannels,
        SettingsField::BitDepth,
        SettingsField::FinalSamplingRate,
        SettingsField::FinalNumberOfChannels,
        SettingsField::FinalBitDepth,
    ];
}

impl fmt::Display for SettingsField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SettingsField::SamplingRate => "sampling_rate",
            SettingsField::NumberOfChannels => "number_of_channels",
            SettingsField::BitDepth => "bit_depth",
            SettingsField::FinalSamplingRate => "final_sampling_rate",
            SettingsField::FinalNumberOfChannels => "final_number_of_channels",
            SettingsField::FinalBitDepth => "final_bit_depth",
        };
        write!(f, "{}", name)
    }
}

/// A single field that differs between two versions of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldChange {
    pub field: SettingsField,
    pub before: Option<u32>,
    pub after: Option<u32>,
}

impl SettingsRequest {
    /// Request with every field unspecified
    pub fn new() -> Self {
        Self::default()
    }

    /// Source-side fields taken from a concrete format
    pub fn from_format(format: &AudioFormat) -> Self {
        Self {
            sampling_rate: Some(format.sample_rate),
            number_of_channels: Some(format.channels),
            bit_depth: Some(format.bit_depth),
            ..Default::default()
        }
    }

    pub fn with_sampling_rate(mut self, rate: u32) -> Self {
        self.sampling_rate = Some(rate);
        self
    }

    pub fn with_number_of_channels(mut self, channels: u16) -> Self {
        self.number_of_channels = Some(channels);
        self
    }

    pub fn with_bit_depth(mut self, bits: u16) -> Self {
        self.bit_depth = Some(bits);
        self
    }

    pub fn with_final_sampling_rate(mut self, rate: u32) -> Self {
        self.final_sampling_rate = Some(rate);
        self
    }

    pub fn with_final_number_of_channels(mut self, channels: u16) -> Self {
        self.final_number_of_channels = Some(channels);
        self
    }

    pub fn with_final_bit_depth(mut self, bits: u16) -> Self {
        self.final_bit_depth = Some(bits);
        self
    }

    pub fn attributed_to(mut self, element: ElementId) -> Self {
        self.requested_by = Some(element);
        self
    }

    /// True when the request carries no opinion at all
    pub fn is_unspecified(&self) -> bool {
        SettingsField::ALL.iter().all(|f| self.get(*f).is_none())
    }

    pub fn get(&self, field: SettingsField) -> Option<u32> {
        match field {
            SettingsField::SamplingRate => self.sampling_rate,
            SettingsField::NumberOfChannels => self.number_of_channels.map(u32::from),
            SettingsField::BitDepth => self.bit_depth.map(u32::from),
            SettingsField::FinalSamplingRate => self.final_sampling_rate,
            SettingsField::FinalNumberOfChannels => self.final_number_of_channels.map(u32::from),
            SettingsField::FinalBitDepth => self.final_bit_depth.map(u32::from),
        }
    }

    /// Fields whose value differs from `before`; `requested_by` is ignored
    pub fn changes_from(&self, before: &SettingsRequest) -> Vec<FieldChange> {
        SettingsField::ALL
            .iter()
            .filter_map(|&field| {
                let (was, now) = (before.get(field), self.get(field));
                (was != now).then_some(FieldChange {
                    field,
                    before: was,
                    after: now,
                })
            })
            .collect()
    }

    pub fn sampling_rate_for(&self, side: FormatSide) -> Option<u32> {
        match side {
            FormatSide::Source => self.sampling_rate,
            FormatSide::Final => self.final_sampling_rate,
        }
    }

    pub fn channels_for(&self, side: FormatSide) -> Option<u16> {
        match side {
            FormatSide::Source => self.number_of_channels,
            FormatSide::Final => self.final_number_of_channels,
        }
    }

    pub fn bit_depth_for(&self, side: FormatSide) -> Option<u16> {
        match side {
            FormatSide::Source => self.bit_depth,
            FormatSide::Final => self.final_bit_depth,
        }
    }

    pub fn set_sampling_rate_for(&mut self, side: FormatSide, rate: u32) {
        match side {
            FormatSide::Source => self.sampling_rate = Some(rate),
            FormatSide::Final => self.final_sampling_rate = Some(rate),
        }
    }

    pub fn set_channels_for(&mut self, side: FormatSide, channels: u16) {
        match side {
            FormatSide::Source => self.number_of_channels = Some(channels),
            FormatSide::Final => self.final_number_of_channels = Some(channels),
        }
    }

    pub fn set_bit_depth_for(&mut self, side: FormatSide, bits: u16) {
        match side {
            FormatSide::Source => self.bit_depth = Some(bits),
            FormatSide::Final => self.final_bit_depth = Some(bits),
        }
    }
}

fn show<T: fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

impl fmt::Display for SettingsRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SRC: rate: {}, ch: {}, bits: {}, DST: rate: {}, ch: {}, bits: {}",
            show(self.sampling_rate),
            show(self.number_of_channels),
            show(self.bit_depth),
            show(self.final_sampling_rate),
            show(self.final_number_of_channels),
            show(self.final_bit_depth)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_request_is_unspecified() {
        assert!(SettingsRequest::new().is_unspecified());
        assert!(!SettingsRequest::new().with_final_bit_depth(24).is_unspecified());
    }

    #[test]
    fn test_changes_ignore_originator() {
        let before = SettingsRequest::new().with_sampling_rate(48000);
        let after = before.attributed_to(ElementId(2));
        assert!(after.changes_from(&before).is_empty());
    }

    #[test]
    fn test_changes_report_each_field() {
        let before = SettingsRequest::new().with_final_bit_depth(24);
        let after = before.with_bit_depth(16).with_final_bit_depth(16);
        let changes = after.changes_from(&before);
        assert_eq!(
            changes,
            vec![
                FieldChange {
                    field: SettingsField::BitDepth,
                    before: None,
                    after: Some(16)
                },
                FieldChange {
                    field: SettingsField::FinalBitDepth,
                    before: Some(24),
                    after: Some(16)
                },
            ]
        );
    }

    #[test]
    fn test_side_accessors() {
        let mut request = SettingsRequest::from_format(&AudioFormat::new(44100, 2, 16));
        request.set_sampling_rate_for(FormatSide::Final, 16000);
        assert_eq!(request.sampling_rate_for(FormatSide::Source), Some(44100));
        assert_eq!(request.sampling_rate_for(FormatSide::Final), Some(16000));
        assert_eq!(request.channels_for(FormatSide::Final), None);
    }

    #[test]
    fn test_display_marks_unspecified_fields() {
        let request = SettingsRequest::new().with_sampling_rate(48000);
        assert_eq!(
            request.to_string(),
            "SRC: rate: 48000, ch: -, bits: -, DST: rate: -, ch: -, bits: -"
        );
    }
}
