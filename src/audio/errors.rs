use std::time::Duration;

use super::elements::{ElementId, ElementState};
use super::negotiation::SettingsField;

/// Errors reported by a native stage
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("Operation not supported by native stage: {0}")]
    Unsupported(&'static str),

    #[error("Native stage rejected configuration: {0}")]
    Rejected(String),

    #[error("Native stage resources not created")]
    NotCreated,

    #[error("Native stage error: {0}")]
    Native(#[from] anyhow::Error),
}

/// Errors raised by an element's lifecycle or reconfiguration
#[derive(Debug, thiserror::Error)]
pub enum ElementError {
    #[error("{element}: invalid state transition {from} -> {to}")]
    InvalidTransition {
        element: String,
        from: ElementState,
        to: ElementState,
    },

    #[error("{element}: native stage did not acknowledge stop within {timeout:?}")]
    StopTimeout { element: String, timeout: Duration },

    #[error("{element}: stream probe failed: {reason}")]
    ProbeFailed { element: String, reason: String },

    #[error("{element}: {source}")]
    Stage {
        element: String,
        #[source]
        source: StageError,
    },

    #[error("{element}: {operation} not supported")]
    Unsupported {
        element: String,
        operation: &'static str,
    },
}

impl ElementError {
    pub fn stage(element: &str, source: StageError) -> Self {
        ElementError::Stage {
            element: element.to_string(),
            source,
        }
    }

    /// Failures that leave the element in an inconsistent state and must
    /// abort a negotiation instead of being absorbed locally
    pub fn aborts_negotiation(&self) -> bool {
        matches!(
            self,
            ElementError::StopTimeout { .. } | ElementError::InvalidTransition { .. }
        )
    }
}

/// Protocol-level negotiation failures
#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    #[error(
        "Conflicting constraints on {field}: {first} requires {first_value}, {second} requires {second_value}"
    )]
    Conflict {
        field: SettingsField,
        first: String,
        first_value: u32,
        second: String,
        second_value: u32,
    },

    #[error("{element} cleared {field}; amendments may only make a request more specific")]
    InvalidAmendment {
        element: String,
        field: SettingsField,
    },

    #[error("Negotiation did not converge within {rounds} rounds")]
    RoundLimitExceeded { rounds: u32 },

    #[error("Negotiation aborted: {0}")]
    Element(#[from] ElementError),
}

/// Errors surfaced to whatever owns the pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Element(#[from] ElementError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error("Invalid pipeline topology: {0}")]
    InvalidTopology(String),

    #[error("Unknown element: {0}")]
    UnknownElement(ElementId),

    #[error("Element {element} is not a {expected}")]
    WrongElementType {
        element: ElementId,
        expected: &'static str,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
