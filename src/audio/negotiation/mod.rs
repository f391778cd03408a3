// Settings negotiation protocol
//
// The message type elements use to advertise and amend an audio format,
// and the bounded broadcast that propagates it across the pipeline.

pub mod broadcast;
pub mod request;

pub use broadcast::{Amendment, ElementFailure, NegotiationOutcome, Negotiator};
pub use request::{FieldChange, SettingsField, SettingsRequest};
