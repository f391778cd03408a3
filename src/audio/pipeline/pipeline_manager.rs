// Pipeline orchestrator
//
// Owns the element arena in source-to-sink order and drives it:
// - start in source-to-sink order, negotiating self-originated requests
//   before downstream elements start
// - stop in sink-to-source order, continuing past failures
// - settings negotiation through a bounded broadcast
// - derived pipeline state published on a watch channel, events on a
//   broadcast channel

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use super::events::PipelineEvent;
use super::state::{reduce_states, PipelineState};
use crate::audio::elements::{ElementEvent, ElementId, ElementKind, ElementState, PipelineElement};
use crate::audio::errors::{ElementError, PipelineError, Result};
use crate::audio::negotiation::{NegotiationOutcome, Negotiator, SettingsRequest};
use crate::audio::types::PipelineConfig;
use crate::audio::validation::{validate_config, validate_element_name};

pub struct Pipeline {
    config: PipelineConfig,
    elements: Vec<Box<dyn PipelineElement>>,
    state_tx: watch::Sender<PipelineState>,
    events_tx: broadcast::Sender<PipelineEvent>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        validate_config(&config)?;

        let (state_tx, _) = watch::channel(PipelineState::Unavailable);
        let (events_tx, _) = broadcast::channel(config.event_capacity);

        info!("🏗️ AUDIO_PIPELINE: Creating pipeline '{}'", config.name);

        Ok(Self {
            config,
            elements: Vec::new(),
            state_tx,
            events_tx,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Append an element. Kinds must keep the order SOURCE* PROCESS* SINK*.
    pub fn add_element(&mut self, mut element: Box<dyn PipelineElement>) -> Result<ElementId> {
        validate_element_name(element.name())?;

        if self.elements.iter().any(|e| e.name() == element.name()) {
            return Err(PipelineError::InvalidTopology(format!(
                "duplicate element name '{}'",
                element.name()
            )));
        }

        if let Some(last) = self.elements.last() {
            if element.kind() < last.kind() {
                return Err(PipelineError::InvalidTopology(format!(
                    "{} element '{}' cannot follow {} element '{}'",
                    element.kind(),
                    element.name(),
                    last.kind(),
                    last.name()
                )));
            }
        }

        element.apply_pipeline_config(&self.config);

        let id = ElementId(self.elements.len());
        info!(
            "➕ AUDIO_PIPELINE: '{}' added {} element '{}' as {}",
            self.config.name,
            element.kind(),
            element.name(),
            id
        );
        self.elements.push(element);
        Ok(id)
    }

    fn validate_topology(&self) -> Result<()> {
        if !self.elements.iter().any(|e| e.kind() == ElementKind::Source) {
            return Err(PipelineError::InvalidTopology(
                "pipeline has no source element".to_string(),
            ));
        }
        if !self.elements.iter().any(|e| e.kind() == ElementKind::Sink) {
            return Err(PipelineError::InvalidTopology(
                "pipeline has no sink element".to_string(),
            ));
        }
        Ok(())
    }

    pub fn element(&self, id: ElementId) -> Result<&dyn PipelineElement> {
        self.elements
            .get(id.0)
            .map(|e| e.as_ref())
            .ok_or(PipelineError::UnknownElement(id))
    }

    /// Typed access to a concrete element, e.g. to adjust an equalizer band
    pub fn element_mut<T: PipelineElement>(&mut self, id: ElementId) -> Result<&mut T> {
        let element = self
            .elements
            .get_mut(id.0)
            .ok_or(PipelineError::UnknownElement(id))?;

        element
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or(PipelineError::WrongElementType {
                element: id,
                expected: std::any::type_name::<T>(),
            })
    }

    pub fn find_element(&self, name: &str) -> Option<ElementId> {
        self.elements
            .iter()
            .position(|e| e.name() == name)
            .map(ElementId)
    }

    pub fn element_state(&self, id: ElementId) -> Result<ElementState> {
        self.element(id).map(|e| e.state())
    }

    pub fn element_states(&self) -> Vec<ElementState> {
        self.elements.iter().map(|e| e.state()).collect()
    }

    /// Derived from the element states on every call
    pub fn state(&self) -> PipelineState {
        reduce_states(&self.element_states())
    }

    /// True once every element can be started
    pub fn is_ready(&self) -> bool {
        !self.elements.is_empty() && self.elements.iter().all(|e| e.is_ready())
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PipelineState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events_tx.subscribe()
    }

    fn emit(&self, event: PipelineEvent) {
        // No subscribers is not an error
        if self.events_tx.send(event).is_err() {
            debug!("AUDIO_PIPELINE: no event subscribers");
        }
    }

    fn publish_state(&self) {
        let current = self.state();
        let previous = self.state_tx.send_replace(current);
        if previous != current {
            info!(
                "🔄 AUDIO_PIPELINE: '{}' {} -> {}",
                self.config.name, previous, current
            );
            self.emit(PipelineEvent::StateChanged { previous, current });
        }
    }

    /// Start every element in source-to-sink order.
    ///
    /// Calling this on a running pipeline changes nothing. A settings
    /// request an element originates while starting (a stream source that
    /// discovered its format) is negotiated before the next element starts.
    pub async fn start(&mut self) -> Result<()> {
        self.validate_topology()?;
        info!(
            "▶️ AUDIO_PIPELINE: Starting '{}' ({} elements)",
            self.config.name,
            self.elements.len()
        );

        for index in 0..self.elements.len() {
            let result = self.elements[index].start().await;
            self.publish_state();

            if let Err(e) = result {
                error!(
                    "❌ AUDIO_PIPELINE: Failed to start '{}': {}",
                    self.elements[index].name(),
                    e
                );
                return Err(e.into());
            }

            if let Some(request) = self.elements[index].take_settings_request() {
                self.negotiate(request.attributed_to(ElementId(index))).await?;
                self.publish_state();
            }
        }

        info!(
            "✅ AUDIO_PIPELINE: '{}' is {}",
            self.config.name,
            self.state()
        );
        Ok(())
    }

    /// Stop every element in sink-to-source order. Every element is asked
    /// to stop even if an earlier one fails; the first failure is returned.
    pub async fn stop(&mut self) -> Result<()> {
        info!("⏹️ AUDIO_PIPELINE: Stopping '{}'", self.config.name);

        let mut first_error: Option<ElementError> = None;
        for element in self.elements.iter_mut().rev() {
            if let Err(e) = element.stop().await {
                warn!("⚠️ AUDIO_PIPELINE: Failed to stop '{}': {}", element.name(), e);
                first_error.get_or_insert(e);
            }
        }

        self.publish_state();
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Pause every element that supports it; the rest keep running
    pub async fn pause(&mut self) -> Result<()> {
        let mut first_error: Option<ElementError> = None;
        for element in self.elements.iter_mut().rev() {
            match element.pause().await {
                Ok(()) => {}
                Err(ElementError::Unsupported { .. }) => {
                    debug!("AUDIO_PIPELINE: '{}' cannot pause, left running", element.name());
                }
                Err(e) => {
                    warn!("⚠️ AUDIO_PIPELINE: Failed to pause '{}': {}", element.name(), e);
                    first_error.get_or_insert(e);
                }
            }
        }

        self.publish_state();
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    pub async fn resume(&mut self) -> Result<()> {
        let mut first_error: Option<ElementError> = None;
        for element in self.elements.iter_mut() {
            if element.state() != ElementState::Paused {
                continue;
            }
            if let Err(e) = element.resume().await {
                warn!("⚠️ AUDIO_PIPELINE: Failed to resume '{}': {}", element.name(), e);
                first_error.get_or_insert(e);
            }
        }

        self.publish_state();
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Broadcast a settings change to every element until no element
    /// amends it.
    ///
    /// Runs to completion before returning. Protocol failures (conflicting
    /// amendments, a stage that will not stop, no convergence) are returned
    /// after every element is put back on its previous configuration; an
    /// element that merely rejects the new format keeps its previous
    /// configuration and is listed in the outcome.
    pub async fn request_settings(&mut self, request: SettingsRequest) -> Result<NegotiationOutcome> {
        let outcome = self.negotiate(request).await;
        self.publish_state();
        outcome
    }

    async fn negotiate(&mut self, request: SettingsRequest) -> Result<NegotiationOutcome> {
        let outcome = Negotiator::new(self.config.max_negotiation_rounds)
            .run(&mut self.elements, request)
            .await?;

        for failure in &outcome.failures {
            warn!(
                "⚠️ AUDIO_PIPELINE: '{}' rejected {}: {}",
                failure.element_name, outcome.settled, failure.error
            );
        }

        self.emit(PipelineEvent::SettingsApplied {
            settled: outcome.settled,
            rounds: outcome.rounds,
            failed_elements: outcome
                .failures
                .iter()
                .map(|f| f.element_name.clone())
                .collect(),
        });
        Ok(outcome)
    }

    /// Drain element event queues and republish them. Settings changes an
    /// element originated since the last call are negotiated here.
    ///
    /// Returns the number of element events handled.
    pub async fn process_events(&mut self) -> Result<usize> {
        let mut handled = 0;

        for index in 0..self.elements.len() {
            let id = ElementId(index);
            for event in self.elements[index].poll_events() {
                handled += 1;
                match event {
                    ElementEvent::StateChanged(state) => {
                        debug!(
                            "AUDIO_PIPELINE: '{}' reported {}",
                            self.elements[index].name(),
                            state
                        );
                    }
                    ElementEvent::PlaybackIssue(reason) => {
                        self.emit(PipelineEvent::PlaybackIssue { element: id, reason });
                    }
                    ElementEvent::StreamFinished => {
                        self.emit(PipelineEvent::StreamFinished { element: id });
                    }
                }
            }

            if let Some(request) = self.elements[index].take_settings_request() {
                if let Err(e) = self.negotiate(request.attributed_to(id)).await {
                    self.publish_state();
                    return Err(e);
                }
            }
        }

        self.publish_state();
        Ok(handled)
    }

    /// Stop everything and release every native handle
    pub async fn teardown(&mut self) -> Result<()> {
        let stopped = self.stop().await;

        for element in self.elements.iter_mut().rev() {
            element.release();
        }

        self.publish_state();
        info!("🗑️ AUDIO_PIPELINE: '{}' torn down", self.config.name);
        stopped
    }
}
