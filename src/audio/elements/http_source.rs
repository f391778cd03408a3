// Network stream source with a probe phase
//
// Before real-time playback the source runs a short-lived probe stage to
// discover the stream's native format. Once the format is known the probe
// is torn down and the streaming stage is built for that format. Each
// phase owns the handler for its stage's event queue; the phase value is
// replaced as a whole at every boundary.

use async_trait::async_trait;
use std::any::Any;
use std::mem;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use super::{
    check_format, ElementCore, ElementEvent, ElementKind, ElementState, FormatSide,
    PipelineElement,
};
use crate::audio::errors::ElementError;
use crate::audio::negotiation::SettingsRequest;
use crate::audio::stage::{stop_and_wait, StageEvent, StageHandle, StopWait, StreamBackend};
use crate::audio::types::{AudioFormat, PipelineConfig, StageConfig};

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Readiness phase of a stream source
pub enum SourcePhase {
    /// No probe has run since construction or the last URI change
    Idle,
    Probing,
    Streaming(StreamingHandler),
    /// The last probe failed; starting again retries it
    Failed(String),
}

impl SourcePhase {
    pub fn name(&self) -> &'static str {
        match self {
            SourcePhase::Idle => "IDLE",
            SourcePhase::Probing => "PROBING",
            SourcePhase::Streaming(_) => "STREAMING",
            SourcePhase::Failed(_) => "FAILED",
        }
    }
}

/// Probe-phase handler: waits for the format or a reason to give up
struct ProbeHandler {
    events: mpsc::UnboundedReceiver<StageEvent>,
    deadline: Instant,
}

impl ProbeHandler {
    async fn discover_format(&mut self) -> Result<AudioFormat, String> {
        loop {
            match timeout_at(self.deadline, self.events.recv()).await {
                Err(_) => return Err("timed out waiting for stream format".to_string()),
                Ok(None) => return Err("probe stage closed its event queue".to_string()),
                Ok(Some(StageEvent::FormatDiscovered(format))) => return Ok(format),
                Ok(Some(StageEvent::StreamError(reason))) => return Err(reason),
                Ok(Some(StageEvent::Stopped | StageEvent::Finished)) => {
                    return Err("probe stage ended before the format was known".to_string())
                }
                Ok(Some(StageEvent::Started)) => debug!("HTTP_SOURCE: probe stage running"),
            }
        }
    }
}

/// Streaming-phase handler: drains events published by the streaming stage
pub struct StreamingHandler {
    events: mpsc::UnboundedReceiver<StageEvent>,
}

impl StreamingHandler {
    fn drain(&mut self) -> Vec<StageEvent> {
        let mut drained = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => drained.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if drained.is_empty() {
                        debug!("HTTP_SOURCE: streaming stage event queue closed");
                    }
                    break;
                }
            }
        }
        drained
    }
}

/// Source reading and decoding an HTTP audio stream
pub struct HttpStreamSource {
    core: ElementCore,
    uri: String,
    backend: Box<dyn StreamBackend>,
    phase: SourcePhase,
    format: Option<AudioFormat>,
    pending_request: Option<SettingsRequest>,
    probe_timeout: Duration,
}

impl HttpStreamSource {
    pub fn new(
        name: impl Into<String>,
        uri: impl Into<String>,
        backend: Box<dyn StreamBackend>,
    ) -> Self {
        Self {
            core: ElementCore::detached(name, ElementKind::Source),
            uri: uri.into(),
            backend,
            phase: SourcePhase::Idle,
            format: None,
            pending_request: None,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn phase(&self) -> &SourcePhase {
        &self.phase
    }

    /// Format discovered by the last successful probe
    pub fn stream_format(&self) -> Option<AudioFormat> {
        self.format
    }

    pub fn set_probe_timeout(&mut self, timeout: Duration) {
        self.probe_timeout = timeout;
    }

    /// Point the source at a new stream. The current stream is stopped and
    /// released; the next start probes again.
    pub async fn set_stream_uri(&mut self, uri: impl Into<String>) -> Result<(), ElementError> {
        self.core.stop().await?;
        self.core.detach_stage();
        self.phase = SourcePhase::Idle;
        self.format = None;
        self.pending_request = None;
        self.uri = uri.into();
        info!("🔗 HTTP_SOURCE: {}: stream set to {}", self.core.name(), self.uri);
        Ok(())
    }

    /// Swap in the next phase; the previous phase's handler is dropped here
    fn enter_phase(&mut self, next: SourcePhase) {
        debug!(
            "HTTP_SOURCE: {}: phase {} -> {}",
            self.core.name(),
            self.phase.name(),
            next.name()
        );
        drop(mem::replace(&mut self.phase, next));
    }

    fn fail_probe(&mut self, reason: String) -> ElementError {
        warn!("❌ HTTP_SOURCE: {}: probe failed: {}", self.core.name(), reason);
        self.enter_phase(SourcePhase::Failed(reason.clone()));
        self.core.detach_stage();
        ElementError::ProbeFailed {
            element: self.core.name().to_string(),
            reason,
        }
    }

    /// Run the probe stage until the stream format is known, then build
    /// the streaming stage for it
    async fn probe_stream(&mut self) -> Result<(), ElementError> {
        self.core.transition(ElementState::Preparing)?;
        self.enter_phase(SourcePhase::Probing);
        info!("🔎 HTTP_SOURCE: {}: probing {}", self.core.name(), self.uri);

        let StageHandle { mut stage, events } = match self.backend.open_probe(&self.uri) {
            Ok(handle) => handle,
            Err(e) => return Err(self.fail_probe(e.to_string())),
        };

        let mut handler = ProbeHandler {
            events,
            deadline: Instant::now() + self.probe_timeout,
        };

        let outcome = match stage
            .create_resources(&StageConfig::passthrough(AudioFormat::default()))
            .and_then(|_| stage.run())
        {
            Ok(()) => handler.discover_format().await,
            Err(e) => Err(e.to_string()),
        };

        // The probe stage never outlives this call
        if stage.is_running() {
            match stop_and_wait(stage.as_mut(), self.core.stop_timeout()).await {
                Ok(StopWait::Acknowledged) => {}
                Ok(StopWait::TimedOut) => warn!(
                    "⏱️ HTTP_SOURCE: {}: probe stage did not stop in time, releasing anyway",
                    self.core.name()
                ),
                Err(e) => warn!("⚠️ HTTP_SOURCE: {}: probe stop failed: {}", self.core.name(), e),
            }
        }
        stage.release_resources();
        drop(handler);

        let format = match outcome {
            Ok(format) => format,
            Err(reason) => return Err(self.fail_probe(reason)),
        };
        if let Err(e) = check_format(self.core.name(), &format) {
            return Err(self.fail_probe(e.to_string()));
        }

        let StageHandle { stage, events } = match self.backend.open_stream(&self.uri, &format) {
            Ok(handle) => handle,
            Err(e) => return Err(self.fail_probe(e.to_string())),
        };

        info!("🎵 HTTP_SOURCE: {}: stream format {}", self.core.name(), format);
        self.core.attach_stage(stage);
        self.format = Some(format);
        self.pending_request = Some(SettingsRequest::from_format(&format));
        self.enter_phase(SourcePhase::Streaming(StreamingHandler { events }));
        Ok(())
    }
}

#[async_trait]
impl PipelineElement for HttpStreamSource {
    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }

    fn stage_config(&self) -> StageConfig {
        StageConfig::passthrough(self.format.unwrap_or_default())
    }

    fn input_format(&self) -> Option<AudioFormat> {
        None
    }

    fn output_format(&self) -> Option<AudioFormat> {
        self.format
    }

    /// Ready once a probe succeeded and the streaming stage exists
    fn is_ready(&self) -> bool {
        matches!(self.phase, SourcePhase::Streaming(_)) && self.core.has_stage()
    }

    fn apply_pipeline_config(&mut self, config: &PipelineConfig) {
        self.core.set_stop_timeout(config.stop_timeout());
        self.probe_timeout = config.probe_timeout();
    }

    async fn start(&mut self) -> Result<(), ElementError> {
        if self.core.state().is_started() {
            return Ok(());
        }
        if !self.is_ready() {
            self.probe_stream().await?;
        }
        let config = self.stage_config();
        self.core.start(&config).await
    }

    /// The stream format is dictated by the server; concrete source-side
    /// fields that disagree with it are amended back
    async fn on_settings_request(
        &mut self,
        request: &mut SettingsRequest,
        side: FormatSide,
    ) -> Result<(), ElementError> {
        let Some(format) = self.format else {
            return Ok(());
        };
        if side != FormatSide::Source {
            return Ok(());
        }

        let mut amended = false;
        if request.sampling_rate.is_some_and(|rate| rate != format.sample_rate) {
            request.sampling_rate = Some(format.sample_rate);
            amended = true;
        }
        if request
            .number_of_channels
            .is_some_and(|channels| channels != format.channels)
        {
            request.number_of_channels = Some(format.channels);
            amended = true;
        }
        if request.bit_depth.is_some_and(|bits| bits != format.bit_depth) {
            request.bit_depth = Some(format.bit_depth);
            amended = true;
        }

        if amended {
            info!(
                "✏️ HTTP_SOURCE: {}: stream is fixed at {}, amending request",
                self.core.name(),
                format
            );
        }
        Ok(())
    }

    /// Negotiation never reconfigures the stream, so there is nothing to undo
    async fn restore_stage_config(&mut self, _config: &StageConfig) -> Result<(), ElementError> {
        Ok(())
    }

    fn take_settings_request(&mut self) -> Option<SettingsRequest> {
        self.pending_request.take()
    }

    fn poll_events(&mut self) -> Vec<ElementEvent> {
        let SourcePhase::Streaming(handler) = &mut self.phase else {
            return Vec::new();
        };

        let mut events = Vec::new();
        for event in handler.drain() {
            match event {
                StageEvent::StreamError(reason) => {
                    warn!("⚠️ HTTP_SOURCE: {}: playback issue: {}", self.core.name(), reason);
                    events.push(ElementEvent::PlaybackIssue(reason));
                }
                StageEvent::Stopped => {
                    if !self.core.state().is_stopped()
                        && self
                            .core
                            .transition(ElementState::Stopping)
                            .and_then(|_| self.core.transition(ElementState::Stopped))
                            .is_ok()
                    {
                        events.push(ElementEvent::StateChanged(ElementState::Stopped));
                    }
                }
                StageEvent::Finished => {
                    info!("🏁 HTTP_SOURCE: {}: stream finished", self.core.name());
                    events.push(ElementEvent::StreamFinished);
                }
                StageEvent::FormatDiscovered(format) => {
                    if self.format != Some(format) {
                        info!(
                            "🎵 HTTP_SOURCE: {}: stream format changed to {}",
                            self.core.name(),
                            format
                        );
                        self.format = Some(format);
                        self.pending_request = Some(SettingsRequest::from_format(&format));
                    }
                }
                StageEvent::Started => {
                    debug!("HTTP_SOURCE: {}: streaming stage running", self.core.name())
                }
            }
        }
        events
    }

    fn release(&mut self) {
        self.core.detach_stage();
        self.enter_phase(SourcePhase::Idle);
        self.format = None;
        self.pending_request = None;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
