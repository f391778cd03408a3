// Shared element lifecycle
//
// Owns the element's native stage handle exclusively and drives it through
// the element state machine: lazy creation on first start, bounded
// stop-and-wait, stop-before-reconfigure, optional pause/resume.

use std::time::Duration;
use tracing::{debug, info, warn};

use super::state::ElementState;
use super::ElementKind;
use crate::audio::errors::{ElementError, StageError};
use crate::audio::stage::{stop_and_wait, NativeStage, StopWait};
use crate::audio::types::StageConfig;

const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_millis(2000);

pub struct ElementCore {
    name: String,
    kind: ElementKind,
    state: ElementState,
    stage: Option<Box<dyn NativeStage>>,
    resources_created: bool,
    stop_timeout: Duration,
}

impl ElementCore {
    pub fn new(name: impl Into<String>, kind: ElementKind, stage: Box<dyn NativeStage>) -> Self {
        Self {
            name: name.into(),
            kind,
            state: ElementState::Unavailable,
            stage: Some(stage),
            resources_created: false,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    /// Core without a stage yet; one is attached once it can be built
    pub fn detached(name: impl Into<String>, kind: ElementKind) -> Self {
        Self {
            name: name.into(),
            kind,
            state: ElementState::Unavailable,
            stage: None,
            resources_created: false,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn state(&self) -> ElementState {
        self.state
    }

    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    pub fn set_stop_timeout(&mut self, timeout: Duration) {
        self.stop_timeout = timeout;
    }

    pub fn has_stage(&self) -> bool {
        self.stage.is_some()
    }

    pub fn resources_created(&self) -> bool {
        self.resources_created
    }

    /// Stage state query: whether the native worker is moving data
    pub fn stage_running(&self) -> bool {
        self.stage.as_ref().map(|s| s.is_running()).unwrap_or(false)
    }

    pub fn transition(&mut self, next: ElementState) -> Result<(), ElementError> {
        if !self.state.can_transition_to(next) {
            return Err(ElementError::InvalidTransition {
                element: self.name.clone(),
                from: self.state,
                to: next,
            });
        }
        if self.state != next {
            debug!("🔄 {}: {} -> {}", self.name, self.state, next);
            self.state = next;
        }
        Ok(())
    }

    /// Install a stage that has not been created yet, freeing any previous
    /// one. The element state is left alone.
    pub fn attach_stage(&mut self, stage: Box<dyn NativeStage>) {
        self.free_native();
        self.stage = Some(stage);
    }

    /// Run `f` against the native stage
    pub fn with_stage<R>(
        &mut self,
        f: impl FnOnce(&mut dyn NativeStage) -> Result<R, StageError>,
    ) -> Result<R, ElementError> {
        let stage = self
            .stage
            .as_deref_mut()
            .ok_or_else(|| ElementError::stage(&self.name, StageError::NotCreated))?;
        f(stage).map_err(|e| ElementError::stage(&self.name, e))
    }

    /// Start the element; no-op if already starting or running.
    ///
    /// Native resources are created lazily with `config` on the first start.
    pub async fn start(&mut self, config: &StageConfig) -> Result<(), ElementError> {
        match self.state {
            s if s.is_started() => {
                debug!("{}: start ignored, already {}", self.name, s);
                return Ok(());
            }
            ElementState::Unavailable | ElementState::Preparing | ElementState::Stopped => {}
            other => {
                return Err(ElementError::InvalidTransition {
                    element: self.name.clone(),
                    from: other,
                    to: ElementState::Starting,
                })
            }
        }

        if !self.resources_created {
            if self.state == ElementState::Unavailable {
                self.transition(ElementState::Preparing)?;
            }
            if let Err(e) = self.with_stage(|stage| stage.create_resources(config)) {
                self.state = ElementState::Unavailable;
                return Err(e);
            }
            self.resources_created = true;
            info!("🏗️ {}: created native stage ({})", self.name, config);
        }

        self.transition(ElementState::Starting)?;
        if let Err(e) = self.with_stage(|stage| stage.run()) {
            self.transition(ElementState::Stopped)?;
            return Err(e);
        }
        self.transition(ElementState::Running)
    }

    /// Stop the element and wait (bounded) for the stage to quiesce.
    ///
    /// On timeout the element stays STOPPING.
    pub async fn stop(&mut self) -> Result<(), ElementError> {
        if self.state.is_stopped() {
            return Ok(());
        }

        let previous = self.state;
        self.transition(ElementState::Stopping)?;

        if self.stage_running() {
            let timeout = self.stop_timeout;
            let stage = self
                .stage
                .as_deref_mut()
                .ok_or_else(|| ElementError::stage(&self.name, StageError::NotCreated))?;

            match stop_and_wait(stage, timeout).await {
                Ok(StopWait::Acknowledged) => {}
                Ok(StopWait::TimedOut) => {
                    warn!(
                        "⏱️ {}: native stage did not stop within {:?}",
                        self.name, timeout
                    );
                    return Err(ElementError::StopTimeout {
                        element: self.name.clone(),
                        timeout,
                    });
                }
                Err(e) => {
                    self.state = previous;
                    return Err(ElementError::stage(&self.name, e));
                }
            }
        }

        self.transition(ElementState::Stopped)
    }

    /// Apply a new configuration, stopping the stage first if it is running.
    ///
    /// An element that was RUNNING is restarted afterwards, with the old
    /// configuration if the new one was rejected.
    pub async fn reconfigure(&mut self, config: &StageConfig) -> Result<(), ElementError> {
        if !self.resources_created {
            // Picked up by create_resources on first start
            return Ok(());
        }

        let was_running = self.state == ElementState::Running;
        if was_running || self.stage_running() {
            self.stop().await?;
        }

        let applied = self.with_stage(|stage| stage.apply_configuration(config));

        if was_running {
            self.transition(ElementState::Starting)?;
            if let Err(e) = self.with_stage(|stage| stage.run()) {
                self.transition(ElementState::Stopped)?;
                return Err(e);
            }
            self.transition(ElementState::Running)?;
        }

        applied
    }

    pub async fn pause(&mut self) -> Result<(), ElementError> {
        match self.state {
            ElementState::Paused | ElementState::Pausing => return Ok(()),
            ElementState::Running => {}
            other => {
                return Err(ElementError::InvalidTransition {
                    element: self.name.clone(),
                    from: other,
                    to: ElementState::Pausing,
                })
            }
        }

        self.transition(ElementState::Pausing)?;
        match self.with_stage(|stage| stage.pause()) {
            Ok(()) => self.transition(ElementState::Paused),
            Err(e) => {
                self.transition(ElementState::Running)?;
                Err(unsupported_or(e, &self.name, "pause"))
            }
        }
    }

    pub async fn resume(&mut self) -> Result<(), ElementError> {
        match self.state {
            ElementState::Running | ElementState::Resuming => return Ok(()),
            ElementState::Paused => {}
            other => {
                return Err(ElementError::InvalidTransition {
                    element: self.name.clone(),
                    from: other,
                    to: ElementState::Resuming,
                })
            }
        }

        self.transition(ElementState::Resuming)?;
        match self.with_stage(|stage| stage.resume()) {
            Ok(()) => self.transition(ElementState::Running),
            Err(e) => {
                self.transition(ElementState::Paused)?;
                Err(unsupported_or(e, &self.name, "resume"))
            }
        }
    }

    /// Free the native handle. The element becomes UNAVAILABLE.
    pub fn release(&mut self) {
        self.free_native();
        self.state = ElementState::Unavailable;
    }

    fn free_native(&mut self) {
        if self.resources_created {
            if let Some(stage) = self.stage.as_deref_mut() {
                stage.release_resources();
            }
            self.resources_created = false;
            info!("🗑️ {}: released native stage", self.name);
        }
    }

    /// Take the stage out, releasing its resources first
    pub fn detach_stage(&mut self) -> Option<Box<dyn NativeStage>> {
        self.release();
        self.stage.take()
    }
}

impl Drop for ElementCore {
    fn drop(&mut self) {
        if self.resources_created {
            if let Some(stage) = self.stage.as_deref_mut() {
                stage.release_resources();
            }
        }
    }
}

fn unsupported_or(e: ElementError, element: &str, operation: &'static str) -> ElementError {
    match e {
        ElementError::Stage {
            source: StageError::Unsupported(_),
            ..
        } => ElementError::Unsupported {
            element: element.to_string(),
            operation,
        },
        other => other,
    }
}
