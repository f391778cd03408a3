// Shared fakes for integration tests
//
// FakeStage records every native call into a log that several stages can
// share, so tests can assert cross-element ordering. FakeBackend hands out
// probe and streaming stages whose event queues the test controls.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use adf_pipeline::audio::stage::{StageHandle, StopAck};
use adf_pipeline::{AudioFormat, NativeStage, StageConfig, StageError, StageEvent, StreamBackend};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageCall {
    Create(StageConfig),
    Apply(StageConfig),
    Run,
    RequestStop,
    Pause,
    Resume,
    SetBandGain(usize, i32),
    Release,
}

pub type CallLog = Arc<Mutex<Vec<(String, StageCall)>>>;

pub fn new_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Calls recorded for one stage, in order
pub fn calls_for(log: &CallLog, stage: &str) -> Vec<StageCall> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|(name, _)| name == stage)
        .map(|(_, call)| call.clone())
        .collect()
}

/// Names of stages in the order they received `call`
pub fn order_of(log: &CallLog, call: &StageCall) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|(_, c)| c == call)
        .map(|(name, _)| name.clone())
        .collect()
}

pub fn count_applies(log: &CallLog) -> usize {
    log.lock()
        .unwrap()
        .iter()
        .filter(|(_, c)| matches!(c, StageCall::Apply(_)))
        .count()
}

pub struct FakeStage {
    name: String,
    log: CallLog,
    running: bool,
    stuck_on_stop: bool,
    reject_apply: bool,
    pausable: bool,
    held_acks: Vec<oneshot::Sender<()>>,
}

impl FakeStage {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            running: false,
            stuck_on_stop: false,
            reject_apply: false,
            pausable: false,
            held_acks: Vec::new(),
        }
    }

    pub fn boxed(name: &str, log: &CallLog) -> Box<dyn NativeStage> {
        Box::new(Self::new(name, log))
    }

    /// Never acknowledges a stop request
    pub fn stuck_on_stop(mut self) -> Self {
        self.stuck_on_stop = true;
        self
    }

    pub fn rejecting_apply(mut self) -> Self {
        self.reject_apply = true;
        self
    }

    pub fn pausable(mut self) -> Self {
        self.pausable = true;
        self
    }

    fn record(&self, call: StageCall) {
        self.log.lock().unwrap().push((self.name.clone(), call));
    }
}

impl NativeStage for FakeStage {
    fn create_resources(&mut self, config: &StageConfig) -> Result<(), StageError> {
        self.record(StageCall::Create(*config));
        Ok(())
    }

    fn apply_configuration(&mut self, config: &StageConfig) -> Result<(), StageError> {
        self.record(StageCall::Apply(*config));
        if self.reject_apply {
            return Err(StageError::Rejected("format not supported".to_string()));
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn run(&mut self) -> Result<(), StageError> {
        self.record(StageCall::Run);
        self.running = true;
        Ok(())
    }

    fn request_stop(&mut self) -> Result<StopAck, StageError> {
        self.record(StageCall::RequestStop);
        let (tx, rx) = oneshot::channel();
        if self.stuck_on_stop {
            self.held_acks.push(tx);
        } else {
            self.running = false;
            let _ = tx.send(());
        }
        Ok(rx)
    }

    fn pause(&mut self) -> Result<(), StageError> {
        if !self.pausable {
            return Err(StageError::Unsupported("pause"));
        }
        self.record(StageCall::Pause);
        Ok(())
    }

    fn resume(&mut self) -> Result<(), StageError> {
        if !self.pausable {
            return Err(StageError::Unsupported("resume"));
        }
        self.record(StageCall::Resume);
        Ok(())
    }

    fn set_band_gain(&mut self, band: usize, gain_db: i32) -> Result<(), StageError> {
        self.record(StageCall::SetBandGain(band, gain_db));
        Ok(())
    }

    fn release_resources(&mut self) {
        self.record(StageCall::Release);
        self.running = false;
    }
}

/// What the probe stage reports once it runs
#[derive(Debug, Clone)]
pub enum ProbeScript {
    /// Queue these events, then close the queue
    Events(Vec<StageEvent>),
    /// Report nothing and keep the queue open
    Silent,
}

/// Stream backend whose probe outcome is scripted by the test
pub struct FakeBackend {
    log: CallLog,
    script: ProbeScript,
    fail_open: bool,
    silent_probes: Vec<mpsc::UnboundedSender<StageEvent>>,
    /// Sender for the most recently opened streaming stage
    pub stream_events: Arc<Mutex<Option<mpsc::UnboundedSender<StageEvent>>>>,
    /// Formats the streaming stages were opened with, per URI
    pub opened_streams: Arc<Mutex<Vec<(String, AudioFormat)>>>,
}

impl FakeBackend {
    pub fn new(log: &CallLog, script: ProbeScript) -> Self {
        Self {
            log: log.clone(),
            script,
            fail_open: false,
            silent_probes: Vec::new(),
            stream_events: Arc::new(Mutex::new(None)),
            opened_streams: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn discovering(log: &CallLog, format: AudioFormat) -> Self {
        Self::new(
            log,
            ProbeScript::Events(vec![
                StageEvent::Started,
                StageEvent::FormatDiscovered(format),
            ]),
        )
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }
}

impl StreamBackend for FakeBackend {
    fn open_probe(&mut self, _uri: &str) -> Result<StageHandle, StageError> {
        if self.fail_open {
            return Err(StageError::Native(anyhow::anyhow!("connection refused")));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        match &self.script {
            ProbeScript::Events(events) => {
                for event in events {
                    let _ = tx.send(event.clone());
                }
            }
            ProbeScript::Silent => self.silent_probes.push(tx),
        }

        Ok(StageHandle {
            stage: FakeStage::boxed("probe", &self.log),
            events: rx,
        })
    }

    fn open_stream(&mut self, uri: &str, format: &AudioFormat) -> Result<StageHandle, StageError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.stream_events.lock().unwrap() = Some(tx);
        self.opened_streams
            .lock()
            .unwrap()
            .push((uri.to_string(), *format));

        Ok(StageHandle {
            stage: FakeStage::boxed("stream", &self.log),
            events: rx,
        })
    }
}
