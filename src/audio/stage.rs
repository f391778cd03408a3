// Native stage boundary
//
// Everything below this trait (resampling math, equalizer DSP, decoding,
// I2S and HTTP I/O) lives in the vendor audio library. The core only
// creates, configures, runs, stops and queries stages through it.

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use super::errors::StageError;
use super::types::{AudioFormat, StageConfig};

/// Resolves once the native stage has quiesced after `request_stop`
pub type StopAck = oneshot::Receiver<()>;

/// Lifecycle/status events emitted by a native stage's worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    Started,
    Stopped,
    FormatDiscovered(AudioFormat),
    StreamError(String),
    Finished,
}

/// Opaque handle onto one vendor audio-processing unit
pub trait NativeStage: Send {
    /// Allocate the native stage with its initial configuration
    fn create_resources(&mut self, config: &StageConfig) -> Result<(), StageError>;

    /// Reconfigure an already-created stage; the stage must not be running
    fn apply_configuration(&mut self, config: &StageConfig) -> Result<(), StageError>;

    /// Whether the native worker is actively moving data
    fn is_running(&self) -> bool;

    fn run(&mut self) -> Result<(), StageError>;

    /// Ask the worker to stop. The returned receiver fires when it has.
    fn request_stop(&mut self) -> Result<StopAck, StageError>;

    fn pause(&mut self) -> Result<(), StageError> {
        Err(StageError::Unsupported("pause"))
    }

    fn resume(&mut self) -> Result<(), StageError> {
        Err(StageError::Unsupported("resume"))
    }

    /// Live parameter update for equalizer stages
    fn set_band_gain(&mut self, _band: usize, _gain_db: i32) -> Result<(), StageError> {
        Err(StageError::Unsupported("set_band_gain"))
    }

    /// Free native memory. Must be idempotent.
    fn release_resources(&mut self);
}

/// A stage together with the event queue its worker publishes on
pub struct StageHandle {
    pub stage: Box<dyn NativeStage>,
    pub events: mpsc::UnboundedReceiver<StageEvent>,
}

/// Factory for the sub-pipelines a stream source drives
pub trait StreamBackend: Send {
    /// Lightweight reader + decoder used only to discover the stream format
    fn open_probe(&mut self, uri: &str) -> Result<StageHandle, StageError>;

    /// Real-time reader + decoder configured for the discovered format
    fn open_stream(&mut self, uri: &str, format: &AudioFormat) -> Result<StageHandle, StageError>;
}

/// Outcome of a bounded stop-and-wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopWait {
    Acknowledged,
    TimedOut,
}

/// Request stop and wait at most `timeout` for the worker to acknowledge.
///
/// A dropped acknowledgement sender means the worker is gone, which counts
/// as stopped.
pub async fn stop_and_wait(
    stage: &mut dyn NativeStage,
    timeout: Duration,
) -> Result<StopWait, StageError> {
    let ack = stage.request_stop()?;

    match tokio::time::timeout(timeout, ack).await {
        Ok(Ok(())) => Ok(StopWait::Acknowledged),
        Ok(Err(_)) => {
            warn!("⚠️ NATIVE_STAGE: stop acknowledgement channel closed, treating stage as stopped");
            Ok(StopWait::Acknowledged)
        }
        Err(_) => Ok(StopWait::TimedOut),
    }
}
