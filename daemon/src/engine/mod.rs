pub mod manager;

use std::time::Instant;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// One partial or final transcription update for the current utterance.
/// Only the most recent fragment is current input; earlier fragments are
/// discarded, never concatenated.
#[derive(Debug, Clone)]
pub struct TranscriptFragment {
    pub text: String,
    pub is_final: bool,
    pub captured_at: Instant,
}

impl TranscriptFragment {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            captured_at: Instant::now(),
        }
    }

    pub fn final_result(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            captured_at: Instant::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// No capture device, or permission to use it was denied. Fatal: the
    /// engine is done for this process.
    #[error("audio capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// The recognition model could not be provisioned or loaded. Fatal.
    #[error("recognition model unavailable: {0}")]
    ModelUnavailable(String),

    /// Anything the engine can recover from by restarting the session.
    #[error("transient recognition failure: {0}")]
    Transient(String),
}

impl EngineError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, EngineError::Transient(_))
    }
}

/// Events flowing from a recognition session to the session driver.
#[derive(Debug)]
pub enum EngineEvent {
    Fragment(TranscriptFragment),
    /// The underlying session terminated, expectedly or not.
    Ended,
    Error(EngineError),
}

/// One live recognition session. Dropping the handle does not stop the
/// task; `stop()` asks it to wind down, after which it sends `Ended`.
pub struct EngineSession {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl EngineSession {
    pub fn new(stop_tx: watch::Sender<bool>, task: JoinHandle<()>) -> Self {
        Self { stop_tx, task }
    }

    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Seam between the engine manager and an actual transcription
/// implementation. The production backend captures microphone audio and
/// runs whisper; tests script fragment sequences.
pub trait RecognitionBackend: Send {
    /// Begin one continuous, interim-result-enabled recognition session.
    /// Fragments and lifecycle events flow through `events`; the session
    /// ends with a single `EngineEvent::Ended`.
    fn spawn(&mut self, events: mpsc::Sender<EngineEvent>) -> Result<EngineSession, EngineError>;
}
