use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use shared::ipc::StatusInfo;
use shared::Intent;

use crate::config::Config;
use crate::engine::RecognitionBackend;
use crate::feedback::{FeedbackEmitter, FeedbackHandle};
use crate::output::IntentSink;
use crate::session::driver::{SessionControl, SessionDriver, SessionHandles};
use crate::session::machine::SessionMode;
use crate::transcription::recognizer::WhisperRecognizer;

/// Owns the long-lived daemon pieces and the running session pipeline.
pub struct DaemonState {
    pub config: Config,
    sink: IntentSink,
    feedback: FeedbackHandle,
    engine_unavailable: Arc<AtomicBool>,
    handles: Option<SessionHandles>,
    driver_task: Option<JoinHandle<()>>,
}

impl DaemonState {
    pub fn new(config: Config) -> Self {
        let sink = IntentSink::new(config.output.intent_log.clone());
        let feedback = FeedbackEmitter::spawn(config.feedback.enabled, config.feedback.volume);
        Self {
            config,
            sink,
            feedback,
            engine_unavailable: Arc::new(AtomicBool::new(false)),
            handles: None,
            driver_task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.driver_task
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    /// Start the session pipeline with the production recognizer.
    pub fn start_session(&mut self) -> anyhow::Result<()> {
        let backend = Box::new(WhisperRecognizer::new(self.config.engine.clone()));
        self.start_session_with(backend)
    }

    /// Same, with an injected backend. This is the seam the integration
    /// tests script fragment sequences through.
    pub fn start_session_with(
        &mut self,
        backend: Box<dyn RecognitionBackend>,
    ) -> anyhow::Result<()> {
        if self.is_running() {
            warn!("Session pipeline already running");
            return Ok(());
        }
        let (driver, handles) = SessionDriver::new(
            &self.config,
            backend,
            self.sink.clone(),
            self.feedback.sender(),
            Arc::clone(&self.engine_unavailable),
        )?;
        self.handles = Some(handles);
        self.driver_task = Some(tokio::spawn(driver.run()));
        info!("Session pipeline started");
        Ok(())
    }

    pub async fn stop_session(&mut self) {
        if let Some(handles) = self.handles.take() {
            let _ = handles.control_tx.send(SessionControl::Shutdown).await;
        }
        if let Some(task) = self.driver_task.take() {
            let _ = task.await;
            info!("Session pipeline stopped");
        }
    }

    /// Explicit user activation, the microphone-button path.
    pub async fn trigger(&self) -> bool {
        match &self.handles {
            Some(handles) => handles
                .control_tx
                .send(SessionControl::Trigger)
                .await
                .is_ok(),
            None => false,
        }
    }

    pub async fn cancel(&self) -> bool {
        match &self.handles {
            Some(handles) => handles
                .control_tx
                .send(SessionControl::Cancel)
                .await
                .is_ok(),
            None => false,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.handles
            .as_ref()
            .map(|h| *h.mode_rx.borrow())
            .unwrap_or(SessionMode::Idle)
    }

    pub fn status(&self) -> StatusInfo {
        StatusInfo {
            is_running: self.is_running(),
            mode: self.mode().to_string(),
            engine_available: !self.engine_unavailable.load(Ordering::SeqCst),
        }
    }

    pub fn last_intent(&self) -> Option<Intent> {
        self.sink.last_intent()
    }

    pub fn subscribe_intents(&self) -> broadcast::Receiver<Intent> {
        self.sink.subscribe()
    }
}
