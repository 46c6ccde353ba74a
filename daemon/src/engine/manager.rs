use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{EngineError, EngineEvent, EngineSession, RecognitionBackend};
use crate::session::machine::SessionMode;

/// Supervises the single recognition session: idempotent start/stop, a
/// delayed restart when the session dies unexpectedly (never while the
/// session mode is Processing), and permanent unavailability once the
/// backend reports a fatal error.
///
/// Restarts are modeled as an explicit deadline the session driver polls,
/// not an inline retry, so the driver's select loop stays the only place
/// where time passes.
pub struct SpeechEngineManager {
    backend: Box<dyn RecognitionBackend>,
    events_tx: mpsc::Sender<EngineEvent>,
    session: Option<EngineSession>,
    /// True while transcription is wanted, independent of whether a
    /// session is currently alive.
    desired: bool,
    /// Stop requests whose `Ended` acknowledgment has not arrived yet.
    /// Their eventual `Ended` events are stale and must not touch the
    /// current session or trigger a restart.
    pending_stops: u32,
    unavailable: Arc<AtomicBool>,
    restart_delay: Duration,
    restart_at: Option<Instant>,
}

impl SpeechEngineManager {
    pub fn new(
        backend: Box<dyn RecognitionBackend>,
        events_tx: mpsc::Sender<EngineEvent>,
        restart_delay: Duration,
        unavailable: Arc<AtomicBool>,
    ) -> Self {
        Self {
            backend,
            events_tx,
            session: None,
            desired: false,
            pending_stops: 0,
            unavailable,
            restart_delay,
            restart_at: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }

    /// Idempotent: a second start while a session is alive is a no-op.
    pub fn start(&mut self) {
        self.desired = true;
        self.spawn_session();
    }

    /// Idempotent; also cancels any scheduled restart so an intentional
    /// stop stays stopped.
    pub fn stop(&mut self) {
        self.desired = false;
        self.restart_at = None;
        if let Some(session) = self.session.take() {
            session.stop();
            self.pending_stops += 1;
            info!("Recognition session stop requested");
        }
    }

    /// The backend reported `Ended`. Schedule a restart unless the stop was
    /// ours, the engine is gone for good, or the session is mid-dispatch.
    pub fn on_session_ended(&mut self, mode: SessionMode) {
        if self.pending_stops > 0 {
            // Acknowledgment of a deliberate stop, possibly arriving after
            // a newer session already started. Leave that session alone.
            self.pending_stops -= 1;
            debug!("Recognition session ended after stop");
            return;
        }
        self.session = None;
        if !self.desired {
            return;
        }
        if !self.is_available() {
            return;
        }
        if mode == SessionMode::Processing {
            debug!("Recognition ended during processing, restart deferred");
            return;
        }
        warn!(
            "Recognition session ended unexpectedly, restarting in {:?}",
            self.restart_delay
        );
        self.restart_at = Some(Instant::now() + self.restart_delay);
    }

    /// The backend reported an error. Transient errors are absorbed (the
    /// following `Ended` drives the restart); fatal ones retire the engine
    /// for the rest of the process. Returns true on the first fatal error
    /// so the caller can surface it exactly once.
    pub fn on_engine_error(&mut self, err: &EngineError) -> bool {
        if !err.is_fatal() {
            warn!("Transient recognition error absorbed: {}", err);
            return false;
        }
        let first = !self.unavailable.swap(true, Ordering::SeqCst);
        if first {
            error!("Fatal recognition error, engine disabled: {}", err);
        }
        self.restart_at = None;
        if let Some(session) = self.session.take() {
            session.stop();
            session.abort();
        }
        first
    }

    /// Deadline for the driver's select loop; None when nothing is pending.
    pub fn restart_deadline(&self) -> Option<Instant> {
        self.restart_at
    }

    /// The restart deadline elapsed. The guard conditions are re-checked
    /// here because the world may have moved on during the delay.
    pub fn on_restart_due(&mut self, mode: SessionMode) {
        self.restart_at = None;
        if !self.desired || mode == SessionMode::Processing {
            return;
        }
        self.spawn_session();
    }

    fn spawn_session(&mut self) {
        if self.session.is_some() || !self.is_available() {
            return;
        }
        match self.backend.spawn(self.events_tx.clone()) {
            Ok(session) => {
                info!("Recognition session started");
                self.session = Some(session);
            }
            Err(e) if e.is_fatal() => {
                // Routed through the event channel so the driver's error
                // handler retires the engine and surfaces the notice once.
                let _ = self.events_tx.try_send(EngineEvent::Error(e));
            }
            Err(e) => {
                warn!("Recognition spawn failed, retrying in {:?}: {}", self.restart_delay, e);
                self.restart_at = Some(Instant::now() + self.restart_delay);
            }
        }
    }
}
