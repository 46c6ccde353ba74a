use std::sync::atomic::AtomicBool;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use crate::config::Config;
use crate::dispatch::{IntentDispatcher, UserContext};
use crate::engine::manager::SpeechEngineManager;
use crate::engine::{EngineEvent, RecognitionBackend, TranscriptFragment};
use crate::feedback::FeedbackCue;
use crate::identity::IdentityResolver;
use crate::output::IntentSink;
use crate::session::endpointer::{FragmentDisposition, SilenceEndpointer};
use crate::session::machine::{ActivationSource, SessionMode, SessionStateMachine};
use crate::transcription::clean_transcript;
use crate::wake::WakeWordSet;

const ENGINE_EVENT_CAPACITY: usize = 64;
const CONTROL_CAPACITY: usize = 8;

/// Control surface of the driver task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionControl {
    /// Explicit user activation, no wake word needed.
    Trigger,
    /// Explicit cancellation of the current listening session.
    Cancel,
    Shutdown,
}

/// Channels the rest of the daemon uses to reach a running driver.
#[derive(Clone)]
pub struct SessionHandles {
    pub control_tx: mpsc::Sender<SessionControl>,
    pub mode_rx: watch::Receiver<SessionMode>,
}

/// The session driver task: sole owner of the state machine, the
/// endpointer and the engine manager. All session work funnels through one
/// `select!` loop, so the current SessionMode is consulted on every event
/// and stale engine callbacks or timers can never race the session.
pub struct SessionDriver {
    machine: SessionStateMachine,
    endpointer: SilenceEndpointer,
    manager: SpeechEngineManager,
    wake: WakeWordSet,
    wake_enabled: bool,
    finalize_interim: bool,
    dispatcher: IntentDispatcher,
    identity: IdentityResolver,
    sink: IntentSink,
    cues: Sender<FeedbackCue>,
    user: UserContext,
    events_rx: mpsc::Receiver<EngineEvent>,
    control_rx: mpsc::Receiver<SessionControl>,
    /// Whether the latest pending update came from an engine-final result.
    last_was_final: bool,
}

impl SessionDriver {
    pub fn new(
        config: &Config,
        backend: Box<dyn RecognitionBackend>,
        sink: IntentSink,
        cues: Sender<FeedbackCue>,
        engine_unavailable: Arc<AtomicBool>,
    ) -> Result<(Self, SessionHandles)> {
        let (events_tx, events_rx) = mpsc::channel(ENGINE_EVENT_CAPACITY);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let (mode_tx, mode_rx) = watch::channel(SessionMode::Idle);

        let machine = SessionStateMachine::new(mode_tx, cues.clone());
        let endpointer = SilenceEndpointer::new(
            Duration::from_millis(config.session.silence_ms),
            config.session.min_command_chars,
        );
        let manager = SpeechEngineManager::new(
            backend,
            events_tx,
            Duration::from_millis(config.engine.restart_delay_ms),
            engine_unavailable,
        );
        let dispatcher = IntentDispatcher::new(
            config.dispatch.endpoint.clone(),
            Duration::from_secs(config.dispatch.timeout_seconds),
        )?;
        let identity = IdentityResolver::new(
            config.identity.resolver_url.clone(),
            Duration::from_secs(config.identity.timeout_seconds),
            config.identity.enabled,
        )?;

        let driver = Self {
            machine,
            endpointer,
            manager,
            wake: WakeWordSet::new(&config.wake.phrases),
            wake_enabled: config.wake.enabled,
            finalize_interim: config.session.finalize_interim,
            dispatcher,
            identity,
            sink,
            cues,
            user: UserContext {
                address: config.dispatch.user_address.clone(),
            },
            events_rx,
            control_rx,
            last_was_final: false,
        };
        let handles = SessionHandles {
            control_tx,
            mode_rx,
        };
        Ok((driver, handles))
    }

    pub async fn run(mut self) {
        info!("Session driver started");
        self.manager.start();

        loop {
            let silence_deadline = self.endpointer.deadline();
            let restart_deadline = self.manager.restart_deadline();

            tokio::select! {
                event = self.events_rx.recv() => match event {
                    Some(event) => self.on_engine_event(event).await,
                    None => break,
                },
                control = self.control_rx.recv() => match control {
                    Some(SessionControl::Trigger) => self.on_trigger(),
                    Some(SessionControl::Cancel) => self.on_cancel(),
                    Some(SessionControl::Shutdown) | None => break,
                },
                _ = sleep_until(silence_deadline.unwrap_or_else(Instant::now)),
                    if silence_deadline.is_some() =>
                {
                    self.on_silence_elapsed().await;
                }
                _ = sleep_until(restart_deadline.unwrap_or_else(Instant::now)),
                    if restart_deadline.is_some() =>
                {
                    self.manager.on_restart_due(self.machine.mode());
                }
            }
        }

        self.manager.stop();
        info!("Session driver stopped");
    }

    async fn on_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Fragment(fragment) => self.on_fragment(fragment).await,
            EngineEvent::Ended => self.manager.on_session_ended(self.machine.mode()),
            EngineEvent::Error(err) => {
                if self.manager.on_engine_error(&err) {
                    let _ = self.cues.send(FeedbackCue::EngineFailed(
                        "Microphone unavailable. Voice activation is disabled.".to_string(),
                    ));
                }
            }
        }
    }

    async fn on_fragment(&mut self, fragment: TranscriptFragment) {
        let raw = clean_transcript(&fragment.text);
        let normalized = self.wake.strip(&raw);

        match self.machine.mode() {
            SessionMode::Idle => {
                if self.wake_enabled
                    && self.wake.matches(&raw)
                    && self.machine.activate(ActivationSource::WakeWord)
                {
                    self.begin_listening();
                    // The waking fragment may already carry command text.
                    self.accept_fragment(&raw, &normalized, fragment.is_final)
                        .await;
                }
            }
            SessionMode::Listening => {
                self.accept_fragment(&raw, &normalized, fragment.is_final)
                    .await;
            }
            SessionMode::Processing => {
                debug!("Fragment dropped while processing: '{}'", raw);
            }
        }
    }

    async fn accept_fragment(&mut self, raw: &str, normalized: &str, is_final: bool) {
        match self.endpointer.observe(normalized, is_final) {
            FragmentDisposition::Noise => {}
            FragmentDisposition::Armed => {
                self.machine.update_pending(raw, normalized);
                self.last_was_final = false;
            }
            FragmentDisposition::FinalizeNow => {
                self.machine.update_pending(raw, normalized);
                self.last_was_final = true;
                self.finalize_and_dispatch().await;
            }
        }
    }

    fn on_trigger(&mut self) {
        if self.machine.activate(ActivationSource::Manual) {
            self.begin_listening();
        }
    }

    fn on_cancel(&mut self) {
        if self.machine.cancel() {
            self.endpointer.clear();
        }
    }

    fn begin_listening(&mut self) {
        // Arm immediately so a session that never hears anything cancels.
        self.endpointer.arm();
        self.last_was_final = false;
    }

    async fn on_silence_elapsed(&mut self) {
        self.endpointer.clear();
        if self.machine.mode() != SessionMode::Listening {
            return;
        }
        let qualifying = self
            .machine
            .pending_text()
            .map(|t| self.endpointer.qualifies(t))
            .unwrap_or(false);
        let usable = qualifying && (self.finalize_interim || self.last_was_final);

        if usable {
            self.finalize_and_dispatch().await;
        } else {
            info!("Silence with no qualifying command, cancelling session");
            self.machine.cancel();
        }
    }

    /// Exactly one dispatch per pending command: the Listening->Processing
    /// edge is the gate, so a fast-path finalize followed by a timer expiry
    /// can never submit twice.
    async fn finalize_and_dispatch(&mut self) {
        self.endpointer.clear();
        let Some(text) = self.machine.begin_processing() else {
            return;
        };

        // Recognition pauses for the backend round-trip so a restarted
        // engine cannot re-submit the same utterance.
        self.manager.stop();

        let mut intent = self.dispatcher.dispatch(&text, &self.user).await;
        self.identity.enrich(&mut intent).await;
        self.sink.deliver(&intent);

        self.machine.complete(&intent);
        self.manager.start();
    }
}
