// Shared helpers for uniagentd integration tests: a hand-driven
// recognition backend and polling utilities.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use uniagentd::config::Config;
use uniagentd::engine::{
    EngineError, EngineEvent, EngineSession, RecognitionBackend, TranscriptFragment,
};

/// Shared side of the scripted backend: tests push events through the
/// sender the most recent session handed out.
pub struct ScriptedShared {
    events_tx: Mutex<Option<mpsc::Sender<EngineEvent>>>,
    spawn_count: AtomicUsize,
}

impl ScriptedShared {
    pub fn spawn_count(&self) -> usize {
        self.spawn_count.load(Ordering::SeqCst)
    }

    pub async fn send_interim(&self, text: &str) {
        self.send(EngineEvent::Fragment(TranscriptFragment::interim(text)))
            .await;
    }

    pub async fn send_final(&self, text: &str) {
        self.send(EngineEvent::Fragment(TranscriptFragment::final_result(
            text,
        )))
        .await;
    }

    pub async fn send_ended(&self) {
        self.send(EngineEvent::Ended).await;
    }

    pub async fn send_error(&self, err: EngineError) {
        self.send(EngineEvent::Error(err)).await;
    }

    async fn send(&self, event: EngineEvent) {
        let tx = self.events_tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }
}

/// Recognition backend driven by the test instead of a microphone.
pub struct ScriptedBackend {
    shared: Arc<ScriptedShared>,
}

impl ScriptedBackend {
    pub fn new() -> (Self, Arc<ScriptedShared>) {
        let shared = Arc::new(ScriptedShared {
            events_tx: Mutex::new(None),
            spawn_count: AtomicUsize::new(0),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            shared,
        )
    }
}

impl RecognitionBackend for ScriptedBackend {
    fn spawn(&mut self, events: mpsc::Sender<EngineEvent>) -> Result<EngineSession, EngineError> {
        self.shared.spawn_count.fetch_add(1, Ordering::SeqCst);
        *self.shared.events_tx.lock().unwrap() = Some(events);

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let _ = stop_rx.changed().await;
        });
        Ok(EngineSession::new(stop_tx, task))
    }
}

/// Test config: fast timers, no audio, no identity calls, dispatch aimed
/// at `endpoint`.
pub fn test_config(endpoint: &str) -> Config {
    let mut config = Config::default();
    config.feedback.enabled = false;
    config.identity.enabled = false;
    config.session.silence_ms = 200;
    config.engine.restart_delay_ms = 40;
    config.dispatch.endpoint = endpoint.to_string();
    config.dispatch.timeout_seconds = 1;
    config
}

/// Poll `predicate` every 10 ms until it holds or `timeout_ms` elapsed.
pub async fn wait_until<F: Fn() -> bool>(predicate: F, timeout_ms: u64) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    predicate()
}
