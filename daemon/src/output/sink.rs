use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use shared::Intent;

/// Hands finalized intents to the outside world: an in-process broadcast
/// for embedders, the retained last intent for the CLI, and an optional
/// JSON-lines log tailed by the presentation layer.
#[derive(Clone)]
pub struct IntentSink {
    tx: broadcast::Sender<Intent>,
    last: Arc<Mutex<Option<Intent>>>,
    log_path: Option<PathBuf>,
}

impl IntentSink {
    pub fn new(log_path: Option<PathBuf>) -> Self {
        let (tx, _rx) = broadcast::channel(16);
        Self {
            tx,
            last: Arc::new(Mutex::new(None)),
            log_path,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Intent> {
        self.tx.subscribe()
    }

    pub fn last_intent(&self) -> Option<Intent> {
        self.last.lock().unwrap().clone()
    }

    /// Delivery is best-effort on every channel; a full broadcast buffer or
    /// an unwritable log never reaches the session.
    pub fn deliver(&self, intent: &Intent) {
        debug!("Delivering intent: {}", intent);
        *self.last.lock().unwrap() = Some(intent.clone());
        let _ = self.tx.send(intent.clone());

        if let Some(path) = &self.log_path {
            if let Err(e) = append_jsonl(path, intent) {
                warn!("Failed to append intent log {}: {}", path.display(), e);
            }
        }
    }
}

fn append_jsonl(path: &PathBuf, intent: &Intent) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let line = serde_json::to_string(intent)?;
    writeln!(file, "{}", line)?;
    Ok(())
}
