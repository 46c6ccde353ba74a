use std::sync::mpsc::Sender;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::feedback::FeedbackCue;
use shared::Intent;

/// Session mode. Exactly one value at any time, owned by the state machine;
/// everyone else reads the watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    #[default]
    Idle,
    Listening,
    Processing,
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionMode::Idle => write!(f, "idle"),
            SessionMode::Listening => write!(f, "listening"),
            SessionMode::Processing => write!(f, "processing"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationSource {
    WakeWord,
    Manual,
}

/// The utterance being collected while the session is not Idle.
/// Fragments replace the text; they are never concatenated.
#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub raw_text: String,
    pub normalized_text: String,
    pub started_at: Instant,
}

impl PendingCommand {
    fn new() -> Self {
        Self {
            raw_text: String::new(),
            normalized_text: String::new(),
            started_at: Instant::now(),
        }
    }
}

/// Single-writer session state machine.
///
/// Legal edges: Idle -> Listening -> Processing -> Idle, plus the
/// cancellation edge Listening -> Idle. Every other attempt is a no-op so
/// out-of-order engine callbacks can never corrupt the mode. Each taken
/// edge emits exactly one feedback cue.
pub struct SessionStateMachine {
    mode: SessionMode,
    pending: Option<PendingCommand>,
    mode_tx: watch::Sender<SessionMode>,
    cues: Sender<FeedbackCue>,
}

impl SessionStateMachine {
    pub fn new(mode_tx: watch::Sender<SessionMode>, cues: Sender<FeedbackCue>) -> Self {
        Self {
            mode: SessionMode::Idle,
            pending: None,
            mode_tx,
            cues,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn pending_text(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.normalized_text.as_str())
    }

    /// Idle -> Listening. Clears any previous pending command. Returns false
    /// when the edge is not available from the current mode.
    pub fn activate(&mut self, source: ActivationSource) -> bool {
        if self.mode != SessionMode::Idle {
            debug!("Activation ignored in mode {}", self.mode);
            return false;
        }
        self.pending = Some(PendingCommand::new());
        self.transition(SessionMode::Listening, FeedbackCue::Activated);
        info!("Session activated ({:?})", source);
        true
    }

    /// Replace the pending command text with the latest fragment.
    /// Only meaningful while Listening.
    pub fn update_pending(&mut self, raw: &str, normalized: &str) -> bool {
        if self.mode != SessionMode::Listening {
            return false;
        }
        if let Some(pending) = self.pending.as_mut() {
            pending.raw_text = raw.to_string();
            pending.normalized_text = normalized.to_string();
            return true;
        }
        false
    }

    /// Listening -> Processing. Returns the command text to dispatch, or
    /// None when the edge is not available. The pending command stays alive
    /// until the Processing -> Idle edge.
    pub fn begin_processing(&mut self) -> Option<String> {
        if self.mode != SessionMode::Listening {
            debug!("Finalize ignored in mode {}", self.mode);
            return None;
        }
        let text = self
            .pending
            .as_ref()
            .map(|p| p.normalized_text.clone())
            .unwrap_or_default();
        self.transition(SessionMode::Processing, FeedbackCue::Finalized);
        Some(text)
    }

    /// Processing -> Idle. Always taken once dispatch resolved, fallback or
    /// not, so the session can never wedge in Processing.
    pub fn complete(&mut self, intent: &Intent) -> bool {
        if self.mode != SessionMode::Processing {
            debug!("Completion ignored in mode {}", self.mode);
            return false;
        }
        self.pending = None;
        self.transition(
            SessionMode::Idle,
            FeedbackCue::Completed(intent.summary()),
        );
        true
    }

    /// Listening -> Idle: explicit cancel, or silence with no qualifying
    /// command text.
    pub fn cancel(&mut self) -> bool {
        if self.mode != SessionMode::Listening {
            debug!("Cancel ignored in mode {}", self.mode);
            return false;
        }
        self.pending = None;
        self.transition(SessionMode::Idle, FeedbackCue::Cancelled);
        true
    }

    fn transition(&mut self, to: SessionMode, cue: FeedbackCue) {
        info!(from = %self.mode, to = %to, "session transition");
        self.mode = to;
        let _ = self.mode_tx.send(to);
        let _ = self.cues.send(cue);
    }
}
