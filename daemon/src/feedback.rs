use std::io::Cursor;
use std::process::Command;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

/// Cue emitted on each session transition edge. Exactly one cue per edge.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackCue {
    /// Idle -> Listening.
    Activated,
    /// Listening -> Processing.
    Finalized,
    /// Processing -> Idle; carries the spoken acknowledgement text.
    Completed(String),
    /// Listening -> Idle.
    Cancelled,
    /// One-time notice that the recognition engine is gone for good.
    EngineFailed(String),
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum ToneKind {
    Wake,
    Success,
}

/// Pitch/duration envelope for a tone cue: two sine segments per variant.
fn tone_pair(kind: ToneKind) -> [(f32, u64); 2] {
    match kind {
        ToneKind::Wake => [(660.0, 90), (990.0, 140)],
        ToneKind::Success => [(990.0, 90), (660.0, 140)],
    }
}

/// Which tone, if any, a cue triggers. The cancel edge reuses the wake
/// envelope at half pitch instead of introducing a third variant.
fn tone_for(cue: &FeedbackCue) -> Option<(ToneKind, f32)> {
    match cue {
        FeedbackCue::Activated => Some((ToneKind::Wake, 1.0)),
        FeedbackCue::Finalized => Some((ToneKind::Success, 1.0)),
        FeedbackCue::Cancelled => Some((ToneKind::Wake, 0.5)),
        FeedbackCue::Completed(_) | FeedbackCue::EngineFailed(_) => None,
    }
}

fn speech_for(cue: &FeedbackCue) -> Option<&str> {
    match cue {
        FeedbackCue::Completed(text) | FeedbackCue::EngineFailed(text) => Some(text),
        _ => None,
    }
}

/// Cloneable, non-blocking handle used by the session side to emit cues.
#[derive(Clone)]
pub struct FeedbackHandle {
    tx: Sender<FeedbackCue>,
}

impl FeedbackHandle {
    /// Fire-and-forget: a dead audio thread just drops the cue.
    pub fn emit(&self, cue: FeedbackCue) {
        let _ = self.tx.send(cue);
    }

    pub fn sender(&self) -> Sender<FeedbackCue> {
        self.tx.clone()
    }
}

impl From<Sender<FeedbackCue>> for FeedbackHandle {
    fn from(tx: Sender<FeedbackCue>) -> Self {
        Self { tx }
    }
}

pub struct FeedbackEmitter;

impl FeedbackEmitter {
    /// Spawn the audio thread and return the cue handle. With `enabled`
    /// false, or when no output device exists, the thread still drains cues
    /// so the session side never notices.
    pub fn spawn(enabled: bool, volume: f32) -> FeedbackHandle {
        let (tx, rx) = channel();
        let spawned = thread::Builder::new()
            .name("feedback-audio".to_string())
            .spawn(move || audio_loop(rx, enabled, volume));
        if let Err(e) = spawned {
            warn!("Failed to spawn feedback thread: {}", e);
        }
        FeedbackHandle { tx }
    }
}

fn audio_loop(rx: Receiver<FeedbackCue>, enabled: bool, volume: f32) {
    // The output stream must live on this thread for as long as we play.
    let output = if enabled {
        match rodio::OutputStream::try_default() {
            Ok(pair) => Some(pair),
            Err(e) => {
                warn!("No audio output device, feedback disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    let mut speech: Option<rodio::Sink> = None;

    while let Ok(cue) = rx.recv() {
        debug!("Feedback cue: {:?}", cue);
        let Some((_stream, handle)) = output.as_ref() else {
            continue;
        };

        if let Some((kind, pitch)) = tone_for(&cue) {
            play_tone(handle, kind, pitch, volume);
        }
        if let Some(text) = speech_for(&cue) {
            speak(handle, &mut speech, text, volume);
        }
    }
}

fn play_tone(handle: &rodio::OutputStreamHandle, kind: ToneKind, pitch: f32, volume: f32) {
    use rodio::source::{SineWave, Source};

    match rodio::Sink::try_new(handle) {
        Ok(sink) => {
            for (hz, ms) in tone_pair(kind) {
                let segment = SineWave::new(hz * pitch)
                    .take_duration(Duration::from_millis(ms))
                    .amplify(0.25 * volume);
                sink.append(segment);
            }
            sink.detach();
        }
        Err(e) => warn!("Tone playback failed: {}", e),
    }
}

fn speak(
    handle: &rodio::OutputStreamHandle,
    speech: &mut Option<rodio::Sink>,
    text: &str,
    volume: f32,
) {
    use rodio::Source;

    // A new acknowledgement always cancels the one still playing.
    if let Some(previous) = speech.take() {
        previous.stop();
    }

    let output = Command::new("espeak-ng").arg("--stdout").arg(text).output();
    let wav = match output {
        Ok(out) if out.status.success() => out.stdout,
        Ok(out) => {
            warn!(
                "espeak-ng failed: {}",
                String::from_utf8_lossy(&out.stderr)
            );
            return;
        }
        Err(e) => {
            warn!("Failed to run espeak-ng: {}", e);
            return;
        }
    };

    let sink = match rodio::Sink::try_new(handle) {
        Ok(sink) => sink,
        Err(e) => {
            warn!("Speech playback failed: {}", e);
            return;
        }
    };
    match rodio::Decoder::new(Cursor::new(wav)) {
        Ok(source) => {
            sink.set_volume(volume);
            sink.append(source.convert_samples::<f32>());
            *speech = Some(sink);
        }
        Err(e) => warn!("Failed to decode synthesized speech: {}", e),
    }
}
