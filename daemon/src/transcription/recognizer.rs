use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::AudioCapture;
use crate::config::EngineConfig;
use crate::engine::{
    EngineError, EngineEvent, EngineSession, RecognitionBackend, TranscriptFragment,
};
use crate::transcription::model;

const AUDIO_CHANNEL_CAPACITY: usize = 100;

/// Production recognition backend: microphone capture gated by an RMS
/// energy tracker, whisper transcription of the accumulated utterance for
/// interim results, and an engine-final result once silence outlasts the
/// confirmation window. The loaded model is cached across session restarts.
pub struct WhisperRecognizer {
    config: EngineConfig,
    context: Arc<Mutex<Option<Arc<WhisperContext>>>>,
}

impl WhisperRecognizer {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            context: Arc::new(Mutex::new(None)),
        }
    }
}

impl RecognitionBackend for WhisperRecognizer {
    fn spawn(&mut self, events: mpsc::Sender<EngineEvent>) -> Result<EngineSession, EngineError> {
        // Microphone problems are the permission/initialization class:
        // fatal, detected before the task even starts.
        let mut capture = AudioCapture::new(self.config.sample_rate)
            .map_err(|e| EngineError::CaptureUnavailable(e.to_string()))?;
        let (audio_tx, audio_rx) = broadcast::channel(AUDIO_CHANNEL_CAPACITY);
        capture
            .start(audio_tx)
            .map_err(|e| EngineError::CaptureUnavailable(e.to_string()))?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let config = self.config.clone();
        let context_slot = Arc::clone(&self.context);
        let task = tokio::spawn(async move {
            run_session(capture, audio_rx, events, stop_rx, config, context_slot).await;
        });

        Ok(EngineSession::new(stop_tx, task))
    }
}

async fn run_session(
    mut capture: AudioCapture,
    mut audio_rx: broadcast::Receiver<Vec<f32>>,
    events: mpsc::Sender<EngineEvent>,
    mut stop_rx: watch::Receiver<bool>,
    config: EngineConfig,
    context_slot: Arc<Mutex<Option<Arc<WhisperContext>>>>,
) {
    let outcome = session_loop(&mut audio_rx, &events, &mut stop_rx, &config, &context_slot).await;
    capture.stop();
    if let Err(e) = outcome {
        let _ = events.send(EngineEvent::Error(e)).await;
    }
    let _ = events.send(EngineEvent::Ended).await;
}

async fn session_loop(
    audio_rx: &mut broadcast::Receiver<Vec<f32>>,
    events: &mpsc::Sender<EngineEvent>,
    stop_rx: &mut watch::Receiver<bool>,
    config: &EngineConfig,
    context_slot: &Arc<Mutex<Option<Arc<WhisperContext>>>>,
) -> Result<(), EngineError> {
    let context = load_context(config, context_slot).await?;
    let mut state = context
        .create_state()
        .map_err(|e| EngineError::ModelUnavailable(e.to_string()))?;

    let interim_samples =
        (config.interim_interval_ms * config.sample_rate as u64 / 1000) as usize;
    let mut gate = EnergyGate::new(
        config.energy_threshold,
        Duration::from_millis(config.final_silence_ms),
    );
    let mut utterance: Vec<f32> = Vec::new();
    let mut fresh = 0usize;
    let mut last_interim = String::new();

    info!("Recognition session listening");
    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    debug!("Recognition session stopping");
                    return Ok(());
                }
            }
            chunk = audio_rx.recv() => {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Recognizer lagged, dropped {} audio chunks", n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(EngineError::Transient("audio stream closed".to_string()));
                    }
                };

                match gate.observe(rms_level(&chunk)) {
                    GateDecision::Quiet => {}
                    GateDecision::Speech | GateDecision::Trailing => {
                        utterance.extend_from_slice(&chunk);
                        fresh += chunk.len();
                        if fresh >= interim_samples {
                            fresh = 0;
                            if let Some(text) = transcribe(&mut state, &utterance, config)? {
                                if text != last_interim {
                                    last_interim = text.clone();
                                    let _ = events
                                        .send(EngineEvent::Fragment(TranscriptFragment::interim(text)))
                                        .await;
                                }
                            }
                        }
                    }
                    GateDecision::UtteranceEnd => {
                        utterance.extend_from_slice(&chunk);
                        let text = transcribe(&mut state, &utterance, config)?;
                        utterance.clear();
                        fresh = 0;
                        last_interim.clear();
                        if let Some(text) = text {
                            let _ = events
                                .send(EngineEvent::Fragment(TranscriptFragment::final_result(text)))
                                .await;
                        }
                    }
                }
            }
        }
    }
}

async fn load_context(
    config: &EngineConfig,
    slot: &Arc<Mutex<Option<Arc<WhisperContext>>>>,
) -> Result<Arc<WhisperContext>, EngineError> {
    if let Some(ctx) = slot.lock().unwrap().as_ref() {
        return Ok(Arc::clone(ctx));
    }

    let path = model::locate_model(&config.model_url, config.model_path.as_deref())
        .map_err(|e| EngineError::ModelUnavailable(e.to_string()))?;
    model::ensure_model(&path, &config.model_url, config.model_checksum.as_deref())
        .await
        .map_err(|e| EngineError::ModelUnavailable(e.to_string()))?;

    let ctx = WhisperContext::new_with_params(
        &path.to_string_lossy(),
        WhisperContextParameters::default(),
    )
    .map_err(|e| EngineError::ModelUnavailable(e.to_string()))?;

    info!("Whisper model loaded from {:?}", path);
    let ctx = Arc::new(ctx);
    *slot.lock().unwrap() = Some(Arc::clone(&ctx));
    Ok(ctx)
}

fn transcribe(
    state: &mut whisper_rs::WhisperState,
    audio: &[f32],
    config: &EngineConfig,
) -> Result<Option<String>, EngineError> {
    let audio = pad_audio(audio, config.sample_rate as usize);

    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
    params.set_print_special(false);
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);
    params.set_language(Some(&config.language));
    params.set_single_segment(true);
    params.set_n_threads(config.n_thread as i32);

    state
        .full(params, &audio)
        .map_err(|e| EngineError::Transient(format!("transcription failed: {}", e)))?;

    let mut text = String::new();
    for i in 0..state.full_n_segments() {
        if let Some(segment) = state.get_segment(i) {
            if let Ok(s) = segment.to_str() {
                text.push_str(s);
            }
        }
    }
    let trimmed = text.trim().to_string();
    Ok((!trimmed.is_empty()).then_some(trimmed))
}

/// Whisper needs at least a second of audio; pad short windows with
/// trailing silence.
fn pad_audio(audio: &[f32], min_samples: usize) -> Vec<f32> {
    let mut padded = audio.to_vec();
    if padded.len() < min_samples {
        padded.resize(min_samples, 0.0);
    }
    padded
}

fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateDecision {
    /// Quiet, no utterance in progress.
    Quiet,
    /// Speech; the chunk belongs to the utterance.
    Speech,
    /// Post-speech silence still inside the confirmation window.
    Trailing,
    /// Silence outlasted the window: the utterance is complete.
    UtteranceEnd,
}

/// Energy-based utterance tracker deciding when the engine itself should
/// mark a result final.
struct EnergyGate {
    threshold: f32,
    final_silence: Duration,
    speaking: bool,
    silence_since: Option<Instant>,
}

impl EnergyGate {
    fn new(threshold: f32, final_silence: Duration) -> Self {
        Self {
            threshold,
            final_silence,
            speaking: false,
            silence_since: None,
        }
    }

    fn observe(&mut self, level: f32) -> GateDecision {
        if level > self.threshold {
            self.speaking = true;
            self.silence_since = None;
            return GateDecision::Speech;
        }
        if !self.speaking {
            return GateDecision::Quiet;
        }
        let since = *self.silence_since.get_or_insert_with(Instant::now);
        if since.elapsed() >= self.final_silence {
            self.speaking = false;
            self.silence_since = None;
            GateDecision::UtteranceEnd
        } else {
            GateDecision::Trailing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_level() {
        assert_eq!(rms_level(&[]), 0.0);
        assert_eq!(rms_level(&[0.0; 16]), 0.0);
        let level = rms_level(&[0.5; 16]);
        assert!((level - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_pad_audio() {
        assert_eq!(pad_audio(&[0.1; 10], 16).len(), 16);
        assert_eq!(pad_audio(&[0.1; 20], 16).len(), 20);
        let padded = pad_audio(&[0.1; 10], 16);
        assert_eq!(padded[10..], [0.0; 6]);
    }

    #[test]
    fn test_gate_quiet_until_speech() {
        let mut gate = EnergyGate::new(0.02, Duration::from_millis(50));
        assert_eq!(gate.observe(0.001), GateDecision::Quiet);
        assert_eq!(gate.observe(0.1), GateDecision::Speech);
        assert_eq!(gate.observe(0.1), GateDecision::Speech);
    }

    #[test]
    fn test_gate_trailing_then_utterance_end() {
        let mut gate = EnergyGate::new(0.02, Duration::from_millis(20));
        assert_eq!(gate.observe(0.1), GateDecision::Speech);
        assert_eq!(gate.observe(0.001), GateDecision::Trailing);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(gate.observe(0.001), GateDecision::UtteranceEnd);
        // Back to quiet after the utterance closed.
        assert_eq!(gate.observe(0.001), GateDecision::Quiet);
    }

    #[test]
    fn test_gate_speech_resets_silence_window() {
        let mut gate = EnergyGate::new(0.02, Duration::from_millis(20));
        gate.observe(0.1);
        assert_eq!(gate.observe(0.001), GateDecision::Trailing);
        // Speech resumes: the pending silence window is discarded.
        assert_eq!(gate.observe(0.1), GateDecision::Speech);
        assert_eq!(gate.observe(0.001), GateDecision::Trailing);
    }
}
