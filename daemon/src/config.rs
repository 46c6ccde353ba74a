use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default = "Config::default")]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub wake: WakeConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SessionConfig {
    /// Debounce window after the last qualifying fragment before a command
    /// is considered finished.
    #[serde(default = "default_silence_ms")]
    pub silence_ms: u64,
    /// Normalized command text must be strictly longer than this to count.
    #[serde(default = "default_min_command_chars")]
    pub min_command_chars: usize,
    /// Allow a debounce-expiry finalize to use interim (not engine-final)
    /// text verbatim. With false, expiry over interim-only text cancels.
    #[serde(default = "default_finalize_interim")]
    pub finalize_interim: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            silence_ms: default_silence_ms(),
            min_command_chars: default_min_command_chars(),
            finalize_interim: default_finalize_interim(),
        }
    }
}

fn default_silence_ms() -> u64 {
    1500
}
fn default_min_command_chars() -> usize {
    3
}
fn default_finalize_interim() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct WakeConfig {
    #[serde(default = "default_wake_enabled")]
    pub enabled: bool,
    /// Activation phrase variants, accent/misspelling tolerant forms
    /// included. The set is data, not an algorithm.
    #[serde(default = "default_wake_phrases")]
    pub phrases: Vec<String>,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            enabled: default_wake_enabled(),
            phrases: default_wake_phrases(),
        }
    }
}

fn default_wake_enabled() -> bool {
    true
}

fn default_wake_phrases() -> Vec<String> {
    vec![
        "hey sonic".to_string(),
        "hey sonik".to_string(),
        "hay sonic".to_string(),
        "a sonic".to_string(),
        "sonic".to_string(),
    ]
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default)]
    pub model_path: Option<String>,
    #[serde(default = "default_model_url")]
    pub model_url: String,
    #[serde(default)]
    pub model_checksum: Option<String>,
    #[serde(default = "default_n_thread")]
    pub n_thread: u32,
    /// How much fresh audio accumulates before an interim window is
    /// transcribed.
    #[serde(default = "default_interim_interval_ms")]
    pub interim_interval_ms: u64,
    /// RMS level above which a chunk counts as speech.
    #[serde(default = "default_energy_threshold")]
    pub energy_threshold: f32,
    /// In-engine silence needed before the backend marks a result final.
    #[serde(default = "default_final_silence_ms")]
    pub final_silence_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            restart_delay_ms: default_restart_delay_ms(),
            sample_rate: default_sample_rate(),
            model_path: None,
            model_url: default_model_url(),
            model_checksum: None,
            n_thread: default_n_thread(),
            interim_interval_ms: default_interim_interval_ms(),
            energy_threshold: default_energy_threshold(),
            final_silence_ms: default_final_silence_ms(),
        }
    }
}

fn default_language() -> String {
    "en".to_string()
}
fn default_restart_delay_ms() -> u64 {
    300
}
fn default_sample_rate() -> u32 {
    16000
}
fn default_model_url() -> String {
    "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.en.bin".to_string()
}
fn default_n_thread() -> u32 {
    4
}
fn default_interim_interval_ms() -> u64 {
    1000
}
fn default_energy_threshold() -> f32 {
    0.02
}
fn default_final_silence_ms() -> u64 {
    800
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DispatchConfig {
    #[serde(default = "default_dispatch_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_dispatch_timeout")]
    pub timeout_seconds: u64,
    /// Wallet address forwarded as account context, when known.
    #[serde(default)]
    pub user_address: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_dispatch_endpoint(),
            timeout_seconds: default_dispatch_timeout(),
            user_address: None,
        }
    }
}

fn default_dispatch_endpoint() -> String {
    "http://localhost:8080/api/v1/chat".to_string()
}
fn default_dispatch_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct IdentityConfig {
    #[serde(default = "default_identity_enabled")]
    pub enabled: bool,
    #[serde(default = "default_resolver_url")]
    pub resolver_url: String,
    #[serde(default = "default_identity_timeout")]
    pub timeout_seconds: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            enabled: default_identity_enabled(),
            resolver_url: default_resolver_url(),
            timeout_seconds: default_identity_timeout(),
        }
    }
}

fn default_identity_enabled() -> bool {
    true
}
fn default_resolver_url() -> String {
    "https://api.ensideas.com/ens/resolve".to_string()
}
fn default_identity_timeout() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FeedbackConfig {
    #[serde(default = "default_feedback_enabled")]
    pub enabled: bool,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            enabled: default_feedback_enabled(),
            volume: default_volume(),
        }
    }
}

fn default_feedback_enabled() -> bool {
    true
}
fn default_volume() -> f32 {
    1.0
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct OutputConfig {
    /// JSON-lines file the presentation layer tails; disabled when unset.
    #[serde(default)]
    pub intent_log: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RateLimitConfig {
    #[serde(default = "default_commands_per_second")]
    pub commands_per_second: u32,
    #[serde(default = "default_burst_capacity")]
    pub burst_capacity: u32,
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            commands_per_second: default_commands_per_second(),
            burst_capacity: default_burst_capacity(),
            enabled: default_rate_limit_enabled(),
        }
    }
}

fn default_commands_per_second() -> u32 {
    10
}
fn default_burst_capacity() -> u32 {
    20
}
fn default_rate_limit_enabled() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            wake: WakeConfig::default(),
            engine: EngineConfig::default(),
            dispatch: DispatchConfig::default(),
            identity: IdentityConfig::default(),
            feedback: FeedbackConfig::default(),
            output: OutputConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

pub fn load_config() -> Result<Config> {
    let config_path = get_config_path();

    if !config_path.exists() {
        tracing::info!("Config file not found at {:?}, using defaults", config_path);
        return Ok(Config::default());
    }

    tracing::info!("Loading config from {:?}", config_path);
    let config_str = std::fs::read_to_string(&config_path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

    let config: Config = toml::from_str(&config_str)
        .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;

    tracing::info!("Config loaded successfully");
    Ok(config)
}

fn get_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("uniagent")
        .join("config.toml")
}
