pub mod audio;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod feedback;
pub mod identity;
pub mod output;
pub mod rate_limit;
pub mod server;
pub mod session;
pub mod state;
pub mod transcription;
pub mod wake;

pub use dispatch::IntentDispatcher;
pub use engine::manager::SpeechEngineManager;
pub use output::IntentSink;
pub use rate_limit::CommandRateLimiter;
pub use session::{SessionControl, SessionDriver, SessionMode};
pub use state::DaemonState;
pub use wake::WakeWordSet;
