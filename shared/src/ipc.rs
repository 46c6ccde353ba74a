use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::intent::Intent;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Stop,
    /// Explicit user activation: Idle -> Listening without a wake word.
    Trigger,
    /// Explicit cancellation: Listening -> Idle.
    Cancel,
    Status,
    LastIntent,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Response {
    Ok,
    Error(String),
    Status(StatusInfo),
    Intent(Option<Intent>),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusInfo {
    pub is_running: bool,
    /// Current session mode: "idle", "listening" or "processing".
    pub mode: String,
    /// False once the recognition engine hit a fatal error and was declared
    /// permanently unavailable for this process.
    pub engine_available: bool,
}

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection refused: is uniagentd running?")]
    ConnectionRefused,

    #[error("Connection timeout")]
    Timeout,
}
