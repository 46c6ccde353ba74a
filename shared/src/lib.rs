pub mod intent;
pub mod ipc;

pub use intent::Intent;
pub use ipc::{Command, IpcError, Response, StatusInfo};
