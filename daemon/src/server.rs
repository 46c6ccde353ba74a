use shared::ipc::{Command, Response};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::RateLimitConfig;
use crate::rate_limit::CommandRateLimiter;
use crate::state::DaemonState;

/// XDG runtime dir when available, /tmp otherwise. The CLI mirrors this.
pub fn default_socket_path() -> PathBuf {
    if let Some(runtime_dir) = dirs::runtime_dir() {
        runtime_dir.join("uniagentd.sock")
    } else {
        PathBuf::from("/tmp/uniagentd.sock")
    }
}

pub struct DaemonServer {
    socket_path: PathBuf,
    state: Arc<Mutex<DaemonState>>,
    limiter: Arc<CommandRateLimiter>,
}

impl DaemonServer {
    pub fn new(
        socket_path: PathBuf,
        state: Arc<Mutex<DaemonState>>,
        rate_limit: &RateLimitConfig,
    ) -> Self {
        Self {
            socket_path,
            state,
            limiter: Arc::new(CommandRateLimiter::new(rate_limit)),
        }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        info!("Starting socket server at {}", self.socket_path.display());
        let listener = UnixListener::bind(&self.socket_path)?;

        loop {
            let state = Arc::clone(&self.state);
            let limiter = Arc::clone(&self.limiter);
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(state, limiter, stream).await {
                            error!("Error handling connection: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }

    async fn handle_connection(
        state: Arc<Mutex<DaemonState>>,
        limiter: Arc<CommandRateLimiter>,
        mut stream: tokio::net::UnixStream,
    ) -> anyhow::Result<()> {
        let mut buffer = vec![0u8; 1024];
        let n = stream.read(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }
        buffer.truncate(n);

        let command: Command = serde_json::from_slice(&buffer)?;
        debug!("Received command: {:?}", command);

        let response = if !limiter.check() {
            warn!("Command rate limited: {:?}", command);
            Response::Error("rate limited".to_string())
        } else {
            Self::execute(state, command).await
        };

        let response_json = serde_json::to_vec(&response)?;
        stream.write_all(&response_json).await?;
        debug!("Sent response: {:?}", response);

        Ok(())
    }

    async fn execute(state: Arc<Mutex<DaemonState>>, command: Command) -> Response {
        match command {
            Command::Start => {
                let mut guard = state.lock().await;
                match guard.start_session() {
                    Ok(()) => Response::Ok,
                    Err(e) => Response::Error(e.to_string()),
                }
            }
            Command::Stop => {
                state.lock().await.stop_session().await;
                Response::Ok
            }
            Command::Trigger => {
                if state.lock().await.trigger().await {
                    Response::Ok
                } else {
                    Response::Error("session not running".to_string())
                }
            }
            Command::Cancel => {
                if state.lock().await.cancel().await {
                    Response::Ok
                } else {
                    Response::Error("session not running".to_string())
                }
            }
            Command::Status => Response::Status(state.lock().await.status()),
            Command::LastIntent => Response::Intent(state.lock().await.last_intent()),
        }
    }
}

impl Drop for DaemonServer {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tokio::net::UnixStream;

    fn quiet_state() -> Arc<Mutex<DaemonState>> {
        let mut config = Config::default();
        config.feedback.enabled = false;
        config.identity.enabled = false;
        Arc::new(Mutex::new(DaemonState::new(config)))
    }

    async fn round_trip(socket: &PathBuf, command: Command) -> Response {
        let mut stream = UnixStream::connect(socket).await.unwrap();
        stream
            .write_all(&serde_json::to_vec(&command).unwrap())
            .await
            .unwrap();
        let mut buffer = vec![0u8; 4096];
        let n = stream.read(&mut buffer).await.unwrap();
        buffer.truncate(n);
        serde_json::from_slice(&buffer).unwrap()
    }

    #[tokio::test]
    async fn test_status_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("uniagentd-test.sock");
        let server = DaemonServer::new(socket.clone(), quiet_state(), &RateLimitConfig::default());

        let server_task = tokio::spawn(async move { server.run().await });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let response = round_trip(&socket, Command::Status).await;
        match response {
            Response::Status(info) => {
                assert!(!info.is_running);
                assert_eq!(info.mode, "idle");
            }
            other => panic!("unexpected response: {:?}", other),
        }

        server_task.abort();
    }

    #[tokio::test]
    async fn test_trigger_without_session_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("uniagentd-test2.sock");
        let server = DaemonServer::new(socket.clone(), quiet_state(), &RateLimitConfig::default());

        let server_task = tokio::spawn(async move { server.run().await });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let response = round_trip(&socket, Command::Trigger).await;
        assert!(matches!(response, Response::Error(_)));

        let response = round_trip(&socket, Command::LastIntent).await;
        assert_eq!(response, Response::Intent(None));

        server_task.abort();
    }

    #[tokio::test]
    async fn test_rate_limited_command() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("uniagentd-test3.sock");
        let rate_limit = RateLimitConfig {
            commands_per_second: 1,
            burst_capacity: 1,
            enabled: true,
        };
        let server = DaemonServer::new(socket.clone(), quiet_state(), &rate_limit);

        let server_task = tokio::spawn(async move { server.run().await });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let first = round_trip(&socket, Command::Status).await;
        assert!(matches!(first, Response::Status(_)));

        let second = round_trip(&socket, Command::Status).await;
        assert_eq!(second, Response::Error("rate limited".to_string()));

        server_task.abort();
    }
}
