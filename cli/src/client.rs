use shared::ipc::{Command, IpcError, Response};
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::{timeout, Duration};
use tracing::warn;

/// Timeout for socket operations.
const SOCKET_TIMEOUT: Duration = Duration::from_secs(5);

/// Socket path mirror of the daemon: XDG runtime dir when available,
/// /tmp otherwise.
fn get_socket_path() -> PathBuf {
    if let Some(runtime_dir) = dirs::runtime_dir() {
        runtime_dir.join("uniagentd.sock")
    } else {
        PathBuf::from("/tmp/uniagentd.sock")
    }
}

pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    pub fn new() -> Self {
        Self {
            socket_path: get_socket_path(),
        }
    }

    pub async fn send_command(&self, cmd: Command) -> Result<Response, IpcError> {
        let mut stream = match timeout(SOCKET_TIMEOUT, UnixStream::connect(&self.socket_path)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IpcError::ConnectionRefused);
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                return Err(IpcError::ConnectionRefused);
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                warn!(
                    "Connection timeout: failed to connect to daemon at {} within {:?}",
                    self.socket_path.display(),
                    SOCKET_TIMEOUT
                );
                return Err(IpcError::Timeout);
            }
        };

        let command_json = serde_json::to_vec(&cmd)?;

        if timeout(SOCKET_TIMEOUT, stream.write_all(&command_json))
            .await
            .is_err()
        {
            warn!("Write timeout: failed to send command within {:?}", SOCKET_TIMEOUT);
            return Err(IpcError::Timeout);
        }

        let mut buffer = vec![0u8; 4096];
        let n = match timeout(SOCKET_TIMEOUT, stream.read(&mut buffer)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                warn!("Read timeout: no response from daemon within {:?}", SOCKET_TIMEOUT);
                return Err(IpcError::Timeout);
            }
        };
        buffer.truncate(n);

        let response: Response = serde_json::from_slice(&buffer)?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Intent, StatusInfo};
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn test_send_command_socket_not_found() {
        let client = DaemonClient {
            socket_path: PathBuf::from("/tmp/uniagent-test-no-such.sock"),
        };
        let result = client.send_command(Command::Status).await;
        assert!(matches!(result, Err(IpcError::ConnectionRefused)));
    }

    async fn spawn_mock_server(socket: &str, response: Response) {
        std::fs::remove_file(socket).ok();
        let listener = UnixListener::bind(socket).unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buffer = vec![0u8; 1024];
            let n = stream.read(&mut buffer).await.unwrap();
            buffer.truncate(n);
            let _command: Command = serde_json::from_slice(&buffer).unwrap();

            let response_json = serde_json::to_vec(&response).unwrap();
            stream.write_all(&response_json).await.unwrap();
        });
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn test_send_command_ok_response() {
        let socket = "/tmp/test_uniagent_ok.sock";
        spawn_mock_server(socket, Response::Ok).await;

        let client = DaemonClient {
            socket_path: PathBuf::from(socket),
        };
        let result = client.send_command(Command::Trigger).await;
        assert!(matches!(result, Ok(Response::Ok)));

        std::fs::remove_file(socket).ok();
    }

    #[tokio::test]
    async fn test_send_command_status() {
        let socket = "/tmp/test_uniagent_status.sock";
        spawn_mock_server(
            socket,
            Response::Status(StatusInfo {
                is_running: true,
                mode: "listening".to_string(),
                engine_available: true,
            }),
        )
        .await;

        let client = DaemonClient {
            socket_path: PathBuf::from(socket),
        };
        let result = client.send_command(Command::Status).await;

        match result {
            Ok(Response::Status(info)) => {
                assert!(info.is_running);
                assert_eq!(info.mode, "listening");
                assert!(info.engine_available);
            }
            other => panic!("unexpected response: {:?}", other),
        }

        std::fs::remove_file(socket).ok();
    }

    #[tokio::test]
    async fn test_send_command_intent() {
        let socket = "/tmp/test_uniagent_intent.sock";
        let intent = Intent {
            action: "BRIDGE ASSETS".to_string(),
            source_chain: "SEPOLIA".to_string(),
            target_chain: "SUI NET".to_string(),
            amount: 100.0,
            token_in: "USDC".to_string(),
            token_out: None,
            recipient: None,
            recipient_address: None,
            original_text: "bridge 100 usdc".to_string(),
            fallback: true,
        };
        spawn_mock_server(socket, Response::Intent(Some(intent.clone()))).await;

        let client = DaemonClient {
            socket_path: PathBuf::from(socket),
        };
        let result = client.send_command(Command::LastIntent).await;
        assert_eq!(result.unwrap(), Response::Intent(Some(intent)));

        std::fs::remove_file(socket).ok();
    }

    #[tokio::test]
    async fn test_send_command_timeout_on_read() {
        let socket = "/tmp/test_uniagent_timeout.sock";
        std::fs::remove_file(socket).ok();

        let listener = UnixListener::bind(socket).unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buffer = vec![0u8; 1024];
            let _n = stream.read(&mut buffer).await.unwrap();
            // No response: the client must time out.
            tokio::time::sleep(tokio::time::Duration::from_secs(6)).await;
        });
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let client = DaemonClient {
            socket_path: PathBuf::from(socket),
        };
        let result = client.send_command(Command::Status).await;
        assert!(matches!(result, Err(IpcError::Timeout)));

        std::fs::remove_file(socket).ok();
    }
}
