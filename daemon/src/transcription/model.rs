use anyhow::Result;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const CHUNK_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolve where the recognition model lives. An explicit path wins;
/// otherwise well-known locations are probed and the user data dir is the
/// download target.
pub fn locate_model(model_url: &str, explicit_path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit_path {
        return Ok(PathBuf::from(path));
    }

    let filename = model_url
        .rsplit('/')
        .next()
        .filter(|f| !f.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Invalid model URL: cannot extract filename"))?;

    let candidates: Vec<PathBuf> = [
        dirs::data_dir().map(|p| p.join("uniagent").join(filename)),
        Some(PathBuf::from("/usr/share/whisper").join(filename)),
        Some(PathBuf::from("./models").join(filename)),
    ]
    .into_iter()
    .flatten()
    .collect();

    for path in &candidates {
        if path.exists() {
            info!("Found model at {:?}", path);
            return Ok(path.clone());
        }
    }

    let default_path = dirs::data_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?
        .join("uniagent")
        .join(filename);
    debug!("Model not found locally, will use {:?}", default_path);
    Ok(default_path)
}

/// Make sure the model file exists and, when a checksum is configured,
/// matches it. Downloads (or re-downloads on mismatch) otherwise.
pub async fn ensure_model(path: &Path, url: &str, checksum: Option<&str>) -> Result<()> {
    if path.exists() {
        match checksum {
            None => return Ok(()),
            Some(expected) => {
                let actual = file_sha256(path)?;
                if actual == expected {
                    return Ok(());
                }
                warn!(
                    "Model checksum mismatch (expected {}, got {}), re-downloading",
                    expected, actual
                );
            }
        }
    }
    download_model(path, url, checksum).await
}

async fn download_model(path: &Path, url: &str, checksum: Option<&str>) -> Result<()> {
    use futures_util::StreamExt;

    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Invalid model path"))?;
    tokio::fs::create_dir_all(parent).await?;

    // Temp file plus atomic rename so an interrupted download never leaves
    // a half-written model behind.
    let temp_path = path.with_extension("tmp");
    if temp_path.exists() {
        tokio::fs::remove_file(&temp_path).await?;
    }

    info!("Downloading model from {}", url);
    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        anyhow::bail!("Model download failed: HTTP {}", response.status());
    }

    let mut stream = response.bytes_stream();
    let mut hasher = Sha256::new();
    let mut file = tokio::fs::File::create(&temp_path).await?;
    let mut downloaded = 0u64;

    loop {
        let chunk = match timeout(CHUNK_TIMEOUT, stream.next()).await {
            Ok(Some(Ok(chunk))) => chunk,
            Ok(Some(Err(e))) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                anyhow::bail!("Model download error: {}", e);
            }
            Ok(None) => break,
            Err(_) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                anyhow::bail!("Model download stalled for {:?}", CHUNK_TIMEOUT);
            }
        };
        downloaded += chunk.len() as u64;
        hasher.update(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    if let Some(expected) = checksum {
        let actual = hex::encode(hasher.finalize());
        if actual != expected {
            let _ = tokio::fs::remove_file(&temp_path).await;
            anyhow::bail!(
                "Model checksum mismatch after download: expected {}, got {}",
                expected,
                actual
            );
        }
    }

    tokio::fs::rename(&temp_path, path).await?;
    info!("Model downloaded ({} bytes) to {:?}", downloaded, path);
    Ok(())
}

pub fn file_sha256(path: &Path) -> Result<String> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_model_explicit_path_wins() {
        let path = locate_model("https://example.com/ggml-base.en.bin", Some("/opt/m.bin")).unwrap();
        assert_eq!(path, PathBuf::from("/opt/m.bin"));
    }

    #[test]
    fn test_locate_model_uses_url_filename() {
        let path = locate_model(
            "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.en.bin",
            None,
        )
        .unwrap();
        assert!(path.to_str().unwrap().ends_with("ggml-base.en.bin"));
    }

    #[test]
    fn test_locate_model_rejects_bad_url() {
        assert!(locate_model("", None).is_err());
    }

    #[test]
    fn test_file_sha256_known_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            file_sha256(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_ensure_model_downloads_and_verifies() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/model.bin")
            .with_status(200)
            .with_body("abc")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let checksum = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

        ensure_model(&path, &format!("{}/model.bin", server.url()), Some(checksum))
            .await
            .unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
        // Second call is a no-op: the file exists and verifies.
        ensure_model(&path, "http://127.0.0.1:9/model.bin", Some(checksum))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ensure_model_rejects_checksum_mismatch() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/model.bin")
            .with_status(200)
            .with_body("evil payload")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");

        let result = ensure_model(
            &path,
            &format!("{}/model.bin", server.url()),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"),
        )
        .await;

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_ensure_model_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/model.bin")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let result = ensure_model(&path, &format!("{}/model.bin", server.url()), None).await;
        assert!(result.is_err());
    }
}
