//! `logs.stream` (§4.6): returns the tail of a service's log. Container
//! services delegate to the runtime's own log command; native services read
//! the log file the native backend already appends to.

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::process::Command;

use hopbox_proto::manifest::BackendKind;

use crate::error::AgentError;

const TAIL_LINES: &str = "200";
const MAX_TAIL_BYTES: u64 = 256 * 1024;

pub async fn tail(name: &str, backend: BackendKind, container_runtime: &str, log_dir: &std::path::Path) -> Result<String, AgentError> {
    match backend {
        BackendKind::Container => tail_container(name, container_runtime).await,
        BackendKind::Native => tail_file(&log_dir.join(format!("{name}.log"))).await,
    }
}

async fn tail_container(name: &str, container_runtime: &str) -> Result<String, AgentError> {
    let output = Command::new(container_runtime)
        .args(["logs", "--tail", TAIL_LINES, name])
        .output()
        .await
        .map_err(|e| AgentError::Internal(format!("failed to spawn {container_runtime} logs: {e}")))?;

    let mut combined = output.stdout;
    combined.extend_from_slice(&output.stderr);
    Ok(String::from_utf8_lossy(&combined).into_owned())
}

async fn tail_file(path: &std::path::Path) -> Result<String, AgentError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| AgentError::Internal(format!("failed to open {}: {e}", path.display())))?;

    let len = file
        .metadata()
        .await
        .map_err(|e| AgentError::Internal(format!("failed to stat {}: {e}", path.display())))?
        .len();

    let start = len.saturating_sub(MAX_TAIL_BYTES);
    if start > 0 {
        file.seek(std::io::SeekFrom::Start(start))
            .await
            .map_err(|e| AgentError::Internal(format!("failed to seek {}: {e}", path.display())))?;
    }

    let mut buf = String::new();
    file.read_to_string(&mut buf)
        .await
        .map_err(|e| AgentError::Internal(format!("failed to read {}: {e}", path.display())))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn tails_a_native_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api.log");
        let mut file = tokio::fs::File::create(&path).await.unwrap();
        file.write_all(b"line one\nline two\n").await.unwrap();
        drop(file);

        let got = tail_file(&path).await.unwrap();
        assert_eq!(got, "line one\nline two\n");
    }

    #[tokio::test]
    async fn missing_log_file_is_an_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = tail_file(&dir.path().join("ghost.log")).await.unwrap_err();
        assert!(matches!(err, AgentError::Internal(_)));
    }
}
