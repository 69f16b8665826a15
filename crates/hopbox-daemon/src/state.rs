//! `DaemonState` persistence: atomic write-then-rename, and a stale-PID
//! liveness check so a leftover state file from a crashed daemon doesn't
//! block a fresh `hop up` (§8 property 3).

use std::path::Path;

use hopbox_proto::DaemonState;
use nix::sys::signal::kill;
use nix::unistd::Pid;

use crate::error::DaemonError;

/// Writes `state` to `path` atomically: serialize to a sibling temp file,
/// then rename over the destination so readers never observe a partial
/// write.
pub async fn write_atomic(path: &Path, state: &DaemonState) -> Result<(), DaemonError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("tmp");
    let json = serde_json::to_vec_pretty(state)?;
    tokio::fs::write(&tmp_path, &json).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

pub async fn remove(path: &Path) -> Result<(), DaemonError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Loads an existing state file and reports whether its recorded PID is
/// still alive. A state file whose PID is dead is stale: it is removed
/// before returning, so it never blocks a fresh `hop up` and never lingers
/// for a reader to trip over later (§8 property 3).
pub async fn load_if_live(path: &Path) -> Result<Option<DaemonState>, DaemonError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let state: DaemonState = serde_json::from_slice(&bytes)?;
    if pid_is_alive(state.pid) {
        Ok(Some(state))
    } else {
        remove(path).await?;
        Ok(None)
    }
}

fn pid_is_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopbox_proto::ForwardedPort;
    use tempfile::TempDir;

    fn sample_state() -> DaemonState {
        DaemonState {
            pid: std::process::id(),
            host: "devbox".to_string(),
            interface: "hopbox0".to_string(),
            started_at: "2026-01-01T00:00:00Z".to_string(),
            connected: true,
            last_healthy: None,
            forwarded_ports: vec![ForwardedPort {
                port: 3000,
                program: "node".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn write_then_load_roundtrips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("devbox.state.json");
        write_atomic(&path, &sample_state()).await.unwrap();
        let loaded = load_if_live(&path).await.unwrap().unwrap();
        assert_eq!(loaded.host, "devbox");
    }

    #[tokio::test]
    async fn state_with_dead_pid_is_reported_as_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("devbox.state.json");
        let mut state = sample_state();
        state.pid = 1; // never our own pid in a test sandbox, but alive (init) - use an implausible one below instead
        state.pid = 999_999; // implausible, almost certainly not assigned
        write_atomic(&path, &state).await.unwrap();
        let loaded = load_if_live(&path).await.unwrap();
        assert!(loaded.is_none());
        assert!(!path.exists(), "stale state file should be removed, not just ignored");
    }

    #[tokio::test]
    async fn missing_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.state.json");
        assert!(load_if_live(&path).await.unwrap().is_none());
    }
}
