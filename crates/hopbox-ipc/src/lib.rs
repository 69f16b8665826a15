//! Local transport for Hopbox's Unix-domain-socket protocols: the helper
//! socket, the daemon control socket, and any test harness built on the same
//! framing.

mod fd;
mod framed;

pub use fd::{recv_with_fd, send_with_fd};
pub use framed::{IpcClient, IpcConnection, IpcServer};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("failed to connect to socket at {0}: {1}")]
    Connect(PathBuf, std::io::Error),
    #[error("failed to bind socket at {0}: {1}")]
    Bind(PathBuf, std::io::Error),
    #[error("another process is already listening on {0}")]
    AlreadyRunning(PathBuf),
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("failed to encode message: {0}")]
    Encode(serde_json::Error),
    #[error("failed to decode message: {0}")]
    Decode(serde_json::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopbox_proto::{ControlRequest, ControlResponse, ControlStateView};
    use tempfile::TempDir;

    #[tokio::test]
    async fn client_server_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.sock");

        let server = IpcServer::<ControlRequest, ControlResponse>::bind(&path)
            .await
            .unwrap();

        let handle = tokio::spawn(async move {
            let mut conn = server.accept().await.unwrap();
            let req = conn.recv().await.unwrap();
            assert_eq!(req, ControlRequest::Status);
            let state = ControlStateView {
                pid: 1234,
                connected: true,
                last_healthy: None,
                interface: "hopbox0".to_string(),
                started_at: "2026-01-01T00:00:00Z".to_string(),
                bridges: vec!["url_open".to_string()],
            };
            conn.send(&ControlResponse::ok_status(state)).await.unwrap();
        });

        let mut client = IpcClient::<ControlRequest, ControlResponse>::connect(&path)
            .await
            .unwrap();
        let resp = client.request(&ControlRequest::Status).await.unwrap();
        assert!(resp.ok);
        assert_eq!(resp.state.unwrap().interface, "hopbox0");

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn stale_socket_file_is_replaced_on_bind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stale.sock");
        std::fs::write(&path, b"not a socket").unwrap();

        let server = IpcServer::<ControlRequest, ControlResponse>::bind(&path)
            .await
            .unwrap();
        assert!(path.exists());

        drop(server);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn bind_fails_when_a_live_server_holds_the_socket() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("live.sock");

        let _server = IpcServer::<ControlRequest, ControlResponse>::bind(&path)
            .await
            .unwrap();

        let err = IpcServer::<ControlRequest, ControlResponse>::bind(&path)
            .await
            .unwrap_err();
        assert!(matches!(err, IpcError::AlreadyRunning(_)));
    }
}
