//! WireGuard tunnel backends shared by the daemon and the agent.

mod device;
mod error;
mod kernel;
mod tunnel;
mod userspace;

pub use device::AsyncTunDevice;
pub use error::TunnelError;
pub use kernel::KernelTunnel;
pub use tunnel::{Tunnel, TunnelStatus};
pub use userspace::UserspaceTunnel;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn tunnel_status_reports_interface_name() {
        let status = TunnelStatus {
            up: true,
            interface: "hopbox0".to_string(),
            ..Default::default()
        };
        assert!(status.up);
        assert_eq!(status.interface, "hopbox0");
        assert_eq!(status.last_handshake_time_secs, 0);
    }

    #[tokio::test]
    async fn kernel_tunnel_up_fails_cleanly_without_a_uapi_socket() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("hopbox0.sock");
        let mut tunnel =
            kernel::KernelTunnel::with_socket_path("hopbox0".to_string(), "private_key=0\n".to_string(), socket);
        let err = tunnel.up().await.unwrap_err();
        assert!(matches!(err, TunnelError::Uapi(_, _)));
    }

    #[tokio::test]
    async fn kernel_tunnel_ready_fires_only_after_uapi_confirms() {
        let dir = TempDir::new().unwrap();
        let socket_path = dir.path().join("hopbox0.sock");
        let listener = tokio::net::UnixListener::bind(&socket_path).unwrap();

        // A stub UAPI peer: read whatever the client sends, always reply
        // with a bare success so `up()` can complete.
        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            loop {
                let Ok((mut stream, _)) = listener.accept().await else { break };
                let mut buf = Vec::new();
                let _ = stream.read_to_end(&mut buf).await;
                let _ = stream.write_all(b"errno=0\n\n").await;
            }
        });

        let mut tunnel =
            kernel::KernelTunnel::with_socket_path("hopbox0".to_string(), "private_key=0\n".to_string(), socket_path);
        let mut ready = tunnel.ready();
        assert!(!*ready.borrow(), "ready must not fire before up() confirms");

        tunnel.up().await.unwrap();
        ready.changed().await.unwrap();
        assert!(*ready.borrow(), "ready must fire once the UAPI set=1 confirms");
    }
}
