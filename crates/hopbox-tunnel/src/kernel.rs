//! Kernel WireGuard backend: the interface and its crypto live in the
//! kernel module, configured over the UAPI Unix socket every `wg`-compatible
//! implementation exposes at `/var/run/wireguard/<interface>.sock`.
//!
//! The wire format is the same `key=value` text protocol `hopbox_proto`
//! already builds for the userspace backend (§4.2/§6), so this backend is a
//! thin transport around the same config strings — the helper is
//! responsible for bringing the interface itself into existence.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::watch;
use tracing::debug;

use hopbox_proto::tunnel_config::parse_ipc_status;

use crate::error::TunnelError;
use crate::tunnel::{Tunnel, TunnelStatus};

pub struct KernelTunnel {
    interface: String,
    uapi_socket: PathBuf,
    config_text: String,
    up: bool,
    ready_tx: watch::Sender<bool>,
}

impl KernelTunnel {
    pub fn new(interface: String, config_text: String) -> Self {
        let uapi_socket = PathBuf::from("/var/run/wireguard").join(format!("{interface}.sock"));
        Self::with_socket_path(interface, config_text, uapi_socket)
    }

    pub fn with_socket_path(interface: String, config_text: String, uapi_socket: PathBuf) -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            interface,
            uapi_socket,
            config_text,
            up: false,
            ready_tx,
        }
    }

    async fn send_operation(&self, op: &str) -> Result<String, TunnelError> {
        let mut stream = UnixStream::connect(&self.uapi_socket)
            .await
            .map_err(|e| TunnelError::Uapi(self.uapi_socket.display().to_string(), e))?;

        stream
            .write_all(op.as_bytes())
            .await
            .map_err(|e| TunnelError::Uapi(self.uapi_socket.display().to_string(), e))?;
        stream
            .shutdown()
            .await
            .map_err(|e| TunnelError::Uapi(self.uapi_socket.display().to_string(), e))?;

        let mut response = String::new();
        stream
            .read_to_string(&mut response)
            .await
            .map_err(|e| TunnelError::Uapi(self.uapi_socket.display().to_string(), e))?;

        if !response.contains("errno=0") {
            return Err(TunnelError::UapiProtocol(response));
        }

        Ok(response)
    }

    /// Live handshake/byte-counter status, parsed from a `get=1` UAPI query.
    async fn live_status(&self) -> Result<hopbox_proto::tunnel_config::TunnelStatus, TunnelError> {
        let response = self.send_operation("get=1\n\n").await?;
        parse_ipc_status(&response).map_err(|e| TunnelError::UapiProtocol(e.to_string()))
    }
}

#[async_trait]
impl Tunnel for KernelTunnel {
    async fn up(&mut self) -> Result<(), TunnelError> {
        let op = format!("set=1\n{}\n", self.config_text);
        self.send_operation(&op).await?;
        self.up = true;
        // The UAPI `set=1` call returning `errno=0` is the kernel's
        // confirmation that the interface is configured and Dial-safe.
        let _ = self.ready_tx.send(true);
        Ok(())
    }

    async fn down(&mut self) -> Result<(), TunnelError> {
        if !self.up {
            return Ok(());
        }
        self.send_operation("set=1\nreplace_peers=true\n\n").await?;
        self.up = false;
        let _ = self.ready_tx.send(false);
        Ok(())
    }

    async fn status(&self) -> TunnelStatus {
        match self.live_status().await {
            Ok(live) => TunnelStatus {
                up: self.up && live.up,
                interface: self.interface.clone(),
                last_handshake_time_secs: live.last_handshake_time_secs,
                tx_bytes: live.tx_bytes,
                rx_bytes: live.rx_bytes,
                endpoint: live.endpoint,
            },
            Err(e) => {
                debug!("uapi status query failed, reporting administrative state only: {e}");
                TunnelStatus {
                    up: self.up,
                    interface: self.interface.clone(),
                    ..Default::default()
                }
            }
        }
    }

    fn interface_name(&self) -> &str {
        &self.interface
    }

    fn ready(&self) -> watch::Receiver<bool> {
        self.ready_tx.subscribe()
    }
}
