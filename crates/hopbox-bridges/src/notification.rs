use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bridge::Bridge;
use crate::common::{run_accept_loop, BridgeRuntime};
use crate::error::BridgeError;

pub const DEFAULT_PORT: u16 = 2226;
const MAX_PAYLOAD: usize = 64 * 1024;

#[derive(Debug, Deserialize, Default)]
struct NotificationPayload {
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
}

/// Parses `{title, body}` JSON and invokes the OS notification command.
/// Invalid JSON is dropped silently; a payload with both fields empty is
/// dropped too (§4.5).
pub struct NotificationBridge {
    port: u16,
    runtime: Arc<BridgeRuntime>,
}

impl NotificationBridge {
    pub fn new() -> Self {
        Self::with_port(DEFAULT_PORT)
    }

    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            runtime: BridgeRuntime::new(),
        }
    }
}

impl Default for NotificationBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bridge for NotificationBridge {
    fn name(&self) -> &'static str {
        "notification"
    }

    async fn start(&self, ctx: CancellationToken) -> Result<(), BridgeError> {
        run_accept_loop(self.port, ctx, self.runtime.clone(), None, handle).await
    }

    async fn start_with_notify(
        &self,
        ctx: CancellationToken,
        port_tx: oneshot::Sender<u16>,
    ) -> Result<(), BridgeError> {
        run_accept_loop(self.port, ctx, self.runtime.clone(), Some(port_tx), handle).await
    }

    fn status(&self) -> String {
        self.runtime.status()
    }
}

async fn handle(mut stream: TcpStream) {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];
    loop {
        if buf.len() >= MAX_PAYLOAD {
            break;
        }
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n.min(MAX_PAYLOAD - buf.len())]),
            Err(e) => {
                warn!("notification read error: {e}");
                return;
            }
        }
    }

    let payload: NotificationPayload = match serde_json::from_slice(&buf) {
        Ok(p) => p,
        Err(e) => {
            debug!("dropping invalid notification payload: {e}");
            return;
        }
    };

    if payload.title.is_empty() && payload.body.is_empty() {
        return;
    }

    notify(&payload.title, &payload.body);
}

fn notify(title: &str, body: &str) {
    let result = if cfg!(target_os = "macos") {
        let script = format!(
            "display notification {:?} with title {:?}",
            body, title
        );
        std::process::Command::new("osascript")
            .arg("-e")
            .arg(script)
            .spawn()
    } else {
        std::process::Command::new("notify-send")
            .arg(title)
            .arg(body)
            .spawn()
    };

    if let Err(e) = result {
        warn!("failed to dispatch notification: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_is_rejected() {
        let payload = NotificationPayload::default();
        assert!(payload.title.is_empty() && payload.body.is_empty());
    }

    #[test]
    fn partial_payload_parses() {
        let payload: NotificationPayload =
            serde_json::from_str(r#"{"title":"build failed"}"#).unwrap();
        assert_eq!(payload.title, "build failed");
        assert_eq!(payload.body, "");
    }
}
