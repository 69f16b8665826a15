use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::bridge::Bridge;
use crate::common::{run_accept_loop, BridgeRuntime};
use crate::error::BridgeError;

pub const DEFAULT_PORT: u16 = 2224;
const MAX_PAYLOAD: usize = 1024 * 1024;

/// Reads up to 1 MiB and writes it to the system clipboard (§4.5).
pub struct ClipboardBridge {
    port: u16,
    runtime: Arc<BridgeRuntime>,
}

impl ClipboardBridge {
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

impl Default for ClipboardBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bridge for ClipboardBridge {
    fn name(&self) -> &'static str {
        "clipboard"
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
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        if buf.len() >= MAX_PAYLOAD {
            break;
        }
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n.min(MAX_PAYLOAD - buf.len())]),
            Err(e) => {
                warn!("clipboard read error: {e}");
                return;
            }
        }
    }

    if buf.is_empty() {
        return;
    }

    if let Err(e) = write_clipboard(&buf).await {
        warn!("failed to write clipboard: {e}");
    }
}

async fn write_clipboard(data: &[u8]) -> std::io::Result<()> {
    let (program, args): (&str, &[&str]) = if cfg!(target_os = "macos") {
        ("pbcopy", &[])
    } else {
        ("xclip", &["-selection", "clipboard"])
    };

    let mut child = tokio::process::Command::new(program)
        .args(args)
        .stdin(std::process::Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(data).await?;
    }

    child.wait().await?;
    Ok(())
}
