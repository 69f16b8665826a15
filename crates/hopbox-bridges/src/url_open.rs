use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::bridge::Bridge;
use crate::common::{run_accept_loop, BridgeRuntime};
use crate::error::BridgeError;

pub const DEFAULT_PORT: u16 = 2225;

/// Reads a single newline-terminated URL per connection and opens it with
/// the OS's default URL handler (§4.5).
pub struct UrlOpenBridge {
    port: u16,
    runtime: Arc<BridgeRuntime>,
}

impl UrlOpenBridge {
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

impl Default for UrlOpenBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bridge for UrlOpenBridge {
    fn name(&self) -> &'static str {
        "url_open"
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

async fn handle(stream: TcpStream) {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    if let Err(e) = reader.read_line(&mut line).await {
        warn!("url_open read error: {e}");
        return;
    }
    let url = line.trim();
    if url.is_empty() {
        return;
    }
    open_url(url);
}

fn open_url(url: &str) {
    let opener = if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    if let Err(e) = std::process::Command::new(opener).arg(url).spawn() {
        warn!("failed to launch {opener} for url {url}: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream as ClientStream;

    #[tokio::test]
    async fn binds_ephemeral_port_and_reports_it() {
        let bridge = UrlOpenBridge::with_port(0);
        let ctx = CancellationToken::new();
        let (tx, rx) = oneshot::channel();

        let ctx_clone = ctx.clone();
        let handle_task = tokio::spawn(async move { bridge.start_with_notify(ctx_clone, tx).await });

        let port = rx.await.unwrap();
        assert_ne!(port, 0);

        ctx.cancel();
        let _ = handle_task.await;
    }

    #[tokio::test]
    async fn empty_line_is_ignored_without_panicking() {
        let bridge = UrlOpenBridge::with_port(0);
        let ctx = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        let ctx_clone = ctx.clone();
        let task = tokio::spawn(async move { bridge.start_with_notify(ctx_clone, tx).await });
        let port = rx.await.unwrap();

        let mut conn = ClientStream::connect(("127.0.0.1", port)).await.unwrap();
        conn.write_all(b"\n").await.unwrap();
        drop(conn);

        ctx.cancel();
        let _ = task.await;
    }
}
