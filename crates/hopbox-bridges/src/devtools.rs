use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::bridge::Bridge;
use crate::common::{run_accept_loop, BridgeRuntime};
use crate::error::BridgeError;

pub const DEFAULT_PORT: u16 = 9222;

/// Forwards each accepted connection to `127.0.0.1:<target_port>` as a plain
/// byte pipe, for the browser remote-debug protocol (§4.5).
pub struct DevToolsBridge {
    port: u16,
    target_port: u16,
    runtime: Arc<BridgeRuntime>,
}

impl DevToolsBridge {
    pub fn new(target_port: u16) -> Self {
        Self::with_port(DEFAULT_PORT, target_port)
    }

    pub fn with_port(port: u16, target_port: u16) -> Self {
        Self {
            port,
            target_port,
            runtime: BridgeRuntime::new(),
        }
    }
}

#[async_trait]
impl Bridge for DevToolsBridge {
    fn name(&self) -> &'static str {
        "devtools"
    }

    async fn start(&self, ctx: CancellationToken) -> Result<(), BridgeError> {
        let target_port = self.target_port;
        run_accept_loop(self.port, ctx, self.runtime.clone(), None, move |stream| {
            pipe_to_target(stream, target_port)
        })
        .await
    }

    async fn start_with_notify(
        &self,
        ctx: CancellationToken,
        port_tx: oneshot::Sender<u16>,
    ) -> Result<(), BridgeError> {
        let target_port = self.target_port;
        run_accept_loop(
            self.port,
            ctx,
            self.runtime.clone(),
            Some(port_tx),
            move |stream| pipe_to_target(stream, target_port),
        )
        .await
    }

    fn status(&self) -> String {
        self.runtime.status()
    }
}

async fn pipe_to_target(mut inbound: TcpStream, target_port: u16) {
    let mut outbound = match TcpStream::connect(("127.0.0.1", target_port)).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("devtools bridge failed to reach 127.0.0.1:{target_port}: {e}");
            return;
        }
    };

    if let Err(e) = tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await {
        warn!("devtools bridge pipe error: {e}");
    }
}
