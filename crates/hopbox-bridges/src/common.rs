use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::BridgeError;

/// Shared bound-address bookkeeping every bridge composes rather than inherits.
#[derive(Default)]
pub struct BridgeRuntime {
    bound_addr: Mutex<Option<SocketAddr>>,
}

impl BridgeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn status(&self) -> String {
        match *self.bound_addr.lock().unwrap() {
            Some(addr) => format!("running ({addr})"),
            None => "stopped".to_string(),
        }
    }

    fn set_bound(&self, addr: SocketAddr) {
        *self.bound_addr.lock().unwrap() = Some(addr);
    }

    fn clear(&self) {
        *self.bound_addr.lock().unwrap() = None;
    }
}

/// Binds to `127.0.0.1:bind_port`, optionally reporting the bound port over
/// `notify_port` (for tests that bind an ephemeral port with 0), and accepts
/// connections until `ctx` is cancelled, dispatching each to `handler`.
pub async fn run_accept_loop<F, Fut>(
    bind_port: u16,
    ctx: CancellationToken,
    runtime: Arc<BridgeRuntime>,
    notify_port: Option<oneshot::Sender<u16>>,
    handler: F,
) -> Result<(), BridgeError>
where
    F: Fn(TcpStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(("127.0.0.1", bind_port))
        .await
        .map_err(|e| BridgeError::Bind(bind_port, e))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| BridgeError::Bind(bind_port, e))?;
    runtime.set_bound(local_addr);

    if let Some(tx) = notify_port {
        let _ = tx.send(local_addr.port());
    }

    let handler = Arc::new(handler);
    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                debug!(port = local_addr.port(), "bridge shutting down");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!(port = local_addr.port(), %peer, "bridge connection accepted");
                        let handler = handler.clone();
                        tokio::spawn(async move { handler(stream).await; });
                    }
                    Err(e) => warn!(port = local_addr.port(), "bridge accept error: {e}"),
                }
            }
        }
    }

    runtime.clear();
    Ok(())
}
