//! Local control socket: `status` and `shutdown` (§4.3 step 6).

use std::path::Path;
use std::sync::Arc;

use hopbox_ipc::IpcServer;
use hopbox_proto::{ControlRequest, ControlResponse, ControlStateView};
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::DaemonError;

/// Read-only snapshot the control socket serves on `status`.
pub type StateSnapshot = watch::Receiver<ControlStateView>;

pub async fn serve(
    socket_path: &Path,
    snapshot: StateSnapshot,
    shutdown: CancellationToken,
    ctx: CancellationToken,
) -> Result<(), DaemonError> {
    let server = Arc::new(IpcServer::<Value, ControlResponse>::bind(socket_path).await?);

    loop {
        tokio::select! {
            _ = ctx.cancelled() => break,
            accepted = server.accept() => {
                let mut conn = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("control socket accept error: {e}");
                        continue;
                    }
                };
                let snapshot = snapshot.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    let raw = match conn.recv().await {
                        Ok(req) => req,
                        Err(e) => {
                            debug!("control socket read error: {e}");
                            return;
                        }
                    };
                    let method = raw.get("method").and_then(Value::as_str).unwrap_or("");
                    let response = match serde_json::from_value::<ControlRequest>(raw.clone()) {
                        Ok(ControlRequest::Status) => ControlResponse::ok_status(snapshot.borrow().clone()),
                        Ok(ControlRequest::Shutdown) => {
                            shutdown.cancel();
                            ControlResponse::ok_empty()
                        }
                        Err(_) => ControlResponse::unknown_method(method),
                    };
                    let _ = conn.send(&response).await;
                });
            }
        }
    }

    Ok(())
}
