use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::BridgeError;

/// The narrow capability set every bridge presents: start, an observable
/// variant for tests, stop (via cancelling `ctx`), and a point-in-time status.
#[async_trait]
pub trait Bridge: Send + Sync {
    fn name(&self) -> &'static str;

    async fn start(&self, ctx: CancellationToken) -> Result<(), BridgeError>;

    /// Like `start`, but reports the bound port once listening — used by
    /// tests that bind an ephemeral port and need to know which one.
    async fn start_with_notify(
        &self,
        ctx: CancellationToken,
        port_tx: oneshot::Sender<u16>,
    ) -> Result<(), BridgeError>;

    fn status(&self) -> String;
}
