use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::TunnelError;

/// Status reported by `Status()`: up-flag, last-handshake time (0 = never),
/// cumulative tx/rx byte counts, and the peer endpoint currently in use
/// (§4.2). Parsed from (or, for the userspace backend, tracked in place of)
/// the same `IpcGet()` text both backends are configured through.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TunnelStatus {
    pub up: bool,
    pub interface: String,
    /// Unix timestamp of the last completed handshake; 0 means never.
    pub last_handshake_time_secs: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub endpoint: Option<String>,
}

/// Common surface both tunnel backends present to the daemon/agent.
#[async_trait]
pub trait Tunnel: Send + Sync {
    async fn up(&mut self) -> Result<(), TunnelError>;
    async fn down(&mut self) -> Result<(), TunnelError>;
    async fn status(&self) -> TunnelStatus;
    fn interface_name(&self) -> &str;

    /// A one-shot signal closed once the device is up and Dial-safe.
    /// Callers must wait on this before touching the tunnel's address space
    /// (§5's `Ready` happens-before ordering guarantee); `subscribe()` may be
    /// called any number of times and from any number of waiters.
    fn ready(&self) -> watch::Receiver<bool>;
}
