#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("helper unreachable at startup: {0}")]
    HelperUnreachable(#[from] hopbox_ipc::IpcError),
    #[error("tunnel error: {0}")]
    Tunnel(#[from] hopbox_tunnel::TunnelError),
    #[error("bridge error: {0}")]
    Bridge(#[from] hopbox_bridges::BridgeError),
    #[error("state io error: {0}")]
    State(#[from] std::io::Error),
    #[error("state (de)serialization error: {0}")]
    StateSerde(#[from] serde_json::Error),
}
