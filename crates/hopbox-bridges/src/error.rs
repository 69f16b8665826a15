use std::io;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to bind bridge listener on port {0}: {1}")]
    Bind(u16, io::Error),
    #[error("bridge io error: {0}")]
    Io(#[from] io::Error),
}
