use std::io;

#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("failed to create TUN device: {0}")]
    DeviceCreate(io::Error),
    #[error("TUN device io error: {0}")]
    DeviceIo(io::Error),
    #[error("failed to bind UDP socket on port {0}: {1}")]
    UdpBind(u16, io::Error),
    #[error("UDP io error: {0}")]
    UdpIo(io::Error),
    #[error("no peer endpoint configured")]
    NoEndpoint,
    #[error("UAPI socket error at {0}: {1}")]
    Uapi(String, io::Error),
    #[error("malformed UAPI response: {0}")]
    UapiProtocol(String),
    #[error("wireguard handshake/encapsulation error: {0}")]
    Crypto(String),
    #[error("tunnel is not up")]
    NotUp,
}
