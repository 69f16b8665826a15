//! Client side of the helper socket protocol (§4.1). Every action except
//! `create_tun` is a plain request/response; `create_tun` additionally
//! carries the TUN fd as `SCM_RIGHTS` ancillary data, so it bypasses
//! `hopbox_ipc`'s generic JSON framing.

use std::os::fd::OwnedFd;
use std::path::Path;

use hopbox_ipc::{IpcClient, IpcError};
use hopbox_proto::{HelperRequest, HelperResponse};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

pub async fn create_tun(socket_path: &Path, mtu: u16) -> Result<(String, OwnedFd), IpcError> {
    let mut stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| IpcError::Connect(socket_path.to_path_buf(), e))?;

    let request = HelperRequest::CreateTun { mtu };
    let mut payload = serde_json::to_vec(&request).map_err(IpcError::Encode)?;
    payload.push(b'\n');
    stream.write_all(&payload).await.map_err(IpcError::Io)?;
    stream.flush().await.map_err(IpcError::Io)?;

    let mut buf = vec![0u8; 4096];
    let (n, fd) = hopbox_ipc::recv_with_fd(&stream, &mut buf)
        .await
        .map_err(IpcError::Io)?;

    let response: HelperResponse = serde_json::from_slice(&buf[..n]).map_err(IpcError::Decode)?;
    if !response.ok {
        return Err(IpcError::Protocol(
            response.error.unwrap_or_else(|| "create_tun failed".to_string()),
        ));
    }

    let interface = response.interface.unwrap_or_default();
    let fd = fd.ok_or_else(|| IpcError::Protocol("helper did not return a tun fd".to_string()))?;

    Ok((interface, fd))
}

pub async fn simple_request(socket_path: &Path, request: HelperRequest) -> Result<HelperResponse, IpcError> {
    let mut client = IpcClient::<HelperRequest, HelperResponse>::connect(socket_path).await?;
    client.request(&request).await
}
