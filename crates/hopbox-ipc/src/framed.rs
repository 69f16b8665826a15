//! Newline-delimited JSON framing over a Unix domain socket.
//!
//! Hopbox runs three distinct local sockets on this framing: the helper
//! socket (`HelperRequest`/`HelperResponse`), the daemon's control socket
//! (`ControlRequest`/`ControlResponse`), and ad-hoc test harnesses. Rather
//! than duplicate the accept/bind/connect boilerplate per protocol, the
//! framing is generic over the request and response types.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use crate::IpcError;

/// Client side of a framed Unix socket protocol.
pub struct IpcClient<Req, Resp> {
    stream: BufReader<UnixStream>,
    _marker: PhantomData<(Req, Resp)>,
}

impl<Req, Resp> IpcClient<Req, Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    pub async fn connect(path: &Path) -> Result<Self, IpcError> {
        let stream = UnixStream::connect(path)
            .await
            .map_err(|e| IpcError::Connect(path.to_path_buf(), e))?;
        Ok(Self {
            stream: BufReader::new(stream),
            _marker: PhantomData,
        })
    }

    pub async fn request(&mut self, req: &Req) -> Result<Resp, IpcError> {
        write_line(self.stream.get_mut(), req).await?;
        read_line(&mut self.stream).await
    }

    pub fn into_inner(self) -> UnixStream {
        self.stream.into_inner()
    }
}

/// Server side of a framed Unix socket protocol: binds, cleans up stale
/// sockets, and removes the socket file on drop.
pub struct IpcServer<Req, Resp> {
    listener: UnixListener,
    socket_path: PathBuf,
    _marker: PhantomData<(Req, Resp)>,
}

impl<Req, Resp> IpcServer<Req, Resp>
where
    Req: DeserializeOwned,
    Resp: Serialize,
{
    /// Binds to `path`, removing a stale (unconnectable) socket file first.
    /// Returns [`IpcError::AlreadyRunning`] if another process is live on it.
    pub async fn bind(path: &Path) -> Result<Self, IpcError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IpcError::Bind(path.to_path_buf(), e))?;
        }

        if path.exists() {
            match UnixStream::connect(path).await {
                Ok(_) => return Err(IpcError::AlreadyRunning(path.to_path_buf())),
                Err(_) => {
                    std::fs::remove_file(path).map_err(|e| IpcError::Bind(path.to_path_buf(), e))?;
                }
            }
        }

        let listener =
            UnixListener::bind(path).map_err(|e| IpcError::Bind(path.to_path_buf(), e))?;

        Ok(Self {
            listener,
            socket_path: path.to_path_buf(),
            _marker: PhantomData,
        })
    }

    pub async fn accept(&self) -> Result<IpcConnection<Req, Resp>, IpcError> {
        let (stream, _) = self
            .listener
            .accept()
            .await
            .map_err(|e| IpcError::Accept(e))?;
        Ok(IpcConnection {
            stream: BufReader::new(stream),
            _marker: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.socket_path
    }
}

impl<Req, Resp> Drop for IpcServer<Req, Resp> {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

/// A single accepted connection. A connection may carry more than one
/// request (the daemon control socket is long-lived per CLI invocation).
pub struct IpcConnection<Req, Resp> {
    stream: BufReader<UnixStream>,
    _marker: PhantomData<(Req, Resp)>,
}

impl<Req, Resp> IpcConnection<Req, Resp>
where
    Req: DeserializeOwned,
    Resp: Serialize,
{
    pub async fn recv(&mut self) -> Result<Req, IpcError> {
        read_line(&mut self.stream).await
    }

    pub async fn send(&mut self, resp: &Resp) -> Result<(), IpcError> {
        write_line(self.stream.get_mut(), resp).await
    }

    pub fn get_ref(&self) -> &UnixStream {
        self.stream.get_ref()
    }

    pub fn into_inner(self) -> UnixStream {
        self.stream.into_inner()
    }
}

async fn write_line<T: Serialize>(stream: &mut UnixStream, value: &T) -> Result<(), IpcError> {
    let mut json = serde_json::to_string(value).map_err(IpcError::Encode)?;
    json.push('\n');
    stream
        .write_all(json.as_bytes())
        .await
        .map_err(IpcError::Io)?;
    stream.flush().await.map_err(IpcError::Io)
}

async fn read_line<T: DeserializeOwned>(
    stream: &mut BufReader<UnixStream>,
) -> Result<T, IpcError> {
    let mut line = String::new();
    let n = stream.read_line(&mut line).await.map_err(IpcError::Io)?;
    if n == 0 {
        return Err(IpcError::ConnectionClosed);
    }
    serde_json::from_str(&line).map_err(IpcError::Decode)
}
