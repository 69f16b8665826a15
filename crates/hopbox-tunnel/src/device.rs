//! Async read/write over a TUN file descriptor.
//!
//! The fd itself is created by the privileged helper (`hopbox-helper`,
//! which uses the `tun` crate for the ioctls) and handed to this process
//! over `SCM_RIGHTS`; from here it is just a file descriptor, so this
//! wraps it in tokio's `AsyncFd` and drives reads/writes through `nix`
//! rather than pulling in a second device-management dependency.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use tokio::io::unix::AsyncFd;

use crate::error::TunnelError;

pub struct AsyncTunDevice {
    inner: AsyncFd<OwnedFd>,
}

impl AsyncTunDevice {
    pub fn from_owned_fd(fd: OwnedFd) -> Result<Self, TunnelError> {
        let inner = AsyncFd::new(fd).map_err(TunnelError::DeviceIo)?;
        Ok(Self { inner })
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.inner.get_ref().as_raw_fd()
    }

    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, TunnelError> {
        loop {
            let mut guard = self.inner.readable().await.map_err(TunnelError::DeviceIo)?;
            match guard.try_io(|fd| {
                nix::unistd::read(fd.get_ref().as_raw_fd(), buf)
                    .map_err(|e| std::io::Error::from_raw_os_error(e as i32))
            }) {
                Ok(result) => return result.map_err(TunnelError::DeviceIo),
                Err(_would_block) => continue,
            }
        }
    }

    pub async fn write(&self, buf: &[u8]) -> Result<usize, TunnelError> {
        loop {
            let mut guard = self.inner.writable().await.map_err(TunnelError::DeviceIo)?;
            match guard.try_io(|fd| {
                nix::unistd::write(fd.get_ref().as_raw_fd(), buf)
                    .map_err(|e| std::io::Error::from_raw_os_error(e as i32))
            }) {
                Ok(result) => return result.map_err(TunnelError::DeviceIo),
                Err(_would_block) => continue,
            }
        }
    }
}
