//! `SCM_RIGHTS` ancillary-data transfer: the privileged helper creates the
//! TUN device and hands the open file descriptor back to the unprivileged
//! caller over the same Unix socket the JSON response rides on (§4.1).
//!
//! Tokio's `UnixStream` has no `sendmsg`/`recvmsg` of its own, so these
//! helpers wait on its readiness (`writable`/`readable`) and then drive the
//! syscall through `nix` on the raw fd, retrying on `WouldBlock` the way
//! tokio's own `try_io` helpers do.

use std::io::{self, IoSlice, IoSliceMut};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use nix::sys::socket::{recvmsg, sendmsg, ControlMessage, ControlMessageOwned, MsgFlags};
use tokio::net::UnixStream;

/// Sends `payload` with `fd` attached as `SCM_RIGHTS` ancillary data.
pub async fn send_with_fd(stream: &UnixStream, payload: &[u8], fd: RawFd) -> io::Result<()> {
    loop {
        stream.writable().await?;
        match try_send(stream.as_raw_fd(), payload, fd) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e),
        }
    }
}

fn try_send(raw: RawFd, payload: &[u8], fd: RawFd) -> io::Result<()> {
    let iov = [IoSlice::new(payload)];
    let fds = [fd];
    let cmsg = [ControlMessage::ScmRights(&fds)];
    sendmsg::<()>(raw, &iov, &cmsg, MsgFlags::empty(), None)
        .map(|_| ())
        .map_err(nix_to_io)
}

/// Receives a datagram that may carry a single passed fd.
///
/// Returns the number of payload bytes read and the received fd, if any.
pub async fn recv_with_fd(stream: &UnixStream, buf: &mut [u8]) -> io::Result<(usize, Option<OwnedFd>)> {
    loop {
        stream.readable().await?;
        match try_recv(stream.as_raw_fd(), buf) {
            Ok(result) => return Ok(result),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e),
        }
    }
}

fn try_recv(raw: RawFd, buf: &mut [u8]) -> io::Result<(usize, Option<OwnedFd>)> {
    let mut iov = [IoSliceMut::new(buf)];
    let mut cmsg_buffer = nix::cmsg_space!([RawFd; 1]);
    let msg = recvmsg::<()>(raw, &mut iov, Some(&mut cmsg_buffer), MsgFlags::empty())
        .map_err(nix_to_io)?;

    let mut fd = None;
    for cmsg in msg.cmsgs() {
        if let ControlMessageOwned::ScmRights(fds) = cmsg {
            if let Some(&raw_fd) = fds.first() {
                fd = Some(unsafe { OwnedFd::from_raw_fd(raw_fd) });
            }
        }
    }

    Ok((msg.bytes, fd))
}

fn nix_to_io(e: nix::Error) -> io::Error {
    io::Error::from_raw_os_error(e as i32)
}
