//! TUN device lifecycle and interface/route configuration (§4.1).
//!
//! Address/route manipulation shells out to `ip` (Linux) — there is no
//! netlink crate in this stack, and shelling out matches how the daemon's
//! other native-process supervision already works.

use std::os::fd::{AsRawFd, RawFd};
use std::process::Command;

use thiserror::Error;
use tun::Device;

#[derive(Debug, Error)]
pub enum TunOpsError {
    #[error("failed to create tun device: {0}")]
    Create(std::io::Error),
    #[error("command {0} failed: {1}")]
    CommandFailed(String, String),
    #[error("failed to spawn {0}: {1}")]
    Spawn(String, std::io::Error),
}

/// Creates a TUN device with the given MTU. Returns the interface name, the
/// raw fd to hand off via `SCM_RIGHTS`, and the device itself (kept alive
/// until the fd has been sent — dropping it afterward closes the helper's
/// copy, which is fine: the client received an independent kernel dup).
pub fn create_tun(mtu: u16) -> Result<(String, RawFd, tun::platform::Device), TunOpsError> {
    let mut config = tun::Configuration::default();
    config.mtu(mtu as i32).up();

    let device = tun::create(&config).map_err(TunOpsError::Create)?;
    let name = device.name().to_string();
    let fd = device.as_raw_fd();

    Ok((name, fd, device))
}

pub fn configure_tun(
    interface: &str,
    local_address: &str,
    peer_network: &str,
) -> Result<(), TunOpsError> {
    run("ip", &["addr", "add", local_address, "dev", interface])?;
    run("ip", &["link", "set", "dev", interface, "up"])?;
    run(
        "ip",
        &["route", "add", peer_network, "dev", interface],
    )?;
    Ok(())
}

pub fn cleanup_tun(interface: &str) -> Result<(), TunOpsError> {
    run("ip", &["link", "delete", interface])?;
    Ok(())
}

fn run(program: &str, args: &[&str]) -> Result<(), TunOpsError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| TunOpsError::Spawn(program.to_string(), e))?;

    if !output.status.success() {
        return Err(TunOpsError::CommandFailed(
            format!("{program} {}", args.join(" ")),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }

    Ok(())
}
