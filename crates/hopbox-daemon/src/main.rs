//! Per-host connectivity supervisor binary (§4.3). One process per host,
//! named `hopbox-daemon --host <name>`, normally launched detached by the
//! CLI and left running until `hop down` or a `shutdown` control request.

mod agent_client;
mod control;
mod error;
mod forwarder;
mod helper_client;
mod logging;
mod monitor;
mod state;

use std::net::SocketAddr;
use std::os::fd::OwnedFd;
use std::time::Duration;

use clap::Parser;
use hopbox_proto::{paths, DaemonState, HelperRequest, HostRecord};
use hopbox_tunnel::{AsyncTunDevice, Tunnel, UserspaceTunnel};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use error::DaemonError;

const AGENT_CONTROL_PORT: u16 = 4200;
const TUNNEL_UDP_PORT: u16 = 51820;
const DEFAULT_MTU: u16 = 1420;

#[derive(Parser, Debug)]
#[command(name = "hopbox-daemon")]
#[command(about = "Connectivity supervisor for one hopbox host", long_about = None)]
struct Args {
    /// Name of the host record to bring up (`<user-config-dir>/hosts/<host>.yaml`).
    #[arg(long)]
    host: String,

    /// TUN device MTU requested from the privileged helper.
    #[arg(long, default_value_t = DEFAULT_MTU)]
    mtu: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_path = paths::daemon_log_path(&args.host);
    let _log_guard = logging::init(&args.host, &log_path)?;

    if let Err(e) = run(args).await {
        error!("daemon exiting with error: {e}");
        return Err(e.into());
    }
    Ok(())
}

async fn run(args: Args) -> Result<(), DaemonError> {
    let host = args.host;
    hopbox_proto::validate_host_name(&host)
        .map_err(|e| DaemonError::State(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())))?;
    let record = load_host_record(&host)?;

    // Drop a leftover state file from a crashed daemon before claiming this
    // host: a live record here means another daemon already owns it.
    let state_path = paths::daemon_state_path(&host);
    if let Some(existing) = state::load_if_live(&state_path).await? {
        return Err(DaemonError::State(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("daemon for {host} is already running (pid {})", existing.pid),
        )));
    }

    let helper_socket = paths::helper_socket_path();
    info!(%host, "requesting tun device from helper");
    let (interface, tun_fd): (String, OwnedFd) = helper_client::create_tun(&helper_socket, args.mtu).await?;

    let local_address: hopbox_proto::cidr::CidrAddr = record
        .local_address
        .parse()
        .map_err(|_| DaemonError::State(std::io::Error::new(std::io::ErrorKind::InvalidData, "bad local_address in host record")))?;

    let tunnel = build_userspace_tunnel(&interface, tun_fd, &record).await?;
    let mut tunnel: Box<dyn Tunnel> = Box::new(tunnel);
    let mut ready = tunnel.ready();
    tunnel.up().await?;

    // Ready happens-before the first user of the tunnel's address space
    // (§5): wait for the device to report itself Dial-safe before asking
    // the helper to configure the interface and route.
    if !*ready.borrow() {
        ready.changed().await.map_err(|_| {
            DaemonError::State(std::io::Error::new(std::io::ErrorKind::Other, "tunnel dropped before becoming ready"))
        })?;
    }
    info!(%host, %interface, "tunnel is up");

    let peer_network = format!("{}/{}", record.peer_address, local_address.prefix);
    if let Err(e) = expect_ok(
        &helper_socket,
        HelperRequest::ConfigureTun {
            interface: interface.clone(),
            local_address: record.local_address.clone(),
            peer_network: peer_network.clone(),
        },
    )
    .await
    {
        tunnel.down().await.ok();
        return Err(e.into());
    }

    let hop_hostname = format!("{host}.hop");
    if let Err(e) = expect_ok(
        &helper_socket,
        HelperRequest::AddHost {
            ip: record.peer_address.clone(),
            hostname: hop_hostname.clone(),
        },
    )
    .await
    {
        warn!("failed to add hosts entry for {hop_hostname}: {e}");
    }

    let started_at = chrono::Utc::now().to_rfc3339();
    let initial_state = DaemonState {
        pid: std::process::id(),
        host: host.clone(),
        interface: interface.clone(),
        started_at: started_at.clone(),
        connected: true,
        last_healthy: None,
        forwarded_ports: Vec::new(),
    };
    state::write_atomic(&state_path, &initial_state).await?;

    let ctx = CancellationToken::new();
    let shutdown = CancellationToken::new();

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("reqwest client builds with no custom TLS config");

    let (health_tx, mut health_rx) = mpsc::channel(16);
    let (last_healthy_tx, last_healthy_rx) = watch::channel(None);
    let monitor_config = monitor::MonitorConfig {
        health_url: format!("http://{}:{AGENT_CONTROL_PORT}/health", record.peer_address),
        ..Default::default()
    };
    let monitor_ctx = ctx.clone();
    let monitor_client = http_client.clone();
    let monitor_handle = tokio::spawn(monitor::run(monitor_config, monitor_client, monitor_ctx, health_tx, last_healthy_tx));

    let source = Box::new(agent_client::AgentClient::new(http_client, &record.peer_address, AGENT_CONTROL_PORT));
    let forwarder_config = forwarder::ForwarderConfig::new(record.peer_address.clone(), record.ssh_port, TUNNEL_UDP_PORT, AGENT_CONTROL_PORT);
    let mut port_forwarder = forwarder::PortForwarder::new(forwarder_config, source);
    let forwarder_ctx = ctx.clone();
    let forwarder_handle = tokio::spawn(async move {
        port_forwarder.run(forwarder_ctx).await;
    });

    let bridges: Vec<std::sync::Arc<dyn hopbox_bridges::Bridge>> = vec![
        std::sync::Arc::new(hopbox_bridges::UrlOpenBridge::new()),
        std::sync::Arc::new(hopbox_bridges::NotificationBridge::new()),
        std::sync::Arc::new(hopbox_bridges::ClipboardBridge::new()),
        std::sync::Arc::new(hopbox_bridges::DevToolsBridge::new(9222)),
    ];
    let mut bridge_handles = Vec::new();
    let mut bridge_names = Vec::new();
    for bridge in bridges {
        let bridge_ctx = ctx.clone();
        bridge_names.push(bridge.name().to_string());
        bridge_handles.push(tokio::spawn(async move {
            if let Err(e) = bridge.start(bridge_ctx).await {
                warn!(bridge = bridge.name(), "bridge exited with error: {e}");
            }
        }));
    }

    let (snapshot_tx, snapshot_rx) = watch::channel(hopbox_proto::ControlStateView {
        pid: std::process::id(),
        connected: true,
        last_healthy: None,
        interface: interface.clone(),
        started_at: started_at.clone(),
        bridges: bridge_names,
    });
    let control_socket = paths::control_socket_path(&host);
    let control_ctx = ctx.clone();
    let control_shutdown = shutdown.clone();
    let control_path = control_socket.clone();
    let control_handle = tokio::spawn(async move { control::serve(&control_path, snapshot_rx, control_shutdown, control_ctx).await });

    info!(%host, "daemon ready, serving control socket at {}", control_socket.display());

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(DaemonError::State)?;
    let mut sighup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
        .map_err(DaemonError::State)?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received SIGINT, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }
            _ = sighup.recv() => {
                info!("ignoring SIGHUP, daemon survives terminal detachment");
                continue;
            }
            _ = shutdown.cancelled() => {
                info!("shutdown requested over control socket");
                break;
            }
            Some(event) = health_rx.recv() => {
                let now_healthy = last_healthy_rx.borrow().clone();
                let connected = matches!(event.state, hopbox_proto::ConnectivityState::Connected);
                let _ = snapshot_tx.send(hopbox_proto::ControlStateView {
                    pid: std::process::id(),
                    connected,
                    last_healthy: now_healthy,
                    interface: interface.clone(),
                    started_at: started_at.clone(),
                    bridges: snapshot_tx.borrow().bridges.clone(),
                });
                if let Some(outage) = event.outage {
                    info!(%host, outage_secs = outage.num_seconds(), "connectivity restored");
                } else if !connected {
                    warn!(%host, "connectivity lost");
                }
            }
        }
    }

    ctx.cancel();
    let _ = monitor_handle.await;
    let _ = forwarder_handle.await;
    for handle in bridge_handles {
        let _ = handle.await;
    }
    let _ = control_handle.await;

    if let Err(e) = expect_ok(&helper_socket, HelperRequest::RemoveHost { hostname: hop_hostname }).await {
        warn!("failed to remove hosts entry during teardown (best-effort): {e}");
    }
    if let Err(e) = expect_ok(&helper_socket, HelperRequest::CleanupTun { interface: interface.clone() }).await {
        warn!("failed to clean up tun interface during teardown (best-effort): {e}");
    }
    tunnel.down().await.ok();
    state::remove(&state_path).await?;

    info!(%host, "daemon stopped");
    Ok(())
}

/// Sends a helper request and turns an application-level `{ok: false}`
/// response into an error, same as a transport failure would be.
async fn expect_ok(socket: &std::path::Path, request: HelperRequest) -> Result<(), DaemonError> {
    let response = helper_client::simple_request(socket, request).await?;
    if !response.ok {
        return Err(hopbox_ipc::IpcError::Protocol(response.error.unwrap_or_else(|| "helper request failed".to_string())).into());
    }
    Ok(())
}

fn load_host_record(host: &str) -> Result<HostRecord, DaemonError> {
    let path = paths::host_record_path(host);
    let text = std::fs::read_to_string(&path).map_err(DaemonError::State)?;
    HostRecord::from_yaml(&text)
        .map_err(|e| DaemonError::State(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())))
}

async fn build_userspace_tunnel(interface: &str, tun_fd: OwnedFd, record: &HostRecord) -> Result<UserspaceTunnel, DaemonError> {
    let device = AsyncTunDevice::from_owned_fd(tun_fd)?;

    let udp = UdpSocket::bind(("0.0.0.0", 0)).await.map_err(DaemonError::State)?;

    let endpoint: SocketAddr = match record.endpoint.parse() {
        Ok(addr) => addr,
        Err(_) => {
            let mut addrs = tokio::net::lookup_host(&record.endpoint).await.map_err(DaemonError::State)?;
            addrs.next().ok_or_else(|| {
                DaemonError::State(std::io::Error::new(std::io::ErrorKind::NotFound, format!("could not resolve endpoint {}", record.endpoint)))
            })?
        }
    };
    udp.connect(endpoint).await.map_err(DaemonError::State)?;

    let private_key = hopbox_proto::keys::decode_base64_key(&record.client_private_key)
        .map_err(|e| DaemonError::State(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())))?;
    let peer_public_key = hopbox_proto::keys::decode_base64_key(&record.peer_public_key)
        .map_err(|e| DaemonError::State(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())))?;

    let tunnel = UserspaceTunnel::new(
        interface.to_string(),
        device,
        udp,
        &private_key,
        &peer_public_key,
        Some(endpoint),
        Some(25),
    )?;

    Ok(tunnel)
}
