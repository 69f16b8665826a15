//! Remote agent binary (§4.6, §4.7): terminates the tunnel on the kernel
//! side and serves the HTTP control plane. Runs detached on the remote
//! host; the interface itself is expected to already exist (platform
//! install scripts, out of scope per §1) — this process only configures
//! its crypto and peer over the UAPI socket.

mod backend;
mod error;
mod http;
mod logging;
mod logs;
mod packages;
mod ports;
mod scripts;
mod snapshot;
mod supervisor;
mod workspace;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use hopbox_proto::cidr::CidrAddr;
use hopbox_proto::manifest::Manifest;
use hopbox_proto::tunnel_config::{build_server_ipc, TunnelConfig, DEFAULT_MTU};
use hopbox_tunnel::{KernelTunnel, Tunnel};
use tracing::{error, info, warn};

use http::{AgentConfig, AppState};

#[derive(Parser, Debug)]
#[command(name = "hopbox-agent", about = "Remote control plane for a hopbox workspace")]
struct Args {
    /// Interface name the tunnel has already been brought up on (e.g. `wg-hopbox`).
    #[arg(long, default_value = "wg-hopbox")]
    interface: String,

    /// This host's private key, lowercase hex.
    #[arg(long, env = "HOPBOX_PRIVATE_KEY_HEX")]
    private_key_hex: String,

    /// Client's public key, lowercase hex.
    #[arg(long, env = "HOPBOX_PEER_PUBLIC_KEY_HEX")]
    peer_public_key_hex: String,

    /// This host's tunnel address, e.g. `10.10.0.2/24` (server defaults to `.2`).
    #[arg(long, default_value = "10.10.0.2/24")]
    local_address: String,

    /// Client's allowed address inside the tunnel, e.g. `10.10.0.1/24`.
    #[arg(long, default_value = "10.10.0.1/24")]
    peer_address: String,

    /// UDP port this side listens on.
    #[arg(long, default_value_t = 51820)]
    listen_port: u16,

    #[arg(long, default_value_t = DEFAULT_MTU)]
    mtu: u16,

    /// Port the HTTP control plane binds on top of the tunnel address.
    #[arg(long, default_value_t = 4200)]
    control_port: u16,

    /// Path to the workspace manifest this agent was last synced with.
    #[arg(long, default_value = "/etc/hopbox/hopbox.yaml")]
    manifest_path: PathBuf,

    /// Directory native-service logs are appended to.
    #[arg(long, default_value = "/var/log/hopbox")]
    log_dir: PathBuf,

    /// Container runtime binary name (`docker`, `podman`, ...).
    #[arg(long, default_value = "docker")]
    container_runtime: String,

    /// Path this process writes its own log file to.
    #[arg(long, default_value = "/var/log/hopbox/agent.log")]
    agent_log_path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = logging::init(&args.agent_log_path)?;

    if let Err(e) = run(args).await {
        error!("agent exiting with error: {e}");
        return Err(e);
    }
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    let local_address: CidrAddr = args.local_address.parse().map_err(|e| anyhow::anyhow!("bad --local-address: {e}"))?;
    let peer_address: CidrAddr = args.peer_address.parse().map_err(|e| anyhow::anyhow!("bad --peer-address: {e}"))?;

    let tunnel_config = TunnelConfig {
        local_private_key_hex: args.private_key_hex.clone(),
        peer_public_key_hex: args.peer_public_key_hex.clone(),
        local_address,
        peer_allowed_address: peer_address,
        endpoint: None,
        listen_port: args.listen_port,
        mtu: args.mtu,
        persistent_keepalive_interval: 0,
    };
    if !tunnel_config.is_server() {
        anyhow::bail!("agent tunnel config must have a listen_port and no endpoint (server role)");
    }
    let ipc_text = build_server_ipc(&tunnel_config);

    let mut tunnel = KernelTunnel::new(args.interface.clone(), ipc_text);
    let tunnel_up = match tunnel.up().await {
        Ok(()) => {
            info!(interface = %args.interface, "tunnel configured");
            true
        }
        Err(e) => {
            warn!("failed to configure tunnel over UAPI socket: {e} (serving control plane regardless)");
            false
        }
    };

    let manifest = match tokio::fs::read_to_string(&args.manifest_path).await {
        Ok(text) => Manifest::from_yaml(&text).unwrap_or_else(|e| {
            warn!("existing manifest at {} is invalid, starting empty: {e}", args.manifest_path.display());
            Manifest::default()
        }),
        Err(_) => Manifest::default(),
    };

    let state = Arc::new(AppState {
        workspace: workspace::WorkspaceStore::new(manifest, args.log_dir.clone(), args.container_runtime.clone()),
        config: AgentConfig {
            manifest_path: args.manifest_path.clone(),
            log_dir: args.log_dir.clone(),
            container_runtime: args.container_runtime.clone(),
            local_ip: local_addr_only(&args.local_address),
        },
        package_installer: packages::PackageInstaller::default(),
        snapshot_tool: snapshot::SnapshotTool::new("hopbox-snapshot"),
        tunnel_up: AtomicBool::new(tunnel_up),
    });

    if let Some(supervisor) = state.workspace.current().await.supervisor.clone() {
        info!("starting services from the manifest loaded at boot");
        if let Err(e) = supervisor.start_all().await {
            error!("initial service start failed: {e}");
        }
    }

    let bind_addr = format!("{}:{}", local_addr_only(&args.local_address), args.control_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(%bind_addr, "agent control plane listening");

    let router = http::router(state);
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("http server error: {e}");
        }
    });

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sighup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT, shutting down"),
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = async { loop { sighup.recv().await; info!("ignoring SIGHUP, agent survives terminal detachment"); } } => {}
        _ = server => info!("http server task ended"),
    }

    tunnel.down().await.ok();
    Ok(())
}

fn local_addr_only(cidr: &str) -> String {
    cidr.split('/').next().unwrap_or(cidr).to_string()
}
