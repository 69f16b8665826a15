//! Privileged helper daemon (§4.1). Root-owned; listens on a world-writable
//! Unix socket and performs the handful of operations that require
//! privilege: TUN creation, interface/route configuration, and `/etc/hosts`
//! mutation.

mod hosts;
mod tun_ops;

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use hopbox_ipc::IpcServer;
use hopbox_proto::{HelperRequest, HelperResponse};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "hopbox-helper", about = "Hopbox privileged helper daemon")]
struct Args {
    /// Unix socket path to listen on.
    #[arg(long, env = "HOPBOX_HELPER_SOCKET")]
    socket: Option<PathBuf>,

    /// Path to the hosts file to mutate (overridable for testing).
    #[arg(long, env = "HOPBOX_HOSTS_FILE", default_value = "/etc/hosts")]
    hosts_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let socket_path = args
        .socket
        .unwrap_or_else(hopbox_proto::paths::helper_socket_path);

    let server = IpcServer::<HelperRequest, HelperResponse>::bind(&socket_path).await?;
    std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o666))?;
    info!(path = %socket_path.display(), "helper listening");

    let hosts_lock = Arc::new(Mutex::new(()));
    let hosts_file = Arc::new(args.hosts_file);

    loop {
        let mut conn = match server.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("accept error: {e}");
                continue;
            }
        };

        let hosts_lock = hosts_lock.clone();
        let hosts_file = hosts_file.clone();

        tokio::spawn(async move {
            let request = match conn.recv().await {
                Ok(req) => req,
                Err(e) => {
                    warn!("failed to read request: {e}");
                    return;
                }
            };

            match request {
                HelperRequest::CreateTun { mtu } => {
                    match tun_ops::create_tun(mtu) {
                        Ok((interface, fd, device)) => {
                            let response = HelperResponse::ok_with_interface(interface);
                            let json = match serde_json::to_vec(&response) {
                                Ok(j) => j,
                                Err(e) => {
                                    warn!("failed to encode create_tun response: {e}");
                                    return;
                                }
                            };
                            let stream = conn.into_inner();
                            if let Err(e) = hopbox_ipc::send_with_fd(&stream, &json, fd).await {
                                warn!("failed to send tun fd: {e}");
                            }
                            drop(device);
                        }
                        Err(e) => {
                            let response = HelperResponse::err(e.to_string());
                            let _ = conn.send(&response).await;
                        }
                    }
                }
                HelperRequest::ConfigureTun {
                    interface,
                    local_address,
                    peer_network,
                } => {
                    let response = match tun_ops::configure_tun(&interface, &local_address, &peer_network) {
                        Ok(()) => HelperResponse::ok(),
                        Err(e) => HelperResponse::err(e.to_string()),
                    };
                    let _ = conn.send(&response).await;
                }
                HelperRequest::CleanupTun { interface } => {
                    let response = match tun_ops::cleanup_tun(&interface) {
                        Ok(()) => HelperResponse::ok(),
                        Err(e) => HelperResponse::err(e.to_string()),
                    };
                    let _ = conn.send(&response).await;
                }
                HelperRequest::AddHost { ip, hostname } => {
                    let response = mutate_hosts(&hosts_lock, &hosts_file, |contents| {
                        hosts::add_host(contents, &ip, &hostname)
                    })
                    .await;
                    let _ = conn.send(&response).await;
                }
                HelperRequest::RemoveHost { hostname } => {
                    let response = mutate_hosts(&hosts_lock, &hosts_file, |contents| {
                        hosts::remove_host(contents, &hostname)
                    })
                    .await;
                    let _ = conn.send(&response).await;
                }
            }
        });
    }
}

async fn mutate_hosts(
    lock: &Mutex<()>,
    path: &PathBuf,
    mutate: impl FnOnce(&str) -> String,
) -> HelperResponse {
    let _guard = lock.lock().await;
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) => return HelperResponse::err(format!("failed to read {}: {e}", path.display())),
    };
    let updated = mutate(&contents);
    match tokio::fs::write(path, updated).await {
        Ok(()) => HelperResponse::ok(),
        Err(e) => HelperResponse::err(format!("failed to write {}: {e}", path.display())),
    }
}
