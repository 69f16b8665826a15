//! Dynamic port forwarder: a polling reconciler that mirrors the remote
//! host's listening TCP ports onto local proxies (§4.4).

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePort {
    pub port: u16,
    pub program: String,
}

/// Supplies the current remote listening-port set. The agent's
/// `ports.list` RPC backs the production implementation; tests substitute
/// a canned source.
#[async_trait]
pub trait RemotePortSource: Send + Sync {
    async fn list(&self) -> anyhow::Result<Vec<RemotePort>>;
}

struct ProxyHandle {
    program: String,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

pub struct ForwarderConfig {
    pub remote_host: String,
    pub poll_interval: Duration,
    pub excluded_ports: HashSet<u16>,
}

impl ForwarderConfig {
    pub fn new(remote_host: String, ssh_port: u16, tunnel_udp_port: u16, agent_control_port: u16) -> Self {
        let mut excluded_ports = HashSet::new();
        excluded_ports.insert(ssh_port);
        excluded_ports.insert(tunnel_udp_port);
        excluded_ports.insert(agent_control_port);
        Self {
            remote_host,
            poll_interval: Duration::from_secs(3),
            excluded_ports,
        }
    }
}

pub struct PortForwarder {
    config: ForwarderConfig,
    source: Box<dyn RemotePortSource>,
    proxies: HashMap<u16, ProxyHandle>,
}

impl PortForwarder {
    pub fn new(config: ForwarderConfig, source: Box<dyn RemotePortSource>) -> Self {
        Self {
            config,
            source,
            proxies: HashMap::new(),
        }
    }

    pub fn forwarded_ports(&self) -> Vec<hopbox_proto::ForwardedPort> {
        self.proxies
            .iter()
            .map(|(port, handle)| hopbox_proto::ForwardedPort {
                port: *port,
                program: handle.program.clone(),
            })
            .collect()
    }

    /// Runs the reconciler until `ctx` is cancelled, then stops every proxy.
    pub async fn run(&mut self, ctx: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = interval.tick() => self.reconcile().await,
            }
        }
        self.stop_all().await;
    }

    async fn reconcile(&mut self) {
        let remote = match self.source.list().await {
            Ok(ports) => ports,
            Err(e) => {
                debug!("skipping forwarder tick: failed to list remote ports: {e}");
                return;
            }
        };

        let remote: HashMap<u16, String> = remote
            .into_iter()
            .filter(|p| !self.config.excluded_ports.contains(&p.port))
            .map(|p| (p.port, p.program))
            .collect();

        let stale: Vec<u16> = self
            .proxies
            .keys()
            .copied()
            .filter(|port| !remote.contains_key(port))
            .collect();
        for port in stale {
            if let Some(handle) = self.proxies.remove(&port) {
                handle.cancel.cancel();
                let _ = handle.task.await;
                debug!(port, "unforwarded");
            }
        }

        for (port, program) in &remote {
            if let Some(handle) = self.proxies.get_mut(port) {
                handle.program = program.clone();
                continue;
            }

            match TcpListener::bind(("127.0.0.1", *port)).await {
                Ok(listener) => {
                    let cancel = CancellationToken::new();
                    let remote_host = self.config.remote_host.clone();
                    let port_value = *port;
                    let task_cancel = cancel.clone();
                    let task = tokio::spawn(async move {
                        accept_loop(listener, remote_host, port_value, task_cancel).await;
                    });
                    self.proxies.insert(
                        *port,
                        ProxyHandle {
                            program: program.clone(),
                            cancel,
                            task,
                        },
                    );
                    debug!(port, "forwarded");
                }
                Err(e) => {
                    debug!(port, "local bind failed, will retry next tick: {e}");
                }
            }
        }
    }

    async fn stop_all(&mut self) {
        for (_, handle) in self.proxies.drain() {
            handle.cancel.cancel();
            let _ = handle.task.await;
        }
    }
}

async fn accept_loop(listener: TcpListener, remote_host: String, port: u16, ctx: CancellationToken) {
    loop {
        tokio::select! {
            _ = ctx.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((local, _)) => {
                        let remote_host = remote_host.clone();
                        tokio::spawn(async move { splice(local, remote_host, port).await; });
                    }
                    Err(e) => warn!(port, "forwarder accept error: {e}"),
                }
            }
        }
    }
}

async fn splice(mut local: TcpStream, remote_host: String, port: u16) {
    let remote_addr: SocketAddr = match format!("{remote_host}:{port}").parse() {
        Ok(addr) => addr,
        Err(_) => match tokio::net::lookup_host((remote_host.as_str(), port)).await {
            Ok(mut addrs) => match addrs.next() {
                Some(addr) => addr,
                None => return,
            },
            Err(e) => {
                warn!(port, "failed to resolve {remote_host}: {e}");
                return;
            }
        },
    };

    let mut remote = match TcpStream::connect(remote_addr).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(port, "failed to connect to {remote_addr}: {e}");
            return;
        }
    };

    if let Err(e) = tokio::io::copy_bidirectional(&mut local, &mut remote).await {
        debug!(port, "forwarder splice ended: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticSource(Vec<RemotePort>);

    #[async_trait]
    impl RemotePortSource for StaticSource {
        async fn list(&self) -> anyhow::Result<Vec<RemotePort>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn excluded_ports_are_never_forwarded() {
        let config = ForwarderConfig::new("127.0.0.1".to_string(), 22, 51820, 4200);
        let source = Box::new(StaticSource(vec![RemotePort {
            port: 22,
            program: "sshd".to_string(),
        }]));
        let mut forwarder = PortForwarder::new(config, source);
        forwarder.reconcile().await;
        assert!(forwarder.proxies.is_empty());
    }
}
