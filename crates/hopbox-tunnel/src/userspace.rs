//! Userspace WireGuard backend built on `boringtun`.
//!
//! Three tasks run for the life of the tunnel, mirroring the read-loop /
//! write-loop / timer-tick split used by every other duplex transport in
//! this workspace: one shuttles plaintext packets from the TUN device to the
//! peer, one shuttles ciphertext from the peer back into the TUN device, and
//! a third drives boringtun's internal handshake/keepalive timers.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use boringtun::noise::{Tunn, TunnResult};
use tokio::net::UdpSocket;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::device::AsyncTunDevice;
use crate::error::TunnelError;
use crate::tunnel::{Tunnel, TunnelStatus};

const MAX_PACKET: usize = 65536;
const TIMER_TICK: Duration = Duration::from_millis(250);

/// Per-direction byte counters the daemon/agent report through `Status()`.
/// `boringtun::noise::Tunn` tracks handshake timing internally but not
/// cumulative traffic, so this backend keeps its own counters the same way
/// the kernel backend gets them for free from the UAPI `get=1` response.
#[derive(Default)]
struct Counters {
    tx_bytes: AtomicU64,
    rx_bytes: AtomicU64,
}

pub struct UserspaceTunnel {
    interface: String,
    device: Arc<AsyncTunDevice>,
    socket: Arc<UdpSocket>,
    tunn: Arc<Mutex<Tunn>>,
    endpoint: Arc<Mutex<Option<SocketAddr>>>,
    counters: Arc<Counters>,
    ready_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl UserspaceTunnel {
    pub fn new(
        interface: String,
        device: AsyncTunDevice,
        socket: UdpSocket,
        private_key: &[u8; 32],
        peer_public_key: &[u8; 32],
        endpoint: Option<SocketAddr>,
        persistent_keepalive: Option<u16>,
    ) -> Result<Self, TunnelError> {
        let tunn = Tunn::new(
            StaticSecret::from(*private_key),
            PublicKey::from(*peer_public_key),
            None,
            persistent_keepalive,
            0,
            None,
        )
        .map_err(|e| TunnelError::Crypto(e.to_string()))?;

        let (ready_tx, _) = watch::channel(false);

        Ok(Self {
            interface,
            device: Arc::new(device),
            socket: Arc::new(socket),
            tunn: Arc::new(Mutex::new(tunn)),
            endpoint: Arc::new(Mutex::new(endpoint)),
            counters: Arc::new(Counters::default()),
            ready_tx,
            tasks: Vec::new(),
        })
    }

    async fn send_to_peer(
        socket: &UdpSocket,
        endpoint: &Mutex<Option<SocketAddr>>,
        counters: &Counters,
        buf: &[u8],
    ) -> Result<(), TunnelError> {
        let addr = endpoint.lock().await.ok_or(TunnelError::NoEndpoint)?;
        socket
            .send_to(buf, addr)
            .await
            .map_err(TunnelError::UdpIo)?;
        counters.tx_bytes.fetch_add(buf.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn tun_to_peer_task(
        device: Arc<AsyncTunDevice>,
        socket: Arc<UdpSocket>,
        tunn: Arc<Mutex<Tunn>>,
        endpoint: Arc<Mutex<Option<SocketAddr>>>,
        counters: Arc<Counters>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut src = [0u8; MAX_PACKET];
            let mut dst = [0u8; MAX_PACKET];
            loop {
                let n = match device.read(&mut src).await {
                    Ok(n) => n,
                    Err(e) => {
                        warn!("tun read error: {e}");
                        break;
                    }
                };

                let mut tunn = tunn.lock().await;
                match tunn.encapsulate(&src[..n], &mut dst) {
                    TunnResult::WriteToNetwork(packet) => {
                        drop(tunn);
                        if let Err(e) = Self::send_to_peer(&socket, &endpoint, &counters, packet).await {
                            warn!("failed sending encapsulated packet: {e}");
                        }
                    }
                    TunnResult::Done => {}
                    TunnResult::Err(e) => warn!("encapsulation error: {e:?}"),
                    _ => {}
                }
            }
        })
    }

    fn peer_to_tun_task(
        device: Arc<AsyncTunDevice>,
        socket: Arc<UdpSocket>,
        tunn: Arc<Mutex<Tunn>>,
        endpoint: Arc<Mutex<Option<SocketAddr>>>,
        counters: Arc<Counters>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut src = [0u8; MAX_PACKET];
            let mut dst = [0u8; MAX_PACKET];
            loop {
                let (n, from) = match socket.recv_from(&mut src).await {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("udp recv error: {e}");
                        break;
                    }
                };
                counters.rx_bytes.fetch_add(n as u64, Ordering::Relaxed);

                let mut tunn = tunn.lock().await;
                match tunn.decapsulate(None, &src[..n], &mut dst) {
                    TunnResult::WriteToTunnelV4(packet, _) | TunnResult::WriteToTunnelV6(packet, _) => {
                        *endpoint.lock().await = Some(from);
                        if let Err(e) = device.write(packet).await {
                            warn!("tun write error: {e}");
                        }
                    }
                    TunnResult::WriteToNetwork(packet) => {
                        *endpoint.lock().await = Some(from);
                        let mut queued = packet.to_vec();
                        loop {
                            if let Err(e) = socket.send_to(&queued, from).await {
                                warn!("failed flushing handshake response: {e}");
                                break;
                            }
                            counters.tx_bytes.fetch_add(queued.len() as u64, Ordering::Relaxed);
                            let mut more = [0u8; MAX_PACKET];
                            match tunn.decapsulate(None, &[], &mut more) {
                                TunnResult::WriteToNetwork(p) => queued = p.to_vec(),
                                _ => break,
                            }
                        }
                    }
                    TunnResult::Done => {}
                    TunnResult::Err(e) => trace!("decapsulation error: {e:?}"),
                }
            }
        })
    }

    fn timer_task(
        socket: Arc<UdpSocket>,
        tunn: Arc<Mutex<Tunn>>,
        endpoint: Arc<Mutex<Option<SocketAddr>>>,
        counters: Arc<Counters>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TIMER_TICK);
            let mut dst = [0u8; MAX_PACKET];
            loop {
                interval.tick().await;
                let mut tunn = tunn.lock().await;
                if let TunnResult::WriteToNetwork(packet) = tunn.update_timers(&mut dst) {
                    if let Some(addr) = *endpoint.lock().await {
                        drop(tunn);
                        match socket.send_to(packet, addr).await {
                            Ok(_) => {
                                counters.tx_bytes.fetch_add(packet.len() as u64, Ordering::Relaxed);
                            }
                            Err(e) => debug!("timer packet send failed: {e}"),
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl Tunnel for UserspaceTunnel {
    async fn up(&mut self) -> Result<(), TunnelError> {
        self.tasks.push(Self::tun_to_peer_task(
            self.device.clone(),
            self.socket.clone(),
            self.tunn.clone(),
            self.endpoint.clone(),
            self.counters.clone(),
        ));
        self.tasks.push(Self::peer_to_tun_task(
            self.device.clone(),
            self.socket.clone(),
            self.tunn.clone(),
            self.endpoint.clone(),
            self.counters.clone(),
        ));
        self.tasks.push(Self::timer_task(
            self.socket.clone(),
            self.tunn.clone(),
            self.endpoint.clone(),
            self.counters.clone(),
        ));
        // The device is up and Dial-safe as soon as its tasks are running;
        // waiters don't need to block on a completed handshake to use the
        // tunnel's address space, only on the read/write loops existing.
        let _ = self.ready_tx.send(true);
        Ok(())
    }

    async fn down(&mut self) -> Result<(), TunnelError> {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        let _ = self.ready_tx.send(false);
        Ok(())
    }

    async fn status(&self) -> TunnelStatus {
        let last_handshake_time_secs = self
            .tunn
            .lock()
            .await
            .time_since_last_handshake()
            .and_then(|age| SystemTime::now().checked_sub(age))
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        TunnelStatus {
            up: !self.tasks.is_empty(),
            interface: self.interface.clone(),
            last_handshake_time_secs,
            tx_bytes: self.counters.tx_bytes.load(Ordering::Relaxed),
            rx_bytes: self.counters.rx_bytes.load(Ordering::Relaxed),
            endpoint: self.endpoint.lock().await.map(|addr| addr.to_string()),
        }
    }

    fn interface_name(&self) -> &str {
        &self.interface
    }

    fn ready(&self) -> watch::Receiver<bool> {
        self.ready_tx.subscribe()
    }
}
