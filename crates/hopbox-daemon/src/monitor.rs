//! Connectivity monitor: polls the agent's `/health` endpoint over the
//! tunnel and tracks the Connected/Disconnected state machine (§4.3 step 4,
//! §8 property 5).

use std::time::Duration;

use chrono::Utc;
use hopbox_proto::{ConnectivityEvent, ConnectivityState};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct MonitorConfig {
    pub health_url: String,
    pub interval: Duration,
    pub request_timeout: Duration,
    pub fail_threshold: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            health_url: String::new(),
            interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(3),
            fail_threshold: 2,
        }
    }
}

/// Runs until `ctx` is cancelled. Emits a state-change event on every
/// Connected<->Disconnected transition and publishes the last-healthy
/// timestamp on `last_healthy`.
pub async fn run(
    config: MonitorConfig,
    client: reqwest::Client,
    ctx: CancellationToken,
    events: mpsc::Sender<ConnectivityEvent>,
    last_healthy: watch::Sender<Option<String>>,
) {
    let mut state = ConnectivityState::Connected;
    let mut down_since = None;
    let mut consecutive_failures = 0u32;
    let mut interval = tokio::time::interval(config.interval);

    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                debug!("connectivity monitor shutting down");
                break;
            }
            _ = interval.tick() => {
                let success = probe(&client, &config.health_url, config.request_timeout).await;
                let now = Utc::now();

                match (state, success) {
                    (ConnectivityState::Connected, true) => {
                        consecutive_failures = 0;
                        let _ = last_healthy.send(Some(now.to_rfc3339()));
                    }
                    (ConnectivityState::Connected, false) => {
                        consecutive_failures += 1;
                        if consecutive_failures >= config.fail_threshold {
                            state = ConnectivityState::Disconnected;
                            down_since = Some(now);
                            warn!("connectivity lost after {consecutive_failures} consecutive failures");
                            let _ = events
                                .send(ConnectivityEvent { state, since: now, outage: None })
                                .await;
                        }
                    }
                    (ConnectivityState::Disconnected, true) => {
                        let outage = down_since.map(|since| now - since);
                        state = ConnectivityState::Connected;
                        consecutive_failures = 0;
                        info!(?outage, "connectivity restored");
                        let _ = events
                            .send(ConnectivityEvent { state, since: now, outage })
                            .await;
                        down_since = None;
                        let _ = last_healthy.send(Some(now.to_rfc3339()));
                    }
                    (ConnectivityState::Disconnected, false) => {}
                }
            }
        }
    }
}

async fn probe(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    match client.get(url).timeout(timeout).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transitions_to_disconnected_after_fail_threshold() {
        let config = MonitorConfig {
            health_url: "http://127.0.0.1:1/health".to_string(),
            interval: Duration::from_millis(10),
            request_timeout: Duration::from_millis(50),
            fail_threshold: 2,
        };
        let client = reqwest::Client::new();
        let ctx = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(8);
        let (healthy_tx, _healthy_rx) = watch::channel(None);

        let ctx_clone = ctx.clone();
        let handle = tokio::spawn(run(config, client, ctx_clone, tx, healthy_tx));

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("monitor should emit a disconnect event")
            .unwrap();
        assert_eq!(event.state, ConnectivityState::Disconnected);

        ctx.cancel();
        let _ = handle.await;
    }
}
