//! HTTP client for the remote agent's control plane (§4.6), used here only
//! for the port forwarder's `ports.list` source. The monitor hits `/health`
//! directly with a plain GET and doesn't need this module.

use serde::Deserialize;

use hopbox_proto::rpc::{RpcRequest, RpcResponse};

use crate::forwarder::RemotePort;

#[derive(Debug, Deserialize)]
struct PortsListEntry {
    port: u16,
    program: String,
}

pub struct AgentClient {
    client: reqwest::Client,
    rpc_url: String,
}

impl AgentClient {
    pub fn new(client: reqwest::Client, peer_address: &str, control_port: u16) -> Self {
        Self {
            client,
            rpc_url: format!("http://{peer_address}:{control_port}/rpc"),
        }
    }
}

#[async_trait::async_trait]
impl crate::forwarder::RemotePortSource for AgentClient {
    async fn list(&self) -> anyhow::Result<Vec<RemotePort>> {
        let request = RpcRequest {
            method: "ports.list".to_string(),
            params: None,
        };
        let response: RpcResponse = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await?
            .json()
            .await?;

        if let Some(err) = response.error {
            anyhow::bail!("agent rejected ports.list: {}", err.message);
        }
        let entries: Vec<PortsListEntry> = serde_json::from_value(response.result.unwrap_or_default())?;
        Ok(entries
            .into_iter()
            .map(|e| RemotePort {
                port: e.port,
                program: e.program,
            })
            .collect())
    }
}
