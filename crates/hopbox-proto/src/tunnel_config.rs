//! `TunnelConfig` and the newline-delimited `key=value` IPC text codec used
//! to program both the userspace and kernel tunnel backends (§4.2, §6).

use crate::cidr::CidrAddr;
use std::collections::HashMap;
use thiserror::Error;

/// Default MTU used when a `TunnelConfig` doesn't override it.
pub const DEFAULT_MTU: u16 = 1420;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfig {
    /// Local private key, lowercase hex (64 chars).
    pub local_private_key_hex: String,
    /// Peer public key, lowercase hex (64 chars).
    pub peer_public_key_hex: String,
    /// Local interface address with prefix length.
    pub local_address: CidrAddr,
    /// Peer's allowed address with prefix length.
    pub peer_allowed_address: CidrAddr,
    /// Remote UDP endpoint `host:port`. Present on client configs, absent on server configs.
    pub endpoint: Option<String>,
    /// Local UDP listen port. 0 means ephemeral. Present on server configs.
    pub listen_port: u16,
    pub mtu: u16,
    /// Persistent keepalive interval in seconds. 0 disables it.
    pub persistent_keepalive_interval: u16,
}

impl TunnelConfig {
    /// A config has an endpoint and no listen port when dialing out (client role).
    pub fn is_client(&self) -> bool {
        self.endpoint.is_some() && self.listen_port == 0
    }

    /// A config has a listen port and no endpoint when accepting connections (server role).
    pub fn is_server(&self) -> bool {
        self.endpoint.is_none() && self.listen_port != 0
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            local_private_key_hex: String::new(),
            peer_public_key_hex: String::new(),
            local_address: "10.10.0.1/24".parse().unwrap(),
            peer_allowed_address: "10.10.0.2/24".parse().unwrap(),
            endpoint: None,
            listen_port: 0,
            mtu: DEFAULT_MTU,
            persistent_keepalive_interval: 0,
        }
    }
}

/// Build the IPC text for a client config (dials out to `endpoint`, never emits `listen_port`).
///
/// Property 4: emits `listen_port` iff `listen_port > 0`; emits
/// `persistent_keepalive_interval` iff it is non-zero; emits `endpoint` iff
/// it is non-empty. A client config never emits `listen_port`.
pub fn build_client_ipc(config: &TunnelConfig) -> String {
    build_ipc(config, false)
}

/// Build the IPC text for a server config. Never emits `endpoint`.
pub fn build_server_ipc(config: &TunnelConfig) -> String {
    build_ipc(config, true)
}

fn build_ipc(config: &TunnelConfig, is_server: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!("private_key={}\n", config.local_private_key_hex));
    if is_server && config.listen_port > 0 {
        out.push_str(&format!("listen_port={}\n", config.listen_port));
    }
    out.push_str(&format!("public_key={}\n", config.peer_public_key_hex));
    out.push_str(&format!("allowed_ip={}\n", config.peer_allowed_address));
    if !is_server {
        if let Some(endpoint) = &config.endpoint {
            if !endpoint.is_empty() {
                out.push_str(&format!("endpoint={}\n", endpoint));
            }
        }
    }
    if config.persistent_keepalive_interval > 0 {
        out.push_str(&format!(
            "persistent_keepalive_interval={}\n",
            config.persistent_keepalive_interval
        ));
    }
    out
}

#[derive(Debug, Error)]
pub enum IpcTextError {
    #[error("malformed line (missing '='): {0:?}")]
    MalformedLine(String),
}

/// Parse a `key=value\n` stream into an ordered map, preserving the last value
/// seen per key (later lines override earlier ones, as with the real UAPI format).
pub fn parse_ipc_text(text: &str) -> Result<HashMap<String, String>, IpcTextError> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| IpcTextError::MalformedLine(line.to_string()))?;
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}

/// Status reported by `IpcGet`, parsed from the same `key=value` text format.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TunnelStatus {
    pub up: bool,
    /// Unix timestamp of the last handshake; 0 means never.
    pub last_handshake_time_secs: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub endpoint: Option<String>,
}

pub fn parse_ipc_status(text: &str) -> Result<TunnelStatus, IpcTextError> {
    let map = parse_ipc_text(text)?;
    Ok(TunnelStatus {
        up: map
            .get("up")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false),
        last_handshake_time_secs: map
            .get("last_handshake_time_sec")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        tx_bytes: map.get("tx_bytes").and_then(|v| v.parse().ok()).unwrap_or(0),
        rx_bytes: map.get("rx_bytes").and_then(|v| v.parse().ok()).unwrap_or(0),
        endpoint: map.get("endpoint").filter(|v| !v.is_empty()).cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> TunnelConfig {
        TunnelConfig {
            local_private_key_hex: "a".repeat(64),
            peer_public_key_hex: "b".repeat(64),
            local_address: "10.10.0.1/24".parse().unwrap(),
            peer_allowed_address: "10.10.0.2/24".parse().unwrap(),
            endpoint: None,
            listen_port: 0,
            mtu: DEFAULT_MTU,
            persistent_keepalive_interval: 0,
        }
    }

    #[test]
    fn client_emits_endpoint_but_never_listen_port() {
        let mut config = base_config();
        config.endpoint = Some("example.com:51820".to_string());
        config.persistent_keepalive_interval = 25;

        let text = build_client_ipc(&config);
        assert!(text.contains("endpoint=example.com:51820\n"));
        assert!(text.contains("persistent_keepalive_interval=25\n"));
        assert!(!text.contains("listen_port"));
    }

    #[test]
    fn client_omits_unset_optionals() {
        let config = base_config();
        let text = build_client_ipc(&config);
        assert!(!text.contains("endpoint"));
        assert!(!text.contains("persistent_keepalive_interval"));
        assert!(!text.contains("listen_port"));
    }

    #[test]
    fn server_emits_listen_port_never_endpoint() {
        let mut config = base_config();
        config.listen_port = 51820;
        config.endpoint = Some("should-not-appear:1234".to_string());

        let text = build_server_ipc(&config);
        assert!(text.contains("listen_port=51820\n"));
        assert!(!text.contains("endpoint"));
    }

    #[test]
    fn parses_status_text() {
        let text = "up=true\nlast_handshake_time_sec=1234\ntx_bytes=10\nrx_bytes=20\nendpoint=1.2.3.4:51820\n";
        let status = parse_ipc_status(text).unwrap();
        assert_eq!(
            status,
            TunnelStatus {
                up: true,
                last_handshake_time_secs: 1234,
                tx_bytes: 10,
                rx_bytes: 20,
                endpoint: Some("1.2.3.4:51820".to_string()),
            }
        );
    }

    #[test]
    fn never_handshaked_status_is_zero() {
        let status = parse_ipc_status("up=false\n").unwrap();
        assert_eq!(status.last_handshake_time_secs, 0);
    }
}
