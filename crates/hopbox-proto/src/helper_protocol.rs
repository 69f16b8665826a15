//! The privileged helper's Unix socket protocol (§4.1, §6).
//!
//! Framing is one JSON request, one JSON response, connection closed after.
//! `create_tun`'s file descriptor rides alongside the response as `SCM_RIGHTS`
//! ancillary data — that transfer lives in `hopbox-ipc`, not in this message
//! schema.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HelperRequest {
    /// Create a TUN device. The fd rides back in the response's ancillary data.
    CreateTun { mtu: u16 },
    /// Assign the tunnel address to `interface` and install a route to its /24.
    ConfigureTun {
        interface: String,
        local_address: String,
        peer_network: String,
    },
    /// Remove the route installed by `configure_tun` (and the interface, where required).
    CleanupTun { interface: String },
    /// Idempotently add/replace a hosts-file entry.
    AddHost { ip: String, hostname: String },
    /// Remove a hosts-file entry by hostname.
    RemoveHost { hostname: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HelperResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
}

impl HelperResponse {
    pub fn ok() -> Self {
        Self {
            ok: true,
            error: None,
            interface: None,
        }
    }

    pub fn ok_with_interface(interface: impl Into<String>) -> Self {
        Self {
            ok: true,
            error: None,
            interface: Some(interface.into()),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
            interface: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_tagging_matches_action_names() {
        let req = HelperRequest::AddHost {
            ip: "10.10.0.2".to_string(),
            hostname: "mybox.hop".to_string(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.starts_with(r#"{"action":"add_host""#));
    }

    #[test]
    fn response_omits_absent_fields() {
        let resp = HelperResponse::ok();
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"ok":true}"#);
    }
}
