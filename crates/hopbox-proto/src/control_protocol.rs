//! The daemon's local control socket protocol (§4.3 step 6, §6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ControlRequest {
    Status,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControlStateView {
    pub pid: u32,
    pub connected: bool,
    pub last_healthy: Option<String>,
    pub interface: String,
    pub started_at: String,
    pub bridges: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControlResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ControlStateView>,
}

impl ControlResponse {
    pub fn ok_status(state: ControlStateView) -> Self {
        Self {
            ok: true,
            error: None,
            state: Some(state),
        }
    }

    pub fn ok_empty() -> Self {
        Self {
            ok: true,
            error: None,
            state: None,
        }
    }

    pub fn unknown_method(method: &str) -> Self {
        Self {
            ok: false,
            error: Some(format!("unknown method: {method}")),
            state: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_request_serializes_with_no_params() {
        let req = ControlRequest::Status;
        assert_eq!(
            serde_json::to_string(&req).unwrap(),
            r#"{"method":"status"}"#
        );
    }

    #[test]
    fn unknown_method_message_matches_spec_wording() {
        let resp = ControlResponse::unknown_method("frobnicate");
        assert_eq!(resp.error.unwrap(), "unknown method: frobnicate");
    }
}
