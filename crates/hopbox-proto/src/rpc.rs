//! The remote agent's `POST /rpc` envelope (§4.6, §6).
//!
//! Per the spec's Open Question, dispatch is untyped on `params` — each
//! method owns its own parameter and result shape as raw JSON. The request/
//! response envelope itself is the only fixed contract.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub message: String,
}

/// Agent HTTP responses always carry either `result` or `error`, never both, never neither.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn ok(result: impl Serialize) -> Self {
        Self {
            result: Some(serde_json::to_value(result).unwrap_or(Value::Null)),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(RpcError {
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub tunnel: bool,
    pub local_ip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceNameParams {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackagesInstallParams {
    pub packages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageFailure {
    pub package: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackagesInstallResult {
    pub installed: Vec<String>,
    pub failed: Vec<PackageFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunScriptParams {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunScriptResult {
    pub output: String,
    pub truncated: bool,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceSyncParams {
    pub yaml: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_omits_whichever_field_is_absent() {
        let ok = RpcResponse::ok(42u32);
        let json = serde_json::to_string(&ok).unwrap();
        assert!(json.contains("\"result\":42"));
        assert!(!json.contains("error"));

        let err = RpcResponse::err("not found");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"message\":\"not found\""));
        assert!(!json.contains("\"result\""));
    }

    #[test]
    fn request_params_are_optional_raw_json() {
        let json = r#"{"method":"services.list"}"#;
        let req: RpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.method, "services.list");
        assert!(req.params.is_none());
    }
}
