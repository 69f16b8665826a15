//! `DaemonState` — the per-host state file under the user run directory.
//!
//! This module only defines the schema and its (de)serialization. The
//! atomic write and stale-PID liveness check described in §3/§8 property 3
//! require real file and process I/O and live in `hopbox-daemon`, which is
//! the sole writer of this file.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForwardedPort {
    pub port: u16,
    pub program: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaemonState {
    pub pid: u32,
    pub host: String,
    pub interface: String,
    /// RFC3339 start timestamp.
    pub started_at: String,
    pub connected: bool,
    /// RFC3339 timestamp of the last successful health check, if any.
    pub last_healthy: Option<String>,
    pub forwarded_ports: Vec<ForwardedPort>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roundtrip() {
        let state = DaemonState {
            pid: 4242,
            host: "mybox".to_string(),
            interface: "hop0".to_string(),
            started_at: "2026-07-28T00:00:00Z".to_string(),
            connected: true,
            last_healthy: Some("2026-07-28T00:01:00Z".to_string()),
            forwarded_ports: vec![ForwardedPort {
                port: 8080,
                program: "node".to_string(),
            }],
        };
        let json = serde_json::to_string(&state).unwrap();
        let parsed: DaemonState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, parsed);
    }
}
