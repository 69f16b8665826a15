//! The remote manifest schema (§3 `ServiceDef`, §4.6 `workspace.sync`, §6).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Container,
    Native,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HealthProbe {
    pub url: String,
    /// Poll interval in seconds (default 2, see §4.7).
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,
    /// Overall timeout in seconds before giving up (default 60).
    #[serde(default = "default_health_timeout")]
    pub timeout_secs: u64,
    /// Per-request timeout in seconds (default 5).
    #[serde(default = "default_health_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_health_interval() -> u64 {
    2
}
fn default_health_timeout() -> u64 {
    60
}
fn default_health_request_timeout() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortMapping {
    pub host: u16,
    /// Defaults to `host` when the manifest gives a bare port.
    #[serde(default)]
    pub container: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceDef {
    pub name: String,
    pub backend: BackendKind,
    /// Container image (for `Container`) or shell command (for `Native`).
    pub image_or_command: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    /// Host:container path bindings, or bare host paths to track for snapshotting.
    #[serde(default)]
    pub data_paths: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub health: Option<HealthProbe>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Manifest {
    #[serde(default)]
    pub services: Vec<ServiceDef>,
    /// Named shell scripts runnable via `run.script`.
    #[serde(default)]
    pub scripts: HashMap<String, String>,
    /// Optional backup/snapshot target identifier; when absent, `snap.*` RPCs 503.
    #[serde(default)]
    pub backup_target: Option<String>,
}

impl Manifest {
    pub fn from_yaml(s: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(s)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Sorted, de-duplicated union of every service's declared data paths (§4.7).
    pub fn data_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .services
            .iter()
            .flat_map(|s| s.data_paths.iter().cloned())
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRunState {
    Running,
    Stopped,
    Starting,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceStatus {
    pub name: String,
    pub state: ServiceRunState,
    pub restart_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_manifest() {
        let yaml = r#"
services:
  - name: db
    backend: container
    image_or_command: "postgres:16"
  - name: api
    backend: native
    image_or_command: "node server.js"
    depends_on: ["db"]
    health:
      url: "http://127.0.0.1:3000/health"
"#;
        let manifest = Manifest::from_yaml(yaml).unwrap();
        assert_eq!(manifest.services.len(), 2);
        assert_eq!(manifest.services[1].depends_on, vec!["db".to_string()]);
        let health = manifest.services[1].health.as_ref().unwrap();
        assert_eq!(health.interval_secs, 2);
        assert_eq!(health.timeout_secs, 60);
    }

    #[test]
    fn data_paths_are_sorted_and_deduped() {
        let mut manifest = Manifest::default();
        manifest.services.push(ServiceDef {
            name: "a".to_string(),
            backend: BackendKind::Native,
            image_or_command: "true".to_string(),
            env: HashMap::new(),
            ports: vec![],
            data_paths: vec!["/data/b".to_string(), "/data/a".to_string()],
            depends_on: vec![],
            health: None,
        });
        manifest.services.push(ServiceDef {
            name: "b".to_string(),
            backend: BackendKind::Native,
            image_or_command: "true".to_string(),
            env: HashMap::new(),
            ports: vec![],
            data_paths: vec!["/data/a".to_string()],
            depends_on: vec![],
            health: None,
        });
        assert_eq!(
            manifest.data_paths(),
            vec!["/data/a".to_string(), "/data/b".to_string()]
        );
    }
}
