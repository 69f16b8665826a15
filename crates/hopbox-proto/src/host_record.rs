//! `HostRecord` — the per-host config persisted under the user config directory.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostNameError {
    #[error("host name {0:?} is empty")]
    Empty(String),
    #[error("host name {0:?} contains characters other than [A-Za-z0-9_-], or starts with one of '_-'")]
    InvalidChars(String),
}

/// Validate a host name against `[A-Za-z0-9][A-Za-z0-9_-]*`.
///
/// This is a path-traversal defense: host names become file names
/// (`<name>.yaml`, `<name>.json`, `<name>.sock`) under trusted directories,
/// so `..`, `/`, and leading punctuation must never be accepted.
pub fn validate_host_name(name: &str) -> Result<(), HostNameError> {
    let mut chars = name.chars();
    let first = chars.next().ok_or_else(|| HostNameError::Empty(name.to_string()))?;
    if !first.is_ascii_alphanumeric() {
        return Err(HostNameError::InvalidChars(name.to_string()));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(HostNameError::InvalidChars(name.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostRecord {
    pub name: String,
    pub display_name: String,
    /// Remote UDP endpoint, `host:port`.
    pub endpoint: String,
    /// Client private key, base64.
    pub client_private_key: String,
    /// Peer (remote) public key, base64.
    pub peer_public_key: String,
    /// Local tunnel address, CIDR (`10.10.0.1/24`).
    pub local_address: String,
    /// Peer address, plain (`10.10.0.2`).
    pub peer_address: String,
    pub ssh_user: String,
    pub ssh_host: String,
    pub ssh_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_host_key: Option<String>,
}

impl HostRecord {
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn from_yaml(s: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        assert!(validate_host_name("mybox").is_ok());
        assert!(validate_host_name("my-box_2").is_ok());
        assert!(validate_host_name("1box").is_ok());
    }

    #[test]
    fn rejects_path_traversal() {
        assert!(validate_host_name("../etc").is_err());
        assert!(validate_host_name("-leading-dash").is_err());
        assert!(validate_host_name("_leading-underscore").is_err());
        assert!(validate_host_name("has/slash").is_err());
        assert!(validate_host_name("").is_err());
    }

    #[test]
    fn yaml_roundtrip() {
        let record = HostRecord {
            name: "mybox".to_string(),
            display_name: "My Box".to_string(),
            endpoint: "mybox.example.com:51820".to_string(),
            client_private_key: "cGxhY2Vob2xkZXJwbGFjZWhvbGRlcnBsYWNlaG9sZGVy".to_string(),
            peer_public_key: "cGxhY2Vob2xkZXJwbGFjZWhvbGRlcnBsYWNlaG9sZGVy".to_string(),
            local_address: "10.10.0.1/24".to_string(),
            peer_address: "10.10.0.2".to_string(),
            ssh_user: "dev".to_string(),
            ssh_host: "mybox.example.com".to_string(),
            ssh_port: 22,
            ssh_host_key: None,
        };
        let yaml = record.to_yaml().unwrap();
        let parsed = HostRecord::from_yaml(&yaml).unwrap();
        assert_eq!(record, parsed);
    }
}
