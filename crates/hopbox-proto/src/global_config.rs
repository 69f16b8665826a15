//! The global default-host pointer: `<user-config-base>/config.yaml` (§6).
//!
//! This is the one piece of cross-host state the CLI consults when a
//! command doesn't name a host explicitly. Everything else under the user
//! config directory is already namespaced per host.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GlobalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_host: Option<String>,
}

impl GlobalConfig {
    pub fn from_yaml(s: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(s)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_has_no_default_host() {
        let config = GlobalConfig::from_yaml("").unwrap();
        assert!(config.default_host.is_none());
    }

    #[test]
    fn roundtrips_default_host() {
        let config = GlobalConfig {
            default_host: Some("mybox".to_string()),
        };
        let yaml = config.to_yaml().unwrap();
        assert_eq!(GlobalConfig::from_yaml(&yaml).unwrap(), config);
    }
}
