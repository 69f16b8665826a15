//! A minimal `addr/prefix` type, avoiding a dependency on a full CIDR crate
//! in this no-I/O proto crate (the networking crates that actually route
//! traffic depend on `ipnetwork` directly).

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CidrAddr {
    pub addr: IpAddr,
    pub prefix: u8,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CidrParseError {
    #[error("missing '/' prefix separator in {0:?}")]
    MissingPrefix(String),
    #[error("invalid address in {0:?}")]
    InvalidAddr(String),
    #[error("invalid prefix length in {0:?}")]
    InvalidPrefix(String),
}

impl fmt::Display for CidrAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

impl FromStr for CidrAddr {
    type Err = CidrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_part, prefix_part) = s
            .split_once('/')
            .ok_or_else(|| CidrParseError::MissingPrefix(s.to_string()))?;
        let addr = addr_part
            .parse::<IpAddr>()
            .map_err(|_| CidrParseError::InvalidAddr(s.to_string()))?;
        let prefix = prefix_part
            .parse::<u8>()
            .map_err(|_| CidrParseError::InvalidPrefix(s.to_string()))?;
        Ok(Self { addr, prefix })
    }
}

impl serde::Serialize for CidrAddr {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for CidrAddr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_display() {
        let c: CidrAddr = "10.10.0.1/24".parse().unwrap();
        assert_eq!(c.to_string(), "10.10.0.1/24");
        assert_eq!(c.prefix, 24);
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!("10.10.0.1".parse::<CidrAddr>().is_err());
    }
}
