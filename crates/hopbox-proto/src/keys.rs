//! Curve25519 key pairs, round-trippable through base64 (at rest) and hex (on the wire).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::rngs::OsRng;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

/// Number of bytes in either half of a key pair.
pub const KEY_LEN: usize = 32;

/// Length of the base64 encoding of a 32-byte key (44 chars, including `=` padding).
pub const BASE64_LEN: usize = 44;

/// Length of the lowercase-hex encoding of a 32-byte key.
pub const HEX_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid base64 key encoding: {0}")]
    Base64(String),
    #[error("invalid hex key encoding: {0}")]
    Hex(String),
    #[error("decoded key has {0} bytes, expected {KEY_LEN}")]
    WrongLength(usize),
}

/// A 32-byte private key and its derived 32-byte public key.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    private: [u8; KEY_LEN],
    public: [u8; KEY_LEN],
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public_hex())
            .field("private", &"<redacted>")
            .finish()
    }
}

impl KeyPair {
    /// Generate a fresh key pair from the OS CSPRNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            private: secret.to_bytes(),
            public: public.to_bytes(),
        }
    }

    /// Derive a key pair from a raw private key, recomputing the public half.
    pub fn from_private_bytes(private: [u8; KEY_LEN]) -> Self {
        let secret = StaticSecret::from(private);
        let public = PublicKey::from(&secret);
        Self {
            private: secret.to_bytes(),
            public: public.to_bytes(),
        }
    }

    pub fn private_bytes(&self) -> &[u8; KEY_LEN] {
        &self.private
    }

    pub fn public_bytes(&self) -> &[u8; KEY_LEN] {
        &self.public
    }

    pub fn private_base64(&self) -> String {
        BASE64.encode(self.private)
    }

    pub fn public_base64(&self) -> String {
        BASE64.encode(self.public)
    }

    pub fn private_hex(&self) -> String {
        hex::encode(self.private)
    }

    pub fn public_hex(&self) -> String {
        hex::encode(self.public)
    }

    /// Reconstruct a key pair from its persisted base64 private key.
    pub fn from_private_base64(s: &str) -> Result<Self, KeyError> {
        let bytes = decode_base64_key(s)?;
        Ok(Self::from_private_bytes(bytes))
    }

    /// Reconstruct a key pair from its wire-format hex private key.
    pub fn from_private_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = decode_hex_key(s)?;
        Ok(Self::from_private_bytes(bytes))
    }
}

/// Decode a base64-encoded 32-byte key.
pub fn decode_base64_key(s: &str) -> Result<[u8; KEY_LEN], KeyError> {
    let bytes = BASE64
        .decode(s.trim())
        .map_err(|e| KeyError::Base64(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| KeyError::WrongLength(v.len()))
}

/// Decode a lowercase-hex-encoded 32-byte key.
pub fn decode_hex_key(s: &str) -> Result<[u8; KEY_LEN], KeyError> {
    let s = s.trim();
    let bytes = hex::decode(s).map_err(|e| KeyError::Hex(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| KeyError::WrongLength(v.len()))
}

/// Convert a persisted base64 key to its wire-format hex representation.
pub fn base64_to_hex(s: &str) -> Result<String, KeyError> {
    Ok(hex::encode(decode_base64_key(s)?))
}

/// Convert a wire-format hex key to its persisted base64 representation.
pub fn hex_to_base64(s: &str) -> Result<String, KeyError> {
    Ok(BASE64.encode(decode_hex_key(s)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn generated_pair_has_correct_lengths() {
        let pair = KeyPair::generate();
        assert_eq!(pair.private_base64().len(), BASE64_LEN);
        assert_eq!(pair.public_base64().len(), BASE64_LEN);
        assert_eq!(pair.private_hex().len(), HEX_LEN);
        assert_eq!(pair.public_hex().len(), HEX_LEN);
    }

    #[test]
    fn public_is_curve_derivation_of_private() {
        let pair = KeyPair::generate();
        let rederived = KeyPair::from_private_bytes(*pair.private_bytes());
        assert_eq!(pair.public_bytes(), rederived.public_bytes());
    }

    #[test]
    fn wrong_length_is_rejected() {
        let short = BASE64.encode([0u8; 16]);
        assert_eq!(
            decode_base64_key(&short),
            Err(KeyError::WrongLength(16))
        );
    }

    #[quickcheck]
    fn base64_hex_roundtrip(bytes: Vec<u8>) -> bool {
        // Property 1: for any generated key pair, converting base64 -> hex -> base64
        // (and vice versa) never loses bytes.
        let mut seed = [0u8; KEY_LEN];
        let n = bytes.len().min(KEY_LEN);
        seed[..n].copy_from_slice(&bytes[..n]);
        let pair = KeyPair::from_private_bytes(seed);

        let b64 = pair.private_base64();
        let hex = base64_to_hex(&b64).unwrap();
        let b64_again = hex_to_base64(&hex).unwrap();
        b64 == b64_again && hex.len() == HEX_LEN && b64.len() == BASE64_LEN
    }
}
