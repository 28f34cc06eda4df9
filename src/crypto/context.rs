//! # Encryption Context
//!
//! Small mapping bound into the AEAD as associated data and into the KMS
//! wrap operation. The context of a record is `{domain_id, secret_id}` and
//! must serialize identically at encrypt and decrypt time, so the JSON key
//! order is fixed by the struct definition.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Serialize;

/// Canonical encryption context of a secret payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncryptContext {
    pub domain_id: String,
    pub secret_id: String,
}

impl EncryptContext {
    pub fn new(domain_id: impl Into<String>, secret_id: impl Into<String>) -> Self {
        EncryptContext {
            domain_id: domain_id.into(),
            secret_id: secret_id.into(),
        }
    }

    /// Deterministic JSON encoding, `domain_id` first.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("context of two strings always serializes")
    }

    /// Base64 of [`to_json`](Self::to_json); the AEAD associated data.
    pub fn to_b64(&self) -> String {
        BASE64.encode(self.to_json())
    }

    /// Key/value view for KMS encryption-context parameters.
    pub fn pairs(&self) -> [(&'static str, &str); 2] {
        [
            ("domain_id", self.domain_id.as_str()),
            ("secret_id", self.secret_id.as_str()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_key_order_is_fixed() {
        let context = EncryptContext::new("d1", "secret-abc");
        assert_eq!(
            context.to_json(),
            r#"{"domain_id":"d1","secret_id":"secret-abc"}"#
        );
    }

    #[test]
    fn test_b64_roundtrip() {
        let context = EncryptContext::new("d1", "secret-abc");
        let decoded = BASE64.decode(context.to_b64()).unwrap();
        assert_eq!(decoded, context.to_json().as_bytes());
    }

    #[test]
    fn test_equal_contexts_encode_identically() {
        let a = EncryptContext::new("d1", "secret-abc");
        let b = EncryptContext::new("d1".to_string(), "secret-abc".to_string());
        assert_eq!(a.to_b64(), b.to_b64());
    }
}
