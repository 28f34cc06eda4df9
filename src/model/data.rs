//! # Wire Shapes
//!
//! Encryption options persisted on a record and the self-describing payload
//! returned by `get_data`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// KMS family that wrapped the data key. Clients pick their decryption path
/// from this value together with the `encrypted` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptType {
    #[serde(rename = "AWS_KMS")]
    AwsKms,
    #[serde(rename = "LOCAL")]
    Local,
}

impl EncryptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncryptType::AwsKms => "AWS_KMS",
            EncryptType::Local => "LOCAL",
        }
    }
}

/// AEAD algorithm used for the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptAlgorithm {
    #[serde(rename = "AES_256_GCM")]
    Aes256Gcm,
}

/// Encryption parameters carried on an encrypted record and echoed back to
/// the caller on `get_data`. All byte-valued fields are base64.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncryptOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypt_type: Option<EncryptType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypt_algorithm: Option<EncryptAlgorithm>,
    /// Base64 of the canonical JSON encryption context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypt_context: Option<String>,
    /// KMS-wrapped data key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypt_data_key: Option<String>,
    /// AEAD nonce.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Wrapped data key of the trusted parent. Only ever present on the
    /// wire, never persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trusted_encrypted_data_key: Option<String>,
}

impl EncryptOptions {
    /// True once the options carry everything a client needs to decrypt.
    pub fn is_complete(&self) -> bool {
        self.encrypt_type.is_some()
            && self.encrypt_algorithm.is_some()
            && self.encrypt_context.is_some()
            && self.encrypt_data_key.is_some()
            && self.nonce.is_some()
    }
}

/// Ciphertext bundle produced by the encryption engine. Serialized as JSON,
/// this is exactly the payload stored in the backend for encrypted records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeBundle {
    /// Base64 AEAD ciphertext.
    pub encrypted_data: String,
    /// Base64 12-byte nonce.
    pub nonce: String,
}

/// Response of `get_data`: plaintext, or an encrypted bundle the caller
/// decrypts with the tenant's KMS.
#[derive(Debug, Clone, Serialize)]
pub struct SecretData {
    pub encrypted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypt_options: Option<EncryptOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_data: Option<String>,
    /// Ciphertext of the trusted parent, when one exists and both records
    /// are encrypted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trusted_encrypted_data: Option<String>,
}

impl SecretData {
    pub fn plaintext(data: Map<String, Value>) -> Self {
        SecretData {
            encrypted: false,
            data: Some(data),
            encrypt_options: None,
            encrypted_data: None,
            trusted_encrypted_data: None,
        }
    }

    pub fn envelope(
        bundle: EnvelopeBundle,
        options: EncryptOptions,
        trusted_encrypted_data: Option<String>,
    ) -> Self {
        SecretData {
            encrypted: true,
            data: None,
            encrypt_options: Some(options),
            encrypted_data: Some(bundle.encrypted_data),
            trusted_encrypted_data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&EncryptType::AwsKms).unwrap(),
            "\"AWS_KMS\""
        );
        assert_eq!(
            serde_json::to_string(&EncryptAlgorithm::Aes256Gcm).unwrap(),
            "\"AES_256_GCM\""
        );
    }

    #[test]
    fn test_plaintext_response_omits_encryption_fields() {
        let mut map = Map::new();
        map.insert("k".into(), Value::String("v".into()));
        let json = serde_json::to_value(SecretData::plaintext(map)).unwrap();
        assert_eq!(json["encrypted"], Value::Bool(false));
        assert_eq!(json["data"]["k"], Value::String("v".into()));
        assert!(json.get("encrypt_options").is_none());
        assert!(json.get("encrypted_data").is_none());
    }

    #[test]
    fn test_envelope_response_shape() {
        let bundle = EnvelopeBundle {
            encrypted_data: "Y3Q=".into(),
            nonce: "bm9uY2U=".into(),
        };
        let options = EncryptOptions {
            encrypt_type: Some(EncryptType::AwsKms),
            encrypt_algorithm: Some(EncryptAlgorithm::Aes256Gcm),
            encrypt_context: Some("Y3R4".into()),
            encrypt_data_key: Some("a2V5".into()),
            nonce: Some("bm9uY2U=".into()),
            trusted_encrypted_data_key: None,
        };
        assert!(options.is_complete());
        let json = serde_json::to_value(SecretData::envelope(bundle, options, None)).unwrap();
        assert_eq!(json["encrypted"], Value::Bool(true));
        assert_eq!(json["encrypted_data"], Value::String("Y3Q=".into()));
        assert_eq!(
            json["encrypt_options"]["encrypt_type"],
            Value::String("AWS_KMS".into())
        );
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_incomplete_options() {
        let options = EncryptOptions {
            encrypt_type: Some(EncryptType::AwsKms),
            ..Default::default()
        };
        assert!(!options.is_complete());
    }
}
