//! # Encryption Engine
//!
//! Envelope encryption with AES-256-GCM. A fresh KMS data key encrypts the
//! payload; the KMS-wrapped form of that key travels with the record so the
//! caller can decrypt at the edge with the tenant's KMS. The canonical
//! encryption context is bound into the AEAD as associated data, so any
//! context mismatch at decrypt time fails authentication.
//!
//! The engine persists nothing, owns no identifiers, and holds the plaintext
//! data key only for the duration of the AEAD call.

mod context;

pub use context::EncryptContext;

use std::sync::Arc;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{Map, Value};

use crate::constants::{DATA_KEY_LEN, NONCE_LEN};
use crate::error::{Error, Result};
use crate::kms::KmsClient;
use crate::model::{EncryptAlgorithm, EncryptOptions, EncryptType, EnvelopeBundle};

pub struct EncryptionEngine {
    kms: Arc<dyn KmsClient>,
    encrypt_type: EncryptType,
}

impl std::fmt::Debug for EncryptionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionEngine")
            .field("encrypt_type", &self.encrypt_type)
            .finish_non_exhaustive()
    }
}

impl EncryptionEngine {
    pub fn new(kms: Arc<dyn KmsClient>, encrypt_type: EncryptType) -> Self {
        EncryptionEngine { kms, encrypt_type }
    }

    pub fn encrypt_type(&self) -> EncryptType {
        self.encrypt_type
    }

    /// Envelope-encrypt a plaintext map under the given context.
    ///
    /// Returns the ciphertext bundle (the exact bytes stored in the backend,
    /// once JSON-serialized) and the base64 KMS-wrapped data key.
    pub async fn encrypt(
        &self,
        data: &Map<String, Value>,
        context: &EncryptContext,
    ) -> Result<(EnvelopeBundle, String)> {
        let plaintext_b64 = BASE64.encode(
            serde_json::to_vec(data).map_err(|e| Error::internal(e.to_string()))?,
        );
        let aad = context.to_b64();

        let data_key = self.kms.generate_data_key(context).await?;
        if data_key.plaintext.len() != DATA_KEY_LEN {
            return Err(Error::internal(
                "kms returned a data key that does not match AES-256-GCM",
            ));
        }
        let wrapped_key_b64 = BASE64.encode(&data_key.wrapped);

        let cipher = Aes256Gcm::new_from_slice(&data_key.plaintext)
            .map_err(|_| Error::internal("invalid data key length"))?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext_b64.as_bytes(),
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|_| Error::internal("payload encryption failed"))?;
        // Zeroizes the plaintext key.
        drop(data_key);

        let bundle = EnvelopeBundle {
            encrypted_data: BASE64.encode(&ciphertext),
            nonce: BASE64.encode(nonce),
        };
        Ok((bundle, wrapped_key_b64))
    }

    /// Inverse of [`encrypt`](Self::encrypt). Any mismatch in key, nonce, or
    /// context fails authentication and is reported as a decrypt failure.
    pub async fn decrypt(
        &self,
        bundle: &EnvelopeBundle,
        wrapped_key_b64: &str,
        context: &EncryptContext,
    ) -> Result<Map<String, Value>> {
        let ciphertext = BASE64
            .decode(&bundle.encrypted_data)
            .map_err(|_| Error::DecryptFailed)?;
        let nonce_bytes = BASE64
            .decode(&bundle.nonce)
            .map_err(|_| Error::DecryptFailed)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(Error::DecryptFailed);
        }
        let wrapped = BASE64
            .decode(wrapped_key_b64)
            .map_err(|_| Error::DecryptFailed)?;

        let data_key = match self.kms.decrypt_data_key(&wrapped, context).await {
            Ok(key) => key,
            // A context the KMS refuses to unwrap under is indistinguishable,
            // to the engine, from a payload that does not authenticate.
            Err(Error::KmsWrongContext) => return Err(Error::DecryptFailed),
            Err(other) => return Err(other),
        };

        let cipher = Aes256Gcm::new_from_slice(&data_key)
            .map_err(|_| Error::DecryptFailed)?;
        let plaintext_b64 = cipher
            .decrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: &ciphertext,
                    aad: context.to_b64().as_bytes(),
                },
            )
            .map_err(|_| Error::DecryptFailed)?;
        drop(data_key);

        let plaintext = BASE64
            .decode(&plaintext_b64)
            .map_err(|_| Error::DecryptFailed)?;
        serde_json::from_slice(&plaintext).map_err(|_| Error::DecryptFailed)
    }

    /// Assemble the encryption options persisted on a record from one
    /// engine run.
    pub fn build_options(
        &self,
        context: &EncryptContext,
        bundle: &EnvelopeBundle,
        wrapped_key_b64: &str,
    ) -> EncryptOptions {
        EncryptOptions {
            encrypt_type: Some(self.encrypt_type),
            encrypt_algorithm: Some(EncryptAlgorithm::Aes256Gcm),
            encrypt_context: Some(context.to_b64()),
            encrypt_data_key: Some(wrapped_key_b64.to_string()),
            nonce: Some(bundle.nonce.clone()),
            trusted_encrypted_data_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kms::LocalKms;
    use serde_json::json;

    fn engine() -> EncryptionEngine {
        EncryptionEngine::new(
            Arc::new(LocalKms::with_master_key([7u8; 32])),
            EncryptType::Local,
        )
    }

    fn sample_data() -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("username".into(), json!("svc"));
        map.insert("password".into(), json!("hunter2"));
        map
    }

    #[tokio::test]
    async fn test_roundtrip_is_identity() {
        let engine = engine();
        let context = EncryptContext::new("d1", "secret-abc");
        let (bundle, wrapped) = engine.encrypt(&sample_data(), &context).await.unwrap();
        let decrypted = engine.decrypt(&bundle, &wrapped, &context).await.unwrap();
        assert_eq!(decrypted, sample_data());
    }

    #[tokio::test]
    async fn test_context_mismatch_fails_decrypt() {
        let engine = engine();
        let context = EncryptContext::new("d1", "secret-abc");
        let (bundle, wrapped) = engine.encrypt(&sample_data(), &context).await.unwrap();

        let wrong_domain = EncryptContext::new("d2", "secret-abc");
        let err = engine
            .decrypt(&bundle, &wrapped, &wrong_domain)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DECRYPT_FAILED");

        let wrong_id = EncryptContext::new("d1", "secret-xyz");
        let err = engine.decrypt(&bundle, &wrapped, &wrong_id).await.unwrap_err();
        assert_eq!(err.code(), "DECRYPT_FAILED");
    }

    #[tokio::test]
    async fn test_tampered_ciphertext_fails_decrypt() {
        let engine = engine();
        let context = EncryptContext::new("d1", "secret-abc");
        let (mut bundle, wrapped) = engine.encrypt(&sample_data(), &context).await.unwrap();
        bundle.encrypted_data = BASE64.encode(b"tampered");
        let err = engine.decrypt(&bundle, &wrapped, &context).await.unwrap_err();
        assert_eq!(err.code(), "DECRYPT_FAILED");
    }

    #[tokio::test]
    async fn test_fresh_nonce_per_encrypt() {
        let engine = engine();
        let context = EncryptContext::new("d1", "secret-abc");
        let (first, _) = engine.encrypt(&sample_data(), &context).await.unwrap();
        let (second, _) = engine.encrypt(&sample_data(), &context).await.unwrap();
        assert_ne!(first.nonce, second.nonce);
        assert_ne!(first.encrypted_data, second.encrypted_data);
    }

    #[tokio::test]
    async fn test_build_options_is_complete() {
        let engine = engine();
        let context = EncryptContext::new("d1", "secret-abc");
        let (bundle, wrapped) = engine.encrypt(&sample_data(), &context).await.unwrap();
        let options = engine.build_options(&context, &bundle, &wrapped);
        assert!(options.is_complete());
        assert_eq!(options.encrypt_type, Some(EncryptType::Local));
        assert_eq!(options.nonce.as_deref(), Some(bundle.nonce.as_str()));
    }
}
