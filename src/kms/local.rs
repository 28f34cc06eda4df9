//! # Local KMS
//!
//! Development and test KMS holding a process-local master key. Data keys
//! are wrapped with AES-256-GCM under that master key, with the canonical
//! context as associated data, so a wrong context fails to unwrap exactly
//! like a managed KMS with a bound encryption context.
//!
//! Never configure this outside development: the master key lives only in
//! process memory and wrapped keys do not survive a restart unless the
//! master key is fixed.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::constants::NONCE_LEN;
use crate::crypto::EncryptContext;
use crate::error::{Error, Result};
use crate::kms::{DataKey, KmsClient};

pub struct LocalKms {
    master_key: Key<Aes256Gcm>,
}

impl std::fmt::Debug for LocalKms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKms").finish_non_exhaustive()
    }
}

impl LocalKms {
    /// Fresh random master key.
    pub fn new() -> Self {
        LocalKms {
            master_key: Aes256Gcm::generate_key(&mut OsRng),
        }
    }

    /// Fixed master key, for deterministic tests.
    pub fn with_master_key(key: [u8; 32]) -> Self {
        LocalKms {
            master_key: key.into(),
        }
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(&self.master_key)
    }
}

impl Default for LocalKms {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KmsClient for LocalKms {
    async fn generate_data_key(&self, context: &EncryptContext) -> Result<DataKey> {
        let data_key = Aes256Gcm::generate_key(&mut OsRng);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher()
            .encrypt(
                &nonce,
                Payload {
                    msg: data_key.as_slice(),
                    aad: context.to_b64().as_bytes(),
                },
            )
            .map_err(|_| Error::KmsUnavailable {
                message: "data key wrap failed".into(),
            })?;

        let mut wrapped = nonce.to_vec();
        wrapped.extend_from_slice(&ciphertext);
        Ok(DataKey {
            plaintext: Zeroizing::new(data_key.to_vec()),
            wrapped,
        })
    }

    async fn decrypt_data_key(
        &self,
        wrapped: &[u8],
        context: &EncryptContext,
    ) -> Result<Zeroizing<Vec<u8>>> {
        if wrapped.len() <= NONCE_LEN {
            return Err(Error::KmsWrongContext);
        }
        let (nonce, ciphertext) = wrapped.split_at(NONCE_LEN);
        let plaintext = self
            .cipher()
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: context.to_b64().as_bytes(),
                },
            )
            .map_err(|_| Error::KmsWrongContext)?;
        Ok(Zeroizing::new(plaintext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_and_unwrap() {
        let kms = LocalKms::new();
        let context = EncryptContext::new("d1", "secret-abc");
        let data_key = kms.generate_data_key(&context).await.unwrap();
        assert_eq!(data_key.plaintext.len(), 32);

        let unwrapped = kms
            .decrypt_data_key(&data_key.wrapped, &context)
            .await
            .unwrap();
        assert_eq!(*unwrapped, *data_key.plaintext);
    }

    #[tokio::test]
    async fn test_wrong_context_refuses_unwrap() {
        let kms = LocalKms::new();
        let context = EncryptContext::new("d1", "secret-abc");
        let data_key = kms.generate_data_key(&context).await.unwrap();

        let wrong = EncryptContext::new("d1", "secret-other");
        let err = kms
            .decrypt_data_key(&data_key.wrapped, &wrong)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "KMS_WRONG_CONTEXT");
    }

    #[tokio::test]
    async fn test_fixed_master_key_is_stable_across_instances() {
        let context = EncryptContext::new("d1", "secret-abc");
        let first = LocalKms::with_master_key([3u8; 32]);
        let data_key = first.generate_data_key(&context).await.unwrap();

        let second = LocalKms::with_master_key([3u8; 32]);
        let unwrapped = second
            .decrypt_data_key(&data_key.wrapped, &context)
            .await
            .unwrap();
        assert_eq!(*unwrapped, *data_key.plaintext);
    }

    #[tokio::test]
    async fn test_truncated_wrapped_key_is_rejected() {
        let kms = LocalKms::new();
        let context = EncryptContext::new("d1", "secret-abc");
        let err = kms.decrypt_data_key(&[0u8; 8], &context).await.unwrap_err();
        assert_eq!(err.code(), "KMS_WRONG_CONTEXT");
    }
}
