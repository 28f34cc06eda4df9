//! # AWS KMS Adapter
//!
//! Data keys from AWS KMS: `GenerateDataKey` with `KeySpec=AES_256` and the
//! canonical encryption context, `Decrypt` under the same context. A context
//! mismatch surfaces as `InvalidCiphertextException` and is reported as a
//! wrong-context error.

use async_trait::async_trait;
use aws_sdk_kms::error::ProvideErrorMetadata;
use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::types::DataKeySpec;
use aws_sdk_kms::Client as KmsSdkClient;
use zeroize::Zeroizing;

use crate::config::AwsSettings;
use crate::crypto::EncryptContext;
use crate::error::{Error, Result};
use crate::kms::{DataKey, KmsClient};
use crate::provider::aws::create_sdk_config;

pub struct AwsKms {
    client: KmsSdkClient,
    key_id: String,
}

impl std::fmt::Debug for AwsKms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsKms")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl AwsKms {
    pub async fn new(config: &AwsSettings) -> Result<Self> {
        let key_id = config
            .kms_key_id
            .clone()
            .ok_or_else(|| Error::WrongConfiguration {
                key: "CONNECTORS.aws.kms_key_id".into(),
            })?;
        let sdk_config = create_sdk_config(config).await?;
        Ok(AwsKms {
            client: KmsSdkClient::new(&sdk_config),
            key_id,
        })
    }
}

#[async_trait]
impl KmsClient for AwsKms {
    async fn generate_data_key(&self, context: &EncryptContext) -> Result<DataKey> {
        let mut request = self
            .client
            .generate_data_key()
            .key_id(&self.key_id)
            .key_spec(DataKeySpec::Aes256);
        for (key, value) in context.pairs() {
            request = request.encryption_context(key, value);
        }

        let output = request.send().await.map_err(|err| {
            if err.code() == Some("AccessDeniedException") {
                Error::KmsPermissionDenied
            } else {
                let service = err.into_service_error();
                if service.is_not_found_exception() {
                    Error::not_found("kms key", self.key_id.clone())
                } else {
                    Error::KmsUnavailable {
                        message: service.to_string(),
                    }
                }
            }
        })?;

        let plaintext = output
            .plaintext()
            .ok_or_else(|| Error::KmsUnavailable {
                message: "kms response is missing the plaintext key".into(),
            })?
            .clone()
            .into_inner();
        let wrapped = output
            .ciphertext_blob()
            .ok_or_else(|| Error::KmsUnavailable {
                message: "kms response is missing the wrapped key".into(),
            })?
            .clone()
            .into_inner();

        Ok(DataKey {
            plaintext: Zeroizing::new(plaintext),
            wrapped,
        })
    }

    async fn decrypt_data_key(
        &self,
        wrapped: &[u8],
        context: &EncryptContext,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let mut request = self
            .client
            .decrypt()
            .key_id(&self.key_id)
            .ciphertext_blob(Blob::new(wrapped.to_vec()));
        for (key, value) in context.pairs() {
            request = request.encryption_context(key, value);
        }

        let output = request.send().await.map_err(|err| {
            if err.code() == Some("AccessDeniedException") {
                Error::KmsPermissionDenied
            } else {
                let service = err.into_service_error();
                if service.is_invalid_ciphertext_exception() {
                    Error::KmsWrongContext
                } else if service.is_not_found_exception() {
                    Error::not_found("kms key", self.key_id.clone())
                } else {
                    Error::KmsUnavailable {
                        message: service.to_string(),
                    }
                }
            }
        })?;

        let plaintext = output
            .plaintext()
            .ok_or_else(|| Error::KmsUnavailable {
                message: "kms response is missing the plaintext key".into(),
            })?
            .clone()
            .into_inner();
        Ok(Zeroizing::new(plaintext))
    }
}
