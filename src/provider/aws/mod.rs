//! # AWS Secrets Manager Backend
//!
//! Managed-KMS-backed store. `put` is create-or-fail, `delete` is a hard
//! delete with no recovery window, `update` replaces the current version.

mod auth;

pub(crate) use auth::create_sdk_config;

use async_trait::async_trait;
use aws_sdk_secretsmanager::Client as SecretsManagerClient;

use crate::config::AwsSettings;
use crate::error::{Error, Result};
use crate::provider::{payload_str, SecretStoreBackend};

const STORE: &str = "aws-secrets-manager";

pub struct AwsSecretsManager {
    client: SecretsManagerClient,
    region: Option<String>,
}

impl std::fmt::Debug for AwsSecretsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsSecretsManager")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl AwsSecretsManager {
    /// Create the client. Static credentials are used when configured,
    /// otherwise the SDK default chain applies.
    pub async fn new(config: &AwsSettings) -> Result<Self> {
        if config.region.is_none() {
            return Err(Error::WrongConfiguration {
                key: "CONNECTORS.aws.region".into(),
            });
        }
        let sdk_config = create_sdk_config(config).await?;
        Ok(AwsSecretsManager {
            client: SecretsManagerClient::new(&sdk_config),
            region: config.region.clone(),
        })
    }
}

#[async_trait]
impl SecretStoreBackend for AwsSecretsManager {
    fn name(&self) -> &'static str {
        STORE
    }

    async fn put(&self, id: &str, payload: &[u8]) -> Result<()> {
        let secret_string = payload_str(payload)?;
        self.client
            .create_secret()
            .name(id)
            .secret_string(secret_string)
            .send()
            .await
            .map_err(|err| {
                let service = err.into_service_error();
                if service.is_resource_exists_exception() {
                    Error::AlreadyExists { id: id.to_string() }
                } else {
                    Error::StoreUnavailable {
                        store: STORE,
                        message: service.to_string(),
                    }
                }
            })?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Vec<u8>> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(id)
            .send()
            .await
            .map_err(|err| {
                let service = err.into_service_error();
                if service.is_resource_not_found_exception() {
                    Error::not_found("secret payload", id)
                } else {
                    Error::StoreUnavailable {
                        store: STORE,
                        message: service.to_string(),
                    }
                }
            })?;
        output
            .secret_string()
            .map(|s| s.as_bytes().to_vec())
            .ok_or_else(|| Error::not_found("secret payload", id))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        match self
            .client
            .delete_secret()
            .secret_id(id)
            .force_delete_without_recovery(true)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                let service = err.into_service_error();
                if service.is_resource_not_found_exception() {
                    Ok(())
                } else {
                    Err(Error::StoreUnavailable {
                        store: STORE,
                        message: service.to_string(),
                    })
                }
            }
        }
    }

    async fn update(&self, id: &str, payload: &[u8]) -> Result<()> {
        let secret_string = payload_str(payload)?;
        self.client
            .put_secret_value()
            .secret_id(id)
            .secret_string(secret_string)
            .send()
            .await
            .map_err(|err| {
                let service = err.into_service_error();
                if service.is_resource_not_found_exception() {
                    Error::not_found("secret payload", id)
                } else {
                    Error::StoreUnavailable {
                        store: STORE,
                        message: service.to_string(),
                    }
                }
            })?;
        Ok(())
    }
}
