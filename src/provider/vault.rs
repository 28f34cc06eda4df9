//! # Vault Backend
//!
//! Development-only store over the Vault KV v2 engine with path-based
//! addressing. Every response is status-checked; a non-success answer is a
//! hard failure, never silently treated as data.

use async_trait::async_trait;
use serde_json::{Map, Value};
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::kv2;

use crate::config::VaultSettings;
use crate::error::{Error, Result};
use crate::provider::SecretStoreBackend;

const STORE: &str = "vault";

pub struct VaultStore {
    client: VaultClient,
    mount: String,
}

impl std::fmt::Debug for VaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultStore")
            .field("mount", &self.mount)
            .finish_non_exhaustive()
    }
}

fn vault_err(id: &str, err: ClientError) -> Error {
    match err {
        ClientError::APIError { code: 404, .. } => Error::not_found("secret payload", id),
        other => Error::StoreUnavailable {
            store: STORE,
            message: other.to_string(),
        },
    }
}

impl VaultStore {
    pub fn new(config: &VaultSettings) -> Result<Self> {
        let (address, token) = match (&config.address, &config.token) {
            (Some(address), Some(token)) => (address.clone(), token.clone()),
            _ => {
                return Err(Error::WrongConfiguration {
                    key: "CONNECTORS.vault".into(),
                })
            }
        };
        let settings = VaultClientSettingsBuilder::default()
            .address(address)
            .token(token)
            .build()
            .map_err(|e| Error::WrongConfiguration {
                key: format!("CONNECTORS.vault: {e}"),
            })?;
        let client = VaultClient::new(settings).map_err(|e| Error::WrongConfiguration {
            key: format!("CONNECTORS.vault: {e}"),
        })?;
        Ok(VaultStore {
            client,
            mount: config.mount.clone(),
        })
    }

    fn decode(id: &str, payload: &[u8]) -> Result<Map<String, Value>> {
        serde_json::from_slice(payload).map_err(|_| Error::StoreUnavailable {
            store: STORE,
            message: format!("payload for {id} is not a JSON object"),
        })
    }
}

#[async_trait]
impl SecretStoreBackend for VaultStore {
    fn name(&self) -> &'static str {
        STORE
    }

    async fn put(&self, id: &str, payload: &[u8]) -> Result<()> {
        let data = Self::decode(id, payload)?;
        kv2::set(&self.client, &self.mount, id, &data)
            .await
            .map_err(|e| vault_err(id, e))?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Vec<u8>> {
        let data: Map<String, Value> = kv2::read(&self.client, &self.mount, id)
            .await
            .map_err(|e| vault_err(id, e))?;
        serde_json::to_vec(&data).map_err(|e| Error::internal(e.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        match kv2::delete_metadata(&self.client, &self.mount, id).await {
            Ok(()) => Ok(()),
            Err(ClientError::APIError { code: 404, .. }) => Ok(()),
            Err(err) => Err(vault_err(id, err)),
        }
    }

    async fn update(&self, id: &str, payload: &[u8]) -> Result<()> {
        // KV v2 set is an upsert; a new version replaces the current one.
        self.put(id, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_address_or_token_is_rejected() {
        let err = VaultStore::new(&VaultSettings {
            address: Some("http://vault:8200".into()),
            token: None,
            mount: "secret".into(),
        })
        .unwrap_err();
        assert_eq!(err.code(), "WRONG_CONFIGURATION");
    }

    #[test]
    fn test_payload_must_be_a_json_object() {
        let err = VaultStore::decode("secret-abc", b"[1,2]").unwrap_err();
        assert_eq!(err.code(), "STORE_UNAVAILABLE");
        assert!(VaultStore::decode("secret-abc", br#"{"k":"v"}"#).is_ok());
    }
}
