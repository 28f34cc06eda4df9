//! # etcd Backend
//!
//! Coordination-service KV with the same upsert semantics as the Consul
//! adapter. The client multiplexes over its own connection pool; each call
//! works on a cheap clone.

use async_trait::async_trait;
use etcd_client::Client;

use crate::config::EtcdSettings;
use crate::error::{Error, Result};
use crate::provider::SecretStoreBackend;

const STORE: &str = "etcd";

pub struct EtcdStore {
    client: Client,
}

impl std::fmt::Debug for EtcdStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtcdStore").finish_non_exhaustive()
    }
}

fn etcd_err(err: etcd_client::Error) -> Error {
    Error::StoreUnavailable {
        store: STORE,
        message: err.to_string(),
    }
}

impl EtcdStore {
    pub async fn connect(config: &EtcdSettings) -> Result<Self> {
        if config.endpoints.is_empty() {
            return Err(Error::WrongConfiguration {
                key: "CONNECTORS.etcd.endpoints".into(),
            });
        }
        let client = Client::connect(config.endpoints.clone(), None)
            .await
            .map_err(etcd_err)?;
        Ok(EtcdStore { client })
    }
}

#[async_trait]
impl SecretStoreBackend for EtcdStore {
    fn name(&self) -> &'static str {
        STORE
    }

    async fn put(&self, id: &str, payload: &[u8]) -> Result<()> {
        let mut client = self.client.clone();
        client
            .put(id, payload.to_vec(), None)
            .await
            .map_err(etcd_err)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Vec<u8>> {
        let mut client = self.client.clone();
        let response = client.get(id, None).await.map_err(etcd_err)?;
        response
            .kvs()
            .first()
            .map(|kv| kv.value().to_vec())
            .ok_or_else(|| Error::not_found("secret payload", id))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut client = self.client.clone();
        client.delete(id, None).await.map_err(etcd_err)?;
        Ok(())
    }

    async fn update(&self, id: &str, payload: &[u8]) -> Result<()> {
        self.put(id, payload).await
    }
}
