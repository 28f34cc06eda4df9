//! # Consul KV Backend
//!
//! Strongly-consistent KV store over the Consul HTTP API. `put` is an
//! upsert. Values are wrapped in a `{"Name", "SecretString"}` envelope;
//! that shape is a wire-format choice local to this adapter and never
//! leaks past it.

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::ConsulSettings;
use crate::error::{Error, Result};
use crate::provider::{payload_str, SecretStoreBackend};

const STORE: &str = "consul";

#[derive(Debug, Serialize, Deserialize)]
struct KvEnvelope {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "SecretString")]
    secret_string: String,
}

#[derive(Debug)]
pub struct ConsulStore {
    client: HttpClient,
    address: String,
    token: Option<String>,
    datacenter: Option<String>,
}

impl ConsulStore {
    pub fn new(config: &ConsulSettings) -> Result<Self> {
        if config.address.is_empty() {
            return Err(Error::WrongConfiguration {
                key: "CONNECTORS.consul.address".into(),
            });
        }
        let client = HttpClient::builder()
            .build()
            .map_err(|e| Error::WrongConfiguration {
                key: format!("CONNECTORS.consul: {e}"),
            })?;
        Ok(ConsulStore {
            client,
            address: config.address.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            datacenter: config.datacenter.clone(),
        })
    }

    fn kv_url(&self, id: &str) -> String {
        format!("{}/v1/kv/{id}", self.address)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut builder = builder;
        if let Some(token) = &self.token {
            builder = builder.header("X-Consul-Token", token);
        }
        if let Some(dc) = &self.datacenter {
            builder = builder.query(&[("dc", dc)]);
        }
        builder
    }

    fn transport_err(err: reqwest::Error) -> Error {
        Error::StoreUnavailable {
            store: STORE,
            message: err.to_string(),
        }
    }

    async fn write(&self, id: &str, payload: &[u8]) -> Result<()> {
        let envelope = KvEnvelope {
            name: id.to_string(),
            secret_string: payload_str(payload)?.to_string(),
        };
        let response = self
            .request(self.client.put(self.kv_url(id)))
            .json(&envelope)
            .send()
            .await
            .map_err(Self::transport_err)?;
        if !response.status().is_success() {
            return Err(Error::StoreUnavailable {
                store: STORE,
                message: format!("kv put returned {}", response.status()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SecretStoreBackend for ConsulStore {
    fn name(&self) -> &'static str {
        STORE
    }

    async fn put(&self, id: &str, payload: &[u8]) -> Result<()> {
        self.write(id, payload).await
    }

    async fn get(&self, id: &str) -> Result<Vec<u8>> {
        let response = self
            .request(self.client.get(self.kv_url(id)))
            .query(&[("raw", "true")])
            .send()
            .await
            .map_err(Self::transport_err)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::not_found("secret payload", id));
        }
        if !response.status().is_success() {
            return Err(Error::StoreUnavailable {
                store: STORE,
                message: format!("kv get returned {}", response.status()),
            });
        }
        let envelope: KvEnvelope = response.json().await.map_err(Self::transport_err)?;
        Ok(envelope.secret_string.into_bytes())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let response = self
            .request(self.client.delete(self.kv_url(id)))
            .send()
            .await
            .map_err(Self::transport_err)?;
        // Consul reports success for deletes of absent keys.
        if !response.status().is_success() {
            return Err(Error::StoreUnavailable {
                store: STORE,
                message: format!("kv delete returned {}", response.status()),
            });
        }
        Ok(())
    }

    async fn update(&self, id: &str, payload: &[u8]) -> Result<()> {
        self.write(id, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_url_shape() {
        let store = ConsulStore::new(&ConsulSettings {
            address: "http://consul:8500/".into(),
            token: None,
            datacenter: None,
        })
        .unwrap();
        assert_eq!(store.kv_url("secret-abc"), "http://consul:8500/v1/kv/secret-abc");
    }

    #[test]
    fn test_envelope_wire_names() {
        let envelope = KvEnvelope {
            name: "secret-abc".into(),
            secret_string: "{\"k\":\"v\"}".into(),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("Name").is_some());
        assert!(json.get("SecretString").is_some());
    }

    #[test]
    fn test_empty_address_is_rejected() {
        let err = ConsulStore::new(&ConsulSettings {
            address: String::new(),
            token: None,
            datacenter: None,
        })
        .unwrap_err();
        assert_eq!(err.code(), "WRONG_CONFIGURATION");
    }
}
