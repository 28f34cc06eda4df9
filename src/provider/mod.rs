//! # Backend Store Adapters
//!
//! Uniform contract over the external systems holding opaque secret
//! payloads by stable id. Each adapter passes its own store's consistency
//! and conflict semantics through; nothing here retries or papers over
//! differences between stores.
//!
//! The router resolves exactly one adapter from the `BACKEND` configuration
//! key at startup and the process keeps it for its lifetime.

pub mod aws;
pub mod consul;
pub mod etcd;
pub mod mongo;
pub mod vault;

pub use aws::AwsSecretsManager;
pub use consul::ConsulStore;
pub use etcd::EtcdStore;
pub use mongo::MongoPayloadStore;
pub use vault::VaultStore;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{BackendKind, Settings};
use crate::error::{Error, Result};

/// Put/Get/Delete/Update of an opaque payload by stable id.
///
/// Payloads are JSON bytes from the caller's perspective; adapters never
/// inspect them beyond what their own wire format requires.
#[async_trait]
pub trait SecretStoreBackend: Send + Sync {
    /// Adapter name used in error tags and logs.
    fn name(&self) -> &'static str;

    /// Store a payload under a new id. Create-or-fail or upsert, per the
    /// adapter's store.
    async fn put(&self, id: &str, payload: &[u8]) -> Result<()>;

    /// Fetch the payload, or `NOT_FOUND`.
    async fn get(&self, id: &str) -> Result<Vec<u8>>;

    /// Remove the payload. Idempotent where the store allows it.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Replace an existing payload.
    async fn update(&self, id: &str, payload: &[u8]) -> Result<()>;
}

/// Resolve the configured backend adapter once at startup.
///
/// The in-database backend shares the metadata database handle; selecting
/// it without one is a configuration error.
pub async fn build(
    settings: &Settings,
    database: Option<&mongodb::Database>,
) -> Result<Arc<dyn SecretStoreBackend>> {
    match settings.backend {
        BackendKind::AwsSecretsManager => Ok(Arc::new(
            AwsSecretsManager::new(&settings.connectors.aws).await?,
        )),
        BackendKind::Consul => Ok(Arc::new(ConsulStore::new(&settings.connectors.consul)?)),
        BackendKind::Etcd => Ok(Arc::new(EtcdStore::connect(&settings.connectors.etcd).await?)),
        BackendKind::MongoDb => {
            let database = database.ok_or_else(|| Error::WrongConfiguration {
                key: "DATABASES.default".into(),
            })?;
            Ok(Arc::new(
                MongoPayloadStore::new(database, &settings.connectors.mongo).await?,
            ))
        }
        BackendKind::Vault => Ok(Arc::new(VaultStore::new(&settings.connectors.vault)?)),
    }
}

/// Payloads are JSON and therefore UTF-8; adapters that speak string-typed
/// wire formats go through here.
pub(crate) fn payload_str(payload: &[u8]) -> Result<&str> {
    std::str::from_utf8(payload)
        .map_err(|_| Error::internal("backend payload is not valid UTF-8"))
}
