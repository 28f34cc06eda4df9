//! # KMS Adapters
//!
//! Data-key generation and unwrapping against a tenant-owned key management
//! service. The contract is purely functional so additional KMS backends
//! plug in behind [`KmsClient`]; the adapter is selected once at startup
//! from the configured encrypt type.

pub mod aws;
pub mod local;

pub use aws::AwsKms;
pub use local::LocalKms;

use std::sync::Arc;

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::config::Settings;
use crate::crypto::EncryptContext;
use crate::error::Result;
use crate::model::EncryptType;

/// A fresh data key: the plaintext form for immediate AEAD use and the
/// KMS-wrapped form for storage. The plaintext zeroizes on drop.
pub struct DataKey {
    pub plaintext: Zeroizing<Vec<u8>>,
    pub wrapped: Vec<u8>,
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataKey")
            .field("plaintext", &"[REDACTED]")
            .field("wrapped_len", &self.wrapped.len())
            .finish()
    }
}

#[async_trait]
pub trait KmsClient: Send + Sync {
    /// Generate a fresh 256-bit data key bound to the given context.
    async fn generate_data_key(&self, context: &EncryptContext) -> Result<DataKey>;

    /// Unwrap a data key. The context must match the one used at wrap time.
    async fn decrypt_data_key(
        &self,
        wrapped: &[u8],
        context: &EncryptContext,
    ) -> Result<Zeroizing<Vec<u8>>>;
}

/// Resolve the KMS adapter for the configured encrypt type.
pub async fn build(settings: &Settings) -> Result<Arc<dyn KmsClient>> {
    match settings.encrypt_type {
        EncryptType::AwsKms => Ok(Arc::new(AwsKms::new(&settings.connectors.aws).await?)),
        EncryptType::Local => Ok(Arc::new(LocalKms::new())),
    }
}
