//! # Service Layer
//!
//! Orchestration behind the stable operation contract: one service per
//! record kind, each wiring the enforcer, the metadata store, the backend
//! store, and (when encryption is on) the encryption engine through the
//! create/update/delete workflows with rollback.

pub mod secret;
pub mod trusted_secret;
pub mod user_secret;

pub use secret::{
    ListSecretParams, SecretService, UpdateSecretDataParams, UpdateSecretParams,
};
pub use trusted_secret::{
    ListTrustedSecretParams, TrustedSecretService, UpdateTrustedSecretDataParams,
    UpdateTrustedSecretParams,
};
pub use user_secret::{
    ListUserSecretParams, UpdateUserSecretDataParams, UpdateUserSecretParams, UserSecretService,
};

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::config::MaskingRules;
use crate::crypto::EncryptionEngine;
use crate::error::{Error, Result};
use crate::model::{EncryptAlgorithm, EncryptOptions};

/// How the payload of a write is protected.
#[derive(Debug, Clone)]
pub(crate) enum EncryptMode {
    /// Stored as the caller's plaintext map.
    Plaintext,
    /// The engine envelope-encrypts before the payload reaches the backend.
    ServiceManaged,
    /// The caller already encrypted and supplies complete options; bytes
    /// are stored verbatim.
    CallerSupplied(EncryptOptions),
}

impl EncryptMode {
    /// The `encrypted` flag and algorithm the resulting record will carry,
    /// used for trusted-parent parity checks before anything is written.
    pub(crate) fn parity(&self) -> (bool, Option<EncryptAlgorithm>) {
        match self {
            EncryptMode::Plaintext => (false, None),
            EncryptMode::ServiceManaged => (true, Some(EncryptAlgorithm::Aes256Gcm)),
            EncryptMode::CallerSupplied(options) => (true, options.encrypt_algorithm),
        }
    }
}

/// Resolve the write mode from the caller's request and the configured
/// engine. An explicit `encrypted` flag from the caller wins; otherwise the
/// global encryption switch decides.
pub(crate) fn resolve_encrypt_mode(
    engine: Option<&Arc<EncryptionEngine>>,
    encrypted: Option<bool>,
    encrypt_options: Option<EncryptOptions>,
) -> Result<EncryptMode> {
    match encrypted {
        Some(true) => {
            let options = encrypt_options.ok_or(Error::RequiredParameter {
                key: "encrypt_options",
            })?;
            if !options.is_complete() {
                return Err(Error::WrongConfiguration {
                    key: "encrypt_options".into(),
                });
            }
            Ok(EncryptMode::CallerSupplied(options))
        }
        Some(false) => Ok(EncryptMode::Plaintext),
        None => {
            if engine.is_some() {
                Ok(EncryptMode::ServiceManaged)
            } else {
                Ok(EncryptMode::Plaintext)
            }
        }
    }
}

/// Emit the operation log line with masking applied.
pub(crate) fn log_operation<P: Serialize>(masking: &MaskingRules, operation: &str, params: &P) {
    if let Ok(value) = serde_json::to_value(params) {
        info!(operation, params = %masking.apply(operation, &value), "request");
    } else {
        info!(operation, "request");
    }
}

pub(crate) mod validate {
    use super::{Error, Map, Result, Value};

    pub fn required_str(key: &'static str, value: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(Error::RequiredParameter { key });
        }
        Ok(())
    }

    pub fn required_map(key: &'static str, value: &Map<String, Value>) -> Result<()> {
        if value.is_empty() {
            return Err(Error::RequiredParameter { key });
        }
        Ok(())
    }
}
