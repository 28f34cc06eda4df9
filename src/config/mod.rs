//! # Configuration
//!
//! Process-wide settings read once at startup from environment variables and
//! passed into the runtime as an immutable value. Nothing here is mutated
//! after bootstrap; components receive the pieces they need explicitly.

mod masking;

pub use masking::MaskingRules;

use crate::constants::{
    DEFAULT_CONSUL_ADDR, DEFAULT_DATABASE, DEFAULT_ETCD_ENDPOINT, DEFAULT_MONGODB_URI,
    DEFAULT_PAYLOAD_COLLECTION, DEFAULT_VAULT_MOUNT,
};
use crate::error::{Error, Result};
use crate::model::EncryptType;

/// Backend store adapter selected by the `BACKEND` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    AwsSecretsManager,
    Consul,
    Etcd,
    MongoDb,
    Vault,
}

impl BackendKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "" | "aws_secrets_manager" | "aws" => Ok(BackendKind::AwsSecretsManager),
            "consul" => Ok(BackendKind::Consul),
            "etcd" => Ok(BackendKind::Etcd),
            "mongodb" => Ok(BackendKind::MongoDb),
            "vault" => Ok(BackendKind::Vault),
            _ => Err(Error::BackendNotDefined {
                backend: value.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::AwsSecretsManager => "aws_secrets_manager",
            BackendKind::Consul => "consul",
            BackendKind::Etcd => "etcd",
            BackendKind::MongoDb => "mongodb",
            BackendKind::Vault => "vault",
        }
    }
}

fn parse_encrypt_type(value: &str) -> Result<EncryptType> {
    match value.to_lowercase().as_str() {
        "" | "aws_kms" => Ok(EncryptType::AwsKms),
        "local" => Ok(EncryptType::Local),
        _ => Err(Error::UnsupportedEncryptType {
            value: value.to_string(),
        }),
    }
}

/// AWS connector settings, shared by the Secrets Manager backend and the
/// KMS adapter. Credentials fall back to the SDK default chain when the
/// static pair is absent.
#[derive(Debug, Clone, Default)]
pub struct AwsSettings {
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub kms_key_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConsulSettings {
    pub address: String,
    pub token: Option<String>,
    pub datacenter: Option<String>,
}

impl Default for ConsulSettings {
    fn default() -> Self {
        ConsulSettings {
            address: DEFAULT_CONSUL_ADDR.to_string(),
            token: None,
            datacenter: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EtcdSettings {
    pub endpoints: Vec<String>,
}

impl Default for EtcdSettings {
    fn default() -> Self {
        EtcdSettings {
            endpoints: vec![DEFAULT_ETCD_ENDPOINT.to_string()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct VaultSettings {
    pub address: Option<String>,
    pub token: Option<String>,
    pub mount: String,
}

impl Default for VaultSettings {
    fn default() -> Self {
        VaultSettings {
            address: None,
            token: None,
            mount: DEFAULT_VAULT_MOUNT.to_string(),
        }
    }
}

/// Collection used by the in-database payload backend.
#[derive(Debug, Clone)]
pub struct MongoPayloadSettings {
    pub collection: String,
}

impl Default for MongoPayloadSettings {
    fn default() -> Self {
        MongoPayloadSettings {
            collection: DEFAULT_PAYLOAD_COLLECTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IdentitySettings {
    pub endpoint: Option<String>,
}

/// Per-adapter connector settings.
#[derive(Debug, Clone, Default)]
pub struct Connectors {
    pub aws: AwsSettings,
    pub consul: ConsulSettings,
    pub etcd: EtcdSettings,
    pub vault: VaultSettings,
    pub mongo: MongoPayloadSettings,
    pub identity: IdentitySettings,
}

/// Metadata database connection.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub uri: String,
    pub database: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            uri: DEFAULT_MONGODB_URI.to_string(),
            database: DEFAULT_DATABASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    pub masking: MaskingRules,
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Backend store for opaque payloads.
    pub backend: BackendKind,
    /// Envelope-encrypt payloads service-side.
    pub encrypt: bool,
    /// KMS family used when encryption is on.
    pub encrypt_type: EncryptType,
    /// System token for privileged identity-service calls.
    pub system_token: Option<String>,
    pub connectors: Connectors,
    pub database: DatabaseSettings,
    pub log: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            backend: BackendKind::AwsSecretsManager,
            encrypt: false,
            encrypt_type: EncryptType::AwsKms,
            system_token: None,
            connectors: Connectors::default(),
            database: DatabaseSettings::default(),
            log: LogSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from environment variables with defaults. Unknown
    /// backend or encrypt-type names fail here rather than at first use.
    pub fn from_env() -> Result<Self> {
        let backend = BackendKind::parse(&env_or_default("BACKEND", ""))?;
        let encrypt = env_or_default("ENCRYPT", "false")
            .parse::<bool>()
            .unwrap_or(false);
        let encrypt_type = parse_encrypt_type(&env_or_default("ENCRYPT_TYPE", ""))?;

        let connectors = Connectors {
            aws: AwsSettings {
                region: env_opt("AWS_REGION"),
                access_key_id: env_opt("AWS_ACCESS_KEY_ID"),
                secret_access_key: env_opt("AWS_SECRET_ACCESS_KEY"),
                kms_key_id: env_opt("AWS_KMS_KEY_ID"),
            },
            consul: ConsulSettings {
                address: env_or_default("CONSUL_ADDR", DEFAULT_CONSUL_ADDR),
                token: env_opt("CONSUL_TOKEN"),
                datacenter: env_opt("CONSUL_DATACENTER"),
            },
            etcd: EtcdSettings {
                endpoints: env_or_default("ETCD_ENDPOINTS", DEFAULT_ETCD_ENDPOINT)
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            vault: VaultSettings {
                address: env_opt("VAULT_ADDR"),
                token: env_opt("VAULT_TOKEN"),
                mount: env_or_default("VAULT_MOUNT", DEFAULT_VAULT_MOUNT),
            },
            mongo: MongoPayloadSettings {
                collection: env_or_default("PAYLOAD_COLLECTION", DEFAULT_PAYLOAD_COLLECTION),
            },
            identity: IdentitySettings {
                endpoint: env_opt("IDENTITY_ENDPOINT"),
            },
        };

        Ok(Settings {
            backend,
            encrypt,
            encrypt_type,
            system_token: env_opt("TOKEN"),
            connectors,
            database: DatabaseSettings {
                uri: env_or_default("MONGODB_URI", DEFAULT_MONGODB_URI),
                database: env_or_default("MONGODB_DATABASE", DEFAULT_DATABASE),
            },
            log: LogSettings::default(),
        })
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_or_default(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse() {
        assert_eq!(
            BackendKind::parse("").unwrap(),
            BackendKind::AwsSecretsManager
        );
        assert_eq!(BackendKind::parse("CONSUL").unwrap(), BackendKind::Consul);
        assert_eq!(BackendKind::parse("etcd").unwrap(), BackendKind::Etcd);
        let err = BackendKind::parse("redis").unwrap_err();
        assert_eq!(err.code(), "BACKEND_NOT_DEFINED");
    }

    #[test]
    fn test_encrypt_type_parse() {
        assert_eq!(parse_encrypt_type("").unwrap(), EncryptType::AwsKms);
        assert_eq!(parse_encrypt_type("local").unwrap(), EncryptType::Local);
        let err = parse_encrypt_type("gcp_kms").unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_ENCRYPT_TYPE");
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.backend, BackendKind::AwsSecretsManager);
        assert!(!settings.encrypt);
        assert_eq!(settings.database.database, "secret");
        assert_eq!(settings.connectors.vault.mount, "secret");
    }
}
