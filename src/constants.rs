//! # Constants
//!
//! Crate-wide defaults and fixed parameters.

/// Default Consul HTTP API address.
pub const DEFAULT_CONSUL_ADDR: &str = "http://127.0.0.1:8500";

/// Default etcd endpoint.
pub const DEFAULT_ETCD_ENDPOINT: &str = "127.0.0.1:2379";

/// Default Vault KV v2 mount point.
pub const DEFAULT_VAULT_MOUNT: &str = "secret";

/// Default metadata database connection string.
pub const DEFAULT_MONGODB_URI: &str = "mongodb://127.0.0.1:27017";

/// Default metadata database name.
pub const DEFAULT_DATABASE: &str = "secret";

/// Collection holding opaque payloads for the in-database backend.
pub const DEFAULT_PAYLOAD_COLLECTION: &str = "secret_data";

/// Data keys are 256-bit, matching AES-256-GCM.
pub const DATA_KEY_LEN: usize = 32;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Budget for a single compensating action during rollback.
pub const ROLLBACK_TIMEOUT_SECS: u64 = 10;

/// Wildcard value for scope fields on records that live above the
/// matching level of the hierarchy.
pub const SCOPE_WILDCARD: &str = "*";

/// Length of the random suffix on generated record ids.
pub const GENERATED_ID_LEN: usize = 12;

/// Replacement written into logs for masked fields.
pub const MASK_PLACEHOLDER: &str = "*****";
