//! # Data Model
//!
//! Typed records for the three secret kinds, the query/filter model used by
//! the metadata store, and the wire shapes returned by `get_data`.

mod data;
mod query;
mod secret;
mod trusted_secret;
mod user_secret;

pub use data::{EncryptAlgorithm, EncryptOptions, EncryptType, EnvelopeBundle, SecretData};
pub use query::{Aggregate, Condition, FilterOp, GroupKey, Page, Query, Sort, StatQuery};
pub use secret::{CreateSecretParams, Secret, SecretPatch};
pub use trusted_secret::{CreateTrustedSecretParams, TrustedSecret, TrustedSecretPatch};
pub use user_secret::{CreateUserSecretParams, UserSecret, UserSecretPatch};

use serde::{Deserialize, Serialize};

use crate::constants::GENERATED_ID_LEN;

/// Scope at which a record lives. Determines visibility and the permission
/// checks applied to every operation touching the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceGroup {
    Domain,
    Workspace,
    Project,
}

impl ResourceGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceGroup::Domain => "DOMAIN",
            ResourceGroup::Workspace => "WORKSPACE",
            ResourceGroup::Project => "PROJECT",
        }
    }
}

/// Generate a record id of the form `<prefix>-<12 hex chars>`.
///
/// Ids are globally unique and immutable once assigned.
pub(crate) fn generate_id(prefix: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &suffix[..GENERATED_ID_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_shape() {
        let id = generate_id("secret");
        assert!(id.starts_with("secret-"));
        assert_eq!(id.len(), "secret-".len() + GENERATED_ID_LEN);
    }

    #[test]
    fn test_resource_group_serde_names() {
        let json = serde_json::to_string(&ResourceGroup::Workspace).unwrap();
        assert_eq!(json, "\"WORKSPACE\"");
        let back: ResourceGroup = serde_json::from_str("\"PROJECT\"").unwrap();
        assert_eq!(back, ResourceGroup::Project);
    }
}
