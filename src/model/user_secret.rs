//! # User Secret Record
//!
//! User-scoped secret, independent of the workspace/project hierarchy.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::metadata::Entity;
use crate::model::{generate_id, EncryptOptions};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSecret {
    pub user_secret_id: String,
    pub name: String,
    pub schema_id: Option<String>,
    pub provider: Option<String>,
    pub tags: HashMap<String, String>,
    pub encrypted: bool,
    pub encrypt_options: EncryptOptions,
    pub user_id: String,
    pub domain_id: String,
    pub created_at: DateTime<Utc>,
}

impl UserSecret {
    pub fn new(
        params: &CreateUserSecretParams,
        user_id: &str,
        domain_id: &str,
        encrypted: bool,
        encrypt_options: EncryptOptions,
    ) -> Self {
        UserSecret {
            user_secret_id: generate_id("user-secret"),
            name: params.name.clone(),
            schema_id: params.schema_id.clone(),
            provider: None,
            tags: params.tags.clone(),
            encrypted,
            encrypt_options,
            user_id: user_id.to_string(),
            domain_id: domain_id.to_string(),
            created_at: Utc::now(),
        }
    }
}

impl Entity for UserSecret {
    const RESOURCE: &'static str = "user secret";
    const COLLECTION: &'static str = "user_secret";
    const ID_FIELD: &'static str = "user_secret_id";
    const INDEX_FIELDS: &'static [&'static str] = &[
        "user_secret_id",
        "name",
        "schema_id",
        "provider",
        "user_id",
        "domain_id",
    ];
    const UNIQUE_FIELDS: &'static [&'static [&'static str]] = &[];
    const SEARCH_FIELDS: &'static [&'static str] =
        &["user_secret_id", "name", "schema_id", "provider"];

    fn id(&self) -> &str {
        &self.user_secret_id
    }
}

/// Inputs of `UserSecret.create`. `user_id` and `domain_id` are inherited
/// from the authenticated token.
#[derive(Debug, Clone, Serialize)]
pub struct CreateUserSecretParams {
    pub name: String,
    pub data: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypt_options: Option<EncryptOptions>,
}

impl CreateUserSecretParams {
    pub fn new(name: impl Into<String>, data: Map<String, Value>) -> Self {
        CreateUserSecretParams {
            name: name.into(),
            data,
            schema_id: None,
            tags: HashMap::new(),
            encrypted: None,
            encrypt_options: None,
        }
    }
}

/// Partial update limited to the declared updatable subset.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserSecretPatch {
    pub name: Option<String>,
    pub tags: Option<HashMap<String, String>>,
    pub schema_id: Option<String>,
    pub encrypted: Option<bool>,
    pub encrypt_options: Option<EncryptOptions>,
}

impl UserSecretPatch {
    pub fn apply(self, record: &mut UserSecret) {
        if let Some(name) = self.name {
            record.name = name;
        }
        if let Some(tags) = self.tags {
            record.tags = tags;
        }
        if let Some(schema_id) = self.schema_id {
            record.schema_id = Some(schema_id);
        }
        if let Some(encrypted) = self.encrypted {
            record.encrypted = encrypted;
        }
        if let Some(encrypt_options) = self.encrypt_options {
            record.encrypt_options = encrypt_options;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_secret_carries_token_scope() {
        let params = CreateUserSecretParams::new("api-token", Map::new());
        let record = UserSecret::new(&params, "user-1", "domain-1", false, Default::default());
        assert_eq!(record.user_id, "user-1");
        assert_eq!(record.domain_id, "domain-1");
        assert!(record.user_secret_id.starts_with("user-secret-"));
    }
}
