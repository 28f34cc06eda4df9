//! # Trusted Secret Record
//!
//! Domain- or workspace-scoped secret that may act as the parent of one or
//! more secrets. A domain-wide trusted secret carries the wildcard workspace
//! so children in any workspace of the domain can reference it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::SCOPE_WILDCARD;
use crate::metadata::Entity;
use crate::model::{generate_id, EncryptOptions, ResourceGroup};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustedSecret {
    pub trusted_secret_id: String,
    pub name: String,
    pub schema_id: Option<String>,
    pub provider: Option<String>,
    pub tags: HashMap<String, String>,
    pub encrypted: bool,
    pub encrypt_options: EncryptOptions,
    pub trusted_account_id: Option<String>,
    /// `DOMAIN` or `WORKSPACE`; the project level does not exist here.
    pub resource_group: ResourceGroup,
    /// `"*"` for domain-group records.
    pub workspace_id: String,
    pub domain_id: String,
    pub created_at: DateTime<Utc>,
}

impl TrustedSecret {
    pub fn new(
        params: &CreateTrustedSecretParams,
        domain_id: &str,
        provider: Option<String>,
        workspace_id: Option<String>,
        encrypted: bool,
        encrypt_options: EncryptOptions,
    ) -> Self {
        let workspace_id = match params.resource_group {
            ResourceGroup::Workspace => workspace_id.unwrap_or_else(|| SCOPE_WILDCARD.to_string()),
            _ => SCOPE_WILDCARD.to_string(),
        };

        TrustedSecret {
            trusted_secret_id: generate_id("trusted-secret"),
            name: params.name.clone(),
            schema_id: params.schema_id.clone(),
            provider,
            tags: params.tags.clone(),
            encrypted,
            encrypt_options,
            trusted_account_id: params.trusted_account_id.clone(),
            resource_group: params.resource_group,
            workspace_id,
            domain_id: domain_id.to_string(),
            created_at: Utc::now(),
        }
    }
}

impl Entity for TrustedSecret {
    const RESOURCE: &'static str = "trusted secret";
    const COLLECTION: &'static str = "trusted_secret";
    const ID_FIELD: &'static str = "trusted_secret_id";
    const INDEX_FIELDS: &'static [&'static str] = &[
        "trusted_secret_id",
        "name",
        "schema_id",
        "provider",
        "trusted_account_id",
        "resource_group",
        "workspace_id",
        "domain_id",
    ];
    /// Names are unique per domain; concurrent creates race to a single
    /// winner and the rest receive a name conflict.
    const UNIQUE_FIELDS: &'static [&'static [&'static str]] = &[&["name", "domain_id"]];
    const SEARCH_FIELDS: &'static [&'static str] =
        &["trusted_secret_id", "name", "schema_id", "provider"];

    fn id(&self) -> &str {
        &self.trusted_secret_id
    }
}

/// Inputs of `TrustedSecret.create`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateTrustedSecretParams {
    pub name: String,
    pub data: Map<String, Value>,
    pub resource_group: ResourceGroup,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypt_options: Option<EncryptOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trusted_account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
}

impl CreateTrustedSecretParams {
    pub fn new(name: impl Into<String>, data: Map<String, Value>, group: ResourceGroup) -> Self {
        CreateTrustedSecretParams {
            name: name.into(),
            data,
            resource_group: group,
            schema_id: None,
            tags: HashMap::new(),
            encrypted: None,
            encrypt_options: None,
            trusted_account_id: None,
            workspace_id: None,
        }
    }
}

/// Partial update limited to the declared updatable subset.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrustedSecretPatch {
    pub name: Option<String>,
    pub tags: Option<HashMap<String, String>>,
    pub schema_id: Option<String>,
    pub encrypted: Option<bool>,
    pub encrypt_options: Option<EncryptOptions>,
}

impl TrustedSecretPatch {
    pub fn apply(self, record: &mut TrustedSecret) {
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
