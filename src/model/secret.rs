//! # Secret Record
//!
//! Workspace/project/domain scoped secret: metadata persisted in the
//! database, payload held by the backend store under `secret_id`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::SCOPE_WILDCARD;
use crate::metadata::Entity;
use crate::model::{generate_id, EncryptOptions, ResourceGroup};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    pub secret_id: String,
    pub name: String,
    pub schema_id: Option<String>,
    pub provider: Option<String>,
    pub tags: HashMap<String, String>,
    pub encrypted: bool,
    pub encrypt_options: EncryptOptions,
    pub trusted_secret_id: Option<String>,
    pub service_account_id: Option<String>,
    pub resource_group: ResourceGroup,
    /// `"*"` for workspace- and domain-group records.
    pub project_id: String,
    /// `"*"` for domain-group records.
    pub workspace_id: String,
    pub domain_id: String,
    pub created_at: DateTime<Utc>,
}

impl Secret {
    /// Build a new record with a generated id. Scope fields must already be
    /// resolved: wildcard values are filled in from the resource group.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        params: &CreateSecretParams,
        domain_id: &str,
        provider: Option<String>,
        project_id: Option<String>,
        workspace_id: Option<String>,
        encrypted: bool,
        encrypt_options: EncryptOptions,
    ) -> Self {
        let (project_id, workspace_id) = match params.resource_group {
            ResourceGroup::Domain => (SCOPE_WILDCARD.to_string(), SCOPE_WILDCARD.to_string()),
            ResourceGroup::Workspace => (
                SCOPE_WILDCARD.to_string(),
                workspace_id.unwrap_or_else(|| SCOPE_WILDCARD.to_string()),
            ),
            ResourceGroup::Project => (
                project_id.unwrap_or_else(|| SCOPE_WILDCARD.to_string()),
                workspace_id.unwrap_or_else(|| SCOPE_WILDCARD.to_string()),
            ),
        };

        Secret {
            secret_id: generate_id("secret"),
            name: params.name.clone(),
            schema_id: params.schema_id.clone(),
            provider,
            tags: params.tags.clone(),
            encrypted,
            encrypt_options,
            trusted_secret_id: params.trusted_secret_id.clone(),
            service_account_id: params.service_account_id.clone(),
            resource_group: params.resource_group,
            project_id,
            workspace_id,
            domain_id: domain_id.to_string(),
            created_at: Utc::now(),
        }
    }
}

impl Entity for Secret {
    const RESOURCE: &'static str = "secret";
    const COLLECTION: &'static str = "secret";
    const ID_FIELD: &'static str = "secret_id";
    const INDEX_FIELDS: &'static [&'static str] = &[
        "secret_id",
        "name",
        "schema_id",
        "provider",
        "service_account_id",
        "trusted_secret_id",
        "resource_group",
        "project_id",
        "workspace_id",
        "domain_id",
    ];
    const UNIQUE_FIELDS: &'static [&'static [&'static str]] = &[];
    const SEARCH_FIELDS: &'static [&'static str] =
        &["secret_id", "name", "schema_id", "provider"];

    fn id(&self) -> &str {
        &self.secret_id
    }
}

/// Inputs of `Secret.create`. `domain_id` and the caller's scope come from
/// the authenticated token, not from here.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSecretParams {
    pub name: String,
    pub data: Map<String, Value>,
    pub resource_group: ResourceGroup,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
    /// `Some(true)` means the caller already encrypted the payload and
    /// supplies complete `encrypt_options`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypt_options: Option<EncryptOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trusted_secret_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
}

impl CreateSecretParams {
    pub fn new(name: impl Into<String>, data: Map<String, Value>, group: ResourceGroup) -> Self {
        CreateSecretParams {
            name: name.into(),
            data,
            resource_group: group,
            schema_id: None,
            tags: HashMap::new(),
            encrypted: None,
            encrypt_options: None,
            trusted_secret_id: None,
            service_account_id: None,
            project_id: None,
            workspace_id: None,
        }
    }
}

/// Partial update limited to the declared updatable subset.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SecretPatch {
    pub name: Option<String>,
    pub tags: Option<HashMap<String, String>>,
    pub schema_id: Option<String>,
    pub encrypted: Option<bool>,
    pub encrypt_options: Option<EncryptOptions>,
    pub project_id: Option<String>,
    /// Detach the record from its project; the scope field becomes the
    /// wildcard so domain/workspace readers keep seeing it.
    pub release_project: bool,
}

impl SecretPatch {
    pub fn apply(self, record: &mut Secret) {
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
        if self.release_project {
            record.project_id = SCOPE_WILDCARD.to_string();
        } else if let Some(project_id) = self.project_id {
            record.project_id = project_id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_params(group: ResourceGroup) -> CreateSecretParams {
        let mut data = Map::new();
        data.insert("password".into(), Value::String("hunter2".into()));
        CreateSecretParams::new("db-credentials", data, group)
    }

    #[test]
    fn test_domain_group_uses_wildcards() {
        let record = Secret::new(
            &sample_params(ResourceGroup::Domain),
            "domain-1",
            None,
            Some("p1".into()),
            Some("ws1".into()),
            false,
            EncryptOptions::default(),
        );
        assert_eq!(record.project_id, "*");
        assert_eq!(record.workspace_id, "*");
        assert_eq!(record.domain_id, "domain-1");
    }

    #[test]
    fn test_project_group_keeps_resolved_scope() {
        let record = Secret::new(
            &sample_params(ResourceGroup::Project),
            "domain-1",
            Some("aws".into()),
            Some("p1".into()),
            Some("ws1".into()),
            false,
            EncryptOptions::default(),
        );
        assert_eq!(record.project_id, "p1");
        assert_eq!(record.workspace_id, "ws1");
        assert_eq!(record.provider.as_deref(), Some("aws"));
    }

    #[test]
    fn test_patch_release_project_wins_over_project_id() {
        let mut record = Secret::new(
            &sample_params(ResourceGroup::Project),
            "domain-1",
            None,
            Some("p1".into()),
            Some("ws1".into()),
            false,
            EncryptOptions::default(),
        );
        SecretPatch {
            project_id: Some("p2".into()),
            release_project: true,
            ..Default::default()
        }
        .apply(&mut record);
        assert_eq!(record.project_id, "*");
    }

    #[test]
    fn test_patch_updates_only_given_fields() {
        let mut record = Secret::new(
            &sample_params(ResourceGroup::Project),
            "domain-1",
            None,
            Some("p1".into()),
            Some("ws1".into()),
            false,
            EncryptOptions::default(),
        );
        let original_name = record.name.clone();
        SecretPatch {
            schema_id: Some("aws-access-key".into()),
            ..Default::default()
        }
        .apply(&mut record);
        assert_eq!(record.name, original_name);
        assert_eq!(record.schema_id.as_deref(), Some("aws-access-key"));
        assert_eq!(record.project_id, "p1");
    }
}
