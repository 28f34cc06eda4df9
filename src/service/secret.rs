//! # Secret Operations
//!
//! Lifecycle of workspace/project/domain scoped secrets. Writes cross the
//! metadata store and the backend store under the write-ahead-rollback
//! discipline: metadata first on create (so a record without payload is the
//! detectable inconsistency), payload first on delete (so the visible
//! orphan is again metadata without payload).

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::authz::{AuthContext, Enforcer, RequiredScope};
use crate::config::MaskingRules;
use crate::constants::SCOPE_WILDCARD;
use crate::crypto::{EncryptContext, EncryptionEngine};
use crate::error::{Error, Result};
use crate::metadata::{get_scoped, remove_scoped, RecordStore};
use crate::model::{
    Condition, CreateSecretParams, EncryptAlgorithm, EncryptOptions, EnvelopeBundle, Query,
    Secret, SecretData, SecretPatch, StatQuery, TrustedSecret,
};
use crate::provider::SecretStoreBackend;
use crate::service::{log_operation, resolve_encrypt_mode, validate, EncryptMode};
use crate::txn::RollbackStack;

/// Inputs of `Secret.update`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateSecretParams {
    pub secret_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub release_project: bool,
}

/// Inputs of `Secret.update_data`.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateSecretDataParams {
    pub secret_id: String,
    pub data: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypt_options: Option<EncryptOptions>,
}

/// Inputs of `Secret.list`; every field narrows the listing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListSecretParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trusted_secret_id: Option<String>,
    pub query: Query,
}

pub struct SecretService {
    metadata: Arc<dyn RecordStore<Secret>>,
    trusted_metadata: Arc<dyn RecordStore<TrustedSecret>>,
    backend: Arc<dyn SecretStoreBackend>,
    engine: Option<Arc<EncryptionEngine>>,
    enforcer: Arc<Enforcer>,
    masking: Arc<MaskingRules>,
}

impl std::fmt::Debug for SecretService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretService")
            .field("backend", &self.backend.name())
            .field("encrypt", &self.engine.is_some())
            .finish_non_exhaustive()
    }
}

impl SecretService {
    pub fn new(
        metadata: Arc<dyn RecordStore<Secret>>,
        trusted_metadata: Arc<dyn RecordStore<TrustedSecret>>,
        backend: Arc<dyn SecretStoreBackend>,
        engine: Option<Arc<EncryptionEngine>>,
        enforcer: Arc<Enforcer>,
        masking: Arc<MaskingRules>,
    ) -> Self {
        SecretService {
            metadata,
            trusted_metadata,
            backend,
            engine,
            enforcer,
            masking,
        }
    }

    /// Create a secret: metadata record plus backend payload, optionally
    /// envelope-encrypted. Any failure after the metadata insert rolls the
    /// record back.
    pub async fn create(&self, ctx: &AuthContext, params: CreateSecretParams) -> Result<Secret> {
        validate::required_str("name", &params.name)?;
        validate::required_map("data", &params.data)?;
        self.enforcer.authorize(ctx, params.resource_group.into())?;
        log_operation(&self.masking, "Secret.create", &params);

        let scope = self.enforcer.resolve_secret_scope(ctx, &params).await?;
        let mode = resolve_encrypt_mode(
            self.engine.as_ref(),
            params.encrypted,
            params.encrypt_options.clone(),
        )?;

        if let Some(parent_id) = &params.trusted_secret_id {
            let workspace_id = scope
                .workspace_id
                .clone()
                .or_else(|| ctx.workspace_id.clone())
                .unwrap_or_else(|| SCOPE_WILDCARD.to_string());
            let parent = self
                .enforcer
                .resolve_trusted_parent(
                    self.trusted_metadata.as_ref(),
                    parent_id,
                    &ctx.domain_id,
                    &workspace_id,
                )
                .await?;
            let (encrypted, algorithm) = mode.parity();
            self.enforcer
                .check_encryption_parity(encrypted, algorithm, &parent)?;
        }

        let (encrypted, initial_options) = initial_encrypt_state(&mode, self.engine.as_deref());
        let record = Secret::new(
            &params,
            &ctx.domain_id,
            scope.provider,
            scope.project_id,
            scope.workspace_id,
            encrypted,
            initial_options,
        );

        let mut tx = RollbackStack::new();
        match self.create_inner(&record, &params.data, &mode, &mut tx).await {
            Ok(stored) => {
                tx.commit();
                Ok(stored)
            }
            Err(err) => {
                tx.run().await;
                Err(err)
            }
        }
    }

    async fn create_inner(
        &self,
        record: &Secret,
        data: &Map<String, Value>,
        mode: &EncryptMode,
        tx: &mut RollbackStack,
    ) -> Result<Secret> {
        self.metadata.insert(record).await?;
        {
            let metadata = Arc::clone(&self.metadata);
            let secret_id = record.secret_id.clone();
            let domain_id = record.domain_id.clone();
            tx.push(format!("delete secret metadata {secret_id}"), move || async move {
                metadata
                    .remove(&[
                        Condition::eq("secret_id", secret_id),
                        Condition::eq("domain_id", domain_id),
                    ])
                    .await
                    .map(|_| ())
            });
        }

        let mut stored = record.clone();
        let payload = match mode {
            EncryptMode::Plaintext | EncryptMode::CallerSupplied(_) => {
                serde_json::to_vec(data).map_err(|e| Error::internal(e.to_string()))?
            }
            EncryptMode::ServiceManaged => {
                let engine = self.engine.as_ref().ok_or_else(|| {
                    Error::internal("encryption requested without a configured engine")
                })?;
                let context = EncryptContext::new(&record.domain_id, &record.secret_id);
                let (bundle, wrapped_key) = engine.encrypt(data, &context).await?;
                stored.encrypt_options = engine.build_options(&context, &bundle, &wrapped_key);
                // A racing delete wins; the missing record is a no-op here.
                let _ = self.metadata.replace(&stored).await?;
                serde_json::to_vec(&bundle).map_err(|e| Error::internal(e.to_string()))?
            }
        };

        self.backend.put(&stored.secret_id, &payload).await?;
        {
            let backend = Arc::clone(&self.backend);
            let secret_id = stored.secret_id.clone();
            tx.push(format!("delete backend payload {secret_id}"), move || async move {
                backend.delete(&secret_id).await
            });
        }
        Ok(stored)
    }

    /// Update metadata fields; the payload is untouched.
    pub async fn update(&self, ctx: &AuthContext, params: UpdateSecretParams) -> Result<Secret> {
        validate::required_str("secret_id", &params.secret_id)?;
        self.enforcer.authorize(ctx, RequiredScope::Project)?;
        log_operation(&self.masking, "Secret.update", &params);

        let record = get_scoped(
            self.metadata.as_ref(),
            &params.secret_id,
            &self.enforcer.domain_scope(ctx),
        )
        .await?;

        if let Some(project_id) = &params.project_id {
            if !params.release_project {
                self.enforcer.check_project(project_id, &ctx.domain_id).await?;
            }
        }

        let mut updated = record.clone();
        SecretPatch {
            name: params.name,
            tags: params.tags,
            schema_id: params.schema_id,
            project_id: params.project_id,
            release_project: params.release_project,
            ..Default::default()
        }
        .apply(&mut updated);

        if !self.metadata.replace(&updated).await? {
            return Err(Error::not_found("secret", &params.secret_id));
        }
        Ok(updated)
    }

    /// Replace the payload (re-encrypting when encryption applies). When the
    /// backend write fails, the previous metadata is restored and the
    /// backend payload is reported as untouched.
    pub async fn update_data(
        &self,
        ctx: &AuthContext,
        params: UpdateSecretDataParams,
    ) -> Result<Secret> {
        validate::required_str("secret_id", &params.secret_id)?;
        validate::required_map("data", &params.data)?;
        self.enforcer.authorize(ctx, RequiredScope::Project)?;
        log_operation(&self.masking, "Secret.update_data", &params);

        let record = get_scoped(
            self.metadata.as_ref(),
            &params.secret_id,
            &self.enforcer.domain_scope(ctx),
        )
        .await?;
        let mode = resolve_encrypt_mode(
            self.engine.as_ref(),
            params.encrypted,
            params.encrypt_options.clone(),
        )?;

        if let Some(parent_id) = &record.trusted_secret_id {
            let parent = self
                .enforcer
                .resolve_trusted_parent(
                    self.trusted_metadata.as_ref(),
                    parent_id,
                    &record.domain_id,
                    &record.workspace_id,
                )
                .await?;
            let (encrypted, algorithm) = mode.parity();
            self.enforcer
                .check_encryption_parity(encrypted, algorithm, &parent)?;
        }

        let mut updated = record.clone();
        if let Some(schema_id) = params.schema_id.clone() {
            updated.schema_id = Some(schema_id);
        }
        let payload = match &mode {
            EncryptMode::Plaintext => {
                updated.encrypted = false;
                updated.encrypt_options = EncryptOptions::default();
                serde_json::to_vec(&params.data).map_err(|e| Error::internal(e.to_string()))?
            }
            EncryptMode::CallerSupplied(options) => {
                updated.encrypted = true;
                updated.encrypt_options = options.clone();
                serde_json::to_vec(&params.data).map_err(|e| Error::internal(e.to_string()))?
            }
            EncryptMode::ServiceManaged => {
                let engine = self.engine.as_ref().ok_or_else(|| {
                    Error::internal("encryption requested without a configured engine")
                })?;
                let context = EncryptContext::new(&record.domain_id, &record.secret_id);
                let (bundle, wrapped_key) = engine.encrypt(&params.data, &context).await?;
                updated.encrypted = true;
                updated.encrypt_options = engine.build_options(&context, &bundle, &wrapped_key);
                serde_json::to_vec(&bundle).map_err(|e| Error::internal(e.to_string()))?
            }
        };

        let mut tx = RollbackStack::new();
        if !self.metadata.replace(&updated).await? {
            return Err(Error::not_found("secret", &params.secret_id));
        }
        {
            let metadata = Arc::clone(&self.metadata);
            let previous = record.clone();
            tx.push(
                format!("restore secret metadata {}", record.secret_id),
                move || async move { metadata.replace(&previous).await.map(|_| ()) },
            );
        }

        match self.backend.update(&record.secret_id, &payload).await {
            Ok(()) => {
                tx.commit();
                Ok(updated)
            }
            Err(err) => {
                tx.run().await;
                Err(err)
            }
        }
    }

    /// Delete payload first, then metadata; an absent payload counts as
    /// already deleted.
    pub async fn delete(&self, ctx: &AuthContext, secret_id: &str) -> Result<()> {
        validate::required_str("secret_id", secret_id)?;
        self.enforcer.authorize(ctx, RequiredScope::Project)?;

        let record = get_scoped(
            self.metadata.as_ref(),
            secret_id,
            &self.enforcer.domain_scope(ctx),
        )
        .await?;

        self.backend.delete(&record.secret_id).await?;
        remove_scoped(
            self.metadata.as_ref(),
            secret_id,
            &self.enforcer.domain_scope(ctx),
        )
        .await
    }

    pub async fn get(&self, ctx: &AuthContext, secret_id: &str) -> Result<Secret> {
        validate::required_str("secret_id", secret_id)?;
        self.enforcer.authorize(ctx, RequiredScope::Project)?;
        get_scoped(
            self.metadata.as_ref(),
            secret_id,
            &self.enforcer.secret_read_scope(ctx),
        )
        .await
    }

    /// Fetch the payload. Plaintext records return their data (merged under
    /// a plaintext trusted parent when one is linked); encrypted records
    /// return the envelope bundle, with the parent's wrapped key and
    /// ciphertext attached when a trusted parent is linked.
    pub async fn get_data(&self, ctx: &AuthContext, secret_id: &str) -> Result<SecretData> {
        validate::required_str("secret_id", secret_id)?;
        self.enforcer.authorize(ctx, RequiredScope::System)?;

        let record = get_scoped(
            self.metadata.as_ref(),
            secret_id,
            &self.enforcer.domain_scope(ctx),
        )
        .await?;
        let payload = self.backend.get(&record.secret_id).await?;

        let parent = match &record.trusted_secret_id {
            Some(parent_id) => {
                let parent = self
                    .enforcer
                    .resolve_trusted_parent(
                        self.trusted_metadata.as_ref(),
                        parent_id,
                        &record.domain_id,
                        &record.workspace_id,
                    )
                    .await?;
                self.enforcer.check_encryption_parity(
                    record.encrypted,
                    record.encrypt_options.encrypt_algorithm,
                    &parent,
                )?;
                Some(parent)
            }
            None => None,
        };

        if record.encrypted {
            let bundle: EnvelopeBundle = serde_json::from_slice(&payload)
                .map_err(|_| Error::internal("stored payload is not an envelope bundle"))?;
            let mut options = record.encrypt_options.clone();
            let mut trusted_encrypted_data = None;
            if let Some(parent) = parent {
                let parent_payload = self.backend.get(&parent.trusted_secret_id).await?;
                let parent_bundle: EnvelopeBundle = serde_json::from_slice(&parent_payload)
                    .map_err(|_| {
                        Error::internal("stored trusted payload is not an envelope bundle")
                    })?;
                options.trusted_encrypted_data_key =
                    parent.encrypt_options.encrypt_data_key.clone();
                trusted_encrypted_data = Some(parent_bundle.encrypted_data);
            }
            Ok(SecretData::envelope(bundle, options, trusted_encrypted_data))
        } else {
            let mut data: Map<String, Value> = serde_json::from_slice(&payload)
                .map_err(|_| Error::internal("stored payload is not a JSON object"))?;
            if let Some(parent) = parent {
                let parent_payload = self.backend.get(&parent.trusted_secret_id).await?;
                let parent_data: Map<String, Value> = serde_json::from_slice(&parent_payload)
                    .map_err(|_| Error::internal("stored trusted payload is not a JSON object"))?;
                // Merge the parent underneath; the child's keys win.
                for (key, value) in parent_data {
                    data.entry(key).or_insert(value);
                }
            }
            Ok(SecretData::plaintext(data))
        }
    }

    pub async fn list(
        &self,
        ctx: &AuthContext,
        params: ListSecretParams,
    ) -> Result<(Vec<Secret>, u64)> {
        self.enforcer.authorize(ctx, RequiredScope::Project)?;

        let mut query = params.query.clone();
        query.filter.extend(self.enforcer.secret_read_scope(ctx));
        for (key, value) in [
            ("secret_id", params.secret_id),
            ("name", params.name),
            ("schema_id", params.schema_id),
            ("provider", params.provider),
            ("service_account_id", params.service_account_id),
            ("trusted_secret_id", params.trusted_secret_id),
        ] {
            if let Some(value) = value {
                query.filter.push(Condition::eq(key, value));
            }
        }
        self.metadata.query(&query).await
    }

    pub async fn stat(&self, ctx: &AuthContext, mut query: StatQuery) -> Result<Vec<Value>> {
        self.enforcer.authorize(ctx, RequiredScope::Project)?;
        query.filter.extend(self.enforcer.secret_read_scope(ctx));
        self.metadata.stat(&query).await
    }
}

/// Flag and options a new record starts with, before the engine (if any)
/// fills in the key material.
pub(crate) fn initial_encrypt_state(
    mode: &EncryptMode,
    engine: Option<&EncryptionEngine>,
) -> (bool, EncryptOptions) {
    match mode {
        EncryptMode::Plaintext => (false, EncryptOptions::default()),
        EncryptMode::CallerSupplied(options) => (true, options.clone()),
        EncryptMode::ServiceManaged => (
            true,
            EncryptOptions {
                encrypt_type: engine.map(|e| e.encrypt_type()),
                encrypt_algorithm: Some(EncryptAlgorithm::Aes256Gcm),
                ..Default::default()
            },
        ),
    }
}
