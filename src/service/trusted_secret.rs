//! # Trusted Secret Operations
//!
//! Domain/workspace scoped parents for derived secrets. The shape follows
//! the secret lifecycle with two differences: there is no payload read
//! surface (children expose the parent's material through their own
//! `get_data`), and deletion is refused while any secret references the
//! record.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::authz::{AuthContext, Enforcer, RequiredScope};
use crate::config::MaskingRules;
use crate::crypto::{EncryptContext, EncryptionEngine};
use crate::error::{Error, Result};
use crate::metadata::{get_scoped, remove_scoped, RecordStore};
use crate::model::{
    Condition, CreateTrustedSecretParams, EncryptOptions, Query, Secret, StatQuery,
    TrustedSecret, TrustedSecretPatch,
};
use crate::provider::SecretStoreBackend;
use crate::service::secret::initial_encrypt_state;
use crate::service::{log_operation, resolve_encrypt_mode, validate, EncryptMode};
use crate::txn::RollbackStack;

/// Inputs of `TrustedSecret.update`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateTrustedSecretParams {
    pub trusted_secret_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,
}

/// Inputs of `TrustedSecret.update_data`.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateTrustedSecretDataParams {
    pub trusted_secret_id: String,
    pub data: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypt_options: Option<EncryptOptions>,
}

/// Inputs of `TrustedSecret.list`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListTrustedSecretParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trusted_secret_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trusted_account_id: Option<String>,
    pub query: Query,
}

pub struct TrustedSecretService {
    metadata: Arc<dyn RecordStore<TrustedSecret>>,
    secret_metadata: Arc<dyn RecordStore<Secret>>,
    backend: Arc<dyn SecretStoreBackend>,
    engine: Option<Arc<EncryptionEngine>>,
    enforcer: Arc<Enforcer>,
    masking: Arc<MaskingRules>,
}

impl std::fmt::Debug for TrustedSecretService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustedSecretService")
            .field("backend", &self.backend.name())
            .field("encrypt", &self.engine.is_some())
            .finish_non_exhaustive()
    }
}

impl TrustedSecretService {
    pub fn new(
        metadata: Arc<dyn RecordStore<TrustedSecret>>,
        secret_metadata: Arc<dyn RecordStore<Secret>>,
        backend: Arc<dyn SecretStoreBackend>,
        engine: Option<Arc<EncryptionEngine>>,
        enforcer: Arc<Enforcer>,
        masking: Arc<MaskingRules>,
    ) -> Self {
        TrustedSecretService {
            metadata,
            secret_metadata,
            backend,
            engine,
            enforcer,
            masking,
        }
    }

    pub async fn create(
        &self,
        ctx: &AuthContext,
        params: CreateTrustedSecretParams,
    ) -> Result<TrustedSecret> {
        validate::required_str("name", &params.name)?;
        validate::required_map("data", &params.data)?;
        self.enforcer.authorize(ctx, params.resource_group.into())?;
        log_operation(&self.masking, "TrustedSecret.create", &params);

        let scope = self.enforcer.resolve_trusted_scope(ctx, &params).await?;
        let mode = resolve_encrypt_mode(
            self.engine.as_ref(),
            params.encrypted,
            params.encrypt_options.clone(),
        )?;

        let (encrypted, initial_options) = initial_encrypt_state(&mode, self.engine.as_deref());
        let record = TrustedSecret::new(
            &params,
            &ctx.domain_id,
            scope.provider,
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
        record: &TrustedSecret,
        data: &Map<String, Value>,
        mode: &EncryptMode,
        tx: &mut RollbackStack,
    ) -> Result<TrustedSecret> {
        self.metadata.insert(record).await?;
        {
            let metadata = Arc::clone(&self.metadata);
            let trusted_secret_id = record.trusted_secret_id.clone();
            let domain_id = record.domain_id.clone();
            tx.push(
                format!("delete trusted secret metadata {trusted_secret_id}"),
                move || async move {
                    metadata
                        .remove(&[
                            Condition::eq("trusted_secret_id", trusted_secret_id),
                            Condition::eq("domain_id", domain_id),
                        ])
                        .await
                        .map(|_| ())
                },
            );
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
                let context =
                    EncryptContext::new(&record.domain_id, &record.trusted_secret_id);
                let (bundle, wrapped_key) = engine.encrypt(data, &context).await?;
                stored.encrypt_options = engine.build_options(&context, &bundle, &wrapped_key);
                let _ = self.metadata.replace(&stored).await?;
                serde_json::to_vec(&bundle).map_err(|e| Error::internal(e.to_string()))?
            }
        };

        self.backend.put(&stored.trusted_secret_id, &payload).await?;
        {
            let backend = Arc::clone(&self.backend);
            let trusted_secret_id = stored.trusted_secret_id.clone();
            tx.push(
                format!("delete backend payload {trusted_secret_id}"),
                move || async move { backend.delete(&trusted_secret_id).await },
            );
        }
        Ok(stored)
    }

    pub async fn update(
        &self,
        ctx: &AuthContext,
        params: UpdateTrustedSecretParams,
    ) -> Result<TrustedSecret> {
        validate::required_str("trusted_secret_id", &params.trusted_secret_id)?;
        self.enforcer.authorize(ctx, RequiredScope::Workspace)?;
        log_operation(&self.masking, "TrustedSecret.update", &params);

        let record = get_scoped(
            self.metadata.as_ref(),
            &params.trusted_secret_id,
            &self.enforcer.domain_scope(ctx),
        )
        .await?;
        self.enforcer.authorize(ctx, record.resource_group.into())?;

        let mut updated = record.clone();
        TrustedSecretPatch {
            name: params.name,
            tags: params.tags,
            schema_id: params.schema_id,
            ..Default::default()
        }
        .apply(&mut updated);

        if !self.metadata.replace(&updated).await? {
            return Err(Error::not_found("trusted secret", &params.trusted_secret_id));
        }
        Ok(updated)
    }

    pub async fn update_data(
        &self,
        ctx: &AuthContext,
        params: UpdateTrustedSecretDataParams,
    ) -> Result<TrustedSecret> {
        validate::required_str("trusted_secret_id", &params.trusted_secret_id)?;
        validate::required_map("data", &params.data)?;
        self.enforcer.authorize(ctx, RequiredScope::Workspace)?;
        log_operation(&self.masking, "TrustedSecret.update_data", &params);

        let record = get_scoped(
            self.metadata.as_ref(),
            &params.trusted_secret_id,
            &self.enforcer.domain_scope(ctx),
        )
        .await?;
        self.enforcer.authorize(ctx, record.resource_group.into())?;

        let mode = resolve_encrypt_mode(
            self.engine.as_ref(),
            params.encrypted,
            params.encrypt_options.clone(),
        )?;

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
                let context =
                    EncryptContext::new(&record.domain_id, &record.trusted_secret_id);
                let (bundle, wrapped_key) = engine.encrypt(&params.data, &context).await?;
                updated.encrypted = true;
                updated.encrypt_options = engine.build_options(&context, &bundle, &wrapped_key);
                serde_json::to_vec(&bundle).map_err(|e| Error::internal(e.to_string()))?
            }
        };

        let mut tx = RollbackStack::new();
        if !self.metadata.replace(&updated).await? {
            return Err(Error::not_found("trusted secret", &params.trusted_secret_id));
        }
        {
            let metadata = Arc::clone(&self.metadata);
            let previous = record.clone();
            tx.push(
                format!("restore trusted secret metadata {}", record.trusted_secret_id),
                move || async move { metadata.replace(&previous).await.map(|_| ()) },
            );
        }

        match self
            .backend
            .update(&record.trusted_secret_id, &payload)
            .await
        {
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

    /// Refused while any secret references the record.
    pub async fn delete(&self, ctx: &AuthContext, trusted_secret_id: &str) -> Result<()> {
        validate::required_str("trusted_secret_id", trusted_secret_id)?;
        self.enforcer.authorize(ctx, RequiredScope::Workspace)?;

        let record = get_scoped(
            self.metadata.as_ref(),
            trusted_secret_id,
            &self.enforcer.domain_scope(ctx),
        )
        .await?;
        self.enforcer.authorize(ctx, record.resource_group.into())?;

        let related = self
            .secret_metadata
            .filter(&[
                Condition::eq("trusted_secret_id", trusted_secret_id),
                Condition::eq("domain_id", ctx.domain_id.clone()),
            ])
            .await?;
        if let Some(secret) = related.first() {
            return Err(Error::ExistRelatedSecret {
                secret_id: secret.secret_id.clone(),
            });
        }

        self.backend.delete(&record.trusted_secret_id).await?;
        remove_scoped(
            self.metadata.as_ref(),
            trusted_secret_id,
            &self.enforcer.domain_scope(ctx),
        )
        .await
    }

    pub async fn get(&self, ctx: &AuthContext, trusted_secret_id: &str) -> Result<TrustedSecret> {
        validate::required_str("trusted_secret_id", trusted_secret_id)?;
        self.enforcer.authorize(ctx, RequiredScope::Workspace)?;
        get_scoped(
            self.metadata.as_ref(),
            trusted_secret_id,
            &self.enforcer.trusted_read_scope(ctx),
        )
        .await
    }

    pub async fn list(
        &self,
        ctx: &AuthContext,
        params: ListTrustedSecretParams,
    ) -> Result<(Vec<TrustedSecret>, u64)> {
        self.enforcer.authorize(ctx, RequiredScope::Workspace)?;

        let mut query = params.query.clone();
        query.filter.extend(self.enforcer.trusted_read_scope(ctx));
        for (key, value) in [
            ("trusted_secret_id", params.trusted_secret_id),
            ("name", params.name),
            ("schema_id", params.schema_id),
            ("provider", params.provider),
            ("trusted_account_id", params.trusted_account_id),
        ] {
            if let Some(value) = value {
                query.filter.push(Condition::eq(key, value));
            }
        }
        self.metadata.query(&query).await
    }

    pub async fn stat(&self, ctx: &AuthContext, mut query: StatQuery) -> Result<Vec<Value>> {
        self.enforcer.authorize(ctx, RequiredScope::Workspace)?;
        query.filter.extend(self.enforcer.trusted_read_scope(ctx));
        self.metadata.stat(&query).await
    }
}
