//! # User Secret Operations
//!
//! User-scoped secrets outside the workspace/project hierarchy. Every
//! operation except `get_data` is bound to the token's user; `get_data` is
//! the service-to-service read path and checks the domain only.

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
    Condition, CreateUserSecretParams, EncryptOptions, EnvelopeBundle, Query, SecretData,
    StatQuery, UserSecret, UserSecretPatch,
};
use crate::provider::SecretStoreBackend;
use crate::service::secret::initial_encrypt_state;
use crate::service::{log_operation, resolve_encrypt_mode, validate, EncryptMode};
use crate::txn::RollbackStack;

/// Inputs of `UserSecret.update`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateUserSecretParams {
    pub user_secret_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,
}

/// Inputs of `UserSecret.update_data`.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateUserSecretDataParams {
    pub user_secret_id: String,
    pub data: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypt_options: Option<EncryptOptions>,
}

/// Inputs of `UserSecret.list`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListUserSecretParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_secret_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub query: Query,
}

pub struct UserSecretService {
    metadata: Arc<dyn RecordStore<UserSecret>>,
    backend: Arc<dyn SecretStoreBackend>,
    engine: Option<Arc<EncryptionEngine>>,
    enforcer: Arc<Enforcer>,
    masking: Arc<MaskingRules>,
}

impl std::fmt::Debug for UserSecretService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSecretService")
            .field("backend", &self.backend.name())
            .field("encrypt", &self.engine.is_some())
            .finish_non_exhaustive()
    }
}

impl UserSecretService {
    pub fn new(
        metadata: Arc<dyn RecordStore<UserSecret>>,
        backend: Arc<dyn SecretStoreBackend>,
        engine: Option<Arc<EncryptionEngine>>,
        enforcer: Arc<Enforcer>,
        masking: Arc<MaskingRules>,
    ) -> Self {
        UserSecretService {
            metadata,
            backend,
            engine,
            enforcer,
            masking,
        }
    }

    pub async fn create(
        &self,
        ctx: &AuthContext,
        params: CreateUserSecretParams,
    ) -> Result<UserSecret> {
        validate::required_str("name", &params.name)?;
        validate::required_map("data", &params.data)?;
        self.enforcer.authorize(ctx, RequiredScope::User)?;
        let user_id = ctx
            .user_id
            .clone()
            .ok_or(Error::RequiredParameter { key: "user_id" })?;
        log_operation(&self.masking, "UserSecret.create", &params);

        let mode = resolve_encrypt_mode(
            self.engine.as_ref(),
            params.encrypted,
            params.encrypt_options.clone(),
        )?;
        let (encrypted, initial_options) = initial_encrypt_state(&mode, self.engine.as_deref());
        let record = UserSecret::new(&params, &user_id, &ctx.domain_id, encrypted, initial_options);

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
        record: &UserSecret,
        data: &Map<String, Value>,
        mode: &EncryptMode,
        tx: &mut RollbackStack,
    ) -> Result<UserSecret> {
        self.metadata.insert(record).await?;
        {
            let metadata = Arc::clone(&self.metadata);
            let user_secret_id = record.user_secret_id.clone();
            let domain_id = record.domain_id.clone();
            tx.push(
                format!("delete user secret metadata {user_secret_id}"),
                move || async move {
                    metadata
                        .remove(&[
                            Condition::eq("user_secret_id", user_secret_id),
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
                let context = EncryptContext::new(&record.domain_id, &record.user_secret_id);
                let (bundle, wrapped_key) = engine.encrypt(data, &context).await?;
                stored.encrypt_options = engine.build_options(&context, &bundle, &wrapped_key);
                let _ = self.metadata.replace(&stored).await?;
                serde_json::to_vec(&bundle).map_err(|e| Error::internal(e.to_string()))?
            }
        };

        self.backend.put(&stored.user_secret_id, &payload).await?;
        {
            let backend = Arc::clone(&self.backend);
            let user_secret_id = stored.user_secret_id.clone();
            tx.push(
                format!("delete backend payload {user_secret_id}"),
                move || async move { backend.delete(&user_secret_id).await },
            );
        }
        Ok(stored)
    }

    pub async fn update(
        &self,
        ctx: &AuthContext,
        params: UpdateUserSecretParams,
    ) -> Result<UserSecret> {
        validate::required_str("user_secret_id", &params.user_secret_id)?;
        self.enforcer.authorize(ctx, RequiredScope::User)?;
        log_operation(&self.masking, "UserSecret.update", &params);

        let scope = self.enforcer.user_scope(ctx)?;
        let record = get_scoped(self.metadata.as_ref(), &params.user_secret_id, &scope).await?;

        let mut updated = record.clone();
        UserSecretPatch {
            name: params.name,
            tags: params.tags,
            schema_id: params.schema_id,
            ..Default::default()
        }
        .apply(&mut updated);

        if !self.metadata.replace(&updated).await? {
            return Err(Error::not_found("user secret", &params.user_secret_id));
        }
        Ok(updated)
    }

    pub async fn update_data(
        &self,
        ctx: &AuthContext,
        params: UpdateUserSecretDataParams,
    ) -> Result<UserSecret> {
        validate::required_str("user_secret_id", &params.user_secret_id)?;
        validate::required_map("data", &params.data)?;
        self.enforcer.authorize(ctx, RequiredScope::User)?;
        log_operation(&self.masking, "UserSecret.update_data", &params);

        let scope = self.enforcer.user_scope(ctx)?;
        let record = get_scoped(self.metadata.as_ref(), &params.user_secret_id, &scope).await?;
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
                let context = EncryptContext::new(&record.domain_id, &record.user_secret_id);
                let (bundle, wrapped_key) = engine.encrypt(&params.data, &context).await?;
                updated.encrypted = true;
                updated.encrypt_options = engine.build_options(&context, &bundle, &wrapped_key);
                serde_json::to_vec(&bundle).map_err(|e| Error::internal(e.to_string()))?
            }
        };

        let mut tx = RollbackStack::new();
        if !self.metadata.replace(&updated).await? {
            return Err(Error::not_found("user secret", &params.user_secret_id));
        }
        {
            let metadata = Arc::clone(&self.metadata);
            let previous = record.clone();
            tx.push(
                format!("restore user secret metadata {}", record.user_secret_id),
                move || async move { metadata.replace(&previous).await.map(|_| ()) },
            );
        }

        match self.backend.update(&record.user_secret_id, &payload).await {
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

    pub async fn delete(&self, ctx: &AuthContext, user_secret_id: &str) -> Result<()> {
        validate::required_str("user_secret_id", user_secret_id)?;
        self.enforcer.authorize(ctx, RequiredScope::User)?;

        let scope = self.enforcer.user_scope(ctx)?;
        let record = get_scoped(self.metadata.as_ref(), user_secret_id, &scope).await?;

        self.backend.delete(&record.user_secret_id).await?;
        remove_scoped(self.metadata.as_ref(), user_secret_id, &scope).await
    }

    pub async fn get(&self, ctx: &AuthContext, user_secret_id: &str) -> Result<UserSecret> {
        validate::required_str("user_secret_id", user_secret_id)?;
        self.enforcer.authorize(ctx, RequiredScope::User)?;
        let scope = self.enforcer.user_scope(ctx)?;
        get_scoped(self.metadata.as_ref(), user_secret_id, &scope).await
    }

    /// Service-to-service payload read; scoped by domain, not user.
    pub async fn get_data(&self, ctx: &AuthContext, user_secret_id: &str) -> Result<SecretData> {
        validate::required_str("user_secret_id", user_secret_id)?;
        self.enforcer.authorize(ctx, RequiredScope::System)?;

        let record = get_scoped(
            self.metadata.as_ref(),
            user_secret_id,
            &self.enforcer.domain_scope(ctx),
        )
        .await?;
        let payload = self.backend.get(&record.user_secret_id).await?;

        if record.encrypted {
            let bundle: EnvelopeBundle = serde_json::from_slice(&payload)
                .map_err(|_| Error::internal("stored payload is not an envelope bundle"))?;
            Ok(SecretData::envelope(
                bundle,
                record.encrypt_options.clone(),
                None,
            ))
        } else {
            let data: Map<String, Value> = serde_json::from_slice(&payload)
                .map_err(|_| Error::internal("stored payload is not a JSON object"))?;
            Ok(SecretData::plaintext(data))
        }
    }

    pub async fn list(
        &self,
        ctx: &AuthContext,
        params: ListUserSecretParams,
    ) -> Result<(Vec<UserSecret>, u64)> {
        self.enforcer.authorize(ctx, RequiredScope::User)?;

        let mut query = params.query.clone();
        query.filter.extend(self.enforcer.user_scope(ctx)?);
        for (key, value) in [
            ("user_secret_id", params.user_secret_id),
            ("name", params.name),
            ("schema_id", params.schema_id),
            ("provider", params.provider),
        ] {
            if let Some(value) = value {
                query.filter.push(Condition::eq(key, value));
            }
        }
        self.metadata.query(&query).await
    }

    pub async fn stat(&self, ctx: &AuthContext, mut query: StatQuery) -> Result<Vec<Value>> {
        self.enforcer.authorize(ctx, RequiredScope::User)?;
        query.filter.extend(self.enforcer.user_scope(ctx)?);
        self.metadata.stat(&query).await
    }
}
