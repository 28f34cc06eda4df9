//! # Shared Test Fixtures
//!
//! In-process fakes for the external collaborators: a memory-backed payload
//! store with failure injection, a permissive identity service, and a
//! failing KMS for error-path tests. Services are wired exactly like the
//! runtime does it, just against memory stores.

// Not every test binary exercises every fixture.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

use secret_broker::authz::{AuthContext, Enforcer, Role};
use secret_broker::config::MaskingRules;
use secret_broker::crypto::{EncryptContext, EncryptionEngine};
use secret_broker::error::{Error, Result};
use secret_broker::identity::{IdentityClient, Project, ServiceAccount, TrustedAccount};
use secret_broker::kms::{DataKey, KmsClient, LocalKms};
use secret_broker::metadata::memory::MemoryStore;
use secret_broker::model::{EncryptType, Secret, TrustedSecret, UserSecret};
use secret_broker::provider::SecretStoreBackend;
use secret_broker::service::{SecretService, TrustedSecretService, UserSecretService};
use secret_broker::ErrorKind;
use zeroize::Zeroizing;

/// Payload store over a hash map, with switches to make writes fail.
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    fail_puts: AtomicBool,
    fail_updates: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend {
            entries: Mutex::new(HashMap::new()),
            fail_puts: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
        }
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.lock().unwrap().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl SecretStoreBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, id: &str, payload: &[u8]) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable {
                store: "memory",
                message: "injected put failure".into(),
            });
        }
        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(id) {
            return Err(Error::AlreadyExists { id: id.to_string() });
        }
        entries.insert(id.to_string(), payload.to_vec());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Vec<u8>> {
        self.entries
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("secret payload", id))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(id);
        Ok(())
    }

    async fn update(&self, id: &str, payload: &[u8]) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable {
                store: "memory",
                message: "injected update failure".into(),
            });
        }
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(id) {
            Some(slot) => {
                *slot = payload.to_vec();
                Ok(())
            }
            None => Err(Error::not_found("secret payload", id)),
        }
    }
}

/// Identity service that knows every project and workspace.
pub struct StubIdentity;

#[async_trait]
impl IdentityClient for StubIdentity {
    async fn get_service_account(
        &self,
        service_account_id: &str,
        _domain_id: &str,
    ) -> Result<ServiceAccount> {
        Ok(ServiceAccount {
            service_account_id: service_account_id.to_string(),
            provider: Some("aws".into()),
            project_id: Some("p-derived".into()),
            workspace_id: Some("ws1".into()),
        })
    }

    async fn get_project(&self, project_id: &str, _domain_id: &str) -> Result<Project> {
        Ok(Project {
            project_id: project_id.to_string(),
            workspace_id: Some("ws1".into()),
        })
    }

    async fn check_workspace(&self, _workspace_id: &str, _domain_id: &str) -> Result<()> {
        Ok(())
    }

    async fn get_trusted_account(
        &self,
        trusted_account_id: &str,
        _domain_id: &str,
    ) -> Result<TrustedAccount> {
        Ok(TrustedAccount {
            trusted_account_id: trusted_account_id.to_string(),
            provider: Some("aws".into()),
        })
    }
}

/// KMS that refuses every call; drives the encrypt-failure paths.
pub struct FailingKms;

#[async_trait]
impl KmsClient for FailingKms {
    async fn generate_data_key(&self, _context: &EncryptContext) -> Result<DataKey> {
        Err(Error::KmsUnavailable {
            message: "injected kms outage".into(),
        })
    }

    async fn decrypt_data_key(
        &self,
        _wrapped: &[u8],
        _context: &EncryptContext,
    ) -> Result<Zeroizing<Vec<u8>>> {
        Err(Error::KmsUnavailable {
            message: "injected kms outage".into(),
        })
    }
}

pub struct TestEnv {
    pub secrets: SecretService,
    pub trusted: TrustedSecretService,
    pub users: UserSecretService,
    pub backend: Arc<MemoryBackend>,
    pub engine: Option<Arc<EncryptionEngine>>,
}

impl TestEnv {
    pub fn new(encrypt: bool) -> Self {
        let engine = if encrypt {
            Some(Arc::new(EncryptionEngine::new(
                Arc::new(LocalKms::with_master_key([9u8; 32])),
                EncryptType::Local,
            )))
        } else {
            None
        };
        Self::with_engine(engine)
    }

    pub fn with_kms(kms: Arc<dyn KmsClient>) -> Self {
        Self::with_engine(Some(Arc::new(EncryptionEngine::new(
            kms,
            EncryptType::Local,
        ))))
    }

    fn with_engine(engine: Option<Arc<EncryptionEngine>>) -> Self {
        let secret_metadata = Arc::new(MemoryStore::<Secret>::new());
        let trusted_metadata = Arc::new(MemoryStore::<TrustedSecret>::new());
        let user_metadata = Arc::new(MemoryStore::<UserSecret>::new());
        let backend = Arc::new(MemoryBackend::new());
        let enforcer = Arc::new(Enforcer::new(Arc::new(StubIdentity)));
        let masking = Arc::new(MaskingRules::default());

        TestEnv {
            secrets: SecretService::new(
                Arc::clone(&secret_metadata) as _,
                Arc::clone(&trusted_metadata) as _,
                Arc::clone(&backend) as _,
                engine.clone(),
                Arc::clone(&enforcer),
                Arc::clone(&masking),
            ),
            trusted: TrustedSecretService::new(
                Arc::clone(&trusted_metadata) as _,
                Arc::clone(&secret_metadata) as _,
                Arc::clone(&backend) as _,
                engine.clone(),
                Arc::clone(&enforcer),
                Arc::clone(&masking),
            ),
            users: UserSecretService::new(
                user_metadata as _,
                Arc::clone(&backend) as _,
                engine.clone(),
                enforcer,
                masking,
            ),
            backend,
            engine,
        }
    }
}

pub fn domain_admin(domain_id: &str) -> AuthContext {
    AuthContext::new(domain_id, Role::DomainAdmin)
}

pub fn system(domain_id: &str) -> AuthContext {
    AuthContext::new(domain_id, Role::System)
}

pub fn member(domain_id: &str, workspace_id: &str, projects: &[&str]) -> AuthContext {
    AuthContext::new(domain_id, Role::WorkspaceMember)
        .with_workspace(workspace_id)
        .with_user_projects(projects.iter().map(|p| p.to_string()).collect())
}

pub fn user(domain_id: &str, user_id: &str) -> AuthContext {
    AuthContext::new(domain_id, Role::User).with_user(user_id)
}

pub fn data(pairs: &[(&str, &str)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

pub fn assert_kind(err: &Error, kind: ErrorKind) {
    assert_eq!(err.kind(), kind, "unexpected error: {err}");
}
