//! # Runtime
//!
//! Startup wiring: build the settings once, resolve the concrete adapters
//! (backend store, KMS, metadata database, identity client), and hand the
//! service layer to the embedding process as explicit values. There is no
//! service locator and nothing mutable is shared after this returns.

use std::sync::Arc;

use tracing::info;

use crate::authz::Enforcer;
use crate::config::Settings;
use crate::crypto::EncryptionEngine;
use crate::error::{Error, Result};
use crate::identity::HttpIdentity;
use crate::kms;
use crate::metadata::mongo::MongoStore;
use crate::model::{Secret, TrustedSecret, UserSecret};
use crate::provider;
use crate::service::{SecretService, TrustedSecretService, UserSecretService};

/// The wired service layer.
#[derive(Debug)]
pub struct Broker {
    pub secret: SecretService,
    pub trusted_secret: TrustedSecretService,
    pub user_secret: UserSecretService,
}

/// Install the tracing subscriber with the standard env filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "secret_broker=info".into()),
        )
        .init();
}

/// Build every component from the settings and return the service layer.
pub async fn initialize(settings: Settings) -> Result<Broker> {
    let client = mongodb::Client::with_uri_str(&settings.database.uri)
        .await
        .map_err(|e| Error::UpstreamUnavailable {
            service: "database",
            message: e.to_string(),
        })?;
    let database = client.database(&settings.database.database);

    let secret_metadata = Arc::new(MongoStore::<Secret>::new(&database));
    secret_metadata.ensure_indexes().await?;
    let trusted_metadata = Arc::new(MongoStore::<TrustedSecret>::new(&database));
    trusted_metadata.ensure_indexes().await?;
    let user_metadata = Arc::new(MongoStore::<UserSecret>::new(&database));
    user_metadata.ensure_indexes().await?;

    let backend = provider::build(&settings, Some(&database)).await?;
    info!(backend = backend.name(), "backend store resolved");

    let engine = if settings.encrypt {
        let kms = kms::build(&settings).await?;
        info!(encrypt_type = settings.encrypt_type.as_str(), "envelope encryption enabled");
        Some(Arc::new(EncryptionEngine::new(kms, settings.encrypt_type)))
    } else {
        None
    };

    let identity = Arc::new(HttpIdentity::new(&settings)?);
    let enforcer = Arc::new(Enforcer::new(identity));
    let masking = Arc::new(settings.log.masking.clone());

    Ok(Broker {
        secret: SecretService::new(
            Arc::clone(&secret_metadata) as _,
            Arc::clone(&trusted_metadata) as _,
            Arc::clone(&backend),
            engine.clone(),
            Arc::clone(&enforcer),
            Arc::clone(&masking),
        ),
        trusted_secret: TrustedSecretService::new(
            Arc::clone(&trusted_metadata) as _,
            Arc::clone(&secret_metadata) as _,
            Arc::clone(&backend),
            engine.clone(),
            Arc::clone(&enforcer),
            Arc::clone(&masking),
        ),
        user_secret: UserSecretService::new(
            user_metadata as _,
            backend,
            engine,
            enforcer,
            masking,
        ),
    })
}
