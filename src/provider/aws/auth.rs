//! # AWS SDK Configuration
//!
//! Shared SDK config builder for the Secrets Manager backend and the KMS
//! adapter. Static credentials take precedence; otherwise the SDK default
//! chain (environment, profile, instance role) applies.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;

use crate::config::AwsSettings;
use crate::error::Result;

pub(crate) async fn create_sdk_config(config: &AwsSettings) -> Result<SdkConfig> {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let (Some(access_key_id), Some(secret_access_key)) =
        (&config.access_key_id, &config.secret_access_key)
    {
        loader = loader.credentials_provider(Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "secret-broker-static",
        ));
    }
    Ok(loader.load().await)
}
