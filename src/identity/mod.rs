//! # Identity Adapter
//!
//! Read-only client of the external identity service: workspaces, projects,
//! service accounts, and trusted accounts. Privileged lookups authenticate
//! with the system token rather than the caller's token.

pub mod http;

pub use http::HttpIdentity;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub service_account_id: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub workspace_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub project_id: String,
    #[serde(default)]
    pub workspace_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrustedAccount {
    pub trusted_account_id: String,
    #[serde(default)]
    pub provider: Option<String>,
}

#[async_trait]
pub trait IdentityClient: Send + Sync {
    async fn get_service_account(
        &self,
        service_account_id: &str,
        domain_id: &str,
    ) -> Result<ServiceAccount>;

    async fn get_project(&self, project_id: &str, domain_id: &str) -> Result<Project>;

    /// Succeeds when the workspace exists in the domain.
    async fn check_workspace(&self, workspace_id: &str, domain_id: &str) -> Result<()>;

    async fn get_trusted_account(
        &self,
        trusted_account_id: &str,
        domain_id: &str,
    ) -> Result<TrustedAccount>;
}
