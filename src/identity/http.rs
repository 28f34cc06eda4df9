//! # Identity HTTP Client
//!
//! JSON-over-HTTP client for the identity service. Requests post the lookup
//! parameters to `<endpoint>/<resource>/<verb>` with the system token as a
//! bearer credential. A 404 is a not-found for the looked-up resource;
//! transport failures and server errors surface as upstream-unavailable.

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::identity::{IdentityClient, Project, ServiceAccount, TrustedAccount};

const SERVICE: &str = "identity";

#[derive(Debug)]
pub struct HttpIdentity {
    client: HttpClient,
    endpoint: String,
    system_token: Option<String>,
}

impl HttpIdentity {
    pub fn new(settings: &Settings) -> Result<Self> {
        let endpoint = settings
            .connectors
            .identity
            .endpoint
            .clone()
            .ok_or_else(|| Error::WrongConfiguration {
                key: "CONNECTORS.identity.endpoint".into(),
            })?;
        let client = HttpClient::builder()
            .build()
            .map_err(|e| Error::WrongConfiguration {
                key: format!("CONNECTORS.identity: {e}"),
            })?;
        Ok(HttpIdentity {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            system_token: settings.system_token.clone(),
        })
    }

    async fn dispatch<T: DeserializeOwned>(
        &self,
        path: &str,
        resource: &'static str,
        id: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let mut request = self
            .client
            .post(format!("{}/{path}", self.endpoint))
            .json(&body);
        if let Some(token) = &self.system_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| Error::UpstreamUnavailable {
            service: SERVICE,
            message: e.to_string(),
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(Error::not_found(resource, id)),
            status if status.is_success() => {
                response.json().await.map_err(|e| Error::UpstreamUnavailable {
                    service: SERVICE,
                    message: e.to_string(),
                })
            }
            status => Err(Error::UpstreamUnavailable {
                service: SERVICE,
                message: format!("{path} returned {status}"),
            }),
        }
    }
}

#[async_trait]
impl IdentityClient for HttpIdentity {
    async fn get_service_account(
        &self,
        service_account_id: &str,
        domain_id: &str,
    ) -> Result<ServiceAccount> {
        self.dispatch(
            "service-account/get",
            "service account",
            service_account_id,
            json!({
                "service_account_id": service_account_id,
                "domain_id": domain_id,
            }),
        )
        .await
    }

    async fn get_project(&self, project_id: &str, domain_id: &str) -> Result<Project> {
        self.dispatch(
            "project/get",
            "project",
            project_id,
            json!({
                "project_id": project_id,
                "domain_id": domain_id,
            }),
        )
        .await
    }

    async fn check_workspace(&self, workspace_id: &str, domain_id: &str) -> Result<()> {
        self.dispatch::<serde_json::Value>(
            "workspace/check",
            "workspace",
            workspace_id,
            json!({
                "workspace_id": workspace_id,
                "domain_id": domain_id,
            }),
        )
        .await
        .map(|_| ())
    }

    async fn get_trusted_account(
        &self,
        trusted_account_id: &str,
        domain_id: &str,
    ) -> Result<TrustedAccount> {
        self.dispatch(
            "trusted-account/get",
            "trusted account",
            trusted_account_id,
            json!({
                "trusted_account_id": trusted_account_id,
                "domain_id": domain_id,
            }),
        )
        .await
    }
}
