//! # Scope & Authority Enforcement
//!
//! Every operation carries a required scope; the enforcer checks the
//! caller's role against it, derives mandatory read filters from the token,
//! widens read scope with the wildcard so higher-level records stay visible
//! to lower-level callers, and validates create-time references (service
//! accounts, projects, workspaces, trusted parents) against the identity
//! service and the metadata store.

use std::sync::Arc;

use crate::constants::SCOPE_WILDCARD;
use crate::error::{Error, Result};
use crate::identity::IdentityClient;
use crate::metadata::RecordStore;
use crate::model::{
    Condition, CreateSecretParams, CreateTrustedSecretParams, EncryptAlgorithm, ResourceGroup,
    TrustedSecret,
};

/// Role granted by the authenticated token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Service-to-service identity; may read payload data.
    System,
    DomainAdmin,
    WorkspaceOwner,
    WorkspaceMember,
    User,
}

/// Resource scope an operation requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredScope {
    System,
    Domain,
    Workspace,
    Project,
    User,
}

impl Role {
    fn grants(self, scope: RequiredScope) -> bool {
        match scope {
            RequiredScope::System => matches!(self, Role::System),
            RequiredScope::Domain => matches!(self, Role::System | Role::DomainAdmin),
            RequiredScope::Workspace => matches!(
                self,
                Role::System | Role::DomainAdmin | Role::WorkspaceOwner
            ),
            RequiredScope::Project => matches!(
                self,
                Role::System | Role::DomainAdmin | Role::WorkspaceOwner | Role::WorkspaceMember
            ),
            RequiredScope::User => matches!(self, Role::System | Role::DomainAdmin | Role::User),
        }
    }
}

impl From<ResourceGroup> for RequiredScope {
    fn from(group: ResourceGroup) -> Self {
        match group {
            ResourceGroup::Domain => RequiredScope::Domain,
            ResourceGroup::Workspace => RequiredScope::Workspace,
            ResourceGroup::Project => RequiredScope::Project,
        }
    }
}

/// Decoded token metadata accompanying every request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub domain_id: String,
    pub workspace_id: Option<String>,
    pub user_id: Option<String>,
    /// Projects the caller may see; absent means unrestricted within the
    /// caller's domain/workspace visibility.
    pub user_projects: Option<Vec<String>>,
    pub role: Role,
}

impl AuthContext {
    pub fn new(domain_id: impl Into<String>, role: Role) -> Self {
        AuthContext {
            domain_id: domain_id.into(),
            workspace_id: None,
            user_id: None,
            user_projects: None,
            role,
        }
    }

    pub fn with_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_user_projects(mut self, projects: Vec<String>) -> Self {
        self.user_projects = Some(projects);
        self
    }
}

/// Scope fields resolved for a new record.
#[derive(Debug, Clone, Default)]
pub struct ResolvedScope {
    pub provider: Option<String>,
    pub project_id: Option<String>,
    pub workspace_id: Option<String>,
}

pub struct Enforcer {
    identity: Arc<dyn IdentityClient>,
}

impl std::fmt::Debug for Enforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enforcer").finish_non_exhaustive()
    }
}

impl Enforcer {
    pub fn new(identity: Arc<dyn IdentityClient>) -> Self {
        Enforcer { identity }
    }

    /// Reject callers whose role does not grant the required scope.
    pub fn authorize(&self, ctx: &AuthContext, scope: RequiredScope) -> Result<()> {
        if !ctx.role.grants(scope) {
            return Err(Error::PermissionDenied);
        }
        if scope == RequiredScope::User && ctx.role == Role::User && ctx.user_id.is_none() {
            return Err(Error::PermissionDenied);
        }
        Ok(())
    }

    /// Mandatory filters for writes and point reads: the caller's domain.
    pub fn domain_scope(&self, ctx: &AuthContext) -> Vec<Condition> {
        vec![Condition::eq("domain_id", ctx.domain_id.clone())]
    }

    /// Widened filters for secret reads. Workspace- and project-restricted
    /// callers still see records that live above them in the hierarchy,
    /// because those records carry the wildcard in their scope fields.
    pub fn secret_read_scope(&self, ctx: &AuthContext) -> Vec<Condition> {
        let mut conditions = self.domain_scope(ctx);
        if let Some(workspace_id) = &ctx.workspace_id {
            conditions.push(Condition::any_of(
                "workspace_id",
                vec![workspace_id.clone(), SCOPE_WILDCARD.to_string()],
            ));
        }
        if let Some(user_projects) = &ctx.user_projects {
            let mut candidates = user_projects.clone();
            candidates.push(SCOPE_WILDCARD.to_string());
            conditions.push(Condition::any_of("project_id", candidates));
        }
        conditions
    }

    /// Widened filters for trusted-secret reads.
    pub fn trusted_read_scope(&self, ctx: &AuthContext) -> Vec<Condition> {
        let mut conditions = self.domain_scope(ctx);
        if let Some(workspace_id) = &ctx.workspace_id {
            conditions.push(Condition::any_of(
                "workspace_id",
                vec![workspace_id.clone(), SCOPE_WILDCARD.to_string()],
            ));
        }
        conditions
    }

    /// Filters for user-secret operations: domain plus the token's user.
    pub fn user_scope(&self, ctx: &AuthContext) -> Result<Vec<Condition>> {
        let user_id = ctx
            .user_id
            .as_ref()
            .ok_or(Error::RequiredParameter { key: "user_id" })?;
        let mut conditions = self.domain_scope(ctx);
        conditions.push(Condition::eq("user_id", user_id.clone()));
        Ok(conditions)
    }

    /// Resolve scope fields for a new secret.
    ///
    /// A project-group create with a service account derives provider,
    /// project, and workspace from the account and ignores conflicting
    /// caller-supplied values. Caller-supplied projects and workspaces are
    /// validated against the identity service.
    pub async fn resolve_secret_scope(
        &self,
        ctx: &AuthContext,
        params: &CreateSecretParams,
    ) -> Result<ResolvedScope> {
        match params.resource_group {
            ResourceGroup::Domain => Ok(ResolvedScope::default()),
            ResourceGroup::Workspace => {
                let workspace_id = params
                    .workspace_id
                    .clone()
                    .or_else(|| ctx.workspace_id.clone())
                    .ok_or(Error::RequiredParameter {
                        key: "workspace_id",
                    })?;
                self.identity
                    .check_workspace(&workspace_id, &ctx.domain_id)
                    .await?;
                Ok(ResolvedScope {
                    provider: None,
                    project_id: None,
                    workspace_id: Some(workspace_id),
                })
            }
            ResourceGroup::Project => {
                if let Some(service_account_id) = &params.service_account_id {
                    let account = self
                        .identity
                        .get_service_account(service_account_id, &ctx.domain_id)
                        .await?;
                    return Ok(ResolvedScope {
                        provider: account.provider,
                        project_id: account.project_id,
                        workspace_id: account.workspace_id,
                    });
                }
                let project_id = params
                    .project_id
                    .clone()
                    .ok_or(Error::RequiredParameter { key: "project_id" })?;
                let project = self
                    .identity
                    .get_project(&project_id, &ctx.domain_id)
                    .await?;
                let workspace_id = project
                    .workspace_id
                    .or_else(|| params.workspace_id.clone())
                    .or_else(|| ctx.workspace_id.clone());
                Ok(ResolvedScope {
                    provider: None,
                    project_id: Some(project_id),
                    workspace_id,
                })
            }
        }
    }

    /// Resolve scope fields for a new trusted secret.
    pub async fn resolve_trusted_scope(
        &self,
        ctx: &AuthContext,
        params: &CreateTrustedSecretParams,
    ) -> Result<ResolvedScope> {
        if params.resource_group == ResourceGroup::Project {
            return Err(Error::WrongConfiguration {
                key: "resource_group: trusted secrets live at domain or workspace level".into(),
            });
        }

        let mut provider = None;
        if let Some(trusted_account_id) = &params.trusted_account_id {
            let account = self
                .identity
                .get_trusted_account(trusted_account_id, &ctx.domain_id)
                .await?;
            provider = account.provider;
        }

        let workspace_id = match params.resource_group {
            ResourceGroup::Workspace => {
                let workspace_id = params
                    .workspace_id
                    .clone()
                    .or_else(|| ctx.workspace_id.clone())
                    .ok_or(Error::RequiredParameter {
                        key: "workspace_id",
                    })?;
                self.identity
                    .check_workspace(&workspace_id, &ctx.domain_id)
                    .await?;
                Some(workspace_id)
            }
            _ => None,
        };

        Ok(ResolvedScope {
            provider,
            project_id: None,
            workspace_id,
        })
    }

    /// Validate that a project exists in the caller's domain.
    pub async fn check_project(&self, project_id: &str, domain_id: &str) -> Result<()> {
        self.identity.get_project(project_id, domain_id).await.map(|_| ())
    }

    /// Resolve a trusted parent: same domain, and the child's workspace or a
    /// domain-wide parent.
    pub async fn resolve_trusted_parent(
        &self,
        store: &dyn RecordStore<TrustedSecret>,
        trusted_secret_id: &str,
        domain_id: &str,
        workspace_id: &str,
    ) -> Result<TrustedSecret> {
        let conditions = vec![
            Condition::eq("trusted_secret_id", trusted_secret_id),
            Condition::eq("domain_id", domain_id),
            Condition::any_of(
                "workspace_id",
                vec![workspace_id.to_string(), SCOPE_WILDCARD.to_string()],
            ),
        ];
        store
            .find_one(&conditions)
            .await?
            .ok_or_else(|| Error::not_found("trusted secret", trusted_secret_id))
    }

    /// A child and its trusted parent must agree on encryption: the same
    /// `encrypted` flag, and the same algorithm when encrypted.
    pub fn check_encryption_parity(
        &self,
        child_encrypted: bool,
        child_algorithm: Option<EncryptAlgorithm>,
        parent: &TrustedSecret,
    ) -> Result<()> {
        if child_encrypted != parent.encrypted {
            return Err(Error::EncryptionParityMismatch {
                reason: "encrypted flag differs from the trusted secret",
            });
        }
        if child_encrypted {
            let parent_algorithm = parent.encrypt_options.encrypt_algorithm;
            match (child_algorithm, parent_algorithm) {
                (Some(child), Some(parent)) if child == parent => {}
                _ => {
                    return Err(Error::EncryptionParityMismatch {
                        reason: "encrypt algorithm differs from the trusted secret",
                    })
                }
            }
        }
        Ok(())
    }
}
