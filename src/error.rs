//! # Error Types
//!
//! Crate-wide error type with classification into the kinds the service
//! reports to callers (validation, authorization, not-found, conflict,
//! consistency, upstream, crypto, internal).
//!
//! Upstream failures carry the component that produced them and are never
//! retried inside the crate; retry policy belongs to the caller or a proxy.

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A required request parameter was absent.
    #[error("required parameter is missing: {key}")]
    RequiredParameter { key: &'static str },

    /// Startup or per-adapter configuration is invalid.
    #[error("wrong configuration: {key}")]
    WrongConfiguration { key: String },

    /// The token does not grant the required role for the resource scope.
    #[error("permission denied")]
    PermissionDenied,

    /// Metadata, store, identity, or KMS lookup missed.
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// The metadata store enforces uniqueness on the given name.
    #[error("name already exists: {name}")]
    NameConflict { name: String },

    /// The backend store already holds an entry under this id.
    #[error("entry already exists in backend store: {id}")]
    AlreadyExists { id: String },

    /// A secret and its trusted parent disagree on encryption.
    #[error("secret and trusted secret encryption do not match: {reason}")]
    EncryptionParityMismatch { reason: &'static str },

    /// A trusted secret cannot be deleted while secrets reference it.
    #[error("trusted secret is referenced by secret: {secret_id}")]
    ExistRelatedSecret { secret_id: String },

    /// The configured backend name resolves to no adapter.
    #[error("secret backend is not defined: {backend}")]
    BackendNotDefined { backend: String },

    /// The backend store could not be reached or rejected the call.
    #[error("backend store unavailable ({store}): {message}")]
    StoreUnavailable { store: &'static str, message: String },

    /// The KMS could not be reached or rejected the call.
    #[error("kms unavailable: {message}")]
    KmsUnavailable { message: String },

    /// The KMS rejected the supplied encryption context.
    #[error("kms rejected the encryption context")]
    KmsWrongContext,

    /// The caller's credentials are not allowed to use the KMS key.
    #[error("kms permission denied")]
    KmsPermissionDenied,

    /// The identity service could not be reached.
    #[error("upstream service unavailable ({service}): {message}")]
    UpstreamUnavailable { service: &'static str, message: String },

    /// AEAD authentication failed: wrong key, nonce, or context.
    #[error("decrypt failed: payload does not authenticate under the given context")]
    DecryptFailed,

    /// The configured encrypt type has no KMS adapter.
    #[error("unsupported encrypt type: {value}")]
    UnsupportedEncryptType { value: String },

    /// Unexpected failure, surfaced opaquely with a correlation id.
    #[error("internal error [{correlation_id}]: {message}")]
    Internal {
        correlation_id: String,
        message: String,
    },
}

/// Classification of an [`Error`] for the propagation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    NotFound,
    Conflict,
    Consistency,
    Upstream,
    Crypto,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::RequiredParameter { .. } | Error::WrongConfiguration { .. } => {
                ErrorKind::Validation
            }
            Error::PermissionDenied => ErrorKind::Authorization,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::NameConflict { .. } | Error::AlreadyExists { .. } => ErrorKind::Conflict,
            Error::EncryptionParityMismatch { .. }
            | Error::ExistRelatedSecret { .. }
            | Error::BackendNotDefined { .. } => ErrorKind::Consistency,
            Error::StoreUnavailable { .. }
            | Error::KmsUnavailable { .. }
            | Error::UpstreamUnavailable { .. } => ErrorKind::Upstream,
            Error::KmsWrongContext
            | Error::KmsPermissionDenied
            | Error::DecryptFailed
            | Error::UnsupportedEncryptType { .. } => ErrorKind::Crypto,
            Error::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code for logs and wire surfaces.
    pub fn code(&self) -> &'static str {
        match self {
            Error::RequiredParameter { .. } => "REQUIRED_PARAMETER",
            Error::WrongConfiguration { .. } => "WRONG_CONFIGURATION",
            Error::PermissionDenied => "PERMISSION_DENIED",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::NameConflict { .. } => "NAME_CONFLICT",
            Error::AlreadyExists { .. } => "ALREADY_EXISTS",
            Error::EncryptionParityMismatch { .. } => {
                "DIFF_SECRET_AND_TRUSTED_SECRET_ENCRYPTED"
            }
            Error::ExistRelatedSecret { .. } => "EXIST_RELATED_SECRET",
            Error::BackendNotDefined { .. } => "BACKEND_NOT_DEFINED",
            Error::StoreUnavailable { .. } => "STORE_UNAVAILABLE",
            Error::KmsUnavailable { .. } => "KMS_UNAVAILABLE",
            Error::KmsWrongContext => "KMS_WRONG_CONTEXT",
            Error::KmsPermissionDenied => "KMS_PERMISSION_DENIED",
            Error::UpstreamUnavailable { .. } => "UPSTREAM_UNAVAILABLE",
            Error::DecryptFailed => "DECRYPT_FAILED",
            Error::UnsupportedEncryptType { .. } => "UNSUPPORTED_ENCRYPT_TYPE",
            Error::Internal { .. } => "INTERNAL",
        }
    }

    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            correlation_id: uuid::Uuid::new_v4().simple().to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_classification() {
        assert_eq!(
            Error::RequiredParameter { key: "name" }.kind(),
            ErrorKind::Validation
        );
        assert_eq!(Error::PermissionDenied.kind(), ErrorKind::Authorization);
        assert_eq!(
            Error::not_found("secret", "secret-abc").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            Error::StoreUnavailable {
                store: "consul",
                message: "connection refused".into()
            }
            .kind(),
            ErrorKind::Upstream
        );
        assert_eq!(Error::DecryptFailed.kind(), ErrorKind::Crypto);
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            Error::EncryptionParityMismatch {
                reason: "encrypted flag differs"
            }
            .code(),
            "DIFF_SECRET_AND_TRUSTED_SECRET_ENCRYPTED"
        );
        assert_eq!(
            Error::BackendNotDefined {
                backend: "redis".into()
            }
            .code(),
            "BACKEND_NOT_DEFINED"
        );
    }

    #[test]
    fn test_internal_error_carries_correlation_id() {
        let err = Error::internal("boom");
        match err {
            Error::Internal { correlation_id, .. } => {
                assert_eq!(correlation_id.len(), 32);
            }
            _ => panic!("expected internal error"),
        }
    }
}
