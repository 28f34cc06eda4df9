//! # Secret Broker
//!
//! Core of a multi-tenant secret management service that brokers credentials
//! between a trusted control plane and backend secret stores.
//!
//! ## Overview
//!
//! Callers create named secrets carrying sensitive data. The broker:
//!
//! 1. **Persists metadata** - typed Secret / TrustedSecret / UserSecret
//!    records in the configured database
//! 2. **Stores payloads** - opaque bytes in a pluggable backend store
//!    (AWS Secrets Manager, Consul, etcd, MongoDB, or Vault for development)
//! 3. **Envelope encryption** - optional KMS-backed AES-256-GCM so payloads
//!    at rest are never recoverable by the store alone
//! 4. **Scope enforcement** - domain / workspace / project / user scoping
//!    with wildcard widening for reads
//! 5. **Trusted secrets** - derived secrets referencing a parent trusted
//!    secret's key material
//!
//! The RPC surface, identity service, and configuration loading beyond
//! environment variables are external collaborators; this crate exposes the
//! service layer plus a [`runtime`] bootstrap that wires concrete adapters
//! once at startup.

pub mod authz;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod kms;
pub mod metadata;
pub mod model;
pub mod provider;
pub mod runtime;
pub mod service;
pub mod txn;

pub use error::{Error, ErrorKind, Result};
