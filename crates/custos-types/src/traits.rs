//! Collaborator traits for the audit pipeline.
//!
//! The recorder owns its collaborators through these seams so that every
//! leg (identity, local buffer, remote sink, retry queue, alerts) can be
//! replaced with a fake in tests.

use crate::{Actor, AuditEntry, AuditLogFilter, SecurityAlert};
use async_trait::async_trait;

/// Resolves the actor behind the current request.
///
/// Contract: infallible. Implementations that cannot resolve an identity
/// return `None`; the recorder falls back to `Actor::anonymous()`.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_actor(&self) -> Option<Actor>;
}

/// Local durable buffer of recent entries.
///
/// Bounded-ring semantics: `append` evicts the oldest entry once the store
/// holds its capacity, and `list` returns newest first. The remote sink is
/// the system of record; this buffer only keeps the recent window.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditStoreError>;

    async fn list(&self, filter: &AuditLogFilter) -> Result<Vec<AuditEntry>, AuditStoreError>;

    /// Archive all live entries and return how many were archived.
    /// Archival, not deletion: entries stay recoverable out of band.
    async fn clear(&self) -> Result<usize, AuditStoreError>;
}

/// Remote system of record. `send` must be an idempotent upsert keyed by
/// `entry.id` so concurrent retries cannot duplicate records.
#[async_trait]
pub trait RemoteSink: Send + Sync {
    async fn send(&self, entry: &AuditEntry) -> Result<(), RemoteSinkError>;
}

/// Persistent store of entries the remote sink rejected. Unbounded,
/// append-and-drain.
#[async_trait]
pub trait RetryStore: Send + Sync {
    async fn enqueue(&self, entry: AuditEntry) -> Result<(), RetryStoreError>;

    /// Remove and return everything currently queued.
    async fn take_all(&self) -> Result<Vec<AuditEntry>, RetryStoreError>;

    /// Put entries back after a failed resend attempt.
    async fn requeue(&self, entries: Vec<AuditEntry>) -> Result<(), RetryStoreError>;

    async fn len(&self) -> Result<usize, RetryStoreError>;
}

/// Append-only collection of security alerts.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn append(&self, alert: SecurityAlert) -> Result<(), AlertStoreError>;

    async fn list(&self) -> Result<Vec<SecurityAlert>, AlertStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AuditStoreError {
    #[error("audit store error: {0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteSinkError {
    #[error("remote sink error: {0}")]
    Other(String),
    #[error("remote sink unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RetryStoreError {
    #[error("retry store error: {0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AlertStoreError {
    #[error("alert store error: {0}")]
    Other(String),
}
