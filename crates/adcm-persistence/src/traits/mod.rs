//! Persistence traits for the unified storage abstraction layer
//!
//! This module defines the core persistence traits that abstract over the
//! storage backends: the in-memory store and an external database
//! (MySQL/PostgreSQL). Every mutating operation is a single transaction.

pub mod config;
pub mod host_group;
pub mod prototype;

pub use config::ConfigPersistence;
pub use host_group::HostGroupPersistence;
pub use prototype::PrototypePersistence;

use async_trait::async_trait;

use crate::model::StorageMode;

/// Unified persistence service trait
///
/// This is the main interface used by the configuration engine.
#[async_trait]
pub trait PersistenceService:
    PrototypePersistence + ConfigPersistence + HostGroupPersistence + Send + Sync
{
    /// Get the current storage mode
    fn storage_mode(&self) -> StorageMode;

    /// Health check for the storage backend
    async fn health_check(&self) -> anyhow::Result<()>;
}
