//! ADCM Persistence - Storage model and persistence layer
//!
//! This crate provides:
//! - Domain model rows for prototypes, object configs, revisions and host groups
//! - Persistence trait abstractions for the configuration engine
//! - An in-memory backend (single process, tests and offline tooling)
//! - A relational backend (MySQL/PostgreSQL via SeaORM)

pub mod entity;
pub mod memory;
pub mod model;
pub mod sql;
pub mod traits;

// Re-export sea-orm for convenience
pub use sea_orm;

// Re-export persistence traits
pub use traits::{
    ConfigPersistence, HostGroupPersistence, PersistenceService, PrototypePersistence,
};

// Re-export backends
pub use memory::MemoryPersistService;
pub use sql::ExternalDbPersistService;

// Re-export model types
pub use model::{
    ConfigLogData, ConfigOwner, ConfigWrite, HostGroupData, ObjectConfigData, ObjectKind, ObjectRef,
    Prototype, PrototypeConfigRow, StorageMode,
};
