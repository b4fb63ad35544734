//! Object config persistence trait
//!
//! Defines the interface for the append-only revision log and the
//! current/previous pointers of object configs.

use async_trait::async_trait;
use serde_json::Value;

use crate::model::{ConfigLogData, ConfigOwner, ConfigWrite, ObjectConfigData};

/// Object config and revision log operations
#[async_trait]
pub trait ConfigPersistence: Send + Sync {
    /// Find the object config of an owner
    async fn object_config_find(
        &self,
        owner: ConfigOwner,
    ) -> anyhow::Result<Option<ObjectConfigData>>;

    /// Find an object config by its id
    async fn object_config_find_by_id(&self, id: i64)
    -> anyhow::Result<Option<ObjectConfigData>>;

    /// Create the object config of an owner together with its first revision.
    ///
    /// `current` and `previous` both point to the new revision.
    async fn object_config_create(
        &self,
        owner: ConfigOwner,
        config: Value,
        attr: Value,
        description: &str,
    ) -> anyhow::Result<(ObjectConfigData, ConfigLogData)>;

    /// Append a revision and move the pointers:
    /// `previous <- current`, `current <- new`.
    ///
    /// Returns `None` when the object config does not exist.
    async fn config_log_append(
        &self,
        object_config_id: i64,
        config: Value,
        attr: Value,
        description: &str,
    ) -> anyhow::Result<Option<(ObjectConfigData, ConfigLogData)>>;

    /// Apply `writes` in order inside one transaction and return the
    /// resulting pointers and revisions in the same order.
    ///
    /// Either every write is stored or none is. A write naming a missing
    /// object config, or a restore of a revision owned by another object
    /// config, fails the whole batch.
    async fn config_write_all(
        &self,
        writes: Vec<ConfigWrite>,
    ) -> anyhow::Result<Vec<(ObjectConfigData, ConfigLogData)>>;

    /// Find a revision by id
    async fn config_log_find(&self, id: i64) -> anyhow::Result<Option<ConfigLogData>>;

    /// All revisions of an object config in ascending id order
    async fn config_log_list(&self, object_config_id: i64) -> anyhow::Result<Vec<ConfigLogData>>;

    /// Point `current` at an existing revision of the same object config:
    /// `previous <- current`, `current <- chosen`. Optionally rewrites the
    /// chosen revision's description.
    ///
    /// Returns `None` when the object config or the revision does not exist,
    /// or the revision belongs to another object config.
    async fn object_config_restore(
        &self,
        object_config_id: i64,
        config_log_id: i64,
        description: Option<&str>,
    ) -> anyhow::Result<Option<(ObjectConfigData, ConfigLogData)>>;

    /// Delete an object config and all of its revisions
    async fn object_config_delete(&self, object_config_id: i64) -> anyhow::Result<bool>;
}
