//! Host group persistence trait

use async_trait::async_trait;
use serde_json::Value;

use crate::model::{ConfigLogData, HostGroupData, ObjectConfigData, ObjectRef};

/// Host group operations
#[async_trait]
pub trait HostGroupPersistence: Send + Sync {
    /// Create a host group together with its hosts, its object config and
    /// its first revision in one transaction
    async fn host_group_create(
        &self,
        parent: ObjectRef,
        name: &str,
        description: &str,
        hosts: &[i64],
        config: Value,
        attr: Value,
    ) -> anyhow::Result<(HostGroupData, ObjectConfigData, ConfigLogData)>;

    /// Find a host group by id
    async fn host_group_find(&self, id: i64) -> anyhow::Result<Option<HostGroupData>>;

    /// Host groups of a parent object in creation order
    async fn host_group_list(&self, parent: ObjectRef) -> anyhow::Result<Vec<HostGroupData>>;

    /// Replace the host set of a group
    async fn host_group_set_hosts(&self, id: i64, hosts: &[i64]) -> anyhow::Result<bool>;

    /// Delete a host group together with its object config and revisions
    async fn host_group_delete(&self, id: i64) -> anyhow::Result<bool>;
}
