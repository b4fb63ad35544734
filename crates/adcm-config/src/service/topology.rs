//! Topology collaborator
//!
//! The engine does not own the cluster topology. It only asks which hosts
//! are attached to an object (host group membership) and what a builtin
//! variant source currently yields.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use adcm_common::{AdcmError, AdcmResult};
use adcm_persistence::ObjectRef;

#[async_trait]
pub trait Topology: Send + Sync {
    /// Hosts attached to `object`
    async fn hosts_of(&self, object: ObjectRef) -> AdcmResult<Vec<i64>>;

    /// Values of builtin variant source `name` for `object`
    async fn builtin_variants(
        &self,
        object: ObjectRef,
        name: &str,
        args: Option<&Value>,
    ) -> AdcmResult<Vec<Value>>;
}

/// Topology held in memory, filled by the embedding application
#[derive(Debug, Default)]
pub struct StaticTopology {
    hosts: RwLock<HashMap<ObjectRef, Vec<i64>>>,
    builtins: RwLock<HashMap<String, Vec<Value>>>,
}

impl StaticTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_hosts(&self, object: ObjectRef, hosts: Vec<i64>) {
        self.hosts.write().insert(object, hosts);
    }

    pub fn set_builtin(&self, name: impl Into<String>, values: Vec<Value>) {
        self.builtins.write().insert(name.into(), values);
    }
}

#[async_trait]
impl Topology for StaticTopology {
    async fn hosts_of(&self, object: ObjectRef) -> AdcmResult<Vec<i64>> {
        Ok(self.hosts.read().get(&object).cloned().unwrap_or_default())
    }

    async fn builtin_variants(
        &self,
        _object: ObjectRef,
        name: &str,
        _args: Option<&Value>,
    ) -> AdcmResult<Vec<Value>> {
        self.builtins
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| AdcmError::value(format!("unknown builtin variant source \"{}\"", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adcm_persistence::ObjectKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_static_topology() {
        let topology = StaticTopology::new();
        let cluster = ObjectRef::new(ObjectKind::Cluster, 1);
        topology.set_hosts(cluster, vec![10, 11]);
        topology.set_builtin("host_in_cluster", vec![json!("h1")]);

        assert_eq!(topology.hosts_of(cluster).await.unwrap(), vec![10, 11]);
        assert!(
            topology
                .hosts_of(ObjectRef::new(ObjectKind::Cluster, 2))
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            topology
                .builtin_variants(cluster, "host_in_cluster", None)
                .await
                .unwrap(),
            vec![json!("h1")]
        );
        assert!(topology.builtin_variants(cluster, "nope", None).await.is_err());
    }
}
