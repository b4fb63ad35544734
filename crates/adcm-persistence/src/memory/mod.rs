// In-memory persistence backend
// Provides single-process storage without an external database

use std::collections::{BTreeMap, HashMap};

use adcm_common::INIT_DESCRIPTION;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::model::{
    ConfigLogData, ConfigOwner, ConfigWrite, HostGroupData, ObjectConfigData, ObjectRef, PrototypeConfigRow,
    StorageMode, now_millis,
};
use crate::traits::PersistenceService;
use crate::traits::config::ConfigPersistence;
use crate::traits::host_group::HostGroupPersistence;
use crate::traits::prototype::PrototypePersistence;

#[derive(Default)]
struct MemoryState {
    prototype_configs: BTreeMap<i64, Vec<PrototypeConfigRow>>,
    object_configs: BTreeMap<i64, ObjectConfigData>,
    owners: HashMap<ConfigOwner, i64>,
    config_logs: BTreeMap<i64, ConfigLogData>,
    host_groups: BTreeMap<i64, HostGroupData>,
    last_row_id: i64,
    last_object_config_id: i64,
    last_config_log_id: i64,
    last_host_group_id: i64,
}

impl MemoryState {
    fn insert_log(
        &mut self,
        object_config_id: i64,
        config: Value,
        attr: Value,
        description: &str,
    ) -> ConfigLogData {
        self.last_config_log_id += 1;
        let log = ConfigLogData {
            id: self.last_config_log_id,
            object_config_id,
            config,
            attr,
            description: description.to_string(),
            created_at: now_millis(),
        };
        self.config_logs.insert(log.id, log.clone());
        log
    }

    fn create_object_config(
        &mut self,
        owner: ConfigOwner,
        config: Value,
        attr: Value,
        description: &str,
    ) -> anyhow::Result<(ObjectConfigData, ConfigLogData)> {
        if self.owners.contains_key(&owner) {
            anyhow::bail!("object config of {} already exists", owner);
        }
        self.last_object_config_id += 1;
        let id = self.last_object_config_id;
        let log = self.insert_log(id, config, attr, description);
        let object_config = ObjectConfigData {
            id,
            owner,
            current: log.id,
            previous: log.id,
        };
        self.object_configs.insert(id, object_config.clone());
        self.owners.insert(owner, id);
        Ok((object_config, log))
    }

    fn append_log(
        &mut self,
        object_config_id: i64,
        config: Value,
        attr: Value,
        description: &str,
    ) -> Option<(ObjectConfigData, ConfigLogData)> {
        if !self.object_configs.contains_key(&object_config_id) {
            return None;
        }
        let log = self.insert_log(object_config_id, config, attr, description);
        let object_config = self.object_configs.get_mut(&object_config_id)?;
        object_config.previous = object_config.current;
        object_config.current = log.id;
        Some((object_config.clone(), log))
    }

    fn can_restore(&self, object_config_id: i64, config_log_id: i64) -> bool {
        self.object_configs.contains_key(&object_config_id)
            && self
                .config_logs
                .get(&config_log_id)
                .is_some_and(|log| log.object_config_id == object_config_id)
    }

    fn restore_log(
        &mut self,
        object_config_id: i64,
        config_log_id: i64,
        description: Option<&str>,
    ) -> Option<(ObjectConfigData, ConfigLogData)> {
        if !self.can_restore(object_config_id, config_log_id) {
            return None;
        }
        let log = self.config_logs.get_mut(&config_log_id)?;
        if let Some(description) = description {
            log.description = description.to_string();
        }
        let log = log.clone();

        let object_config = self.object_configs.get_mut(&object_config_id)?;
        object_config.previous = object_config.current;
        object_config.current = config_log_id;
        Some((object_config.clone(), log))
    }

    fn delete_object_config(&mut self, object_config_id: i64) -> bool {
        match self.object_configs.remove(&object_config_id) {
            Some(object_config) => {
                self.owners.remove(&object_config.owner);
                self.config_logs
                    .retain(|_, log| log.object_config_id != object_config_id);
                true
            }
            None => false,
        }
    }
}

/// In-memory persistence
///
/// All state lives behind a single lock, so every trait method observes
/// and applies a write atomically. Suitable for tests, offline tooling and
/// single-node deployments that do not need durability.
#[derive(Default)]
pub struct MemoryPersistService {
    state: RwLock<MemoryState>,
}

impl MemoryPersistService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceService for MemoryPersistService {
    fn storage_mode(&self) -> StorageMode {
        StorageMode::Memory
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl PrototypePersistence for MemoryPersistService {
    async fn prototype_config_rows(
        &self,
        prototype_id: i64,
    ) -> anyhow::Result<Vec<PrototypeConfigRow>> {
        let state = self.state.read();
        let mut rows: Vec<PrototypeConfigRow> = state
            .prototype_configs
            .get(&prototype_id)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.action_id.is_none())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }

    async fn prototype_config_save(
        &self,
        prototype_id: i64,
        rows: Vec<PrototypeConfigRow>,
    ) -> anyhow::Result<Vec<PrototypeConfigRow>> {
        let mut state = self.state.write();
        let mut saved = Vec::with_capacity(rows.len());
        for mut row in rows {
            state.last_row_id += 1;
            row.id = state.last_row_id;
            row.prototype_id = prototype_id;
            saved.push(row);
        }
        state
            .prototype_configs
            .entry(prototype_id)
            .or_default()
            .extend(saved.iter().cloned());
        Ok(saved)
    }
}

#[async_trait]
impl ConfigPersistence for MemoryPersistService {
    async fn object_config_find(
        &self,
        owner: ConfigOwner,
    ) -> anyhow::Result<Option<ObjectConfigData>> {
        let state = self.state.read();
        Ok(state
            .owners
            .get(&owner)
            .and_then(|id| state.object_configs.get(id))
            .cloned())
    }

    async fn object_config_find_by_id(
        &self,
        id: i64,
    ) -> anyhow::Result<Option<ObjectConfigData>> {
        Ok(self.state.read().object_configs.get(&id).cloned())
    }

    async fn object_config_create(
        &self,
        owner: ConfigOwner,
        config: Value,
        attr: Value,
        description: &str,
    ) -> anyhow::Result<(ObjectConfigData, ConfigLogData)> {
        self.state
            .write()
            .create_object_config(owner, config, attr, description)
    }

    async fn config_log_append(
        &self,
        object_config_id: i64,
        config: Value,
        attr: Value,
        description: &str,
    ) -> anyhow::Result<Option<(ObjectConfigData, ConfigLogData)>> {
        Ok(self
            .state
            .write()
            .append_log(object_config_id, config, attr, description))
    }

    async fn config_write_all(
        &self,
        writes: Vec<ConfigWrite>,
    ) -> anyhow::Result<Vec<(ObjectConfigData, ConfigLogData)>> {
        let mut state = self.state.write();
        // Checked up front so that a rejected batch leaves no trace
        for write in &writes {
            let valid = match write {
                ConfigWrite::Append {
                    object_config_id, ..
                } => state.object_configs.contains_key(object_config_id),
                ConfigWrite::Restore {
                    object_config_id,
                    config_log_id,
                    ..
                } => state.can_restore(*object_config_id, *config_log_id),
            };
            if !valid {
                anyhow::bail!(
                    "write batch rejected: object config {} cannot take the write",
                    write.object_config_id()
                );
            }
        }

        let mut saved = Vec::with_capacity(writes.len());
        for write in writes {
            let applied = match write {
                ConfigWrite::Append {
                    object_config_id,
                    config,
                    attr,
                    description,
                } => state.append_log(object_config_id, config, attr, &description),
                ConfigWrite::Restore {
                    object_config_id,
                    config_log_id,
                    description,
                } => state.restore_log(object_config_id, config_log_id, description.as_deref()),
            };
            if let Some(applied) = applied {
                saved.push(applied);
            }
        }
        Ok(saved)
    }

    async fn config_log_find(&self, id: i64) -> anyhow::Result<Option<ConfigLogData>> {
        Ok(self.state.read().config_logs.get(&id).cloned())
    }

    async fn config_log_list(&self, object_config_id: i64) -> anyhow::Result<Vec<ConfigLogData>> {
        Ok(self
            .state
            .read()
            .config_logs
            .values()
            .filter(|log| log.object_config_id == object_config_id)
            .cloned()
            .collect())
    }

    async fn object_config_restore(
        &self,
        object_config_id: i64,
        config_log_id: i64,
        description: Option<&str>,
    ) -> anyhow::Result<Option<(ObjectConfigData, ConfigLogData)>> {
        Ok(self
            .state
            .write()
            .restore_log(object_config_id, config_log_id, description))
    }

    async fn object_config_delete(&self, object_config_id: i64) -> anyhow::Result<bool> {
        Ok(self.state.write().delete_object_config(object_config_id))
    }
}

#[async_trait]
impl HostGroupPersistence for MemoryPersistService {
    async fn host_group_create(
        &self,
        parent: ObjectRef,
        name: &str,
        description: &str,
        hosts: &[i64],
        config: Value,
        attr: Value,
    ) -> anyhow::Result<(HostGroupData, ObjectConfigData, ConfigLogData)> {
        let mut state = self.state.write();
        if state
            .host_groups
            .values()
            .any(|g| g.parent == parent && g.name == name)
        {
            anyhow::bail!("host group `{}` of {} already exists", name, parent);
        }

        state.last_host_group_id += 1;
        let group_id = state.last_host_group_id;
        let (object_config, log) = state.create_object_config(
            ConfigOwner::HostGroup(group_id),
            config,
            attr,
            INIT_DESCRIPTION,
        )?;

        let group = HostGroupData {
            id: group_id,
            parent,
            name: name.to_string(),
            description: description.to_string(),
            object_config_id: Some(object_config.id),
            hosts: hosts.to_vec(),
        };
        state.host_groups.insert(group_id, group.clone());
        Ok((group, object_config, log))
    }

    async fn host_group_find(&self, id: i64) -> anyhow::Result<Option<HostGroupData>> {
        Ok(self.state.read().host_groups.get(&id).cloned())
    }

    async fn host_group_list(&self, parent: ObjectRef) -> anyhow::Result<Vec<HostGroupData>> {
        Ok(self
            .state
            .read()
            .host_groups
            .values()
            .filter(|g| g.parent == parent)
            .cloned()
            .collect())
    }

    async fn host_group_set_hosts(&self, id: i64, hosts: &[i64]) -> anyhow::Result<bool> {
        let mut state = self.state.write();
        match state.host_groups.get_mut(&id) {
            Some(group) => {
                group.hosts = hosts.to_vec();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn host_group_delete(&self, id: i64) -> anyhow::Result<bool> {
        let mut state = self.state.write();
        match state.host_groups.remove(&id) {
            Some(group) => {
                if let Some(object_config_id) = group.object_config_id {
                    state.delete_object_config(object_config_id);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::ObjectKind;

    fn cluster(id: i64) -> ConfigOwner {
        ConfigOwner::Object(ObjectRef::new(ObjectKind::Cluster, id))
    }

    #[tokio::test]
    async fn test_create_points_current_and_previous_at_first_revision() {
        let store = MemoryPersistService::new();
        let (oc, log) = store
            .object_config_create(cluster(1), json!({"a": 1}), json!({}), "init")
            .await
            .unwrap();

        assert_eq!(oc.current, log.id);
        assert_eq!(oc.previous, log.id);
        assert_eq!(log.description, "init");
        assert_eq!(
            store.object_config_find(cluster(1)).await.unwrap(),
            Some(oc)
        );
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let store = MemoryPersistService::new();
        store
            .object_config_create(cluster(1), json!({}), json!({}), "init")
            .await
            .unwrap();
        assert!(
            store
                .object_config_create(cluster(1), json!({}), json!({}), "init")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_append_moves_pointers() {
        let store = MemoryPersistService::new();
        let (oc, first) = store
            .object_config_create(cluster(1), json!({"a": 1}), json!({}), "init")
            .await
            .unwrap();

        let (oc2, second) = store
            .config_log_append(oc.id, json!({"a": 2}), json!({}), "second")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(oc2.previous, first.id);
        assert_eq!(oc2.current, second.id);
        assert!(second.id > first.id);

        assert!(
            store
                .config_log_append(999, json!({}), json!({}), "x")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_restore_rejects_foreign_revision() {
        let store = MemoryPersistService::new();
        let (a, _) = store
            .object_config_create(cluster(1), json!({}), json!({}), "init")
            .await
            .unwrap();
        let (_, foreign) = store
            .object_config_create(cluster(2), json!({}), json!({}), "init")
            .await
            .unwrap();

        assert!(
            store
                .object_config_restore(a.id, foreign.id, None)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_restore_rewrites_description() {
        let store = MemoryPersistService::new();
        let (oc, first) = store
            .object_config_create(cluster(1), json!({"a": 1}), json!({}), "init")
            .await
            .unwrap();
        let (_, second) = store
            .config_log_append(oc.id, json!({"a": 2}), json!({}), "second")
            .await
            .unwrap()
            .unwrap();

        let (oc, restored) = store
            .object_config_restore(oc.id, first.id, Some("back to init"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(oc.current, first.id);
        assert_eq!(oc.previous, second.id);
        assert_eq!(restored.description, "back to init");
        assert_eq!(restored.config, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_write_batch_applies_in_order() {
        let store = MemoryPersistService::new();
        let (a, a_first) = store
            .object_config_create(cluster(1), json!({"a": 1}), json!({}), "init")
            .await
            .unwrap();
        let (b, _) = store
            .object_config_create(cluster(2), json!({"b": 1}), json!({}), "init")
            .await
            .unwrap();
        store
            .config_log_append(a.id, json!({"a": 2}), json!({}), "second")
            .await
            .unwrap();

        let saved = store
            .config_write_all(vec![
                ConfigWrite::restore(a.id, a_first.id, Some("rollback")),
                ConfigWrite::append(b.id, json!({"b": 2}), json!({}), "rollback"),
            ])
            .await
            .unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].0.current, a_first.id);
        assert_eq!(saved[0].1.description, "rollback");
        assert_eq!(saved[1].1.config, json!({"b": 2}));
        assert_eq!(
            store.object_config_find(cluster(2)).await.unwrap().unwrap().current,
            saved[1].1.id
        );
    }

    #[tokio::test]
    async fn test_rejected_write_batch_leaves_no_trace() {
        let store = MemoryPersistService::new();
        let (a, first) = store
            .object_config_create(cluster(1), json!({"a": 1}), json!({}), "init")
            .await
            .unwrap();

        let result = store
            .config_write_all(vec![
                ConfigWrite::append(a.id, json!({"a": 2}), json!({}), "second"),
                ConfigWrite::append(999, json!({}), json!({}), "missing"),
            ])
            .await;
        assert!(result.is_err());

        let oc = store.object_config_find(cluster(1)).await.unwrap().unwrap();
        assert_eq!(oc.current, first.id);
        assert_eq!(store.config_log_list(a.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_revisions() {
        let store = MemoryPersistService::new();
        let (oc, log) = store
            .object_config_create(cluster(1), json!({}), json!({}), "init")
            .await
            .unwrap();

        assert!(store.object_config_delete(oc.id).await.unwrap());
        assert!(store.config_log_find(log.id).await.unwrap().is_none());
        assert!(store.object_config_find(cluster(1)).await.unwrap().is_none());
        assert!(!store.object_config_delete(oc.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_prototype_rows_keep_declaration_order() {
        let store = MemoryPersistService::new();
        let rows = vec![
            PrototypeConfigRow {
                name: "b".into(),
                kind: "string".into(),
                ..Default::default()
            },
            PrototypeConfigRow {
                name: "a".into(),
                kind: "integer".into(),
                ..Default::default()
            },
            PrototypeConfigRow {
                name: "action_only".into(),
                kind: "string".into(),
                action_id: Some(1),
                ..Default::default()
            },
        ];
        store.prototype_config_save(10, rows).await.unwrap();

        let loaded = store.prototype_config_rows(10).await.unwrap();
        let names: Vec<&str> = loaded.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(loaded.iter().all(|r| r.prototype_id == 10));
    }

    #[tokio::test]
    async fn test_host_groups_in_creation_order() {
        let store = MemoryPersistService::new();
        let parent = ObjectRef::new(ObjectKind::Cluster, 1);
        let (g1, oc1, _) = store
            .host_group_create(parent, "first", "", &[], json!({}), json!({}))
            .await
            .unwrap();
        let (g2, _, _) = store
            .host_group_create(parent, "second", "", &[7], json!({}), json!({}))
            .await
            .unwrap();
        assert!(
            store
                .host_group_create(parent, "first", "", &[], json!({}), json!({}))
                .await
                .is_err()
        );

        let groups = store.host_group_list(parent).await.unwrap();
        assert_eq!(
            groups.iter().map(|g| g.id).collect::<Vec<_>>(),
            vec![g1.id, g2.id]
        );
        assert_eq!(g2.hosts, vec![7]);
        assert_eq!(groups[1].hosts, vec![7]);
        assert_eq!(oc1.owner, ConfigOwner::HostGroup(g1.id));

        assert!(store.host_group_set_hosts(g1.id, &[5, 6]).await.unwrap());
        assert_eq!(
            store.host_group_find(g1.id).await.unwrap().unwrap().hosts,
            vec![5, 6]
        );

        assert!(store.host_group_delete(g1.id).await.unwrap());
        assert!(store.object_config_find_by_id(oc1.id).await.unwrap().is_none());
    }
}
