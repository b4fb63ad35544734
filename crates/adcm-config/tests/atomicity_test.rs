//! Parent and host group revisions are stored together or not at all

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use adcm_common::SecretVault;
use adcm_config::{ConfigManager, ConfigObject, EngineSettings, Revision, StaticTopology};
use adcm_persistence::{
    ConfigLogData, ConfigOwner, ConfigPersistence, ConfigWrite, HostGroupData,
    HostGroupPersistence, MemoryPersistService, ObjectConfigData, ObjectKind, ObjectRef,
    PersistenceService, Prototype, PrototypeConfigRow, PrototypePersistence, StorageMode,
};
use async_trait::async_trait;
use serde_json::{Value, json};

/// Memory backend that rejects writes to host group configs while `broken`
/// is set
struct GroupWritesFail {
    inner: MemoryPersistService,
    broken: AtomicBool,
}

impl GroupWritesFail {
    async fn owned_by_group(&self, object_config_id: i64) -> anyhow::Result<bool> {
        Ok(matches!(
            self.inner.object_config_find_by_id(object_config_id).await?,
            Some(ObjectConfigData {
                owner: ConfigOwner::HostGroup(_),
                ..
            })
        ))
    }

    async fn check(&self, object_config_id: i64) -> anyhow::Result<()> {
        if self.broken.load(Ordering::SeqCst) && self.owned_by_group(object_config_id).await? {
            anyhow::bail!("group config {} is not writable", object_config_id);
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceService for GroupWritesFail {
    fn storage_mode(&self) -> StorageMode {
        self.inner.storage_mode()
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        self.inner.health_check().await
    }
}

#[async_trait]
impl PrototypePersistence for GroupWritesFail {
    async fn prototype_config_rows(
        &self,
        prototype_id: i64,
    ) -> anyhow::Result<Vec<PrototypeConfigRow>> {
        self.inner.prototype_config_rows(prototype_id).await
    }

    async fn prototype_config_save(
        &self,
        prototype_id: i64,
        rows: Vec<PrototypeConfigRow>,
    ) -> anyhow::Result<Vec<PrototypeConfigRow>> {
        self.inner.prototype_config_save(prototype_id, rows).await
    }
}

#[async_trait]
impl ConfigPersistence for GroupWritesFail {
    async fn object_config_find(
        &self,
        owner: ConfigOwner,
    ) -> anyhow::Result<Option<ObjectConfigData>> {
        self.inner.object_config_find(owner).await
    }

    async fn object_config_find_by_id(
        &self,
        id: i64,
    ) -> anyhow::Result<Option<ObjectConfigData>> {
        self.inner.object_config_find_by_id(id).await
    }

    async fn object_config_create(
        &self,
        owner: ConfigOwner,
        config: Value,
        attr: Value,
        description: &str,
    ) -> anyhow::Result<(ObjectConfigData, ConfigLogData)> {
        self.inner
            .object_config_create(owner, config, attr, description)
            .await
    }

    async fn config_log_append(
        &self,
        object_config_id: i64,
        config: Value,
        attr: Value,
        description: &str,
    ) -> anyhow::Result<Option<(ObjectConfigData, ConfigLogData)>> {
        self.check(object_config_id).await?;
        self.inner
            .config_log_append(object_config_id, config, attr, description)
            .await
    }

    async fn config_write_all(
        &self,
        writes: Vec<ConfigWrite>,
    ) -> anyhow::Result<Vec<(ObjectConfigData, ConfigLogData)>> {
        for write in &writes {
            self.check(write.object_config_id()).await?;
        }
        self.inner.config_write_all(writes).await
    }

    async fn config_log_find(&self, id: i64) -> anyhow::Result<Option<ConfigLogData>> {
        self.inner.config_log_find(id).await
    }

    async fn config_log_list(&self, object_config_id: i64) -> anyhow::Result<Vec<ConfigLogData>> {
        self.inner.config_log_list(object_config_id).await
    }

    async fn object_config_restore(
        &self,
        object_config_id: i64,
        config_log_id: i64,
        description: Option<&str>,
    ) -> anyhow::Result<Option<(ObjectConfigData, ConfigLogData)>> {
        self.check(object_config_id).await?;
        self.inner
            .object_config_restore(object_config_id, config_log_id, description)
            .await
    }

    async fn object_config_delete(&self, object_config_id: i64) -> anyhow::Result<bool> {
        self.inner.object_config_delete(object_config_id).await
    }
}

#[async_trait]
impl HostGroupPersistence for GroupWritesFail {
    async fn host_group_create(
        &self,
        parent: ObjectRef,
        name: &str,
        description: &str,
        hosts: &[i64],
        config: Value,
        attr: Value,
    ) -> anyhow::Result<(HostGroupData, ObjectConfigData, ConfigLogData)> {
        self.inner
            .host_group_create(parent, name, description, hosts, config, attr)
            .await
    }

    async fn host_group_find(&self, id: i64) -> anyhow::Result<Option<HostGroupData>> {
        self.inner.host_group_find(id).await
    }

    async fn host_group_list(&self, parent: ObjectRef) -> anyhow::Result<Vec<HostGroupData>> {
        self.inner.host_group_list(parent).await
    }

    async fn host_group_set_hosts(&self, id: i64, hosts: &[i64]) -> anyhow::Result<bool> {
        self.inner.host_group_set_hosts(id, hosts).await
    }

    async fn host_group_delete(&self, id: i64) -> anyhow::Result<bool> {
        self.inner.host_group_delete(id).await
    }
}

struct Fixture {
    manager: ConfigManager,
    persistence: Arc<GroupWritesFail>,
    cluster: ConfigObject,
    group: HostGroupData,
    _file_dir: tempfile::TempDir,
}

fn prototype(id: i64, version: &str) -> Prototype {
    Prototype {
        id,
        kind: ObjectKind::Cluster,
        name: "cluster".to_string(),
        version: version.to_string(),
        bundle_hash: format!("bundle-{}", version),
        path: String::new(),
    }
}

async fn setup() -> Fixture {
    let persistence = Arc::new(GroupWritesFail {
        inner: MemoryPersistService::new(),
        broken: AtomicBool::new(false),
    });
    let rows: Vec<PrototypeConfigRow> = serde_json::from_value(json!([
        {"name": "timeout", "type": "integer", "default": "10", "group_customization": true}
    ]))
    .unwrap();
    persistence.prototype_config_save(1, rows).await.unwrap();
    let rows: Vec<PrototypeConfigRow> = serde_json::from_value(json!([
        {"name": "timeout", "type": "integer", "default": "10", "group_customization": true},
        {"name": "retries", "type": "integer", "default": "3"}
    ]))
    .unwrap();
    persistence.prototype_config_save(2, rows).await.unwrap();

    let file_dir = tempfile::tempdir().unwrap();
    let topology = Arc::new(StaticTopology::new());
    let settings = EngineSettings::default()
        .with_file_dir(file_dir.path())
        .with_vault_key(SecretVault::generate_base64_key());
    let manager = ConfigManager::builder(settings, persistence.clone())
        .topology(topology.clone())
        .build()
        .unwrap();

    let cluster = ConfigObject::new(ObjectRef::new(ObjectKind::Cluster, 1), prototype(1, "1.0"));
    manager.init(&cluster).await.unwrap();
    topology.set_hosts(cluster.object, vec![1, 2]);
    let group = manager.add_group(&cluster, "g", "", &[1]).await.unwrap();

    Fixture {
        manager,
        persistence,
        cluster,
        group,
        _file_dir: file_dir,
    }
}

impl Fixture {
    fn break_group_writes(&self) {
        self.persistence.broken.store(true, Ordering::SeqCst);
    }

    async fn revision_count(&self) -> usize {
        self.manager.history(&self.cluster).await.unwrap().len()
    }
}

#[tokio::test]
async fn test_failed_group_write_keeps_parent_update_out() {
    let fx = setup().await;
    fx.break_group_writes();

    let err = fx
        .manager
        .update(&fx.cluster, &json!({"timeout": 20}), &json!({}), "raise")
        .await
        .unwrap_err();
    assert_eq!(err.name(), "STORAGE_ERROR");

    let (config, _) = fx.manager.current(&fx.cluster).await.unwrap();
    assert_eq!(config, json!({"timeout": 10}));
    assert_eq!(fx.revision_count().await, 1);
    let (group_config, _) = fx.manager.group_current(&fx.cluster, fx.group.id).await.unwrap();
    assert_eq!(group_config, json!({"timeout": 10}));
}

#[tokio::test]
async fn test_failed_group_write_keeps_parent_restore_out() {
    let fx = setup().await;
    let first = fx.manager.revision(&fx.cluster, Revision::Current).await.unwrap().id;
    let second = fx
        .manager
        .update(&fx.cluster, &json!({"timeout": 20}), &json!({}), "raise")
        .await
        .unwrap();
    fx.break_group_writes();

    assert!(
        fx.manager
            .restore(&fx.cluster, Revision::Id(first), Some("back"))
            .await
            .is_err()
    );
    let current = fx.manager.revision(&fx.cluster, Revision::Current).await.unwrap();
    assert_eq!(current.id, second);
    let restored = fx.manager.revision(&fx.cluster, Revision::Id(first)).await.unwrap();
    assert_ne!(restored.description, "back");
}

#[tokio::test]
async fn test_failed_group_write_keeps_parent_on_old_prototype() {
    let fx = setup().await;
    fx.break_group_writes();

    assert!(fx.manager.switch(&fx.cluster, &prototype(2, "2.0")).await.is_err());
    let (config, _) = fx.manager.current(&fx.cluster).await.unwrap();
    assert_eq!(config, json!({"timeout": 10}));
    assert_eq!(fx.revision_count().await, 1);
}

#[tokio::test]
async fn test_group_writes_land_with_parent() {
    let fx = setup().await;
    fx.manager
        .update(&fx.cluster, &json!({"timeout": 20}), &json!({}), "raise")
        .await
        .unwrap();

    let (group_config, _) = fx.manager.group_current(&fx.cluster, fx.group.id).await.unwrap();
    assert_eq!(group_config, json!({"timeout": 20}));
    assert_eq!(fx.revision_count().await, 2);
}
