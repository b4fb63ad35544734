//! Engine test utilities
//!
//! Builds a [`ConfigManager`] over the in-memory backend with a temporary
//! file directory and a fresh vault key.

#![allow(dead_code)]

use std::sync::Arc;

use adcm_common::SecretVault;
use adcm_config::{ConfigManager, ConfigObject, EngineSettings, StaticBundleFiles, StaticTopology};
use adcm_persistence::{
    MemoryPersistService, ObjectKind, ObjectRef, Prototype, PrototypeConfigRow,
    PrototypePersistence,
};
use serde_json::Value;
use tempfile::TempDir;

pub struct TestEngine {
    pub manager: ConfigManager,
    pub persistence: Arc<MemoryPersistService>,
    pub topology: Arc<StaticTopology>,
    pub file_dir: TempDir,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_bundle(StaticBundleFiles::new())
    }

    pub fn with_bundle(bundle: StaticBundleFiles) -> Self {
        let file_dir = tempfile::tempdir().expect("Failed to create file dir");
        let persistence = Arc::new(MemoryPersistService::new());
        let topology = Arc::new(StaticTopology::new());
        let settings = EngineSettings::default()
            .with_file_dir(file_dir.path())
            .with_vault_key(SecretVault::generate_base64_key());

        let manager = ConfigManager::builder(settings, persistence.clone())
            .bundle_files(Arc::new(bundle))
            .topology(topology.clone())
            .build()
            .expect("Failed to build manager");

        Self {
            manager,
            persistence,
            topology,
            file_dir,
        }
    }

    /// Register a cluster prototype declaring `rows`
    pub async fn prototype(&self, id: i64, version: &str, rows: Value) -> Prototype {
        let rows: Vec<PrototypeConfigRow> =
            serde_json::from_value(rows).expect("Invalid prototype rows");
        self.persistence
            .prototype_config_save(id, rows)
            .await
            .expect("Failed to save prototype rows");

        Prototype {
            id,
            kind: ObjectKind::Cluster,
            name: "cluster".to_string(),
            version: version.to_string(),
            bundle_hash: format!("bundle-{}", version),
            path: String::new(),
        }
    }

    /// Create a cluster with its initial config
    pub async fn cluster(&self, id: i64, prototype: &Prototype) -> ConfigObject {
        let target = ConfigObject::new(ObjectRef::new(ObjectKind::Cluster, id), prototype.clone());
        self.manager
            .init(&target)
            .await
            .expect("Failed to init config");
        target
    }
}
