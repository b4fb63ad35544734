//! Configuration manager
//!
//! Entry point for collaborators: every read and write of an object config
//! or a host group overlay goes through [`ConfigManager`].

use std::sync::Arc;

use moka::sync::Cache;
use serde_json::Value;
use tracing::{debug, info, warn};

use adcm_common::{
    AdcmError, AdcmResult, CUSTOM_GROUP_KEYS, GROUP_KEYS, INIT_DESCRIPTION, SecretVault,
    UPGRADE_DESCRIPTION,
};
use adcm_persistence::{
    ConfigLogData, ConfigOwner, ConfigWrite, HostGroupData, ObjectConfigData, ObjectRef,
    PersistenceService, Prototype,
};

use crate::model::PrototypeSchema;
use crate::service::defaults::{BundleFiles, Defaults, FsBundleFiles, initial_attr};
use crate::service::files::{FileScope, SecretFiles};
use crate::service::history::{Revision, RevisionSummary, Versioner};
use crate::service::host_group::{self, custom_group_keys, default_group_keys, rebuild_group_keys};
use crate::service::projection::{self, ConfigFieldView};
use crate::service::secrets;
use crate::service::structure::{StructureChecker, YspecChecker};
use crate::service::topology::{StaticTopology, Topology};
use crate::service::upgrade::UpgradePlan;
use crate::service::validator::{self, ValidationTarget, Validator};
use crate::settings::EngineSettings;

/// Object whose config is read or written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigObject {
    pub object: ObjectRef,
    pub prototype: Prototype,
    /// Lifecycle state, drives read-only rules
    pub state: Option<String>,
}

impl ConfigObject {
    pub fn new(object: ObjectRef, prototype: Prototype) -> Self {
        Self {
            object,
            prototype,
            state: None,
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    fn owner(&self) -> ConfigOwner {
        ConfigOwner::Object(self.object)
    }
}

pub struct ConfigManagerBuilder {
    settings: EngineSettings,
    persistence: Arc<dyn PersistenceService>,
    vault: Option<Arc<SecretVault>>,
    bundle: Option<Arc<dyn BundleFiles>>,
    topology: Option<Arc<dyn Topology>>,
    structure: Option<Arc<dyn StructureChecker>>,
}

impl ConfigManagerBuilder {
    pub fn vault(mut self, vault: Arc<SecretVault>) -> Self {
        self.vault = Some(vault);
        self
    }

    pub fn bundle_files(mut self, bundle: Arc<dyn BundleFiles>) -> Self {
        self.bundle = Some(bundle);
        self
    }

    pub fn topology(mut self, topology: Arc<dyn Topology>) -> Self {
        self.topology = Some(topology);
        self
    }

    pub fn structure_checker(mut self, structure: Arc<dyn StructureChecker>) -> Self {
        self.structure = Some(structure);
        self
    }

    pub fn build(self) -> AdcmResult<ConfigManager> {
        let settings = self.settings;
        let vault = match self.vault {
            Some(vault) => vault,
            None => Arc::new(SecretVault::from_base64_key(&settings.vault_key)?),
        };
        let bundle = self
            .bundle
            .unwrap_or_else(|| Arc::new(FsBundleFiles::new(&settings.bundle_dir)));

        Ok(ConfigManager {
            versioner: Versioner::new(self.persistence.clone()),
            persistence: self.persistence,
            vault,
            files: SecretFiles::new(&settings.file_dir),
            defaults: Defaults::new(bundle, settings.file_size_cap),
            topology: self
                .topology
                .unwrap_or_else(|| Arc::new(StaticTopology::new())),
            structure: self.structure.unwrap_or_else(|| Arc::new(YspecChecker)),
            schemas: Cache::builder()
                .max_capacity(settings.schema_cache_capacity)
                .build(),
        })
    }
}

#[derive(Clone)]
pub struct ConfigManager {
    persistence: Arc<dyn PersistenceService>,
    vault: Arc<SecretVault>,
    files: SecretFiles,
    defaults: Defaults,
    topology: Arc<dyn Topology>,
    structure: Arc<dyn StructureChecker>,
    versioner: Versioner,
    // PrototypeConfig rows never change for a given prototype
    schemas: Cache<i64, Arc<PrototypeSchema>>,
}

impl ConfigManager {
    pub fn builder(
        settings: EngineSettings,
        persistence: Arc<dyn PersistenceService>,
    ) -> ConfigManagerBuilder {
        ConfigManagerBuilder {
            settings,
            persistence,
            vault: None,
            bundle: None,
            topology: None,
            structure: None,
        }
    }

    pub fn vault(&self) -> &SecretVault {
        &self.vault
    }

    pub fn files(&self) -> &SecretFiles {
        &self.files
    }

    /// Schema of `prototype`, built once and cached
    pub async fn prototype_schema(&self, prototype: &Prototype) -> AdcmResult<Arc<PrototypeSchema>> {
        if let Some(schema) = self.schemas.get(&prototype.id) {
            return Ok(schema);
        }

        let rows = self.persistence.prototype_config_rows(prototype.id).await?;
        let schema = Arc::new(PrototypeSchema::build(&rows)?);
        self.schemas.insert(prototype.id, schema.clone());
        debug!(
            prototype = prototype.id,
            keys = schema.fields().len(),
            "Prototype schema built"
        );
        Ok(schema)
    }

    fn validator(&self) -> Validator<'_> {
        Validator {
            vault: &self.vault,
            topology: self.topology.as_ref(),
            structure: self.structure.as_ref(),
        }
    }

    async fn object_config(&self, owner: ConfigOwner) -> AdcmResult<ObjectConfigData> {
        self.persistence
            .object_config_find(owner)
            .await?
            .ok_or_else(|| AdcmError::not_found(format!("config of {} not found", owner)))
    }

    async fn current_log(&self, owner: ConfigOwner) -> AdcmResult<(ObjectConfigData, ConfigLogData)> {
        let object_config = self.object_config(owner).await?;
        let log = self.versioner.get(&object_config, Revision::Current).await?;
        Ok((object_config, log))
    }

    async fn materialize(&self, scope: FileScope, schema: &PrototypeSchema, config: &Value) {
        if let Err(e) = self.files.materialize(scope, schema, config, &self.vault).await {
            warn!(error = %e, dir = %self.files.dir().display(), "Config files not materialized");
        }
    }

    async fn remove_files(&self, scope: FileScope, schema: &PrototypeSchema) {
        if let Err(e) = self.files.remove_all(scope, schema).await {
            warn!(error = %e, dir = %self.files.dir().display(), "Config files not removed");
        }
    }

    /// Create the first revision of `target` from schema defaults. Objects
    /// whose prototype declares no keys get no config.
    pub async fn init(&self, target: &ConfigObject) -> AdcmResult<Option<i64>> {
        let schema = self.prototype_schema(&target.prototype).await?;
        if !schema.has_leaves() {
            return Ok(None);
        }
        if let Some(existing) = self.persistence.object_config_find(target.owner()).await? {
            debug!(object = %target.object, "Config already initialized");
            return Ok(Some(existing.current));
        }

        let mut config = self.defaults.config(&target.prototype, &schema).await?;
        secrets::encrypt(&schema, &mut config, &self.vault)?;
        let (object_config, log) = self
            .persistence
            .object_config_create(target.owner(), config, initial_attr(&schema), INIT_DESCRIPTION)
            .await?;
        self.materialize(FileScope::Object(target.object), &schema, &log.config)
            .await;

        info!(
            object = %target.object,
            object_config = object_config.id,
            revision = log.id,
            "Config initialized"
        );
        Ok(Some(log.id))
    }

    /// Current `(config, attr)` as stored
    pub async fn current(&self, target: &ConfigObject) -> AdcmResult<(Value, Value)> {
        let (_, log) = self.current_log(target.owner()).await?;
        Ok((log.config, log.attr))
    }

    /// Current `(config, attr)` with secrets decrypted
    pub async fn current_decrypted(&self, target: &ConfigObject) -> AdcmResult<(Value, Value)> {
        let schema = self.prototype_schema(&target.prototype).await?;
        let (mut config, attr) = self.current(target).await?;
        secrets::decrypt(&schema, &mut config, &self.vault)?;
        Ok((config, attr))
    }

    /// Validate and store a new revision, then cascade it to the host groups
    /// of the object
    pub async fn update(
        &self,
        target: &ConfigObject,
        config: &Value,
        attr: &Value,
        description: &str,
    ) -> AdcmResult<i64> {
        let schema = self.prototype_schema(&target.prototype).await?;
        let (object_config, current) = self.current_log(target.owner()).await?;

        let validation = ValidationTarget {
            object: target.object,
            state: target.state.as_deref(),
            current_config: Some(&current.config),
            current_attr: Some(&current.attr),
            overlay: false,
        };
        let (config, attr) = self
            .validator()
            .validate(&schema, &validation, config, attr)
            .await?;

        let group_writes = self
            .cascade_writes(target.object, &schema, &config, &attr, description)
            .await?;
        let parent_write = ConfigWrite::append(object_config.id, config, attr, description);
        let log = self
            .commit_with_groups(target.object, &schema, None, parent_write, group_writes)
            .await?;
        Ok(log.id)
    }

    /// Point `current` at an earlier revision and cascade it
    pub async fn restore(
        &self,
        target: &ConfigObject,
        revision: Revision,
        description: Option<&str>,
    ) -> AdcmResult<i64> {
        let schema = self.prototype_schema(&target.prototype).await?;
        let object_config = self.object_config(target.owner()).await?;
        let log = self.versioner.get(&object_config, revision).await?;

        let group_writes = self
            .cascade_writes(
                target.object,
                &schema,
                &log.config,
                &log.attr,
                description.unwrap_or(&log.description),
            )
            .await?;
        let parent_write = ConfigWrite::restore(object_config.id, log.id, description);
        self.commit_with_groups(target.object, &schema, None, parent_write, group_writes)
            .await?;
        Ok(log.id)
    }

    pub async fn revision(&self, target: &ConfigObject, revision: Revision) -> AdcmResult<ConfigLogData> {
        let object_config = self.object_config(target.owner()).await?;
        self.versioner.get(&object_config, revision).await
    }

    pub async fn history(&self, target: &ConfigObject) -> AdcmResult<Vec<RevisionSummary>> {
        let object_config = self.object_config(target.owner()).await?;
        self.versioner.list(object_config.id).await
    }

    /// UI view of the current revision
    pub async fn schema(&self, target: &ConfigObject) -> AdcmResult<Vec<ConfigFieldView>> {
        let schema = self.prototype_schema(&target.prototype).await?;
        let (config, attr) = self.current(target).await?;
        projection::ui_view(
            &schema,
            target.object,
            target.state.as_deref(),
            &config,
            &attr,
            self.topology.as_ref(),
        )
        .await
    }

    /// Executor view of the current revision
    pub async fn executor_view(&self, target: &ConfigObject) -> AdcmResult<Value> {
        let schema = self.prototype_schema(&target.prototype).await?;
        let (config, attr) = self.current(target).await?;
        Ok(projection::executor_view(
            &schema,
            &self.files,
            FileScope::Object(target.object),
            &config,
            &attr,
        ))
    }

    /// Switch the config of `target` to `new_prototype` after a bundle
    /// upgrade. Host groups of the object follow. Nothing is stored unless
    /// every switch succeeds.
    pub async fn switch(&self, target: &ConfigObject, new_prototype: &Prototype) -> AdcmResult<Option<i64>> {
        let old_schema = self.prototype_schema(&target.prototype).await?;
        let new_schema = self.prototype_schema(new_prototype).await?;

        let Some(object_config) = self.persistence.object_config_find(target.owner()).await? else {
            let upgraded = ConfigObject {
                object: target.object,
                prototype: new_prototype.clone(),
                state: target.state.clone(),
            };
            return self.init(&upgraded).await;
        };

        let plan = UpgradePlan {
            old_prototype: &target.prototype,
            old_schema: &old_schema,
            new_prototype,
            new_schema: &new_schema,
        };
        let current = self.versioner.get(&object_config, Revision::Current).await?;
        let (config, attr) = plan
            .switch(&self.defaults, &self.vault, &current.config, &current.attr)
            .await?;

        let mut group_writes = Vec::new();
        for group in self.groups_of(target.object).await? {
            let (group_object_config, log) =
                self.current_log(ConfigOwner::HostGroup(group.id)).await?;
            let (switched, switched_attr) = plan
                .switch(&self.defaults, &self.vault, &log.config, &log.attr)
                .await?;
            let group_keys =
                rebuild_group_keys(&new_schema, log.attr.get(GROUP_KEYS).unwrap_or(&Value::Null));
            let (merged, merged_attr) = host_group::merge(
                &new_schema,
                &config,
                &attr,
                &switched,
                &switched_attr,
                &group_keys,
            );
            let write = ConfigWrite::append(
                group_object_config.id,
                merged,
                merged_attr,
                UPGRADE_DESCRIPTION,
            );
            group_writes.push((group, write));
        }

        let parent_write = ConfigWrite::append(object_config.id, config, attr, UPGRADE_DESCRIPTION);
        let log = self
            .commit_with_groups(
                target.object,
                &new_schema,
                Some(old_schema.as_ref()),
                parent_write,
                group_writes,
            )
            .await?;

        info!(
            object = %target.object,
            from = %target.prototype.version,
            to = %new_prototype.version,
            revision = log.id,
            "Config switched to new prototype"
        );
        Ok(Some(log.id))
    }

    /// Remove the config of `target`, its revisions, its host groups and
    /// every materialized file
    pub async fn destroy(&self, target: &ConfigObject) -> AdcmResult<()> {
        let schema = self.prototype_schema(&target.prototype).await?;
        for group in self.groups_of(target.object).await? {
            self.drop_group(&schema, &group).await?;
        }
        if let Some(object_config) = self.persistence.object_config_find(target.owner()).await? {
            self.persistence.object_config_delete(object_config.id).await?;
        }
        self.remove_files(FileScope::Object(target.object), &schema)
            .await;
        info!(object = %target.object, "Config destroyed");
        Ok(())
    }

    async fn groups_of(&self, parent: ObjectRef) -> AdcmResult<Vec<HostGroupData>> {
        if !parent.kind.supports_host_groups() {
            return Ok(Vec::new());
        }
        let mut groups = self.persistence.host_group_list(parent).await?;
        groups.sort_by_key(|group| group.id);
        Ok(groups)
    }

    /// Re-merge every host group of `parent` with a parent revision. Nothing
    /// is stored here.
    async fn cascade_writes(
        &self,
        parent: ObjectRef,
        schema: &PrototypeSchema,
        parent_config: &Value,
        parent_attr: &Value,
        description: &str,
    ) -> AdcmResult<Vec<(HostGroupData, ConfigWrite)>> {
        let mut writes = Vec::new();
        for group in self.groups_of(parent).await? {
            let (object_config, log) = self.current_log(ConfigOwner::HostGroup(group.id)).await?;
            let group_keys =
                rebuild_group_keys(schema, log.attr.get(GROUP_KEYS).unwrap_or(&Value::Null));
            let (config, attr) = host_group::merge(
                schema,
                parent_config,
                parent_attr,
                &log.config,
                &log.attr,
                &group_keys,
            );
            writes.push((group, ConfigWrite::append(object_config.id, config, attr, description)));
        }
        Ok(writes)
    }

    /// Store the parent write and the group writes in one batch, then
    /// materialize files of every scope. `old_schema` names files to remove
    /// first when the prototype changed.
    async fn commit_with_groups(
        &self,
        parent: ObjectRef,
        schema: &PrototypeSchema,
        old_schema: Option<&PrototypeSchema>,
        parent_write: ConfigWrite,
        group_writes: Vec<(HostGroupData, ConfigWrite)>,
    ) -> AdcmResult<ConfigLogData> {
        let (groups, writes): (Vec<_>, Vec<_>) = group_writes.into_iter().unzip();
        let object_config_id = parent_write.object_config_id();
        let mut batch = Vec::with_capacity(writes.len() + 1);
        batch.push(parent_write);
        batch.extend(writes);

        let mut saved = self.versioner.commit(batch).await?.into_iter();
        let parent_log = saved.next().ok_or_else(|| {
            AdcmError::not_found(format!("object config {} not found", object_config_id))
        })?;

        let scope = FileScope::Object(parent);
        if let Some(old_schema) = old_schema {
            self.remove_files(scope, old_schema).await;
        }
        self.materialize(scope, schema, &parent_log.config).await;

        for (group, group_log) in groups.iter().zip(saved) {
            let scope = FileScope::Group {
                group_id: group.id,
                parent,
            };
            if let Some(old_schema) = old_schema {
                self.remove_files(scope, old_schema).await;
            }
            self.materialize(scope, schema, &group_log.config).await;
            debug!(
                group = group.id,
                object = %parent,
                revision = group_log.id,
                "Parent config cascaded to host group"
            );
        }
        Ok(parent_log)
    }

    async fn group_of(&self, parent: &ConfigObject, group_id: i64) -> AdcmResult<HostGroupData> {
        self.persistence
            .host_group_find(group_id)
            .await?
            .filter(|group| group.parent == parent.object)
            .ok_or_else(|| {
                AdcmError::HostGroupError(format!(
                    "host group {} of {} not found",
                    group_id, parent.object
                ))
            })
    }

    /// Create a host group of `parent` holding the given hosts. The group
    /// starts with the parent's config and nothing overridden.
    pub async fn add_group(
        &self,
        parent: &ConfigObject,
        name: &str,
        description: &str,
        hosts: &[i64],
    ) -> AdcmResult<HostGroupData> {
        if !parent.object.kind.supports_host_groups() {
            return Err(AdcmError::HostGroupError(format!(
                "{} objects cannot have host groups",
                parent.object.kind
            )));
        }
        let schema = self.prototype_schema(&parent.prototype).await?;
        let (_, parent_log) = self.current_log(parent.owner()).await?;

        let groups = self.groups_of(parent.object).await?;
        if groups.iter().any(|group| group.name == name) {
            return Err(AdcmError::HostGroupError(format!(
                "host group \"{}\" of {} already exists",
                name, parent.object
            )));
        }
        let attached = self.topology.hosts_of(parent.object).await?;
        host_group::check_hosts(parent.object, &attached, &groups, None, hosts)?;

        let (config, attr) = host_group::merge(
            &schema,
            &parent_log.config,
            &parent_log.attr,
            &parent_log.config,
            &parent_log.attr,
            &default_group_keys(&schema),
        );
        let (group, _, log) = self
            .persistence
            .host_group_create(parent.object, name, description, hosts, config, attr)
            .await?;

        let scope = FileScope::Group {
            group_id: group.id,
            parent: parent.object,
        };
        self.materialize(scope, &schema, &log.config).await;
        info!(group = group.id, object = %parent.object, name = %name, "Host group created");
        Ok(group)
    }

    /// Replace the hosts of a group
    pub async fn set_group_hosts(&self, parent: &ConfigObject, group_id: i64, hosts: &[i64]) -> AdcmResult<()> {
        self.group_of(parent, group_id).await?;
        let groups = self.groups_of(parent.object).await?;
        let attached = self.topology.hosts_of(parent.object).await?;
        host_group::check_hosts(parent.object, &attached, &groups, Some(group_id), hosts)?;

        self.persistence.host_group_set_hosts(group_id, hosts).await?;
        info!(group = group_id, object = %parent.object, hosts = hosts.len(), "Host group hosts set");
        Ok(())
    }

    pub async fn group_hosts(&self, parent: &ConfigObject, group_id: i64) -> AdcmResult<Vec<i64>> {
        Ok(self.group_of(parent, group_id).await?.hosts)
    }

    pub async fn groups(&self, parent: &ConfigObject) -> AdcmResult<Vec<HostGroupData>> {
        self.groups_of(parent.object).await
    }

    /// Validate and store a new revision of a host group. Values of keys the
    /// group does not override are ignored; `attr.group_keys` replaces the
    /// override tree when present.
    pub async fn update_group(
        &self,
        parent: &ConfigObject,
        group_id: i64,
        config: &Value,
        attr: &Value,
        description: &str,
    ) -> AdcmResult<i64> {
        let schema = self.prototype_schema(&parent.prototype).await?;
        self.group_of(parent, group_id).await?;
        let (object_config, current) = self.current_log(ConfigOwner::HostGroup(group_id)).await?;
        let (_, parent_log) = self.current_log(parent.owner()).await?;

        let group_keys = attr
            .get(GROUP_KEYS)
            .or_else(|| current.attr.get(GROUP_KEYS))
            .cloned()
            .unwrap_or_else(|| default_group_keys(&schema));
        host_group::check_group_keys(&schema, &group_keys)?;
        if let Some(custom) = attr.get(CUSTOM_GROUP_KEYS) {
            if *custom != custom_group_keys(&schema) {
                return Err(AdcmError::attr("custom_group_keys cannot be changed"));
            }
        }

        validator::check_keys(&schema, config)?;
        host_group::check_attr_names(&schema, attr)?;

        let (group_config, group_attr) =
            host_group::overlay(&schema, &current.config, &current.attr, config, attr);
        let (candidate, candidate_attr) = host_group::merge(
            &schema,
            &parent_log.config,
            &parent_log.attr,
            &group_config,
            &group_attr,
            &group_keys,
        );

        let validation = ValidationTarget {
            object: parent.object,
            state: parent.state.as_deref(),
            current_config: Some(&current.config),
            current_attr: Some(&current.attr),
            overlay: true,
        };
        let (validated, validated_attr) = self
            .validator()
            .validate(&schema, &validation, &candidate, &candidate_attr)
            .await?;
        let (config, attr) = host_group::merge(
            &schema,
            &parent_log.config,
            &parent_log.attr,
            &validated,
            &validated_attr,
            &group_keys,
        );

        let (_, log) = self
            .versioner
            .save(object_config.id, config, attr, description)
            .await?;
        let scope = FileScope::Group {
            group_id,
            parent: parent.object,
        };
        self.materialize(scope, &schema, &log.config).await;
        Ok(log.id)
    }

    /// Current merged `(config, attr)` of a host group
    pub async fn group_current(&self, parent: &ConfigObject, group_id: i64) -> AdcmResult<(Value, Value)> {
        self.group_of(parent, group_id).await?;
        let (_, log) = self.current_log(ConfigOwner::HostGroup(group_id)).await?;
        Ok((log.config, log.attr))
    }

    pub async fn group_history(&self, parent: &ConfigObject, group_id: i64) -> AdcmResult<Vec<RevisionSummary>> {
        self.group_of(parent, group_id).await?;
        let object_config = self.object_config(ConfigOwner::HostGroup(group_id)).await?;
        self.versioner.list(object_config.id).await
    }

    /// UI view of a host group with its override flags
    pub async fn group_schema(&self, parent: &ConfigObject, group_id: i64) -> AdcmResult<Vec<ConfigFieldView>> {
        let schema = self.prototype_schema(&parent.prototype).await?;
        let (config, attr) = self.group_current(parent, group_id).await?;
        projection::ui_view(
            &schema,
            parent.object,
            parent.state.as_deref(),
            &config,
            &attr,
            self.topology.as_ref(),
        )
        .await
    }

    /// Executor view for the hosts of a group
    pub async fn group_executor_view(&self, parent: &ConfigObject, group_id: i64) -> AdcmResult<Value> {
        let schema = self.prototype_schema(&parent.prototype).await?;
        let (config, attr) = self.group_current(parent, group_id).await?;
        let scope = FileScope::Group {
            group_id,
            parent: parent.object,
        };
        Ok(projection::executor_view(&schema, &self.files, scope, &config, &attr))
    }

    /// Remove a host group with its revisions and files
    pub async fn delete_group(&self, parent: &ConfigObject, group_id: i64) -> AdcmResult<()> {
        let schema = self.prototype_schema(&parent.prototype).await?;
        let group = self.group_of(parent, group_id).await?;
        self.drop_group(&schema, &group).await
    }

    async fn drop_group(&self, schema: &PrototypeSchema, group: &HostGroupData) -> AdcmResult<()> {
        self.persistence.host_group_delete(group.id).await?;
        let scope = FileScope::Group {
            group_id: group.id,
            parent: group.parent,
        };
        self.remove_files(scope, schema).await;
        info!(group = group.id, object = %group.parent, "Host group deleted");
        Ok(())
    }
}
