//! SQL-based persistence backend (MySQL/PostgreSQL via SeaORM)
//!
//! This module implements the `PersistenceService` trait over a SeaORM
//! `DatabaseConnection`. Every mutation runs inside one database transaction.

use async_trait::async_trait;
use sea_orm::*;
use serde_json::Value;
use tracing::{debug, info};

use crate::entity::{config_log, host_group, host_group_host, object_config, prototype_config};
use crate::model::*;
use crate::traits::*;

/// External database persistence service
pub struct ExternalDbPersistService {
    db: DatabaseConnection,
}

impl ExternalDbPersistService {
    /// Create a new ExternalDbPersistService with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Connect to the database at `url`
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let db = Database::connect(url).await?;
        info!("Connected to configuration database");
        Ok(Self::new(db))
    }

    /// Get a reference to the underlying database connection
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Create every table of the backend if it does not exist yet
    pub async fn create_schema(&self) -> anyhow::Result<()> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);
        let mut statements = vec![
            schema.create_table_from_entity(prototype_config::Entity),
            schema.create_table_from_entity(object_config::Entity),
            schema.create_table_from_entity(config_log::Entity),
            schema.create_table_from_entity(host_group::Entity),
            schema.create_table_from_entity(host_group_host::Entity),
        ];
        for statement in statements.iter_mut() {
            statement.if_not_exists();
            self.db.execute(backend.build(&*statement)).await?;
        }
        debug!("Configuration tables are in place");
        Ok(())
    }
}

// ============================================================================
// Row conversion
// ============================================================================

fn parse_json(raw: &str) -> anyhow::Result<Value> {
    if raw.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(raw)?)
}

fn prototype_config_to_row(m: prototype_config::Model) -> anyhow::Result<PrototypeConfigRow> {
    Ok(PrototypeConfigRow {
        id: m.id,
        prototype_id: m.prototype_id,
        action_id: m.action_id,
        name: m.name,
        subname: m.subname,
        kind: m.r#type,
        default: m.default_value,
        required: m.required,
        limits: parse_json(&m.limits)?,
        ui_options: parse_json(&m.ui_options)?,
        display_name: m.display_name,
        description: m.description,
        group_customization: m.group_customization,
    })
}

fn object_config_to_data(m: object_config::Model) -> anyhow::Result<ObjectConfigData> {
    let owner = ConfigOwner::from_columns(&m.owner_type, m.owner_id).map_err(anyhow::Error::msg)?;
    Ok(ObjectConfigData {
        id: m.id,
        owner,
        current: m.current,
        previous: m.previous,
    })
}

fn config_log_to_data(m: config_log::Model) -> anyhow::Result<ConfigLogData> {
    Ok(ConfigLogData {
        id: m.id,
        object_config_id: m.object_config_id,
        config: parse_json(&m.config)?,
        attr: parse_json(&m.attr)?,
        description: m.description,
        created_at: m.created_at,
    })
}

fn host_group_to_data(m: host_group::Model, hosts: Vec<i64>) -> anyhow::Result<HostGroupData> {
    let kind = m.parent_type.parse::<ObjectKind>().map_err(anyhow::Error::msg)?;
    Ok(HostGroupData {
        id: m.id,
        parent: ObjectRef::new(kind, m.parent_id),
        name: m.name,
        description: m.description,
        object_config_id: m.object_config_id,
        hosts,
    })
}

async fn insert_log<C: ConnectionTrait>(
    conn: &C,
    object_config_id: i64,
    config: &Value,
    attr: &Value,
    description: &str,
) -> anyhow::Result<config_log::Model> {
    let log = config_log::ActiveModel {
        object_config_id: Set(object_config_id),
        config: Set(config.to_string()),
        attr: Set(attr.to_string()),
        description: Set(description.to_string()),
        created_at: Set(now_millis()),
        ..Default::default()
    };
    Ok(log.insert(conn).await?)
}

/// Insert an object config and its first revision inside `conn`
async fn create_object_config<C: ConnectionTrait>(
    conn: &C,
    owner: ConfigOwner,
    config: &Value,
    attr: &Value,
    description: &str,
) -> anyhow::Result<(ObjectConfigData, ConfigLogData)> {
    let (owner_type, owner_id) = owner.to_columns();
    let object_config = object_config::ActiveModel {
        owner_type: Set(owner_type),
        owner_id: Set(owner_id),
        current: Set(0),
        previous: Set(0),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    let log = insert_log(conn, object_config.id, config, attr, description).await?;

    let mut active: object_config::ActiveModel = object_config.into();
    active.current = Set(log.id);
    active.previous = Set(log.id);
    let object_config = active.update(conn).await?;

    Ok((object_config_to_data(object_config)?, config_log_to_data(log)?))
}

/// Append a revision and move the pointers, `None` when the object config is missing
async fn append_log<C: ConnectionTrait>(
    conn: &C,
    object_config_id: i64,
    config: &Value,
    attr: &Value,
    description: &str,
) -> anyhow::Result<Option<(ObjectConfigData, ConfigLogData)>> {
    let Some(object_config) = object_config::Entity::find_by_id(object_config_id)
        .one(conn)
        .await?
    else {
        return Ok(None);
    };

    let log = insert_log(conn, object_config_id, config, attr, description).await?;

    let current = object_config.current;
    let mut active: object_config::ActiveModel = object_config.into();
    active.previous = Set(current);
    active.current = Set(log.id);
    let object_config = active.update(conn).await?;

    Ok(Some((
        object_config_to_data(object_config)?,
        config_log_to_data(log)?,
    )))
}

/// Point `current` at an own revision, `None` when either row is missing
async fn restore_log<C: ConnectionTrait>(
    conn: &C,
    object_config_id: i64,
    config_log_id: i64,
    description: Option<&str>,
) -> anyhow::Result<Option<(ObjectConfigData, ConfigLogData)>> {
    let Some(object_config) = object_config::Entity::find_by_id(object_config_id)
        .one(conn)
        .await?
    else {
        return Ok(None);
    };
    let Some(log) = config_log::Entity::find_by_id(config_log_id)
        .filter(config_log::Column::ObjectConfigId.eq(object_config_id))
        .one(conn)
        .await?
    else {
        return Ok(None);
    };

    let log = match description {
        Some(description) => {
            let mut active: config_log::ActiveModel = log.into();
            active.description = Set(description.to_string());
            active.update(conn).await?
        }
        None => log,
    };

    let current = object_config.current;
    let mut active: object_config::ActiveModel = object_config.into();
    active.previous = Set(current);
    active.current = Set(config_log_id);
    let object_config = active.update(conn).await?;

    Ok(Some((
        object_config_to_data(object_config)?,
        config_log_to_data(log)?,
    )))
}

async fn replace_hosts<C: ConnectionTrait>(
    conn: &C,
    group_id: i64,
    hosts: &[i64],
) -> anyhow::Result<()> {
    host_group_host::Entity::delete_many()
        .filter(host_group_host::Column::GroupId.eq(group_id))
        .exec(conn)
        .await?;
    if !hosts.is_empty() {
        let rows: Vec<host_group_host::ActiveModel> = hosts
            .iter()
            .map(|host_id| host_group_host::ActiveModel {
                group_id: Set(group_id),
                host_id: Set(*host_id),
                ..Default::default()
            })
            .collect();
        host_group_host::Entity::insert_many(rows).exec(conn).await?;
    }
    Ok(())
}

async fn delete_object_config<C: ConnectionTrait>(
    conn: &C,
    object_config_id: i64,
) -> anyhow::Result<bool> {
    config_log::Entity::delete_many()
        .filter(config_log::Column::ObjectConfigId.eq(object_config_id))
        .exec(conn)
        .await?;
    let result = object_config::Entity::delete_by_id(object_config_id)
        .exec(conn)
        .await?;
    Ok(result.rows_affected > 0)
}

// ============================================================================
// PersistenceService implementation
// ============================================================================

#[async_trait]
impl PersistenceService for ExternalDbPersistService {
    fn storage_mode(&self) -> StorageMode {
        StorageMode::ExternalDb
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        object_config::Entity::find().one(&self.db).await?;
        Ok(())
    }
}

// ============================================================================
// PrototypePersistence implementation
// ============================================================================

#[async_trait]
impl PrototypePersistence for ExternalDbPersistService {
    async fn prototype_config_rows(
        &self,
        prototype_id: i64,
    ) -> anyhow::Result<Vec<PrototypeConfigRow>> {
        prototype_config::Entity::find()
            .filter(prototype_config::Column::PrototypeId.eq(prototype_id))
            .filter(prototype_config::Column::ActionId.is_null())
            .order_by_asc(prototype_config::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(prototype_config_to_row)
            .collect()
    }

    async fn prototype_config_save(
        &self,
        prototype_id: i64,
        rows: Vec<PrototypeConfigRow>,
    ) -> anyhow::Result<Vec<PrototypeConfigRow>> {
        let tx = self.db.begin().await?;
        let mut saved = Vec::with_capacity(rows.len());
        // Inserted one by one so that ascending ids follow declaration order
        for row in rows {
            let model = prototype_config::ActiveModel {
                prototype_id: Set(prototype_id),
                action_id: Set(row.action_id),
                name: Set(row.name),
                subname: Set(row.subname),
                r#type: Set(row.kind),
                default_value: Set(row.default),
                required: Set(row.required),
                limits: Set(row.limits.to_string()),
                ui_options: Set(row.ui_options.to_string()),
                display_name: Set(row.display_name),
                description: Set(row.description),
                group_customization: Set(row.group_customization),
                ..Default::default()
            }
            .insert(&tx)
            .await?;
            saved.push(prototype_config_to_row(model)?);
        }
        tx.commit().await?;
        Ok(saved)
    }
}

// ============================================================================
// ConfigPersistence implementation
// ============================================================================

#[async_trait]
impl ConfigPersistence for ExternalDbPersistService {
    async fn object_config_find(
        &self,
        owner: ConfigOwner,
    ) -> anyhow::Result<Option<ObjectConfigData>> {
        let (owner_type, owner_id) = owner.to_columns();
        object_config::Entity::find()
            .filter(object_config::Column::OwnerType.eq(owner_type))
            .filter(object_config::Column::OwnerId.eq(owner_id))
            .one(&self.db)
            .await?
            .map(object_config_to_data)
            .transpose()
    }

    async fn object_config_find_by_id(
        &self,
        id: i64,
    ) -> anyhow::Result<Option<ObjectConfigData>> {
        object_config::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(object_config_to_data)
            .transpose()
    }

    async fn object_config_create(
        &self,
        owner: ConfigOwner,
        config: Value,
        attr: Value,
        description: &str,
    ) -> anyhow::Result<(ObjectConfigData, ConfigLogData)> {
        let tx = self.db.begin().await?;
        if self.object_config_find(owner).await?.is_some() {
            anyhow::bail!("object config of {} already exists", owner);
        }
        let created = create_object_config(&tx, owner, &config, &attr, description).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn config_log_append(
        &self,
        object_config_id: i64,
        config: Value,
        attr: Value,
        description: &str,
    ) -> anyhow::Result<Option<(ObjectConfigData, ConfigLogData)>> {
        let tx = self.db.begin().await?;
        let appended = append_log(&tx, object_config_id, &config, &attr, description).await?;
        tx.commit().await?;
        Ok(appended)
    }

    async fn config_write_all(
        &self,
        writes: Vec<ConfigWrite>,
    ) -> anyhow::Result<Vec<(ObjectConfigData, ConfigLogData)>> {
        let tx = self.db.begin().await?;
        let mut saved = Vec::with_capacity(writes.len());
        for write in writes {
            let object_config_id = write.object_config_id();
            let applied = match write {
                ConfigWrite::Append {
                    object_config_id,
                    config,
                    attr,
                    description,
                } => append_log(&tx, object_config_id, &config, &attr, &description).await?,
                ConfigWrite::Restore {
                    object_config_id,
                    config_log_id,
                    description,
                } => {
                    restore_log(&tx, object_config_id, config_log_id, description.as_deref())
                        .await?
                }
            };
            // Dropping `tx` rolls back every write applied so far
            let Some(applied) = applied else {
                anyhow::bail!(
                    "write batch rejected: object config {} cannot take the write",
                    object_config_id
                );
            };
            saved.push(applied);
        }
        tx.commit().await?;
        debug!("Committed {} config writes", saved.len());
        Ok(saved)
    }

    async fn config_log_find(&self, id: i64) -> anyhow::Result<Option<ConfigLogData>> {
        config_log::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(config_log_to_data)
            .transpose()
    }

    async fn config_log_list(&self, object_config_id: i64) -> anyhow::Result<Vec<ConfigLogData>> {
        config_log::Entity::find()
            .filter(config_log::Column::ObjectConfigId.eq(object_config_id))
            .order_by_asc(config_log::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(config_log_to_data)
            .collect()
    }

    async fn object_config_restore(
        &self,
        object_config_id: i64,
        config_log_id: i64,
        description: Option<&str>,
    ) -> anyhow::Result<Option<(ObjectConfigData, ConfigLogData)>> {
        let tx = self.db.begin().await?;
        let restored = restore_log(&tx, object_config_id, config_log_id, description).await?;
        tx.commit().await?;
        Ok(restored)
    }

    async fn object_config_delete(&self, object_config_id: i64) -> anyhow::Result<bool> {
        let tx = self.db.begin().await?;
        let deleted = delete_object_config(&tx, object_config_id).await?;
        tx.commit().await?;
        Ok(deleted)
    }
}

// ============================================================================
// HostGroupPersistence implementation
// ============================================================================

impl ExternalDbPersistService {
    async fn group_hosts<C: ConnectionTrait>(conn: &C, group_id: i64) -> anyhow::Result<Vec<i64>> {
        Ok(host_group_host::Entity::find()
            .filter(host_group_host::Column::GroupId.eq(group_id))
            .order_by_asc(host_group_host::Column::Id)
            .all(conn)
            .await?
            .into_iter()
            .map(|m| m.host_id)
            .collect())
    }
}

#[async_trait]
impl HostGroupPersistence for ExternalDbPersistService {
    async fn host_group_create(
        &self,
        parent: ObjectRef,
        name: &str,
        description: &str,
        hosts: &[i64],
        config: Value,
        attr: Value,
    ) -> anyhow::Result<(HostGroupData, ObjectConfigData, ConfigLogData)> {
        let tx = self.db.begin().await?;

        let duplicate = host_group::Entity::find()
            .filter(host_group::Column::ParentType.eq(parent.kind.as_str()))
            .filter(host_group::Column::ParentId.eq(parent.id))
            .filter(host_group::Column::Name.eq(name))
            .one(&tx)
            .await?;
        if duplicate.is_some() {
            anyhow::bail!("host group `{}` of {} already exists", name, parent);
        }

        let group = host_group::ActiveModel {
            parent_type: Set(parent.kind.as_str().to_string()),
            parent_id: Set(parent.id),
            name: Set(name.to_string()),
            description: Set(description.to_string()),
            object_config_id: Set(None),
            ..Default::default()
        }
        .insert(&tx)
        .await?;

        let (object_config, log) = create_object_config(
            &tx,
            ConfigOwner::HostGroup(group.id),
            &config,
            &attr,
            adcm_common::INIT_DESCRIPTION,
        )
        .await?;

        let mut active: host_group::ActiveModel = group.into();
        active.object_config_id = Set(Some(object_config.id));
        let group = active.update(&tx).await?;
        replace_hosts(&tx, group.id, hosts).await?;

        tx.commit().await?;
        Ok((host_group_to_data(group, hosts.to_vec())?, object_config, log))
    }

    async fn host_group_find(&self, id: i64) -> anyhow::Result<Option<HostGroupData>> {
        match host_group::Entity::find_by_id(id).one(&self.db).await? {
            Some(group) => {
                let hosts = Self::group_hosts(&self.db, group.id).await?;
                Ok(Some(host_group_to_data(group, hosts)?))
            }
            None => Ok(None),
        }
    }

    async fn host_group_list(&self, parent: ObjectRef) -> anyhow::Result<Vec<HostGroupData>> {
        let groups = host_group::Entity::find()
            .filter(host_group::Column::ParentType.eq(parent.kind.as_str()))
            .filter(host_group::Column::ParentId.eq(parent.id))
            .order_by_asc(host_group::Column::Id)
            .all(&self.db)
            .await?;

        let mut result = Vec::with_capacity(groups.len());
        for group in groups {
            let hosts = Self::group_hosts(&self.db, group.id).await?;
            result.push(host_group_to_data(group, hosts)?);
        }
        Ok(result)
    }

    async fn host_group_set_hosts(&self, id: i64, hosts: &[i64]) -> anyhow::Result<bool> {
        let tx = self.db.begin().await?;
        if host_group::Entity::find_by_id(id).one(&tx).await?.is_none() {
            return Ok(false);
        }
        replace_hosts(&tx, id, hosts).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn host_group_delete(&self, id: i64) -> anyhow::Result<bool> {
        let tx = self.db.begin().await?;
        let Some(group) = host_group::Entity::find_by_id(id).one(&tx).await? else {
            return Ok(false);
        };

        host_group_host::Entity::delete_many()
            .filter(host_group_host::Column::GroupId.eq(id))
            .exec(&tx)
            .await?;
        if let Some(object_config_id) = group.object_config_id {
            delete_object_config(&tx, object_config_id).await?;
        }
        host_group::Entity::delete_by_id(id).exec(&tx).await?;

        tx.commit().await?;
        Ok(true)
    }
}
