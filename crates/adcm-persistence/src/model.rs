//! Domain model types for the persistence abstraction layer
//!
//! These types are used as arguments and return values of the persistence
//! traits, decoupled from specific storage backends.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of an object that can own a configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Adcm,
    Cluster,
    Service,
    Component,
    Provider,
    Host,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Adcm => "adcm",
            ObjectKind::Cluster => "cluster",
            ObjectKind::Service => "service",
            ObjectKind::Component => "component",
            ObjectKind::Provider => "provider",
            ObjectKind::Host => "host",
        }
    }

    /// Whether host groups may be attached to objects of this kind
    pub fn supports_host_groups(self) -> bool {
        matches!(
            self,
            ObjectKind::Cluster | ObjectKind::Service | ObjectKind::Component | ObjectKind::Provider
        )
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ObjectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "adcm" => Ok(ObjectKind::Adcm),
            "cluster" => Ok(ObjectKind::Cluster),
            "service" => Ok(ObjectKind::Service),
            "component" => Ok(ObjectKind::Component),
            "provider" => Ok(ObjectKind::Provider),
            "host" => Ok(ObjectKind::Host),
            _ => Err(format!("Invalid object kind: {}", s)),
        }
    }
}

/// Owner descriptor `{type, id}` of a main object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub id: i64,
}

impl ObjectRef {
    pub fn new(kind: ObjectKind, id: i64) -> Self {
        Self { kind, id }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.kind, self.id)
    }
}

/// Owner of an object config: a main object or a host group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigOwner {
    Object(ObjectRef),
    HostGroup(i64),
}

/// Owner type column value used for host groups
pub const HOST_GROUP_OWNER: &str = "group";

impl ConfigOwner {
    /// `(owner_type, owner_id)` pair as stored by relational backends
    pub fn to_columns(self) -> (String, i64) {
        match self {
            ConfigOwner::Object(obj) => (obj.kind.as_str().to_string(), obj.id),
            ConfigOwner::HostGroup(id) => (HOST_GROUP_OWNER.to_string(), id),
        }
    }

    pub fn from_columns(owner_type: &str, owner_id: i64) -> Result<Self, String> {
        if owner_type == HOST_GROUP_OWNER {
            return Ok(ConfigOwner::HostGroup(owner_id));
        }
        let kind = owner_type.parse::<ObjectKind>()?;
        Ok(ConfigOwner::Object(ObjectRef::new(kind, owner_id)))
    }
}

impl std::fmt::Display for ConfigOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigOwner::Object(obj) => write!(f, "{}", obj),
            ConfigOwner::HostGroup(id) => write!(f, "group.{}", id),
        }
    }
}

/// Catalog item of a bundle
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prototype {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    pub name: String,
    pub version: String,
    pub bundle_hash: String,
    /// Directory of the prototype inside its bundle
    #[serde(default)]
    pub path: String,
}

/// One declared config key of a prototype
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PrototypeConfigRow {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub prototype_id: i64,
    #[serde(default)]
    pub action_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub subname: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub default: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub limits: Value,
    #[serde(default)]
    pub ui_options: Value,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub group_customization: Option<bool>,
}

/// Handle carrying the current/previous revision pointers of one owner
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectConfigData {
    pub id: i64,
    pub owner: ConfigOwner,
    pub current: i64,
    pub previous: i64,
}

/// One immutable revision of a config+attr pair
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigLogData {
    pub id: i64,
    pub object_config_id: i64,
    pub config: Value,
    pub attr: Value,
    pub description: String,
    /// Milliseconds since the Unix epoch
    pub created_at: i64,
}

/// Pointer move of one object config inside a write batch
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigWrite {
    /// Append a revision: `previous <- current`, `current <- new`
    Append {
        object_config_id: i64,
        config: Value,
        attr: Value,
        description: String,
    },
    /// Point `current` at an existing revision of the same object config,
    /// optionally rewriting its description
    Restore {
        object_config_id: i64,
        config_log_id: i64,
        description: Option<String>,
    },
}

impl ConfigWrite {
    pub fn append(
        object_config_id: i64,
        config: Value,
        attr: Value,
        description: impl Into<String>,
    ) -> Self {
        ConfigWrite::Append {
            object_config_id,
            config,
            attr,
            description: description.into(),
        }
    }

    pub fn restore(object_config_id: i64, config_log_id: i64, description: Option<&str>) -> Self {
        ConfigWrite::Restore {
            object_config_id,
            config_log_id,
            description: description.map(str::to_string),
        }
    }

    pub fn object_config_id(&self) -> i64 {
        match self {
            ConfigWrite::Append {
                object_config_id, ..
            }
            | ConfigWrite::Restore {
                object_config_id, ..
            } => *object_config_id,
        }
    }
}

/// Overlay of a parent object for a subset of its hosts
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostGroupData {
    pub id: i64,
    pub parent: ObjectRef,
    pub name: String,
    pub description: String,
    pub object_config_id: Option<i64>,
    pub hosts: Vec<i64>,
}

/// Storage mode of the persistence layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageMode {
    /// In-process memory store
    Memory,
    /// External database (MySQL/PostgreSQL via SeaORM)
    ExternalDb,
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageMode::Memory => write!(f, "memory"),
            StorageMode::ExternalDb => write!(f, "external_db"),
        }
    }
}

impl std::str::FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(StorageMode::Memory),
            "external_db" => Ok(StorageMode::ExternalDb),
            _ => Err(format!("Invalid storage mode: {}", s)),
        }
    }
}

/// Current wall-clock time in milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
