//! SeaORM entity definitions for the relational backend

pub mod config_log;
pub mod host_group;
pub mod host_group_host;
pub mod object_config;
pub mod prototype_config;

pub mod prelude {
    pub use super::config_log::Entity as ConfigLog;
    pub use super::host_group::Entity as HostGroup;
    pub use super::host_group_host::Entity as HostGroupHost;
    pub use super::object_config::Entity as ObjectConfig;
    pub use super::prototype_config::Entity as PrototypeConfig;
}
