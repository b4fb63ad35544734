//! Object config handles
//!
//! Holds the current and previous revision pointers of one owner.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "object_config")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owner type: adcm, cluster, service, component, provider, host or group
    pub owner_type: String,
    pub owner_id: i64,
    pub current: i64,
    pub previous: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
