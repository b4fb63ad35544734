//! Prototype config declaration rows
//!
//! One row per (prototype, name, subname). Ascending `id` is the bundle
//! declaration order.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "prototype_config")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub prototype_id: i64,
    pub action_id: Option<i64>,
    pub name: String,
    pub subname: String,
    /// Config kind: string, integer, group, ...
    pub r#type: String,
    #[sea_orm(column_type = "Text")]
    pub default_value: String,
    pub required: bool,
    /// JSON document
    #[sea_orm(column_type = "Text")]
    pub limits: String,
    /// JSON document
    #[sea_orm(column_type = "Text")]
    pub ui_options: String,
    pub display_name: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub group_customization: Option<bool>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
