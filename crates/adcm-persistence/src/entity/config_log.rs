//! Config revisions
//!
//! Append-only: rows are never updated except for the description on restore.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "config_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub object_config_id: i64,
    /// Nested config JSON
    #[sea_orm(column_type = "Text")]
    pub config: String,
    /// Attribute JSON
    #[sea_orm(column_type = "Text")]
    pub attr: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    /// Milliseconds since the Unix epoch
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
