//! Prototype config persistence trait

use async_trait::async_trait;

use crate::model::PrototypeConfigRow;

/// Storage of prototype config declarations
#[async_trait]
pub trait PrototypePersistence: Send + Sync {
    /// Config rows of a prototype, excluding action-scoped rows,
    /// ordered by ascending id (declaration order)
    async fn prototype_config_rows(
        &self,
        prototype_id: i64,
    ) -> anyhow::Result<Vec<PrototypeConfigRow>>;

    /// Store the config rows of a prototype, assigning ids in the given order
    async fn prototype_config_save(
        &self,
        prototype_id: i64,
        rows: Vec<PrototypeConfigRow>,
    ) -> anyhow::Result<Vec<PrototypeConfigRow>>;
}
