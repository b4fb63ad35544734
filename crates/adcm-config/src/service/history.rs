//! Config revision history
//!
//! Append-only log of revisions per object config with `current`/`previous`
//! pointers.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use adcm_common::{AdcmError, AdcmResult};
use adcm_persistence::{ConfigLogData, ConfigWrite, ObjectConfigData, PersistenceService};

/// Revision selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revision {
    Current,
    Previous,
    Id(i64),
}

impl FromStr for Revision {
    type Err = AdcmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "current" => Ok(Revision::Current),
            "previous" => Ok(Revision::Previous),
            _ => s
                .parse::<i64>()
                .map(Revision::Id)
                .map_err(|_| AdcmError::not_found(format!("invalid revision \"{}\"", s))),
        }
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Revision::Current => f.write_str("current"),
            Revision::Previous => f.write_str("previous"),
            Revision::Id(id) => write!(f, "{}", id),
        }
    }
}

/// Entry of a revision listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionSummary {
    pub id: i64,
    pub description: String,
    pub created_at: i64,
}

impl From<&ConfigLogData> for RevisionSummary {
    fn from(log: &ConfigLogData) -> Self {
        Self {
            id: log.id,
            description: log.description.clone(),
            created_at: log.created_at,
        }
    }
}

#[derive(Clone)]
pub struct Versioner {
    persistence: Arc<dyn PersistenceService>,
}

impl Versioner {
    pub fn new(persistence: Arc<dyn PersistenceService>) -> Self {
        Self { persistence }
    }

    /// Append a revision: `previous <- current`, `current <- new`
    pub async fn save(
        &self,
        object_config_id: i64,
        config: Value,
        attr: Value,
        description: &str,
    ) -> AdcmResult<(ObjectConfigData, ConfigLogData)> {
        let (object_config, log) = self
            .persistence
            .config_log_append(object_config_id, config, attr, description)
            .await?
            .ok_or_else(|| {
                AdcmError::not_found(format!("object config {} not found", object_config_id))
            })?;
        info!(
            object_config = object_config.id,
            owner = %object_config.owner,
            revision = log.id,
            "Config revision saved"
        );
        Ok((object_config, log))
    }

    fn resolve(object_config: &ObjectConfigData, revision: Revision) -> i64 {
        match revision {
            Revision::Current => object_config.current,
            Revision::Previous => object_config.previous,
            Revision::Id(id) => id,
        }
    }

    pub async fn get(
        &self,
        object_config: &ObjectConfigData,
        revision: Revision,
    ) -> AdcmResult<ConfigLogData> {
        let id = Self::resolve(object_config, revision);
        self.persistence
            .config_log_find(id)
            .await?
            .filter(|log| log.object_config_id == object_config.id)
            .ok_or_else(|| {
                AdcmError::not_found(format!(
                    "revision {} of object config {} not found",
                    revision, object_config.id
                ))
            })
    }

    /// Apply a batch of pointer moves atomically, one saved revision per write
    pub async fn commit(&self, writes: Vec<ConfigWrite>) -> AdcmResult<Vec<ConfigLogData>> {
        let saved = self.persistence.config_write_all(writes).await?;
        for (object_config, log) in &saved {
            info!(
                object_config = object_config.id,
                owner = %object_config.owner,
                revision = log.id,
                "Config revision saved"
            );
        }
        Ok(saved.into_iter().map(|(_, log)| log).collect())
    }

    pub async fn list(&self, object_config_id: i64) -> AdcmResult<Vec<RevisionSummary>> {
        Ok(self
            .persistence
            .config_log_list(object_config_id)
            .await?
            .iter()
            .map(RevisionSummary::from)
            .collect())
    }
}
