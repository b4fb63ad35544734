//! Config switch on bundle upgrade
//!
//! Carries a stored config from the schema of the old prototype to the
//! schema of the new one, key by key under the new schema:
//! - a value equal to the old default follows the default to its new value
//! - any other value of a key present in both schemas with the same kind is
//!   carried as is
//! - new keys and keys whose kind changed take the new default
//!
//! A key whose kind changed loses its stored value even when that value
//! differed from the old default. A stored value has to be well-typed for
//! the kind of its leaf, so it is not carried across a kind change.

use serde_json::{Map, Value, json};
use tracing::debug;

use adcm_common::{AdcmError, AdcmResult, SecretVault};
use adcm_persistence::Prototype;

use crate::model::PrototypeSchema;
use crate::service::defaults::Defaults;
use crate::service::secrets;

/// Old and new prototype of an upgrade together with their schemas
#[derive(Debug, Clone, Copy)]
pub struct UpgradePlan<'a> {
    pub old_prototype: &'a Prototype,
    pub old_schema: &'a PrototypeSchema,
    pub new_prototype: &'a Prototype,
    pub new_schema: &'a PrototypeSchema,
}

fn upgrade_error(err: AdcmError) -> AdcmError {
    match err {
        AdcmError::Storage(e) => AdcmError::Storage(e),
        other => AdcmError::UpgradeError(other.to_string()),
    }
}

impl UpgradePlan<'_> {
    /// Produce the `(config, attr)` pair under the new schema
    pub async fn switch(
        &self,
        defaults: &Defaults,
        vault: &SecretVault,
        old_config: &Value,
        old_attr: &Value,
    ) -> AdcmResult<(Value, Value)> {
        let old_flat = self.old_schema.flatten(old_config);
        let mut flat = Map::new();

        for field in self.new_schema.leaves() {
            let key = field.key();
            let new_default = defaults
                .value(self.new_prototype, field)
                .await
                .map_err(upgrade_error)?;

            let carried = match (self.old_schema.get(&field.name, &field.subname), old_flat.get(&key)) {
                (Some(old_field), Some(old_value)) if old_field.kind == field.kind => {
                    let plain = secrets::reveal(field.kind, old_value, vault)?;
                    let old_default = defaults.value(self.old_prototype, old_field).await.ok();
                    if old_default.as_ref() == Some(&plain) {
                        None
                    } else {
                        Some(old_value.clone())
                    }
                }
                _ => None,
            };

            if carried.is_none() {
                debug!(key = %field.display(), "Upgrade takes the new default");
            }
            flat.insert(key, carried.unwrap_or(new_default));
        }

        let mut config = self.new_schema.unflatten(&flat);
        secrets::encrypt(self.new_schema, &mut config, vault)?;

        let attr: Map<String, Value> = self
            .new_schema
            .activatable_groups()
            .map(|group| {
                let active = old_attr
                    .get(&group.name)
                    .and_then(|entry| entry.get("active"))
                    .and_then(Value::as_bool)
                    .unwrap_or(group.limits.active);
                (group.name.clone(), json!({"active": active}))
            })
            .collect();

        Ok((config, Value::Object(attr)))
    }
}
