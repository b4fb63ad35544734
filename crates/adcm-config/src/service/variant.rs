//! Variant source resolution
//!
//! The allowed set of a variant key is computed at runtime: a literal list,
//! a list stored under another key of the current config, or a builtin
//! generator of the topology collaborator.

use serde_json::Value;

use adcm_common::{AdcmError, AdcmResult};
use adcm_persistence::ObjectRef;

use crate::model::{FieldSpec, VariantSourceKind, value_at};
use crate::service::topology::Topology;

/// Allowed values of a variant key for `object` with stored config `current`
pub async fn resolve(
    field: &FieldSpec,
    object: ObjectRef,
    current: Option<&Value>,
    topology: &dyn Topology,
) -> AdcmResult<Vec<Value>> {
    let Some(source) = &field.limits.source else {
        return Ok(Vec::new());
    };

    match source.kind {
        VariantSourceKind::Inline => Ok(as_list(source.value.as_ref())),
        VariantSourceKind::Config => {
            let name = source.name.as_deref().unwrap_or_default();
            let (key, subkey) = name.split_once('/').unwrap_or((name, ""));
            Ok(as_list(current.and_then(|config| value_at(config, key, subkey))))
        }
        VariantSourceKind::Builtin => {
            let name = source.name.as_deref().ok_or_else(|| {
                AdcmError::value(format!("variant \"{}\" has no builtin name", field.display()))
            })?;
            topology
                .builtin_variants(object, name, source.args.as_ref())
                .await
        }
    }
}

fn as_list(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

/// Membership check of a strict variant value
pub fn check(field: &FieldSpec, value: &Value, allowed: &[Value]) -> AdcmResult<()> {
    let strict = field.limits.source.as_ref().is_some_and(|s| s.strict);
    if !strict || value.is_null() || allowed.contains(value) {
        return Ok(());
    }
    Err(AdcmError::value(format!(
        "\"{}\": not in variant list",
        field.display()
    )))
}

/// Raw limits with `source.value` replaced by the resolved set
pub fn resolved_limits(field: &FieldSpec, allowed: Vec<Value>) -> Value {
    let mut limits = field.limits.raw.clone();
    if let Some(source) = limits.get_mut("source").and_then(Value::as_object_mut) {
        source.insert("value".to_string(), Value::Array(allowed));
    }
    limits
}
