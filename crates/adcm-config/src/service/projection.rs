//! Read projections of a stored config
//!
//! Neither projection mutates state.

use serde::Serialize;
use serde_json::{Map, Value, json};

use adcm_common::{ANSIBLE_VAULT_KEY, AdcmResult, CUSTOM_GROUP_KEYS, GROUP_KEYS};
use adcm_persistence::ObjectRef;

use crate::model::{ConfigKind, FieldSpec, PrototypeSchema, value_at};
use crate::service::files::{FileScope, SecretFiles};
use crate::service::host_group::{is_activation_overridden, is_overridden};
use crate::service::topology::Topology;
use crate::service::variant;

/// One record of the UI view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigFieldView {
    pub name: String,
    pub subname: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub display_name: String,
    pub description: String,
    pub required: bool,
    pub limits: Value,
    pub ui_options: Value,
    pub read_only: bool,
    pub activatable: bool,
    pub default: Value,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_group: Option<bool>,
}

fn override_flag(tree: Option<&Value>, field: &FieldSpec) -> Option<bool> {
    let tree = tree?;
    Some(if field.is_group() {
        is_activation_overridden(tree, &field.name)
    } else {
        is_overridden(tree, &field.name, &field.subname)
    })
}

/// UI view: every declared key with its state-resolved read-only flag and
/// stored value. Variant sources are recomputed against `config`; host
/// group attrs add the `group`/`custom_group` flags.
pub async fn ui_view(
    schema: &PrototypeSchema,
    object: ObjectRef,
    state: Option<&str>,
    config: &Value,
    attr: &Value,
    topology: &dyn Topology,
) -> AdcmResult<Vec<ConfigFieldView>> {
    let group_keys = attr.get(GROUP_KEYS);
    let custom_group_keys = attr.get(CUSTOM_GROUP_KEYS);

    let mut view = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let limits = if field.kind == ConfigKind::Variant {
            let allowed = variant::resolve(field, object, Some(config), topology).await?;
            variant::resolved_limits(field, allowed)
        } else {
            field.limits.raw.clone()
        };
        let value = if field.is_group() {
            Value::Null
        } else {
            value_at(config, &field.name, &field.subname)
                .cloned()
                .unwrap_or(Value::Null)
        };

        view.push(ConfigFieldView {
            name: field.name.clone(),
            subname: field.subname.clone(),
            kind: field.kind.as_str(),
            display_name: field.display_name.clone(),
            description: field.description.clone(),
            required: field.required,
            limits,
            ui_options: field.ui_options.clone(),
            read_only: schema.is_read_only(field, state),
            activatable: field.is_activatable(),
            default: field.default.clone(),
            value,
            group: override_flag(group_keys, field),
            custom_group: override_flag(custom_group_keys, field),
        });
    }
    Ok(view)
}

fn wrap_secret(value: &Value) -> Value {
    match value {
        Value::String(s) if !s.is_empty() => json!({ ANSIBLE_VAULT_KEY: s }),
        other => other.clone(),
    }
}

/// Executor view: `{"config": ..., "attr": ...}` with file kinds replaced by
/// their on-disk path, secrets wrapped for the executor vault and inactive
/// groups nulled
pub fn executor_view(
    schema: &PrototypeSchema,
    files: &SecretFiles,
    scope: FileScope,
    config: &Value,
    attr: &Value,
) -> Value {
    let mut flat = Map::new();
    for field in schema.leaves() {
        let Some(value) = value_at(config, &field.name, &field.subname) else {
            continue;
        };
        let projected = match (field.kind, value) {
            (kind, Value::String(body)) if kind.is_file() && !body.is_empty() => {
                let path = files.path_for(scope, &field.name, &field.subname);
                Value::String(path.to_string_lossy().into_owned())
            }
            (kind, _) if kind.is_file() => Value::Null,
            (ConfigKind::SecretMap, Value::Object(entries)) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), wrap_secret(v)))
                    .collect(),
            ),
            (kind, value) if kind.is_encrypted_string() => wrap_secret(value),
            (_, value) => value.clone(),
        };
        flat.insert(field.key(), projected);
    }

    let mut projected = schema.unflatten(&flat);
    let mut activation = Map::new();
    for group in schema.activatable_groups() {
        let active = attr
            .get(&group.name)
            .and_then(|entry| entry.get("active"))
            .and_then(Value::as_bool)
            .unwrap_or(group.limits.active);
        if !active {
            if let Some(entries) = projected.as_object_mut() {
                entries.insert(group.name.clone(), Value::Null);
            }
        }
        activation.insert(group.name.clone(), json!({"active": active}));
    }

    json!({"config": projected, "attr": activation})
}
