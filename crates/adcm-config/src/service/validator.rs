//! Validation of incoming configuration payloads
//!
//! [`Validator::validate`] checks a candidate `(config, attr)` pair against
//! a prototype schema and returns the normalized pair that gets stored:
//! every leaf present, read-only leaves carried from the stored revision,
//! secrets encrypted and `attr` holding the activation of every activatable
//! group.

use std::collections::HashMap;

use serde_json::{Map, Number, Value, json};

use adcm_common::{AdcmError, AdcmResult, CUSTOM_GROUP_KEYS, GROUP_KEYS, SecretVault};
use adcm_persistence::ObjectRef;

use crate::model::limits::number_lt;
use crate::model::{ConfigKind, FieldSpec, PrototypeSchema, value_at};
use crate::service::secrets;
use crate::service::structure::StructureChecker;
use crate::service::topology::Topology;
use crate::service::variant;

/// Object a payload is validated for
#[derive(Debug, Clone, Copy)]
pub struct ValidationTarget<'a> {
    pub object: ObjectRef,
    /// Lifecycle state of the object, drives read-only rules
    pub state: Option<&'a str>,
    pub current_config: Option<&'a Value>,
    pub current_attr: Option<&'a Value>,
    /// The payload belongs to a host group; `attr` may carry override trees
    pub overlay: bool,
}

pub struct Validator<'a> {
    pub vault: &'a SecretVault,
    pub topology: &'a dyn Topology,
    pub structure: &'a dyn StructureChecker,
}

impl Validator<'_> {
    pub async fn validate(
        &self,
        schema: &PrototypeSchema,
        target: &ValidationTarget<'_>,
        new_config: &Value,
        new_attr: &Value,
    ) -> AdcmResult<(Value, Value)> {
        check_keys(schema, new_config)?;
        let attr = check_attr(schema, target, new_attr)?;

        let mut variants = HashMap::new();
        for field in schema.leaves().filter(|f| f.kind == ConfigKind::Variant) {
            let allowed =
                variant::resolve(field, target.object, target.current_config, self.topology)
                    .await?;
            variants.insert(field.key(), allowed);
        }

        let mut flat = Map::new();
        for field in schema.leaves() {
            let active = schema.is_active(field, &attr);
            let read_only = schema.is_read_only(field, target.state);
            let stored = target
                .current_config
                .and_then(|config| value_at(config, &field.name, &field.subname));
            let incoming = value_at(new_config, &field.name, &field.subname);

            let value = match incoming {
                Some(value) => value.clone(),
                None if read_only || !active => stored.cloned().unwrap_or(Value::Null),
                None if field.required => {
                    return Err(AdcmError::key(format!(
                        "key \"{}\" is required",
                        field.display()
                    )));
                }
                None => Value::Null,
            };

            let allowed = variants.get(&field.key()).map(Vec::as_slice).unwrap_or(&[]);
            self.check_value(field, &value, active && !read_only, allowed)?;

            if read_only {
                if let (Some(incoming), Some(stored)) = (incoming, stored) {
                    let changed = secrets::reveal(field.kind, incoming, self.vault)?
                        != secrets::reveal(field.kind, stored, self.vault)?;
                    if changed {
                        return Err(AdcmError::value(format!(
                            "key \"{}\" is read-only",
                            field.display()
                        )));
                    }
                }
            }

            flat.insert(field.key(), value);
        }

        let mut config = schema.unflatten(&flat);
        secrets::encrypt(schema, &mut config, self.vault)?;
        Ok((config, attr))
    }

    fn check_value(
        &self,
        field: &FieldSpec,
        value: &Value,
        enforce_required: bool,
        allowed: &[Value],
    ) -> AdcmResult<()> {
        let key = field.display();
        if value.is_null() {
            if field.required && enforce_required {
                return Err(AdcmError::value(format!("value of \"{}\" is required", key)));
            }
            return Ok(());
        }

        field
            .kind
            .check_shape(value)
            .map_err(|e| AdcmError::value(format!("\"{}\" {}", key, e)))?;

        let limits = &field.limits;
        match field.kind {
            kind if kind.is_string_like() => {
                let raw = value.as_str().unwrap_or_default();
                let plain = self.plaintext(field, raw)?;

                if kind == ConfigKind::String && plain.contains('\n') {
                    return Err(AdcmError::value(format!(
                        "\"{}\" should not contain newlines",
                        key
                    )));
                }
                if field.required && enforce_required && plain.is_empty() {
                    return Err(AdcmError::value(format!("\"{}\" should not be empty", key)));
                }
                if kind.has_length_limits() {
                    let len = Number::from(plain.chars().count());
                    if let Some(min) = &limits.min {
                        if number_lt(&len, min) {
                            return Err(AdcmError::value(format!(
                                "\"{}\" should be at least {} characters",
                                key, min
                            )));
                        }
                    }
                    if let Some(max) = &limits.max {
                        if number_lt(max, &len) {
                            return Err(AdcmError::value(format!(
                                "\"{}\" should be at most {} characters",
                                key, max
                            )));
                        }
                    }
                }
                if kind == ConfigKind::Variant {
                    variant::check(field, value, allowed)?;
                }
            }
            ConfigKind::Integer | ConfigKind::Float => {
                if let Value::Number(n) = value {
                    if let Some(min) = limits.min.as_ref().filter(|min| number_lt(n, min)) {
                        return Err(AdcmError::value(format!(
                            "\"{}\" should be more than or equal to {}",
                            key, min
                        )));
                    }
                    if let Some(max) = limits.max.as_ref().filter(|max| number_lt(max, n)) {
                        return Err(AdcmError::value(format!(
                            "\"{}\" should be less than or equal to {}",
                            key, max
                        )));
                    }
                }
            }
            ConfigKind::Option => {
                if !limits.option_values().any(|option| option == value) {
                    return Err(AdcmError::value(format!("\"{}\": not in option list", key)));
                }
            }
            ConfigKind::List => {
                if field.required && enforce_required && value.as_array().is_some_and(Vec::is_empty) {
                    return Err(AdcmError::value(format!("\"{}\" should not be empty", key)));
                }
            }
            ConfigKind::Map | ConfigKind::SecretMap => {
                let entries = value.as_object();
                if field.required && enforce_required && entries.is_some_and(Map::is_empty) {
                    return Err(AdcmError::value(format!("\"{}\" should not be empty", key)));
                }
                for entry in entries.into_iter().flat_map(|e| e.values()) {
                    self.plaintext(field, entry.as_str().unwrap_or_default())?;
                }
            }
            ConfigKind::Structure => {
                let yspec = limits.yspec.as_ref().unwrap_or(&Value::Null);
                self.structure
                    .check(yspec, value)
                    .map_err(|e| AdcmError::value(format!("\"{}\" {}", key, e)))?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Plaintext of a string value. Vault payloads are only accepted for
    /// secret kinds and must decrypt.
    fn plaintext(&self, field: &FieldSpec, raw: &str) -> AdcmResult<String> {
        if !SecretVault::is_encrypted(raw) {
            return Ok(raw.to_string());
        }
        if !field.kind.is_secret() {
            return Err(AdcmError::value(format!(
                "\"{}\" is not a secret and cannot hold an encrypted value",
                field.display()
            )));
        }
        self.vault.decrypt(raw).map_err(|e| {
            AdcmError::value(format!("\"{}\": secret decryption failure: {}", field.display(), e))
        })
    }
}

/// Unknown keys and group shapes of `new_config`
pub(crate) fn check_keys(schema: &PrototypeSchema, new_config: &Value) -> AdcmResult<()> {
    let entries = new_config
        .as_object()
        .ok_or_else(|| AdcmError::key("config should be a map"))?;

    for (name, value) in entries {
        let top = schema
            .get(name, "")
            .ok_or_else(|| AdcmError::key(format!("unknown key \"{}\"", name)))?;
        if !top.is_group() {
            continue;
        }
        match value {
            Value::Object(subkeys) => {
                if let Some(subname) = subkeys.keys().find(|s| schema.get(name, s).is_none()) {
                    return Err(AdcmError::key(format!(
                        "unknown key \"{}/{}\"",
                        name, subname
                    )));
                }
            }
            Value::Null => {}
            _ => {
                return Err(AdcmError::key(format!("group \"{}\" should be a map", name)));
            }
        }
    }
    Ok(())
}

/// Shape of `new_attr` and the activation of every activatable group
fn check_attr(
    schema: &PrototypeSchema,
    target: &ValidationTarget<'_>,
    new_attr: &Value,
) -> AdcmResult<Value> {
    let empty = Map::new();
    let entries = match new_attr {
        Value::Null => &empty,
        Value::Object(entries) => entries,
        _ => return Err(AdcmError::attr("attr should be a map")),
    };

    let mut requested = HashMap::new();
    for (name, entry) in entries {
        if name == GROUP_KEYS || name == CUSTOM_GROUP_KEYS {
            if target.overlay {
                continue;
            }
            return Err(AdcmError::attr(format!(
                "\"{}\" is only allowed for host groups",
                name
            )));
        }
        if schema.header(name).is_none_or(|header| !header.limits.activatable) {
            return Err(AdcmError::attr(format!(
                "group \"{}\" is not activatable",
                name
            )));
        }
        let fields = entry
            .as_object()
            .ok_or_else(|| AdcmError::attr(format!("attr of \"{}\" should be a map", name)))?;
        if let Some(extra) = fields.keys().find(|k| k.as_str() != "active") {
            return Err(AdcmError::attr(format!(
                "unknown attr field \"{}\" of \"{}\"",
                extra, name
            )));
        }
        let active = fields
            .get("active")
            .and_then(Value::as_bool)
            .ok_or_else(|| {
                AdcmError::attr(format!("\"active\" of \"{}\" should be a boolean", name))
            })?;
        requested.insert(name.as_str(), active);
    }

    let mut attr = Map::new();
    for group in schema.activatable_groups() {
        let previous = target
            .current_attr
            .and_then(|current| current.get(&group.name))
            .and_then(|entry| entry.get("active"))
            .and_then(Value::as_bool)
            .unwrap_or(group.limits.active);
        let active = requested
            .get(group.name.as_str())
            .copied()
            .unwrap_or(previous);

        if active != previous && group.limits.is_read_only(target.state) {
            return Err(AdcmError::attr(format!(
                "group \"{}\" is read-only and cannot be toggled",
                group.name
            )));
        }
        attr.insert(group.name.clone(), json!({"active": active}));
    }
    Ok(Value::Object(attr))
}
