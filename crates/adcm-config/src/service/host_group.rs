//! Host group overlay
//!
//! A host group carries an alternative configuration for a subset of the
//! hosts of its parent. `attr.group_keys` marks which keys the group
//! overrides and mirrors the schema shape:
//! - a top-level leaf maps to a boolean
//! - a group maps to `{"value": bool, "fields": {subname: bool}}`, where
//!   `value` overrides the activation of an activatable group
//!
//! `attr.custom_group_keys` has the same shape and records which keys the
//! bundle allows to be overridden at all.

use serde_json::{Map, Value, json};

use adcm_common::{AdcmError, AdcmResult, CUSTOM_GROUP_KEYS, GROUP_KEYS};
use adcm_persistence::{HostGroupData, ObjectRef};

use crate::model::{FieldSpec, PrototypeSchema, value_at};

/// Whether the bundle allows `field` to be overridden by host groups.
/// Subkeys inherit the flag of their group header when unset.
pub fn is_customizable(schema: &PrototypeSchema, field: &FieldSpec) -> bool {
    match field.group_customization {
        Some(flag) => flag,
        None if field.subname.is_empty() => false,
        None => schema
            .header(&field.name)
            .and_then(|header| header.group_customization)
            .unwrap_or(false),
    }
}

fn build_tree(
    schema: &PrototypeSchema,
    leaf: impl Fn(&FieldSpec) -> bool,
    group_value: impl Fn(&FieldSpec) -> bool,
) -> Value {
    let mut tree = Map::new();
    for field in schema.top_level() {
        let node = if field.is_group() {
            let fields: Map<String, Value> = schema
                .children(&field.name)
                .map(|child| (child.subname.clone(), Value::Bool(leaf(child))))
                .collect();
            json!({"value": group_value(field), "fields": fields})
        } else {
            Value::Bool(leaf(field))
        };
        tree.insert(field.name.clone(), node);
    }
    Value::Object(tree)
}

/// `custom_group_keys` tree of `schema`
pub fn custom_group_keys(schema: &PrototypeSchema) -> Value {
    build_tree(
        schema,
        |field| is_customizable(schema, field),
        |header| is_customizable(schema, header),
    )
}

/// `group_keys` tree with nothing overridden
pub fn default_group_keys(schema: &PrototypeSchema) -> Value {
    build_tree(schema, |_| false, |_| false)
}

/// Whether `group_keys` marks `name`/`subname` as overridden
pub fn is_overridden(group_keys: &Value, name: &str, subname: &str) -> bool {
    let node = group_keys.get(name);
    let flag = if subname.is_empty() {
        node
    } else {
        node.and_then(|n| n.get("fields")).and_then(|f| f.get(subname))
    };
    flag.and_then(Value::as_bool).unwrap_or(false)
}

/// Whether `group_keys` overrides the activation of group `name`
pub fn is_activation_overridden(group_keys: &Value, name: &str) -> bool {
    group_keys
        .get(name)
        .and_then(|node| node.get("value"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Recompute `group_keys` against `schema`, keeping the overrides that are
/// still allowed
pub fn rebuild_group_keys(schema: &PrototypeSchema, old: &Value) -> Value {
    build_tree(
        schema,
        |field| is_customizable(schema, field) && is_overridden(old, &field.name, &field.subname),
        |header| {
            header.is_activatable()
                && is_customizable(schema, header)
                && is_activation_overridden(old, &header.name)
        },
    )
}

fn flag_of(node: Option<&Value>, key: &str) -> AdcmResult<bool> {
    node.and_then(Value::as_bool)
        .ok_or_else(|| AdcmError::attr(format!("group_keys of \"{}\" should be a boolean", key)))
}

fn check_exact_keys(map: &Map<String, Value>, expected: &[&str], scope: &str) -> AdcmResult<()> {
    for key in expected {
        if !map.contains_key(*key) {
            return Err(AdcmError::attr(format!("{} has no \"{}\"", scope, key)));
        }
    }
    if let Some(extra) = map.keys().find(|k| !expected.contains(&k.as_str())) {
        return Err(AdcmError::attr(format!("{} has unknown key \"{}\"", scope, extra)));
    }
    Ok(())
}

/// Check that `group_keys` mirrors the schema and overrides only
/// customizable keys
pub fn check_group_keys(schema: &PrototypeSchema, group_keys: &Value) -> AdcmResult<()> {
    let tree = group_keys
        .as_object()
        .ok_or_else(|| AdcmError::attr("group_keys should be a map"))?;
    let names: Vec<&str> = schema.top_level().map(|f| f.name.as_str()).collect();
    check_exact_keys(tree, &names, "group_keys")?;

    let not_customizable =
        |key: String| AdcmError::attr(format!("key \"{}\" cannot be overridden by a host group", key));

    for field in schema.top_level() {
        let node = tree.get(&field.name);
        if !field.is_group() {
            if flag_of(node, &field.name)? && !is_customizable(schema, field) {
                return Err(not_customizable(field.display()));
            }
            continue;
        }

        let node = node
            .and_then(Value::as_object)
            .ok_or_else(|| AdcmError::attr(format!("group_keys of \"{}\" should be a map", field.name)))?;
        check_exact_keys(node, &["value", "fields"], &field.name)?;

        if flag_of(node.get("value"), &field.name)?
            && !(field.is_activatable() && is_customizable(schema, field))
        {
            return Err(not_customizable(field.display()));
        }

        let fields = node
            .get("fields")
            .and_then(Value::as_object)
            .ok_or_else(|| AdcmError::attr(format!("fields of \"{}\" should be a map", field.name)))?;
        let children: Vec<&FieldSpec> = schema.children(&field.name).collect();
        let subnames: Vec<&str> = children.iter().map(|c| c.subname.as_str()).collect();
        check_exact_keys(fields, &subnames, &format!("fields of \"{}\"", field.name))?;
        for child in children {
            if flag_of(fields.get(&child.subname), &child.display())?
                && !is_customizable(schema, child)
            {
                return Err(not_customizable(child.display()));
            }
        }
    }
    Ok(())
}

/// Merge a host group with its parent: overridden leaves and activations
/// come from the group, the rest from the parent. The returned attr carries
/// `group_keys` and `custom_group_keys`.
pub fn merge(
    schema: &PrototypeSchema,
    parent_config: &Value,
    parent_attr: &Value,
    group_config: &Value,
    group_attr: &Value,
    group_keys: &Value,
) -> (Value, Value) {
    let mut flat = Map::new();
    for field in schema.leaves() {
        let source = if is_overridden(group_keys, &field.name, &field.subname) {
            group_config
        } else {
            parent_config
        };
        let value = value_at(source, &field.name, &field.subname)
            .cloned()
            .unwrap_or(Value::Null);
        flat.insert(field.key(), value);
    }

    let mut attr = Map::new();
    for group in schema.activatable_groups() {
        let source = if is_activation_overridden(group_keys, &group.name) {
            group_attr
        } else {
            parent_attr
        };
        let entry = source
            .get(&group.name)
            .cloned()
            .unwrap_or_else(|| json!({"active": group.limits.active}));
        attr.insert(group.name.clone(), entry);
    }
    attr.insert(GROUP_KEYS.to_string(), group_keys.clone());
    attr.insert(CUSTOM_GROUP_KEYS.to_string(), custom_group_keys(schema));

    (schema.unflatten(&flat), Value::Object(attr))
}

/// Check that `hosts` may join group `group_id` of `parent`: every host is
/// listed once, attached to the parent and not a member of another group
/// of it
pub fn check_hosts(
    parent: ObjectRef,
    attached: &[i64],
    groups: &[HostGroupData],
    group_id: Option<i64>,
    hosts: &[i64],
) -> AdcmResult<()> {
    for (i, host) in hosts.iter().enumerate() {
        if hosts[..i].contains(host) {
            return Err(AdcmError::HostGroupError(format!(
                "host {} is listed twice",
                host
            )));
        }
        if !attached.contains(host) {
            return Err(AdcmError::HostGroupError(format!(
                "host {} is not attached to {}",
                host, parent
            )));
        }
        if let Some(other) = groups
            .iter()
            .find(|g| Some(g.id) != group_id && g.hosts.contains(host))
        {
            return Err(AdcmError::HostGroupError(format!(
                "host {} is already a member of host group \"{}\"",
                host, other.name
            )));
        }
    }
    Ok(())
}

/// Check that the attr of a group payload names only activatable groups
/// besides the override trees
pub fn check_attr_names(schema: &PrototypeSchema, new_attr: &Value) -> AdcmResult<()> {
    for name in new_attr.as_object().into_iter().flat_map(|attr| attr.keys()) {
        if name == GROUP_KEYS || name == CUSTOM_GROUP_KEYS {
            continue;
        }
        if schema.header(name).is_none_or(|header| !header.limits.activatable) {
            return Err(AdcmError::attr(format!("group \"{}\" is not activatable", name)));
        }
    }
    Ok(())
}

/// Overlay the leaves and activations present in a payload on a stored pair
pub fn overlay(
    schema: &PrototypeSchema,
    stored_config: &Value,
    stored_attr: &Value,
    new_config: &Value,
    new_attr: &Value,
) -> (Value, Value) {
    let mut flat = schema.flatten(stored_config);
    flat.extend(schema.flatten(new_config));

    let mut attr = stored_attr.as_object().cloned().unwrap_or_default();
    for group in schema.activatable_groups() {
        if let Some(entry) = new_attr.get(&group.name) {
            attr.insert(group.name.clone(), entry.clone());
        }
    }
    (schema.unflatten(&flat), Value::Object(attr))
}
