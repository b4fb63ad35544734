//! Schema model of a prototype
//!
//! A [`PrototypeSchema`] is built once from the declared config rows of a
//! prototype and offers two projections of it:
//! - the flat view: `"name/subname"` to descriptor, in declaration order,
//!   with group headers keyed `"name/"`
//! - the nested view: `name` to descriptor, or to `{subname: descriptor}`
//!   for groups

use std::collections::HashMap;

use serde_json::{Map, Value, json};

use adcm_common::{AdcmError, AdcmResult};
use adcm_persistence::PrototypeConfigRow;

use super::kind::ConfigKind;
use super::limits::Limits;

/// Flat key of a declared config key
pub fn flat_key(name: &str, subname: &str) -> String {
    format!("{}/{}", name, subname)
}

/// Human readable key used in error messages
pub fn display_key(name: &str, subname: &str) -> String {
    if subname.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", name, subname)
    }
}

/// Value stored under `name`/`subname` of a nested config
pub fn value_at<'a>(config: &'a Value, name: &str, subname: &str) -> Option<&'a Value> {
    let top = config.get(name)?;
    if subname.is_empty() {
        Some(top)
    } else {
        top.get(subname)
    }
}

/// Descriptor of one declared config key
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub id: i64,
    pub name: String,
    pub subname: String,
    pub kind: ConfigKind,
    /// Typed default; for file kinds this is the bundle path
    pub default: Value,
    pub raw_default: String,
    pub required: bool,
    pub limits: Limits,
    pub ui_options: Value,
    pub display_name: String,
    pub description: String,
    pub group_customization: Option<bool>,
}

impl FieldSpec {
    fn from_row(row: &PrototypeConfigRow) -> Result<Self, String> {
        let kind = row.kind.parse::<ConfigKind>()?;
        let limits = Limits::parse(&row.limits)?;

        if kind == ConfigKind::Group && !row.subname.is_empty() {
            return Err("groups cannot be nested".to_string());
        }
        match kind {
            ConfigKind::Option if limits.option.is_none() => {
                return Err("option key has no `limits.option`".to_string());
            }
            ConfigKind::Variant if limits.source.is_none() => {
                return Err("variant key has no `limits.source`".to_string());
            }
            ConfigKind::Structure => match &limits.yspec {
                None => return Err("structure key has no `limits.yspec`".to_string()),
                Some(yspec) if yspec.get("root").is_none() => {
                    return Err("yspec has no `root` rule".to_string());
                }
                Some(_) => {}
            },
            _ => {}
        }

        let default = kind
            .parse_default(&row.default, limits.option.as_ref())
            .map_err(|e| format!("bad default: {}", e))?;

        Ok(Self {
            id: row.id,
            name: row.name.clone(),
            subname: row.subname.clone(),
            kind,
            default,
            raw_default: row.default.clone(),
            required: row.required,
            limits,
            ui_options: row.ui_options.clone(),
            display_name: row.display_name.clone(),
            description: row.description.clone(),
            group_customization: row.group_customization,
        })
    }

    pub fn key(&self) -> String {
        flat_key(&self.name, &self.subname)
    }

    pub fn display(&self) -> String {
        display_key(&self.name, &self.subname)
    }

    pub fn is_group(&self) -> bool {
        self.kind == ConfigKind::Group
    }

    pub fn is_activatable(&self) -> bool {
        self.is_group() && self.limits.activatable
    }

    /// JSON descriptor of the key as exposed to callers
    pub fn descriptor(&self) -> Value {
        json!({
            "name": self.name,
            "subname": self.subname,
            "type": self.kind.as_str(),
            "default": self.default,
            "required": self.required,
            "limits": self.limits.raw,
            "ui_options": self.ui_options,
            "display_name": self.display_name,
            "description": self.description,
            "group_customization": self.group_customization,
        })
    }
}

/// Config schema of one prototype
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrototypeSchema {
    fields: Vec<FieldSpec>,
    index: HashMap<String, usize>,
}

impl PrototypeSchema {
    /// Build the schema from declared rows in declaration order
    pub fn build(rows: &[PrototypeConfigRow]) -> AdcmResult<Self> {
        let mut schema = PrototypeSchema::default();

        for row in rows.iter().filter(|row| row.action_id.is_none()) {
            let key = display_key(&row.name, &row.subname);
            let field = FieldSpec::from_row(row)
                .map_err(|e| AdcmError::schema(format!("key \"{}\": {}", key, e)))?;
            if schema.index.contains_key(&field.key()) {
                return Err(AdcmError::schema(format!("key \"{}\" is declared twice", key)));
            }
            schema.index.insert(field.key(), schema.fields.len());
            schema.fields.push(field);
        }

        for field in &schema.fields {
            if !field.subname.is_empty() && schema.header(&field.name).is_none() {
                return Err(AdcmError::schema(format!(
                    "key \"{}\" has no group header",
                    field.display()
                )));
            }
            if field.is_group() && schema.children(&field.name).next().is_none() {
                return Err(AdcmError::schema(format!(
                    "group \"{}\" has no subkeys",
                    field.name
                )));
            }
        }

        Ok(schema)
    }

    /// All descriptors, group headers included, in declaration order
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Flat projection: `"name/subname"` to descriptor
    pub fn flat_spec(&self) -> impl Iterator<Item = (String, &FieldSpec)> {
        self.fields.iter().map(|field| (field.key(), field))
    }

    /// Nested projection: `name` to descriptor or `{subname: descriptor}`
    pub fn spec(&self) -> Value {
        let mut spec = Map::new();
        for field in self.top_level() {
            let node = if field.is_group() {
                Value::Object(
                    self.children(&field.name)
                        .map(|child| (child.subname.clone(), child.descriptor()))
                        .collect(),
                )
            } else {
                field.descriptor()
            };
            spec.insert(field.name.clone(), node);
        }
        Value::Object(spec)
    }

    pub fn get(&self, name: &str, subname: &str) -> Option<&FieldSpec> {
        self.index
            .get(&flat_key(name, subname))
            .map(|&idx| &self.fields[idx])
    }

    /// Group header of `name`
    pub fn header(&self, name: &str) -> Option<&FieldSpec> {
        self.get(name, "").filter(|field| field.is_group())
    }

    /// Subkeys of group `name`
    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FieldSpec> + 'a {
        self.fields
            .iter()
            .filter(move |field| field.name == name && !field.subname.is_empty())
    }

    /// Top-level keys: plain leaves and group headers
    pub fn top_level(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|field| field.subname.is_empty())
    }

    /// Value-carrying keys
    pub fn leaves(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|field| !field.is_group())
    }

    pub fn has_leaves(&self) -> bool {
        self.leaves().next().is_some()
    }

    pub fn activatable_groups(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|field| field.is_activatable())
    }

    /// Read-only status of a key, inherited from its group header
    pub fn is_read_only(&self, field: &FieldSpec, state: Option<&str>) -> bool {
        if field.limits.is_read_only(state) {
            return true;
        }
        !field.subname.is_empty()
            && self
                .header(&field.name)
                .is_some_and(|header| header.limits.is_read_only(state))
    }

    /// Whether the group a key belongs to is active under `attr`.
    /// Keys outside activatable groups are always active.
    pub fn is_active(&self, field: &FieldSpec, attr: &Value) -> bool {
        match self.header(&field.name) {
            Some(header) if header.limits.activatable => attr
                .get(&header.name)
                .and_then(|entry| entry.get("active"))
                .and_then(Value::as_bool)
                .unwrap_or(header.limits.active),
            _ => true,
        }
    }

    /// Flatten a nested config into `"name/subname"` keys, following the
    /// schema. Keys absent from the config are absent from the result.
    pub fn flatten(&self, config: &Value) -> Map<String, Value> {
        self.leaves()
            .filter_map(|field| {
                value_at(config, &field.name, &field.subname)
                    .map(|value| (field.key(), value.clone()))
            })
            .collect()
    }

    /// Rebuild a nested config from flat keys. Every group of the schema is
    /// present as a map; leaves missing from `flat` are null.
    pub fn unflatten(&self, flat: &Map<String, Value>) -> Value {
        let mut config = Map::new();
        for field in self.top_level() {
            let node = if field.is_group() {
                Value::Object(
                    self.children(&field.name)
                        .map(|child| {
                            let value = flat.get(&child.key()).cloned().unwrap_or(Value::Null);
                            (child.subname.clone(), value)
                        })
                        .collect(),
                )
            } else {
                flat.get(&field.key()).cloned().unwrap_or(Value::Null)
            };
            config.insert(field.name.clone(), node);
        }
        Value::Object(config)
    }
}
