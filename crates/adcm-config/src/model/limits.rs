//! Typed view of the `limits` map of a declared config key

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// State list of `read_only` / `writable`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateRule {
    Any,
    States(Vec<String>),
}

impl StateRule {
    fn parse(field: &str, value: &Value) -> Result<Self, String> {
        match value {
            Value::String(s) if s == "any" => Ok(StateRule::Any),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| format!("`{}` should list state names", field))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(StateRule::States),
            _ => Err(format!("`{}` should be \"any\" or a list of states", field)),
        }
    }

    pub fn matches(&self, state: Option<&str>) -> bool {
        match self {
            StateRule::Any => true,
            StateRule::States(states) => state.is_some_and(|s| states.iter().any(|x| x == s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantSourceKind {
    Inline,
    Config,
    Builtin,
}

fn default_strict() -> bool {
    true
}

/// `limits.source` of a variant key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSource {
    #[serde(rename = "type")]
    pub kind: VariantSourceKind,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub args: Option<Value>,
    #[serde(default = "default_strict")]
    pub strict: bool,
}

/// Limits recognized by the engine, parsed once per schema build
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Limits {
    pub min: Option<Number>,
    pub max: Option<Number>,
    pub option: Option<Map<String, Value>>,
    pub source: Option<VariantSource>,
    pub yspec: Option<Value>,
    pub read_only: Option<StateRule>,
    pub writable: Option<StateRule>,
    pub activatable: bool,
    pub active: bool,
    /// The limits as declared
    pub raw: Value,
}

impl Limits {
    pub fn parse(raw: &Value) -> Result<Self, String> {
        let mut limits = Limits {
            raw: raw.clone(),
            ..Default::default()
        };
        let map = match raw {
            Value::Null => return Ok(limits),
            Value::Object(map) => map,
            _ => return Err("limits should be a map".to_string()),
        };

        limits.min = number(map, "min")?;
        limits.max = number(map, "max")?;

        if let Some(option) = map.get("option") {
            let option = option
                .as_object()
                .ok_or("`option` should be a map of label to value")?;
            limits.option = Some(option.clone());
        }

        if let Some(source) = map.get("source") {
            let source: VariantSource = serde_json::from_value(source.clone())
                .map_err(|e| format!("invalid variant source: {}", e))?;
            limits.source = Some(source);
        }

        limits.yspec = map.get("yspec").cloned();

        if let Some(value) = map.get("read_only") {
            limits.read_only = Some(StateRule::parse("read_only", value)?);
        }
        if let Some(value) = map.get("writable") {
            limits.writable = Some(StateRule::parse("writable", value)?);
        }
        if limits.read_only.is_some() && limits.writable.is_some() {
            return Err("`read_only` and `writable` are mutually exclusive".to_string());
        }

        limits.activatable = flag(map, "activatable")?;
        limits.active = flag(map, "active")?;

        Ok(limits)
    }

    /// Whether a key with these limits is read-only for an object in `state`
    pub fn is_read_only(&self, state: Option<&str>) -> bool {
        if let Some(rule) = &self.read_only {
            return rule.matches(state);
        }
        if let Some(rule) = &self.writable {
            return !rule.matches(state);
        }
        false
    }

    /// Label values of an `option` key
    pub fn option_values(&self) -> impl Iterator<Item = &Value> {
        self.option.iter().flat_map(|labels| labels.values())
    }
}

fn number(map: &Map<String, Value>, key: &str) -> Result<Option<Number>, String> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(Some(n.clone())),
        Some(_) => Err(format!("`{}` should be a number", key)),
    }
}

fn flag(map: &Map<String, Value>, key: &str) -> Result<bool, String> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(format!("`{}` should be a boolean", key)),
    }
}

/// `value < bound`, exact for integers
pub fn number_lt(value: &Number, bound: &Number) -> bool {
    match (value.as_i64(), bound.as_i64()) {
        (Some(v), Some(b)) => v < b,
        _ => value.as_f64().unwrap_or(f64::NAN) < bound.as_f64().unwrap_or(f64::NAN),
    }
}
