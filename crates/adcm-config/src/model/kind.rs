//! Type registry of config value kinds
//!
//! Every declared config key has one [`ConfigKind`]. The kind decides how a
//! string-encoded default is parsed, which JSON shapes a value may take and
//! whether the value is encrypted at rest or materialized on disk.

use std::str::FromStr;

use serde_json::{Map, Value};

/// Value kind of a declared config key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKind {
    Group,
    String,
    Text,
    Password,
    SecretText,
    File,
    SecretFile,
    Integer,
    Float,
    Boolean,
    Option,
    Variant,
    List,
    Map,
    SecretMap,
    Json,
    Structure,
}

impl ConfigKind {
    pub const ALL: [ConfigKind; 17] = [
        ConfigKind::Group,
        ConfigKind::String,
        ConfigKind::Text,
        ConfigKind::Password,
        ConfigKind::SecretText,
        ConfigKind::File,
        ConfigKind::SecretFile,
        ConfigKind::Integer,
        ConfigKind::Float,
        ConfigKind::Boolean,
        ConfigKind::Option,
        ConfigKind::Variant,
        ConfigKind::List,
        ConfigKind::Map,
        ConfigKind::SecretMap,
        ConfigKind::Json,
        ConfigKind::Structure,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKind::Group => "group",
            ConfigKind::String => "string",
            ConfigKind::Text => "text",
            ConfigKind::Password => "password",
            ConfigKind::SecretText => "secrettext",
            ConfigKind::File => "file",
            ConfigKind::SecretFile => "secretfile",
            ConfigKind::Integer => "integer",
            ConfigKind::Float => "float",
            ConfigKind::Boolean => "boolean",
            ConfigKind::Option => "option",
            ConfigKind::Variant => "variant",
            ConfigKind::List => "list",
            ConfigKind::Map => "map",
            ConfigKind::SecretMap => "secretmap",
            ConfigKind::Json => "json",
            ConfigKind::Structure => "structure",
        }
    }

    /// Small numeric tag of the kind
    pub fn code(self) -> u8 {
        match self {
            ConfigKind::Group => 0,
            ConfigKind::String => 1,
            ConfigKind::Text => 2,
            ConfigKind::Password => 3,
            ConfigKind::SecretText => 4,
            ConfigKind::File => 5,
            ConfigKind::SecretFile => 6,
            ConfigKind::Integer => 7,
            ConfigKind::Float => 8,
            ConfigKind::Boolean => 9,
            ConfigKind::Option => 10,
            ConfigKind::Variant => 11,
            ConfigKind::List => 12,
            ConfigKind::Map => 13,
            ConfigKind::SecretMap => 14,
            ConfigKind::Json => 15,
            ConfigKind::Structure => 16,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Kinds whose whole string value is stored encrypted
    pub fn is_encrypted_string(self) -> bool {
        matches!(
            self,
            ConfigKind::Password | ConfigKind::SecretText | ConfigKind::SecretFile
        )
    }

    /// Kinds holding secrets in any form
    pub fn is_secret(self) -> bool {
        self.is_encrypted_string() || self == ConfigKind::SecretMap
    }

    /// Kinds materialized on disk
    pub fn is_file(self) -> bool {
        matches!(self, ConfigKind::File | ConfigKind::SecretFile)
    }

    /// Kinds whose value is a UTF-8 string
    pub fn is_string_like(self) -> bool {
        matches!(
            self,
            ConfigKind::String
                | ConfigKind::Text
                | ConfigKind::Password
                | ConfigKind::SecretText
                | ConfigKind::File
                | ConfigKind::SecretFile
                | ConfigKind::Variant
        )
    }

    /// Kinds on which `limits.min`/`limits.max` bound the character count
    pub fn has_length_limits(self) -> bool {
        matches!(
            self,
            ConfigKind::String | ConfigKind::Text | ConfigKind::Password | ConfigKind::SecretText
        )
    }

    /// Parse a string-encoded default into its typed form.
    ///
    /// An empty default is the null value. `option` defaults are resolved
    /// against the label map: a known label yields its value, anything else
    /// is returned as the raw string.
    pub fn parse_default(self, raw: &str, option: Option<&Map<String, Value>>) -> Result<Value, String> {
        if raw.is_empty() {
            return Ok(Value::Null);
        }
        match self {
            ConfigKind::Group => Ok(Value::Null),
            ConfigKind::String
            | ConfigKind::Text
            | ConfigKind::Password
            | ConfigKind::SecretText
            | ConfigKind::File
            | ConfigKind::SecretFile
            | ConfigKind::Variant => Ok(Value::String(raw.to_string())),
            ConfigKind::Integer => raw
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("\"{}\" is not an integer", raw)),
            ConfigKind::Float => raw
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("\"{}\" is not a float", raw)),
            ConfigKind::Boolean => parse_bool(raw)
                .map(Value::Bool)
                .ok_or_else(|| format!("\"{}\" is not a boolean", raw)),
            ConfigKind::Option => Ok(option
                .and_then(|labels| labels.get(raw))
                .cloned()
                .unwrap_or_else(|| Value::String(raw.to_string()))),
            ConfigKind::List
            | ConfigKind::Map
            | ConfigKind::SecretMap
            | ConfigKind::Json
            | ConfigKind::Structure => {
                let value: Value = serde_json::from_str(raw)
                    .map_err(|e| format!("default is not valid json: {}", e))?;
                self.check_shape(&value)?;
                Ok(value)
            }
        }
    }

    /// Check the JSON shape of a non-null value
    pub fn check_shape(self, value: &Value) -> Result<(), String> {
        let ok = match self {
            ConfigKind::Group => value.is_object(),
            ConfigKind::String
            | ConfigKind::Text
            | ConfigKind::Password
            | ConfigKind::SecretText
            | ConfigKind::File
            | ConfigKind::SecretFile
            | ConfigKind::Variant => value.is_string(),
            ConfigKind::Integer => value.is_i64(),
            ConfigKind::Float => value.is_number(),
            ConfigKind::Boolean => value.is_boolean(),
            ConfigKind::Option => value.is_string() || value.is_number() || value.is_boolean(),
            ConfigKind::List => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            ConfigKind::Map | ConfigKind::SecretMap => value
                .as_object()
                .is_some_and(|entries| entries.values().all(Value::is_string)),
            ConfigKind::Json | ConfigKind::Structure => true,
        };
        if ok {
            Ok(())
        } else {
            Err(format!("should be {}", self.expected()))
        }
    }

    fn expected(self) -> &'static str {
        match self {
            ConfigKind::Group => "a map",
            ConfigKind::Integer => "an integer",
            ConfigKind::Float => "a number",
            ConfigKind::Boolean => "a boolean",
            ConfigKind::Option => "a scalar",
            ConfigKind::List => "a list of strings",
            ConfigKind::Map | ConfigKind::SecretMap => "a map of strings",
            ConfigKind::Json | ConfigKind::Structure => "json",
            _ => "a string",
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

impl std::fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown config type \"{}\"", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_names_and_codes() {
        for kind in ConfigKind::ALL {
            assert_eq!(kind.as_str().parse::<ConfigKind>().unwrap(), kind);
            assert_eq!(ConfigKind::from_code(kind.code()), Some(kind));
        }
        assert!("float64".parse::<ConfigKind>().is_err());
        assert_eq!(ConfigKind::from_code(200), None);
    }

    #[test]
    fn test_parse_default_scalars() {
        assert_eq!(ConfigKind::Integer.parse_default("42", None).unwrap(), json!(42));
        assert_eq!(ConfigKind::Float.parse_default("0.5", None).unwrap(), json!(0.5));
        assert_eq!(ConfigKind::Boolean.parse_default("yes", None).unwrap(), json!(true));
        assert_eq!(ConfigKind::Boolean.parse_default("false", None).unwrap(), json!(false));
        assert_eq!(ConfigKind::String.parse_default("", None).unwrap(), Value::Null);
        assert!(ConfigKind::Integer.parse_default("4.2", None).is_err());
        assert!(ConfigKind::Boolean.parse_default("maybe", None).is_err());
    }

    #[test]
    fn test_parse_default_structured() {
        assert_eq!(
            ConfigKind::List.parse_default(r#"["a", "b"]"#, None).unwrap(),
            json!(["a", "b"])
        );
        assert!(ConfigKind::List.parse_default("[1]", None).is_err());
        assert!(ConfigKind::Map.parse_default("{bad", None).is_err());
        assert_eq!(
            ConfigKind::Json.parse_default(r#"{"k": [1, null]}"#, None).unwrap(),
            json!({"k": [1, null]})
        );
    }

    #[test]
    fn test_option_default_looks_up_label() {
        let labels = json!({"hi": "high", "port": 80});
        let labels = labels.as_object();
        assert_eq!(ConfigKind::Option.parse_default("hi", labels).unwrap(), json!("high"));
        assert_eq!(ConfigKind::Option.parse_default("port", labels).unwrap(), json!(80));
        assert_eq!(ConfigKind::Option.parse_default("low", labels).unwrap(), json!("low"));
    }

    #[test]
    fn test_check_shape() {
        assert!(ConfigKind::Integer.check_shape(&json!(7)).is_ok());
        assert!(ConfigKind::Integer.check_shape(&json!(7.5)).is_err());
        assert!(ConfigKind::Integer.check_shape(&json!(u64::MAX)).is_err());
        assert!(ConfigKind::Float.check_shape(&json!(7)).is_ok());
        assert!(ConfigKind::String.check_shape(&json!(1)).is_err());
        assert!(ConfigKind::Map.check_shape(&json!({"a": "b"})).is_ok());
        assert!(ConfigKind::Map.check_shape(&json!({"a": 1})).is_err());
        assert!(ConfigKind::Option.check_shape(&json!([1])).is_err());
        assert!(ConfigKind::Json.check_shape(&json!([1, {"a": null}])).is_ok());
    }

    #[test]
    fn test_secret_and_file_kinds() {
        assert!(ConfigKind::Password.is_encrypted_string());
        assert!(ConfigKind::SecretFile.is_encrypted_string());
        assert!(ConfigKind::SecretFile.is_file());
        assert!(ConfigKind::SecretMap.is_secret());
        assert!(!ConfigKind::SecretMap.is_encrypted_string());
        assert!(!ConfigKind::Text.is_secret());
    }
}
