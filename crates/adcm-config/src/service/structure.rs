//! Structural checker of `structure` values
//!
//! A `yspec` document is a map of named rules. Checking starts at the rule
//! named `root`; every rule carries a `match` kind:
//!
//! | match     | extra fields                                  |
//! |-----------|-----------------------------------------------|
//! | `string`, `int`, `float`, `bool`, `none`, `any` | -    |
//! | `list`    | `item`: rule name of every element            |
//! | `dict`    | `items`: key to rule name, `required_items`, `default_item` |
//! | `one_of`  | `variants`: rule names, first match wins       |
//! | `set`     | `variants`: literal values                    |

use serde_json::{Map, Value};

/// Checker of `structure` values against their `limits.yspec`
pub trait StructureChecker: Send + Sync {
    fn check(&self, yspec: &Value, value: &Value) -> Result<(), String>;
}

const MAX_DEPTH: usize = 64;

#[derive(Debug, Default, Clone, Copy)]
pub struct YspecChecker;

impl StructureChecker for YspecChecker {
    fn check(&self, yspec: &Value, value: &Value) -> Result<(), String> {
        let rules = yspec.as_object().ok_or("yspec should be a map of rules")?;
        check_rule(rules, "root", value, "$", 0)
    }
}

fn check_rule(
    rules: &Map<String, Value>,
    rule_name: &str,
    value: &Value,
    path: &str,
    depth: usize,
) -> Result<(), String> {
    if depth > MAX_DEPTH {
        return Err(format!("{}: yspec nesting is too deep", path));
    }
    let rule = rules
        .get(rule_name)
        .ok_or_else(|| format!("{}: unknown yspec rule \"{}\"", path, rule_name))?;
    let kind = rule
        .get("match")
        .and_then(Value::as_str)
        .ok_or_else(|| format!("{}: yspec rule \"{}\" has no match", path, rule_name))?;

    let expect = |ok: bool, what: &str| {
        if ok {
            Ok(())
        } else {
            Err(format!("{}: should be {}", path, what))
        }
    };

    match kind {
        "string" => expect(value.is_string(), "a string"),
        "int" => expect(value.is_i64(), "an integer"),
        "float" => expect(value.is_number(), "a number"),
        "bool" => expect(value.is_boolean(), "a boolean"),
        "none" => expect(value.is_null(), "null"),
        "any" => Ok(()),
        "list" => {
            let items = value
                .as_array()
                .ok_or_else(|| format!("{}: should be a list", path))?;
            let item_rule = rule_ref(rule, "item", path)?;
            for (i, item) in items.iter().enumerate() {
                check_rule(rules, item_rule, item, &format!("{}[{}]", path, i), depth + 1)?;
            }
            Ok(())
        }
        "dict" => {
            let entries = value
                .as_object()
                .ok_or_else(|| format!("{}: should be a map", path))?;
            let items = rule.get("items").and_then(Value::as_object);
            let default_item = rule.get("default_item").and_then(Value::as_str);

            for (key, item) in entries {
                let item_path = format!("{}.{}", path, key);
                let item_rule = items
                    .and_then(|items| items.get(key))
                    .and_then(Value::as_str)
                    .or(default_item)
                    .ok_or_else(|| format!("{}: key is not allowed", item_path))?;
                check_rule(rules, item_rule, item, &item_path, depth + 1)?;
            }

            if let Some(required) = rule.get("required_items").and_then(Value::as_array) {
                for key in required.iter().filter_map(Value::as_str) {
                    if !entries.contains_key(key) {
                        return Err(format!("{}.{}: key is required", path, key));
                    }
                }
            }
            Ok(())
        }
        "one_of" => {
            let variants = variants(rule, path)?;
            let matched = variants.iter().filter_map(Value::as_str).any(|variant| {
                check_rule(rules, variant, value, path, depth + 1).is_ok()
            });
            expect(matched, "one of the declared variants")
        }
        "set" => {
            let variants = variants(rule, path)?;
            expect(variants.contains(value), "one of the declared values")
        }
        other => Err(format!("{}: unknown yspec match \"{}\"", path, other)),
    }
}

fn rule_ref<'a>(rule: &'a Value, field: &str, path: &str) -> Result<&'a str, String> {
    rule.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("{}: yspec rule has no `{}`", path, field))
}

fn variants<'a>(rule: &'a Value, path: &str) -> Result<&'a Vec<Value>, String> {
    rule.get("variants")
        .and_then(Value::as_array)
        .ok_or_else(|| format!("{}: yspec rule has no `variants`", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn yspec() -> Value {
        json!({
            "root": {"match": "list", "item": "country"},
            "country": {
                "match": "dict",
                "items": {"name": "string", "code": "int", "tier": "tier"},
                "required_items": ["name"]
            },
            "tier": {"match": "set", "variants": ["gold", "silver"]},
            "string": {"match": "string"},
            "int": {"match": "int"}
        })
    }

    #[test]
    fn test_valid_document() {
        let value = json!([{"name": "Greece", "code": 30}, {"name": "Peru", "tier": "gold"}]);
        assert!(YspecChecker.check(&yspec(), &value).is_ok());
    }

    #[test]
    fn test_errors_name_the_path() {
        let err = YspecChecker
            .check(&yspec(), &json!([{"name": "Chad", "code": "235"}]))
            .unwrap_err();
        assert_eq!(err, "$[0].code: should be an integer");

        let err = YspecChecker.check(&yspec(), &json!([{"code": 1}])).unwrap_err();
        assert_eq!(err, "$[0].name: key is required");

        let err = YspecChecker
            .check(&yspec(), &json!([{"name": "x", "capital": "y"}]))
            .unwrap_err();
        assert_eq!(err, "$[0].capital: key is not allowed");

        let err = YspecChecker
            .check(&yspec(), &json!([{"name": "x", "tier": "bronze"}]))
            .unwrap_err();
        assert!(err.starts_with("$[0].tier"));
    }

    #[test]
    fn test_one_of_and_default_item() {
        let yspec = json!({
            "root": {"match": "dict", "default_item": "scalar"},
            "scalar": {"match": "one_of", "variants": ["string", "none"]},
            "string": {"match": "string"},
            "none": {"match": "none"}
        });
        assert!(YspecChecker.check(&yspec, &json!({"a": "x", "b": null})).is_ok());
        assert!(YspecChecker.check(&yspec, &json!({"a": 1})).is_err());
    }

    #[test]
    fn test_self_referencing_rule_terminates() {
        let yspec = json!({"root": {"match": "one_of", "variants": ["root"]}});
        assert!(YspecChecker.check(&yspec, &json!(1)).is_err());
    }

    #[test]
    fn test_unknown_rule() {
        let yspec = json!({"root": {"match": "list", "item": "missing"}});
        let err = YspecChecker.check(&yspec, &json!([1])).unwrap_err();
        assert!(err.contains("unknown yspec rule"));
    }
}
