//! Encryption at rest of secret-kind values

use serde_json::Value;

use adcm_common::{AdcmResult, SecretVault};

use crate::model::{ConfigKind, PrototypeSchema};

fn value_at_mut<'a>(config: &'a mut Value, name: &str, subname: &str) -> Option<&'a mut Value> {
    let top = config.get_mut(name)?;
    if subname.is_empty() {
        Some(top)
    } else {
        top.get_mut(subname)
    }
}

fn transform(
    schema: &PrototypeSchema,
    config: &mut Value,
    f: impl Fn(&str) -> AdcmResult<String>,
) -> AdcmResult<()> {
    for field in schema.leaves().filter(|field| field.kind.is_secret()) {
        let Some(value) = value_at_mut(config, &field.name, &field.subname) else {
            continue;
        };
        match (field.kind, value) {
            (ConfigKind::SecretMap, Value::Object(entries)) => {
                for entry in entries.values_mut() {
                    if let Value::String(s) = entry {
                        *s = f(s)?;
                    }
                }
            }
            (_, Value::String(s)) if !s.is_empty() => *s = f(s)?,
            _ => {}
        }
    }
    Ok(())
}

/// Encrypt every plaintext secret of `config` in place
pub fn encrypt(schema: &PrototypeSchema, config: &mut Value, vault: &SecretVault) -> AdcmResult<()> {
    transform(schema, config, |s| Ok(vault.encrypt_if_plain(s)?))
}

/// Decrypt every encrypted secret of `config` in place
pub fn decrypt(schema: &PrototypeSchema, config: &mut Value, vault: &SecretVault) -> AdcmResult<()> {
    transform(schema, config, |s| Ok(vault.decrypt_if_encrypted(s)?))
}

/// Plaintext of a stored secret value, for comparisons
pub fn reveal(kind: ConfigKind, value: &Value, vault: &SecretVault) -> AdcmResult<Value> {
    Ok(match (kind, value) {
        (ConfigKind::SecretMap, Value::Object(entries)) => {
            let mut plain = entries.clone();
            for entry in plain.values_mut() {
                if let Value::String(s) = entry {
                    *s = vault.decrypt_if_encrypted(s)?;
                }
            }
            Value::Object(plain)
        }
        (kind, Value::String(s)) if kind.is_encrypted_string() => {
            Value::String(vault.decrypt_if_encrypted(s)?)
        }
        _ => value.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use adcm_common::VAULT_HEADER;
    use adcm_persistence::PrototypeConfigRow;
    use serde_json::json;

    fn schema() -> PrototypeSchema {
        let rows: Vec<PrototypeConfigRow> = serde_json::from_value(json!([
            {"name": "db", "type": "group"},
            {"name": "db", "subname": "pwd", "type": "password"},
            {"name": "db", "subname": "user", "type": "string"},
            {"name": "tokens", "type": "secretmap"},
            {"name": "empty", "type": "secrettext"}
        ]))
        .unwrap();
        PrototypeSchema::build(&rows).unwrap()
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        let vault = SecretVault::new(&SecretVault::generate_key());
        let schema = schema();
        let original = json!({
            "db": {"pwd": "s3cret", "user": "admin"},
            "tokens": {"a": "x", "b": "y"},
            "empty": ""
        });

        let mut config = original.clone();
        encrypt(&schema, &mut config, &vault).unwrap();
        assert!(config["db"]["pwd"].as_str().unwrap().starts_with(VAULT_HEADER));
        assert!(config["tokens"]["a"].as_str().unwrap().starts_with(VAULT_HEADER));
        assert_eq!(config["db"]["user"], json!("admin"));
        assert_eq!(config["empty"], json!(""));

        let stored = config.clone();
        encrypt(&schema, &mut config, &vault).unwrap();
        assert_eq!(config, stored);

        assert_eq!(
            reveal(ConfigKind::Password, &config["db"]["pwd"], &vault).unwrap(),
            json!("s3cret")
        );

        decrypt(&schema, &mut config, &vault).unwrap();
        assert_eq!(config, original);
    }
}
